//! Demo binary wiring the reconciliation engine against the bundled
//! in-memory inventory stores and a logging stand-in for a cloud-drive
//! client. Sink configuration (this `env_logger::init()` call) is the
//! host's job, per the ambient-stack split documented in the crate's design
//! notes (the engine itself only emits `log` records).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cloudsync_engine::executor::PanClient;
use cloudsync_engine::inventory::MemoryFileDb;
use cloudsync_engine::model::{LocalFileItem, PanFileItem, ScanStatus};
use cloudsync_engine::{FileActionTaskManager, ManagerDeps, Result, SyncConfig, SyncMode};

const HELLO_CONTENTS: &[u8] = b"hello world!\n";

/// Logs transfers instead of performing them; stands in for a real
/// cloud-drive SDK binding in this demo.
struct LoggingClient;

impl PanClient for LoggingClient {
    fn upload(&self, local_path: &str, remote_path: &str, block_size: u64) -> Result<()> {
        log::info!("upload {local_path} -> {remote_path} (block_size={block_size})");
        Ok(())
    }

    fn download(&self, remote_path: &str, local_path: &str, block_size: u64) -> Result<()> {
        log::info!("download {remote_path} -> {local_path} (block_size={block_size})");
        Ok(())
    }

    fn delete_remote(&self, remote_path: &str) -> Result<()> {
        log::info!("delete_remote {remote_path}");
        Ok(())
    }

    fn mkdir_remote(&self, remote_path: &str) -> Result<()> {
        log::info!("mkdir_remote {remote_path}");
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let local_root = "/tmp/cloudsync-demo/local";
    let remote_root = "/cloudsync-demo";

    std::fs::create_dir_all(local_root)?;
    std::fs::write(format!("{local_root}/hello.txt"), HELLO_CONTENTS)?;

    let local_db = MemoryFileDb::<LocalFileItem>::new();
    local_db.seed(
        local_root,
        LocalFileItem {
            path: local_root.to_string(),
            is_folder: true,
            size: 0,
            modified_at: 0,
            hash: String::new(),
            scan_status: ScanStatus::Normal,
        },
    );
    local_db.seed(
        format!("{local_root}/hello.txt"),
        LocalFileItem {
            path: format!("{local_root}/hello.txt"),
            is_folder: false,
            size: HELLO_CONTENTS.len() as u64,
            modified_at: 100,
            hash: String::new(),
            scan_status: ScanStatus::Normal,
        },
    );

    let pan_db = MemoryFileDb::<PanFileItem>::new();
    pan_db.seed(
        remote_root,
        PanFileItem {
            path: remote_root.to_string(),
            is_folder: true,
            size: 0,
            modified_at: 0,
            hash: String::new(),
            scan_status: ScanStatus::Normal,
            updated_at_token: String::new(),
        },
    );

    let config = SyncConfig {
        local_folder_path: PathBuf::from(local_root),
        pan_folder_path: remote_root.to_string(),
        drive_id: "demo-drive".to_string(),
        mode: SyncMode::UploadOnly,
        ..SyncConfig::default()
    };

    let deps = ManagerDeps::with_default_hasher(
        config,
        Arc::new(local_db),
        Arc::new(pan_db),
        Arc::new(LoggingClient),
    );
    let manager = Arc::new(FileActionTaskManager::new(deps)?);

    manager.start()?;
    manager.add_local_folder_modify_count();
    manager.add_pan_folder_modify_count();

    std::thread::sleep(Duration::from_secs(2));

    manager.stop()?;
    Ok(())
}
