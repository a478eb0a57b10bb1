//! `FileActionTaskManager`: owns every process-wide mutable structure for
//! one sync pair (action store, in-process set, folder queues, counters,
//! cancellation token) and the three long-running threads that drive them.
//! Nothing here is a global `static`: each instance is independent, so a
//! host running several sync pairs simply constructs several managers.

use std::path::PathBuf;
use std::sync::Arc;

use log::info;
use parking_lot::Mutex;

use crate::action_store::{ActionStore, InProcessSet};
use crate::cancellation::CancellationToken;
use crate::config::SyncConfig;
use crate::counters::ModificationCounters;
use crate::differ::{run_local_differ, run_remote_differ, DifferContext, FolderQueue};
use crate::error::{Result, SyncError};
use crate::executor::{run_executor, ExecutorContext, PanClient};
use crate::hash::{ContentHasher, Sha1Hasher};
use crate::inventory::{LocalFileDb, PanFileDb};
use crate::path_mapper::PathMapper;

/// Everything the manager needs at construction time. `local_db`/`pan_db`
/// are shared read/write with the external walker and cloud scanner;
/// `client` and `hasher` are the out-of-scope collaborators this crate only
/// consumes through their trait boundary.
pub struct ManagerDeps {
    pub config: SyncConfig,
    pub local_db: Arc<dyn LocalFileDb>,
    pub pan_db: Arc<dyn PanFileDb>,
    pub client: Arc<dyn PanClient>,
    pub hasher: Arc<dyn ContentHasher>,
    pub action_db_path: Option<PathBuf>,
}

impl ManagerDeps {
    /// Convenience constructor using the bundled reference SHA-1 hasher.
    pub fn with_default_hasher(
        config: SyncConfig,
        local_db: Arc<dyn LocalFileDb>,
        pan_db: Arc<dyn PanFileDb>,
        client: Arc<dyn PanClient>,
    ) -> Self {
        Self {
            config,
            local_db,
            pan_db,
            client,
            hasher: Arc::new(Sha1Hasher),
            action_db_path: None,
        }
    }
}

enum RunningTasks {
    None,
    Running {
        token: CancellationToken,
        local_differ: std::thread::JoinHandle<()>,
        remote_differ: std::thread::JoinHandle<()>,
        executor: std::thread::JoinHandle<()>,
    },
}

pub struct FileActionTaskManager {
    config: SyncConfig,
    mapper: PathMapper,
    local_db: Arc<dyn LocalFileDb>,
    pan_db: Arc<dyn PanFileDb>,
    client: Arc<dyn PanClient>,
    hasher: Arc<dyn ContentHasher>,
    store: Arc<ActionStore>,
    in_process: Arc<InProcessSet>,
    counters: Arc<ModificationCounters>,
    local_queue: Arc<Mutex<FolderQueue>>,
    remote_queue: Arc<Mutex<FolderQueue>>,
    folder_create_mutex: Arc<Mutex<()>>,
    tasks: Mutex<RunningTasks>,
}

impl FileActionTaskManager {
    pub fn new(deps: ManagerDeps) -> Result<Self> {
        deps.config.validate()?;
        let mapper = PathMapper::new(&deps.config.local_folder_path, &deps.config.pan_folder_path);
        let store = match &deps.action_db_path {
            Some(path) => ActionStore::open(path)?,
            None => ActionStore::open_in_memory()?,
        };

        Ok(Self {
            config: deps.config,
            mapper,
            local_db: deps.local_db,
            pan_db: deps.pan_db,
            client: deps.client,
            hasher: deps.hasher,
            store: Arc::new(store),
            in_process: Arc::new(InProcessSet::new()),
            counters: Arc::new(ModificationCounters::new()),
            local_queue: Arc::new(Mutex::new(FolderQueue::new())),
            remote_queue: Arc::new(Mutex::new(FolderQueue::new())),
            folder_create_mutex: Arc::new(Mutex::new(())),
            tasks: Mutex::new(RunningTasks::None),
        })
    }

    pub fn path_mapper(&self) -> &PathMapper {
        &self.mapper
    }

    pub fn action_store(&self) -> &ActionStore {
        &self.store
    }

    /// Starts the two differs and the executor coordinator, each on its own
    /// thread. Returns `SyncError::AlreadyRunning` if already started.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut tasks = self.tasks.lock();
        if !matches!(*tasks, RunningTasks::None) {
            return Err(SyncError::AlreadyRunning);
        }

        let token = CancellationToken::new();

        let local_differ = {
            let manager = Arc::clone(self);
            let token = token.clone();
            std::thread::Builder::new()
                .name("local-differ".into())
                .spawn(move || {
                    let ctx = manager.differ_context();
                    run_local_differ(&ctx, &token, now);
                })
                .expect("failed to spawn local differ thread")
        };

        let remote_differ = {
            let manager = Arc::clone(self);
            let token = token.clone();
            std::thread::Builder::new()
                .name("remote-differ".into())
                .spawn(move || {
                    let ctx = manager.differ_context();
                    run_remote_differ(&ctx, &token, now);
                })
                .expect("failed to spawn remote differ thread")
        };

        let executor = {
            let manager = Arc::clone(self);
            let token = token.clone();
            std::thread::Builder::new()
                .name("executor-coordinator".into())
                .spawn(move || {
                    let ctx = manager.executor_context();
                    run_executor(&ctx, &token, &now);
                })
                .expect("failed to spawn executor coordinator thread")
        };

        info!(
            "started sync engine for {} <-> {}",
            self.mapper.local_root(),
            self.mapper.remote_root()
        );

        *tasks = RunningTasks::Running {
            token,
            local_differ,
            remote_differ,
            executor,
        };
        Ok(())
    }

    /// Signals cancellation and joins all three long-running threads, which
    /// in turn join all four of the executor's worker pools: every pool is
    /// joined on shutdown, not only downloads.
    pub fn stop(&self) -> Result<()> {
        let mut tasks = self.tasks.lock();
        match std::mem::replace(&mut *tasks, RunningTasks::None) {
            RunningTasks::None => Err(SyncError::NotRunning),
            RunningTasks::Running {
                token,
                local_differ,
                remote_differ,
                executor,
            } => {
                token.cancel();
                let _ = local_differ.join();
                let _ = remote_differ.join();
                let _ = executor.join();
                info!("stopped sync engine for {}", self.mapper.local_root());
                Ok(())
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !matches!(*self.tasks.lock(), RunningTasks::None)
    }

    /// Called by the external local walker after a scan observed a change.
    /// Tolerated as a no-op (logged at `warn`) when the manager was never
    /// started, rather than surfacing `SyncError::NotRunning` to a caller
    /// that cannot reasonably be expected to track engine lifecycle.
    pub fn add_local_folder_modify_count(&self) {
        if !self.is_running() {
            log::warn!("add_local_folder_modify_count called while the engine is not running");
        }
        self.counters.bump_local_changed();
    }

    /// Called by the external cloud scanner after a scan observed a change.
    pub fn add_pan_folder_modify_count(&self) {
        if !self.is_running() {
            log::warn!("add_pan_folder_modify_count called while the engine is not running");
        }
        self.counters.bump_remote_changed();
    }

    fn differ_context(&self) -> DifferContext<'_> {
        DifferContext {
            local_db: self.local_db.as_ref(),
            pan_db: self.pan_db.as_ref(),
            mapper: &self.mapper,
            hasher: self.hasher.as_ref(),
            store: &self.store,
            counters: &self.counters,
            local_queue: &self.local_queue,
            remote_queue: &self.remote_queue,
            mode: self.config.mode,
            upload_block_size: self.config.file_upload_block_size,
            download_block_size: self.config.file_download_block_size,
            drive_id: &self.config.drive_id,
        }
    }

    fn executor_context(&self) -> ExecutorContext<'_> {
        ExecutorContext {
            mapper: &self.mapper,
            store: &self.store,
            in_process: &self.in_process,
            counters: &self.counters,
            client: self.client.as_ref(),
            folder_create_mutex: &self.folder_create_mutex,
            upload_parallel: self.config.file_upload_parallel,
            download_parallel: self.config.file_download_parallel,
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncMode;
    use crate::inventory::MemoryFileDb;
    use crate::model::{LocalFileItem, PanFileItem, ScanStatus};

    struct NoopClient;
    impl PanClient for NoopClient {
        fn upload(&self, _: &str, _: &str, _: u64) -> Result<()> {
            Ok(())
        }
        fn download(&self, _: &str, _: &str, _: u64) -> Result<()> {
            Ok(())
        }
        fn delete_remote(&self, _: &str) -> Result<()> {
            Ok(())
        }
        fn mkdir_remote(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    fn make_manager(mode: SyncMode) -> Arc<FileActionTaskManager> {
        let local_mem = MemoryFileDb::<LocalFileItem>::new();
        local_mem.seed(
            "/L",
            LocalFileItem {
                path: "/L".into(),
                is_folder: true,
                size: 0,
                modified_at: 0,
                hash: String::new(),
                scan_status: ScanStatus::Normal,
            },
        );
        let pan_mem = MemoryFileDb::<PanFileItem>::new();
        pan_mem.seed(
            "/R",
            PanFileItem {
                path: "/R".into(),
                is_folder: true,
                size: 0,
                modified_at: 0,
                hash: String::new(),
                scan_status: ScanStatus::Normal,
                updated_at_token: String::new(),
            },
        );

        let config = SyncConfig {
            local_folder_path: "/L".into(),
            pan_folder_path: "/R".into(),
            drive_id: "drive-1".into(),
            mode,
            ..SyncConfig::default()
        };

        let deps = ManagerDeps::with_default_hasher(
            config,
            Arc::new(local_mem) as Arc<dyn LocalFileDb>,
            Arc::new(pan_mem) as Arc<dyn PanFileDb>,
            Arc::new(NoopClient) as Arc<dyn PanClient>,
        );
        Arc::new(FileActionTaskManager::new(deps).unwrap())
    }

    #[test]
    fn start_twice_is_rejected() {
        let manager = make_manager(SyncMode::SyncTwoWay);
        manager.start().unwrap();
        assert!(matches!(manager.start(), Err(SyncError::AlreadyRunning)));
        manager.stop().unwrap();
    }

    #[test]
    fn stop_without_start_is_rejected() {
        let manager = make_manager(SyncMode::SyncTwoWay);
        assert!(matches!(manager.stop(), Err(SyncError::NotRunning)));
    }

    #[test]
    fn start_then_stop_joins_cleanly() {
        let manager = make_manager(SyncMode::UploadOnly);
        manager.start().unwrap();
        manager.add_local_folder_modify_count();
        std::thread::sleep(std::time::Duration::from_millis(50));
        manager.stop().unwrap();
        assert!(!manager.is_running());
    }
}
