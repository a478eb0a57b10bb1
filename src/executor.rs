//! The executor coordinator and its four bounded worker pools. One
//! coordinator loop claims actions from the store and hands each to a
//! per-kind `crossbeam_channel` whose capacity equals that kind's configured
//! parallelism; workers block on `recv`, so a full channel is itself the
//! backpressure signal the coordinator checks before claiming more.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, warn};
use parking_lot::Mutex;

use crate::action_store::{ActionStore, InProcessSet};
use crate::cancellation::CancellationToken;
use crate::counters::ModificationCounters;
use crate::error::{Result, SyncError};
use crate::model::{ActionKind, ActionStatus, SyncAction};
use crate::path_mapper::PathMapper;

const IDLE_BACKOFF: Duration = Duration::from_millis(200);
const DELETE_PARALLEL: usize = 1;

/// Operations the executor performs against the remote drive. Out of scope
/// beyond this trait boundary; a production host supplies the cloud SDK
/// binding.
pub trait PanClient: Send + Sync {
    fn upload(&self, local_path: &str, remote_path: &str, block_size: u64) -> Result<()>;
    fn download(&self, remote_path: &str, local_path: &str, block_size: u64) -> Result<()>;
    fn delete_remote(&self, remote_path: &str) -> Result<()>;
    fn mkdir_remote(&self, remote_path: &str) -> Result<()>;
}

pub struct ExecutorContext<'a> {
    pub mapper: &'a PathMapper,
    pub store: &'a ActionStore,
    pub in_process: &'a InProcessSet,
    pub counters: &'a ModificationCounters,
    pub client: &'a dyn PanClient,
    pub folder_create_mutex: &'a Mutex<()>,
    pub upload_parallel: usize,
    pub download_parallel: usize,
}

/// Runs the coordinator loop and all four worker pools for the lifetime of
/// this call, joining every pool before returning (not just downloads).
/// Callers run this on a dedicated thread and signal `token` to unwind it;
/// `thread::scope` makes joining all four pools on shutdown the only
/// possible outcome.
pub fn run_executor(ctx: &ExecutorContext, token: &CancellationToken, now: &(dyn Fn() -> i64 + Sync)) {
    let (upload_tx, upload_rx) = bounded::<SyncAction>(ctx.upload_parallel.max(1));
    let (download_tx, download_rx) = bounded::<SyncAction>(ctx.download_parallel.max(1));
    let (delete_local_tx, delete_local_rx) = bounded::<SyncAction>(DELETE_PARALLEL);
    let (delete_remote_tx, delete_remote_rx) = bounded::<SyncAction>(DELETE_PARALLEL);

    std::thread::scope(|scope| {
        for _ in 0..ctx.upload_parallel.max(1) {
            let rx = upload_rx.clone();
            scope.spawn(move || worker_loop(ctx, rx, now));
        }
        for _ in 0..ctx.download_parallel.max(1) {
            let rx = download_rx.clone();
            scope.spawn(move || worker_loop(ctx, rx, now));
        }
        for _ in 0..DELETE_PARALLEL {
            let rx = delete_local_rx.clone();
            scope.spawn(move || worker_loop(ctx, rx, now));
        }
        for _ in 0..DELETE_PARALLEL {
            let rx = delete_remote_rx.clone();
            scope.spawn(move || worker_loop(ctx, rx, now));
        }

        loop {
            if token.is_cancelled() {
                break;
            }
            if ctx.counters.action_pending() == 0 {
                token.sleep(IDLE_BACKOFF);
                continue;
            }

            let mut claimed_any = false;
            for kind in ActionKind::all() {
                let sender = sender_for(kind, &upload_tx, &download_tx, &delete_local_tx, &delete_remote_tx);
                if sender.len() >= sender.capacity().unwrap_or(1) {
                    continue;
                }
                match ctx.store.claim(kind, ctx.in_process) {
                    Ok(Some(action)) => {
                        ctx.in_process.insert(&action.id);
                        if sender.send(action.clone()).is_err() {
                            ctx.in_process.remove(&action.id);
                        } else {
                            claimed_any = true;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => warn!("claim({kind:?}) failed: {err}"),
                }
            }

            if !claimed_any {
                ctx.counters.decrement_action_pending();
                token.sleep(IDLE_BACKOFF);
            }
        }

        drop(upload_tx);
        drop(download_tx);
        drop(delete_local_tx);
        drop(delete_remote_tx);
    });
}

fn sender_for<'a>(
    kind: ActionKind,
    upload: &'a Sender<SyncAction>,
    download: &'a Sender<SyncAction>,
    delete_local: &'a Sender<SyncAction>,
    delete_remote: &'a Sender<SyncAction>,
) -> &'a Sender<SyncAction> {
    match kind {
        ActionKind::Upload => upload,
        ActionKind::Download => download,
        ActionKind::DeleteLocal => delete_local,
        ActionKind::DeleteRemote => delete_remote,
    }
}

fn worker_loop(ctx: &ExecutorContext, rx: Receiver<SyncAction>, now: &(dyn Fn() -> i64 + Sync)) {
    while let Ok(action) = rx.recv() {
        execute_one(ctx, action, now);
    }
}

fn execute_one(ctx: &ExecutorContext, action: SyncAction, now: &(dyn Fn() -> i64 + Sync)) {
    let result = match action.kind {
        ActionKind::Upload => {
            let _ = ctx.store.mark_status(&action.id, ActionStatus::Uploading, now(), None);
            do_upload(ctx, &action)
        }
        ActionKind::Download => {
            let _ = ctx.store.mark_status(&action.id, ActionStatus::Downloading, now(), None);
            do_download(ctx, &action)
        }
        ActionKind::DeleteLocal => do_delete_local(ctx, &action),
        ActionKind::DeleteRemote => do_delete_remote(ctx, &action),
    };

    let final_status = match &result {
        Ok(()) => ActionStatus::Success,
        Err(SyncError::Illegal(_)) => ActionStatus::Illegal,
        Err(SyncError::NotExisted(_)) => ActionStatus::NotExisted,
        Err(_) => ActionStatus::Create,
    };
    if let Err(err) = &result {
        warn!("action {} failed: {err}", action.id);
    } else {
        debug!("action {} completed", action.id);
    }
    if let Err(err) = ctx.store.mark_status(&action.id, final_status, now(), None) {
        warn!("failed to persist status for {}: {err}", action.id);
    }
    ctx.in_process.remove(&action.id);
}

fn do_upload(ctx: &ExecutorContext, action: &SyncAction) -> Result<()> {
    let local_path = ctx.mapper.local_abs(&action.rel_path);
    let remote_path = ctx.mapper.remote_abs(&action.rel_path);
    if let Some(parent) = parent_of(&remote_path) {
        let _guard = ctx.folder_create_mutex.lock();
        ctx.client.mkdir_remote(parent)?;
    }
    if !std::path::Path::new(&local_path).exists() {
        return Err(SyncError::NotExisted(local_path));
    }
    ctx.client.upload(&local_path, &remote_path, action.block_size)
}

fn do_download(ctx: &ExecutorContext, action: &SyncAction) -> Result<()> {
    let local_path = ctx.mapper.local_abs(&action.rel_path);
    let remote_path = ctx.mapper.remote_abs(&action.rel_path);
    if let Some(parent) = parent_of(&local_path) {
        std::fs::create_dir_all(parent)?;
    }
    ctx.client.download(&remote_path, &local_path, action.block_size)
}

fn do_delete_local(ctx: &ExecutorContext, action: &SyncAction) -> Result<()> {
    let local_path = ctx.mapper.local_abs(&action.rel_path);
    match std::fs::remove_file(&local_path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(_) => match std::fs::remove_dir_all(&local_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        },
    }
}

fn do_delete_remote(ctx: &ExecutorContext, action: &SyncAction) -> Result<()> {
    let remote_path = ctx.mapper.remote_abs(&action.rel_path);
    match ctx.client.delete_remote(&remote_path) {
        Ok(()) => Ok(()),
        // A target already absent on the remote is the expected outcome when
        // retiring a local tombstone whose remote side was already gone, not
        // a failure.
        Err(SyncError::NotExisted(_)) => Ok(()),
        Err(err) => Err(err),
    }
}

fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent).filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_store::ActionStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingClient {
        uploads: AtomicUsize,
        downloads: AtomicUsize,
        fail_next_upload: std::sync::atomic::AtomicBool,
    }

    impl PanClient for RecordingClient {
        fn upload(&self, _local_path: &str, _remote_path: &str, _block_size: u64) -> Result<()> {
            if self.fail_next_upload.swap(false, Ordering::SeqCst) {
                return Err(SyncError::Transfer("simulated failure".into()));
            }
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn download(&self, _remote_path: &str, _local_path: &str, _block_size: u64) -> Result<()> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn delete_remote(&self, _remote_path: &str) -> Result<()> {
            Ok(())
        }
        fn mkdir_remote(&self, _remote_path: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn successful_upload_marks_the_action_as_success() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.txt");
        std::fs::write(&file_path, b"hello").unwrap();

        let mapper = PathMapper::new(dir.path(), "/R");
        let store = ActionStore::open_in_memory().unwrap();
        let in_process = InProcessSet::new();
        let counters = ModificationCounters::new();
        let folder_create_mutex = Mutex::new(());
        let client = RecordingClient::default();

        let action = SyncAction::new(ActionKind::Upload, "a.txt");
        store.admit(&action, 0).unwrap();

        let ctx = ExecutorContext {
            mapper: &mapper,
            store: &store,
            in_process: &in_process,
            counters: &counters,
            client: &client,
            folder_create_mutex: &folder_create_mutex,
            upload_parallel: 1,
            download_parallel: 1,
        };

        execute_one(&ctx, action.clone(), &|| 0);

        let stored = store.get(&action.id).unwrap().unwrap();
        assert_eq!(stored.status, ActionStatus::Success);
        assert_eq!(client.uploads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transient_failure_resets_status_to_create_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();

        let mapper = PathMapper::new(dir.path(), "/R");
        let store = ActionStore::open_in_memory().unwrap();
        let in_process = InProcessSet::new();
        let counters = ModificationCounters::new();
        let folder_create_mutex = Mutex::new(());
        let client = RecordingClient::default();
        client.fail_next_upload.store(true, Ordering::SeqCst);

        let action = SyncAction::new(ActionKind::Upload, "a.txt");
        store.admit(&action, 0).unwrap();

        let ctx = ExecutorContext {
            mapper: &mapper,
            store: &store,
            in_process: &in_process,
            counters: &counters,
            client: &client,
            folder_create_mutex: &folder_create_mutex,
            upload_parallel: 1,
            download_parallel: 1,
        };

        execute_one(&ctx, action.clone(), &|| 0);

        let stored = store.get(&action.id).unwrap().unwrap();
        assert_eq!(stored.status, ActionStatus::Create);
    }

    #[test]
    fn delete_local_treats_an_already_missing_file_as_success() {
        let dir = tempfile::tempdir().unwrap();
        let mapper = PathMapper::new(dir.path(), "/R");
        let store = ActionStore::open_in_memory().unwrap();
        let in_process = InProcessSet::new();
        let counters = ModificationCounters::new();
        let folder_create_mutex = Mutex::new(());
        let client = RecordingClient::default();

        let action = SyncAction::new(ActionKind::DeleteLocal, "gone.txt");
        store.admit(&action, 0).unwrap();

        let ctx = ExecutorContext {
            mapper: &mapper,
            store: &store,
            in_process: &in_process,
            counters: &counters,
            client: &client,
            folder_create_mutex: &folder_create_mutex,
            upload_parallel: 1,
            download_parallel: 1,
        };

        execute_one(&ctx, action.clone(), &|| 0);
        let stored = store.get(&action.id).unwrap().unwrap();
        assert_eq!(stored.status, ActionStatus::Success);
    }
}
