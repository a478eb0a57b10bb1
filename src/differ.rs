//! The two BFS traversal loops that convert two scanned inventories into a
//! stream of `SyncAction` emissions. `sweep_one_folder` holds the per-child
//! decision table shared by both loops; only the trigger counter and which
//! queue a loop drains differ between them. The two BFS queues are shared
//! (behind their own mutex) so a folder discovered by one loop's sweep can
//! be handed to the other loop for deeper comparison.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::action_store::ActionStore;
use crate::cancellation::CancellationToken;
use crate::config::SyncMode;
use crate::counters::ModificationCounters;
use crate::error::Result;
use crate::hash::ContentHasher;
use crate::inventory::{LocalFileDb, PanFileDb};
use crate::model::{ActionKind, InventoryEntry, LocalFileItem, PanFileItem, ScanStatus, SyncAction};
use crate::path_mapper::PathMapper;
use crate::set_algebra::diff_children;

const IDLE_BACKOFF: Duration = Duration::from_millis(300);
const EMPTY_ROOT_BACKOFF: Duration = Duration::from_millis(500);

/// FIFO of folder paths awaiting BFS expansion, deduplicated on push so a
/// folder cannot be queued twice before it is popped.
#[derive(Default)]
pub struct FolderQueue {
    order: VecDeque<String>,
    queued: HashSet<String>,
}

impl FolderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `path` was newly enqueued.
    pub fn push(&mut self, path: impl Into<String>) -> bool {
        let path = path.into();
        if self.queued.insert(path.clone()) {
            self.order.push_back(path);
            true
        } else {
            false
        }
    }

    pub fn pop(&mut self) -> Option<String> {
        let path = self.order.pop_front()?;
        self.queued.remove(&path);
        Some(path)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn reseed(&mut self, root: impl Into<String>) {
        self.order.clear();
        self.queued.clear();
        self.push(root);
    }
}

/// Folder identity travels as a local absolute path in both queues, even
/// the remote-rooted one; the path mapper recovers the paired remote
/// folder at each step. This keeps the per-child decision table written
/// once instead of duplicated with local/remote swapped.
pub struct DifferContext<'a> {
    pub local_db: &'a dyn LocalFileDb,
    pub pan_db: &'a dyn PanFileDb,
    pub mapper: &'a PathMapper,
    pub hasher: &'a dyn ContentHasher,
    pub store: &'a ActionStore,
    pub counters: &'a ModificationCounters,
    pub local_queue: &'a Mutex<FolderQueue>,
    pub remote_queue: &'a Mutex<FolderQueue>,
    pub mode: SyncMode,
    pub upload_block_size: u64,
    pub download_block_size: u64,
    pub drive_id: &'a str,
}

/// Drives the local-rooted loop until cancelled. Blocks the calling thread.
pub fn run_local_differ(ctx: &DifferContext, token: &CancellationToken, now: impl Fn() -> i64) {
    ctx.local_queue.lock().reseed(ctx.mapper.local_root().to_string());

    while !token.is_cancelled() {
        if ctx.local_db.get(ctx.mapper.local_root()).unwrap_or(None).is_none() {
            token.sleep(EMPTY_ROOT_BACKOFF);
            continue;
        }
        if ctx.counters.local_changed() == 0 {
            token.sleep(IDLE_BACKOFF);
            continue;
        }
        let popped = ctx.local_queue.lock().pop();
        let Some(folder) = popped else {
            ctx.local_queue.lock().reseed(ctx.mapper.local_root().to_string());
            ctx.counters.decrement_local_changed();
            token.sleep(IDLE_BACKOFF);
            continue;
        };
        if let Err(err) = sweep_one_folder(ctx, &folder, now()) {
            warn!("local differ sweep of {folder} failed: {err}");
        }
    }
}

/// Drives the remote-rooted loop until cancelled. Blocks the calling thread.
pub fn run_remote_differ(ctx: &DifferContext, token: &CancellationToken, now: impl Fn() -> i64) {
    ctx.remote_queue.lock().reseed(ctx.mapper.local_root().to_string());

    while !token.is_cancelled() {
        if ctx.pan_db.get(ctx.mapper.remote_root()).unwrap_or(None).is_none() {
            token.sleep(EMPTY_ROOT_BACKOFF);
            continue;
        }
        if ctx.counters.remote_changed() == 0 {
            token.sleep(IDLE_BACKOFF);
            continue;
        }
        let popped = ctx.remote_queue.lock().pop();
        let Some(folder) = popped else {
            ctx.remote_queue.lock().reseed(ctx.mapper.local_root().to_string());
            ctx.counters.decrement_remote_changed();
            token.sleep(IDLE_BACKOFF);
            continue;
        };
        if let Err(err) = sweep_one_folder(ctx, &folder, now()) {
            warn!("remote differ sweep of {folder} failed: {err}");
        }
    }
}

/// Compares one folder's children on both sides and emits actions or BFS
/// pushes.
fn sweep_one_folder(ctx: &DifferContext, local_folder: &str, now: i64) -> Result<()> {
    let remote_folder = ctx.mapper.to_remote(local_folder);
    let local_children = ctx.local_db.list_children(local_folder)?;
    let remote_children = ctx.pan_db.list_children(&remote_folder)?;

    let diff = diff_children(
        &local_children,
        &remote_children,
        ctx.mapper.local_root(),
        ctx.mapper.remote_root(),
    );

    for entry in diff.local_only {
        handle_local_only(ctx, entry, now)?;
    }
    for entry in diff.remote_only {
        handle_remote_only(ctx, entry, now)?;
    }
    for (local, remote) in diff.both {
        handle_pair(ctx, local, remote, now)?;
    }
    Ok(())
}

fn handle_local_only(ctx: &DifferContext, entry: &LocalFileItem, now: i64) -> Result<()> {
    match entry.scan_status {
        ScanStatus::Normal if entry.is_folder => {
            ctx.local_queue.lock().push(entry.path.clone());
        }
        ScanStatus::Normal => {
            if ctx.mode.uploads() {
                emit(ctx, ActionKind::Upload, entry, now)?;
            }
        }
        ScanStatus::Discard => {
            if ctx.mode.uploads() {
                emit(ctx, ActionKind::DeleteRemote, entry, now)?;
            } else {
                ctx.local_db.delete(&entry.path)?;
            }
        }
    }
    Ok(())
}

fn handle_remote_only(ctx: &DifferContext, entry: &PanFileItem, now: i64) -> Result<()> {
    match entry.scan_status {
        ScanStatus::Normal if entry.is_folder => {
            ctx.remote_queue.lock().push(ctx.mapper.to_local(&entry.path));
        }
        ScanStatus::Normal => {
            if ctx.mode.downloads() {
                emit_remote(ctx, ActionKind::Download, entry, now)?;
            }
        }
        ScanStatus::Discard => {
            if ctx.mode.downloads() {
                emit_remote(ctx, ActionKind::DeleteLocal, entry, now)?;
            } else {
                ctx.pan_db.delete(&entry.path)?;
            }
        }
    }
    Ok(())
}

fn handle_pair(ctx: &DifferContext, local: &LocalFileItem, remote: &PanFileItem, now: i64) -> Result<()> {
    if local.scan_status == ScanStatus::Discard && remote.scan_status == ScanStatus::Discard {
        ctx.local_db.delete(&local.path)?;
        ctx.pan_db.delete(&remote.path)?;
        return Ok(());
    }

    let same_content = !local.hash.is_empty() && local.hash.eq_ignore_ascii_case(&remote.hash);
    if local.scan_status == ScanStatus::Discard && remote.scan_status == ScanStatus::Normal && same_content {
        if ctx.mode.uploads() {
            emit(ctx, ActionKind::DeleteRemote, local, now)?;
        } else {
            ctx.local_db.delete(&local.path)?;
        }
        return Ok(());
    }
    if remote.scan_status == ScanStatus::Discard && local.scan_status == ScanStatus::Normal && same_content {
        if ctx.mode.downloads() {
            emit_remote(ctx, ActionKind::DeleteLocal, remote, now)?;
        } else {
            ctx.pan_db.delete(&remote.path)?;
        }
        return Ok(());
    }

    if local.is_folder || remote.is_folder {
        ctx.local_queue.lock().push(local.path.clone());
        ctx.remote_queue.lock().push(local.path.clone());
        return Ok(());
    }

    let mut local = local.clone();
    if local.hash.is_empty() && local.size > 0 {
        match read_and_hash(ctx, &local) {
            Ok(hash) => {
                local.hash = hash;
                ctx.local_db.update(local.clone())?;
            }
            Err(err) => {
                warn!("hashing {} failed: {err}", local.path);
                return Ok(());
            }
        }
    } else if local.hash.is_empty() {
        local.hash = crate::hash::EMPTY_CONTENT_HASH.to_string();
    }

    if local.hash.eq_ignore_ascii_case(&remote.hash) {
        return Ok(());
    }

    match ctx.mode {
        SyncMode::UploadOnly => emit(ctx, ActionKind::Upload, &local, now)?,
        SyncMode::DownloadOnly => emit_remote(ctx, ActionKind::Download, remote, now)?,
        SyncMode::SyncTwoWay => {
            if local.modified_at > remote.modified_at {
                emit(ctx, ActionKind::Upload, &local, now)?;
            } else if local.modified_at < remote.modified_at {
                emit_remote(ctx, ActionKind::Download, remote, now)?;
            }
        }
    }
    Ok(())
}

fn read_and_hash(ctx: &DifferContext, item: &LocalFileItem) -> Result<String> {
    let bytes = std::fs::read(&item.path).map_err(|source| crate::error::SyncError::Hashing {
        path: item.path.clone(),
        source,
    })?;
    Ok(ctx.hasher.hash(&bytes))
}

fn emit(ctx: &DifferContext, kind: ActionKind, local: &LocalFileItem, now: i64) -> Result<()> {
    let rel_path = PathMapper::relative_of(local.path(), ctx.mapper.local_root());
    let mut action = SyncAction::new(kind, rel_path);
    action.drive_id = ctx.drive_id.to_string();
    action.size = local.size;
    action.block_size = match kind {
        ActionKind::Upload => ctx.upload_block_size,
        _ => ctx.download_block_size,
    };
    action.peer_updated_at_token = local.modified_at.to_string();
    admit(ctx, action, now)
}

fn emit_remote(ctx: &DifferContext, kind: ActionKind, remote: &PanFileItem, now: i64) -> Result<()> {
    let rel_path = PathMapper::relative_of(remote.path(), ctx.mapper.remote_root());
    let mut action = SyncAction::new(kind, rel_path);
    action.drive_id = ctx.drive_id.to_string();
    action.size = remote.size;
    action.block_size = match kind {
        ActionKind::Download => ctx.download_block_size,
        _ => ctx.upload_block_size,
    };
    action.peer_updated_at_token = remote.updated_at_token.clone();
    admit(ctx, action, now)
}

fn admit(ctx: &DifferContext, action: SyncAction, now: i64) -> Result<()> {
    let id = action.id.clone();
    let kind = action.kind;
    if ctx.store.admit(&action, now)? {
        ctx.counters.bump_action_pending();
        debug!("admitted {kind:?} action {id}");
    }
    Ok(())
}
