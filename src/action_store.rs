//! The persistent, deduplicating action queue. Backed by SQLite so that a
//! restart resumes cleanly against an existing database file. All access
//! goes through the single store mutex embedded in the connection wrapper;
//! callers never see a raw `rusqlite::Connection`.

use std::collections::HashSet;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::Result;
use crate::model::{ActionKind, ActionStatus, SyncAction};

/// Recently completed `Success` actions are not re-admitted for this long.
pub const SUCCESS_HYSTERESIS_SECS: i64 = 5 * 60;
/// Recently rejected `Illegal` actions are not re-admitted for this long.
pub const ILLEGAL_HYSTERESIS_SECS: i64 = 60 * 60;

/// The set of action ids currently claimed by a worker. Process-wide,
/// in-memory, consulted by `claim` so a crashed worker's orphaned
/// `Uploading`/`Downloading` row can be re-claimed by a fresh worker.
#[derive(Default)]
pub struct InProcessSet {
    ids: Mutex<HashSet<String>>,
}

impl InProcessSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: &str) {
        self.ids.lock().insert(id.to_string());
    }

    pub fn remove(&self, id: &str) {
        self.ids.lock().remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.lock().contains(id)
    }
}

pub struct ActionStore {
    conn: Mutex<Connection>,
}

impl ActionStore {
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    pub fn open(path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             CREATE TABLE IF NOT EXISTS sync_actions (
                 id TEXT PRIMARY KEY,
                 kind TEXT NOT NULL,
                 rel_path TEXT NOT NULL,
                 status TEXT NOT NULL,
                 status_updated_at INTEGER NOT NULL,
                 drive_id TEXT NOT NULL DEFAULT '',
                 size INTEGER NOT NULL DEFAULT 0,
                 block_size INTEGER NOT NULL DEFAULT 0,
                 peer_updated_at_token TEXT NOT NULL DEFAULT ''
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<SyncAction>> {
        let conn = self.conn.lock();
        row_to_action(&conn, id)
    }

    /// `admit(a)` contract from the reconciliation spec: insert if absent,
    /// drop if already queued/in-flight, and otherwise apply the per-status
    /// hysteresis window before replacing a terminal record.
    ///
    /// Returns `true` if the action was inserted or replaced (i.e. is now
    /// pending), `false` if it was dropped.
    pub fn admit(&self, action: &SyncAction, now: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let existing = row_to_action(&conn, &action.id)?;

        let should_insert = match existing {
            None => true,
            Some(ref prior) if !prior.status.terminal() => false,
            Some(ref prior) if prior.status == ActionStatus::Success => {
                now.saturating_sub(prior.status_updated_at) >= SUCCESS_HYSTERESIS_SECS
            }
            Some(ref prior) if prior.status == ActionStatus::Illegal => {
                now.saturating_sub(prior.status_updated_at) >= ILLEGAL_HYSTERESIS_SECS
            }
            Some(ref prior) => {
                // NotExisted: re-admit only if the peer's updated-at token moved on.
                prior.peer_updated_at_token != action.peer_updated_at_token
            }
        };

        if !should_insert {
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO sync_actions
                 (id, kind, rel_path, status, status_updated_at, drive_id, size, block_size, peer_updated_at_token)
             VALUES (?1, ?2, ?3, 'create', ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                 status = 'create',
                 status_updated_at = excluded.status_updated_at,
                 drive_id = excluded.drive_id,
                 size = excluded.size,
                 block_size = excluded.block_size,
                 peer_updated_at_token = excluded.peer_updated_at_token",
            params![
                action.id,
                action.kind.as_str(),
                action.rel_path,
                now,
                action.drive_id,
                action.size as i64,
                action.block_size as i64,
                action.peer_updated_at_token,
            ],
        )?;
        Ok(true)
    }

    /// `claim(kind)` contract: prefer an orphaned in-flight row (crash
    /// recovery), otherwise the oldest `Create` row of that kind, skipping
    /// anything already held by a worker per `in_process`.
    pub fn claim(&self, kind: ActionKind, in_process: &InProcessSet) -> Result<Option<SyncAction>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id FROM sync_actions
             WHERE kind = ?1 AND status IN ('uploading', 'downloading')
             ORDER BY status_updated_at ASC",
        )?;
        let orphan_ids: Vec<String> = stmt
            .query_map(params![kind.as_str()], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        for id in orphan_ids {
            if !in_process.contains(&id) {
                return row_to_action(&conn, &id);
            }
        }

        let mut stmt = conn.prepare(
            "SELECT id FROM sync_actions
             WHERE kind = ?1 AND status = 'create'
             ORDER BY status_updated_at ASC",
        )?;
        let pending_ids: Vec<String> = stmt
            .query_map(params![kind.as_str()], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        for id in pending_ids {
            if !in_process.contains(&id) {
                return row_to_action(&conn, &id);
            }
        }

        Ok(None)
    }

    pub fn mark_status(
        &self,
        id: &str,
        status: ActionStatus,
        now: i64,
        peer_updated_at_token: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        match peer_updated_at_token {
            Some(token) => {
                conn.execute(
                    "UPDATE sync_actions SET status = ?1, status_updated_at = ?2, peer_updated_at_token = ?3 WHERE id = ?4",
                    params![status.as_str(), now, token, id],
                )?;
            }
            None => {
                conn.execute(
                    "UPDATE sync_actions SET status = ?1, status_updated_at = ?2 WHERE id = ?3",
                    params![status.as_str(), now, id],
                )?;
            }
        }
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sync_actions WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn pending_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_actions WHERE status IN ('create', 'uploading', 'downloading')",
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Best-effort compaction of terminal records older than `older_than_secs`.
    /// The engine never schedules this itself; the host may call it on a timer.
    pub fn clean_sync_db_records(&self, now: i64, older_than_secs: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let cutoff = now.saturating_sub(older_than_secs);
        let removed = conn.execute(
            "DELETE FROM sync_actions
             WHERE status IN ('success', 'illegal', 'not_existed') AND status_updated_at < ?1",
            params![cutoff],
        )?;
        Ok(removed)
    }

    #[cfg(test)]
    pub(crate) fn all_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM sync_actions")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(ids)
    }
}

fn row_to_action(conn: &Connection, id: &str) -> Result<Option<SyncAction>> {
    let result = conn
        .query_row(
            "SELECT id, kind, rel_path, status, status_updated_at, drive_id, size, block_size, peer_updated_at_token
             FROM sync_actions WHERE id = ?1",
            params![id],
            |row| {
                let kind_str: String = row.get(1)?;
                let status_str: String = row.get(3)?;
                let size: i64 = row.get(6)?;
                let block_size: i64 = row.get(7)?;
                Ok(SyncAction {
                    id: row.get(0)?,
                    kind: parse_kind(&kind_str),
                    rel_path: row.get(2)?,
                    status: ActionStatus::from_str(&status_str).unwrap_or(ActionStatus::Create),
                    status_updated_at: row.get(4)?,
                    drive_id: row.get(5)?,
                    size: size.max(0) as u64,
                    block_size: block_size.max(0) as u64,
                    peer_updated_at_token: row.get(8)?,
                })
            },
        )
        .optional()?;
    Ok(result)
}

fn parse_kind(value: &str) -> ActionKind {
    match value {
        "upload" => ActionKind::Upload,
        "download" => ActionKind::Download,
        "delete_local" => ActionKind::DeleteLocal,
        _ => ActionKind::DeleteRemote,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(rel_path: &str) -> SyncAction {
        SyncAction::new(ActionKind::Upload, rel_path)
    }

    #[test]
    fn admit_inserts_a_new_action() {
        let store = ActionStore::open_in_memory().unwrap();
        assert!(store.admit(&action("a.txt"), 0).unwrap());
        let stored = store.get(&action("a.txt").id).unwrap().unwrap();
        assert_eq!(stored.status, ActionStatus::Create);
    }

    #[test]
    fn admit_is_idempotent_while_pending() {
        let store = ActionStore::open_in_memory().unwrap();
        let a = action("a.txt");
        assert!(store.admit(&a, 0).unwrap());
        assert!(!store.admit(&a, 10).unwrap());
        assert_eq!(store.all_ids().unwrap().len(), 1);
    }

    #[test]
    fn admit_respects_success_hysteresis() {
        let store = ActionStore::open_in_memory().unwrap();
        let a = action("a.txt");
        store.admit(&a, 0).unwrap();
        store.mark_status(&a.id, ActionStatus::Success, 0, None).unwrap();

        assert!(!store.admit(&a, 60).unwrap());
        assert!(store.admit(&a, SUCCESS_HYSTERESIS_SECS).unwrap());
    }

    #[test]
    fn admit_respects_illegal_hysteresis() {
        let store = ActionStore::open_in_memory().unwrap();
        let a = action("a.txt");
        store.admit(&a, 0).unwrap();
        store.mark_status(&a.id, ActionStatus::Illegal, 0, None).unwrap();

        assert!(!store.admit(&a, 1800).unwrap());
        assert!(store.admit(&a, ILLEGAL_HYSTERESIS_SECS).unwrap());
    }

    #[test]
    fn admit_not_existed_requires_peer_token_change() {
        let store = ActionStore::open_in_memory().unwrap();
        let mut a = action("a.txt");
        a.peer_updated_at_token = "v1".into();
        store.admit(&a, 0).unwrap();
        store
            .mark_status(&a.id, ActionStatus::NotExisted, 0, Some("v1"))
            .unwrap();

        assert!(!store.admit(&a, 100).unwrap());

        let mut moved_on = a.clone();
        moved_on.peer_updated_at_token = "v2".into();
        assert!(store.admit(&moved_on, 100).unwrap());
    }

    #[test]
    fn claim_skips_actions_already_in_process() {
        let store = ActionStore::open_in_memory().unwrap();
        let in_process = InProcessSet::new();
        let a = action("a.txt");
        store.admit(&a, 0).unwrap();
        in_process.insert(&a.id);

        assert!(store.claim(ActionKind::Upload, &in_process).unwrap().is_none());
        in_process.remove(&a.id);
        assert!(store.claim(ActionKind::Upload, &in_process).unwrap().is_some());
    }

    #[test]
    fn claim_prefers_orphaned_in_flight_rows() {
        let store = ActionStore::open_in_memory().unwrap();
        let in_process = InProcessSet::new();
        let a = action("a.txt");
        let b = action("b.txt");
        store.admit(&a, 0).unwrap();
        store.admit(&b, 1).unwrap();
        store.mark_status(&a.id, ActionStatus::Uploading, 0, None).unwrap();

        let claimed = store.claim(ActionKind::Upload, &in_process).unwrap().unwrap();
        assert_eq!(claimed.id, a.id);
    }

    #[test]
    fn compaction_removes_only_old_terminal_records() {
        let store = ActionStore::open_in_memory().unwrap();
        let a = action("a.txt");
        store.admit(&a, 0).unwrap();
        store.mark_status(&a.id, ActionStatus::Success, 0, None).unwrap();

        assert_eq!(store.clean_sync_db_records(100, 1000).unwrap(), 0);
        assert_eq!(store.clean_sync_db_records(2000, 1000).unwrap(), 1);
    }
}
