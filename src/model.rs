use serde::{Deserialize, Serialize};

/// Liveness marker written by the external walker/scanner. `Discard` means
/// "tombstoned, awaiting confirmation" rather than "already gone."
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    Normal,
    Discard,
}

/// One entry observed in the local tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalFileItem {
    pub path: String,
    pub is_folder: bool,
    pub size: u64,
    pub modified_at: i64,
    /// Lowercase hex SHA-1, empty until lazily populated by the differ.
    pub hash: String,
    pub scan_status: ScanStatus,
}

/// One entry observed in the remote tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PanFileItem {
    pub path: String,
    pub is_folder: bool,
    pub size: u64,
    pub modified_at: i64,
    pub hash: String,
    pub scan_status: ScanStatus,
    /// Opaque server-supplied version marker distinguishing "same file" from
    /// "content has moved on."
    pub updated_at_token: String,
}

/// The shape the set algebra and differ actually need, implemented by both
/// `LocalFileItem` and `PanFileItem` so the two trees compare identically
/// once reduced to this view.
pub trait InventoryEntry {
    fn path(&self) -> &str;
    fn is_folder(&self) -> bool;
    fn hash(&self) -> &str;
    fn modified_at(&self) -> i64;
    fn scan_status(&self) -> ScanStatus;
}

impl InventoryEntry for LocalFileItem {
    fn path(&self) -> &str {
        &self.path
    }
    fn is_folder(&self) -> bool {
        self.is_folder
    }
    fn hash(&self) -> &str {
        &self.hash
    }
    fn modified_at(&self) -> i64 {
        self.modified_at
    }
    fn scan_status(&self) -> ScanStatus {
        self.scan_status
    }
}

impl InventoryEntry for PanFileItem {
    fn path(&self) -> &str {
        &self.path
    }
    fn is_folder(&self) -> bool {
        self.is_folder
    }
    fn hash(&self) -> &str {
        &self.hash
    }
    fn modified_at(&self) -> i64 {
        self.modified_at
    }
    fn scan_status(&self) -> ScanStatus {
        self.scan_status
    }
}

/// One of the four action kinds the executor can drain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Upload,
    Download,
    DeleteLocal,
    DeleteRemote,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Upload => "upload",
            ActionKind::Download => "download",
            ActionKind::DeleteLocal => "delete_local",
            ActionKind::DeleteRemote => "delete_remote",
        }
    }

    pub fn all() -> [ActionKind; 4] {
        [
            ActionKind::Upload,
            ActionKind::Download,
            ActionKind::DeleteLocal,
            ActionKind::DeleteRemote,
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    Create,
    Uploading,
    Downloading,
    Success,
    NotExisted,
    Illegal,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Create => "create",
            ActionStatus::Uploading => "uploading",
            ActionStatus::Downloading => "downloading",
            ActionStatus::Success => "success",
            ActionStatus::NotExisted => "not_existed",
            ActionStatus::Illegal => "illegal",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Some(match value {
            "create" => ActionStatus::Create,
            "uploading" => ActionStatus::Uploading,
            "downloading" => ActionStatus::Downloading,
            "success" => ActionStatus::Success,
            "not_existed" => ActionStatus::NotExisted,
            "illegal" => ActionStatus::Illegal,
            _ => return None,
        })
    }

    pub fn in_flight(self) -> bool {
        matches!(self, ActionStatus::Uploading | ActionStatus::Downloading)
    }

    pub fn terminal(self) -> bool {
        matches!(
            self,
            ActionStatus::Success | ActionStatus::NotExisted | ActionStatus::Illegal
        )
    }
}

/// A pending or in-flight unit of sync work. Folders never appear here;
/// folders only ever drive BFS expansion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncAction {
    pub id: String,
    pub kind: ActionKind,
    pub rel_path: String,
    pub status: ActionStatus,
    pub status_updated_at: i64,
    pub drive_id: String,
    pub size: u64,
    pub block_size: u64,
    /// Updated-at token captured at emission time, used by `admit`'s
    /// `NotExisted` hysteresis branch to detect that the peer has moved on.
    pub peer_updated_at_token: String,
}

impl SyncAction {
    pub fn new(kind: ActionKind, rel_path: impl Into<String>) -> Self {
        let rel_path = rel_path.into();
        Self {
            id: action_id(kind, &rel_path),
            kind,
            rel_path,
            status: ActionStatus::Create,
            status_updated_at: 0,
            drive_id: String::new(),
            size: 0,
            block_size: 0,
            peer_updated_at_token: String::new(),
        }
    }
}

/// Stable id derived from kind + target relative path, so repeated
/// emissions for the same logical work collide in the action store.
pub fn action_id(kind: ActionKind, rel_path: &str) -> String {
    format!("{}:{}", kind.as_str(), rel_path)
}
