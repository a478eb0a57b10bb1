//! `LocalFileDb` / `PanFileDb`: the two key-value stores keyed by absolute
//! path that the external walker and cloud scanner fill. The core only
//! reads them and deletes `Discard`-status records; it never performs the
//! initial scan. `MemoryFileDb` is a reference implementation for tests and
//! the demo binary, standing in for a real filesystem walker or cloud SDK.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::Result;
use crate::model::{LocalFileItem, PanFileItem};

pub trait LocalFileDb: Send + Sync {
    fn get(&self, path: &str) -> Result<Option<LocalFileItem>>;
    fn list_children(&self, folder: &str) -> Result<Vec<LocalFileItem>>;
    fn update(&self, item: LocalFileItem) -> Result<()>;
    fn delete(&self, path: &str) -> Result<()>;
}

pub trait PanFileDb: Send + Sync {
    fn get(&self, path: &str) -> Result<Option<PanFileItem>>;
    fn list_children(&self, folder: &str) -> Result<Vec<PanFileItem>>;
    fn update(&self, item: PanFileItem) -> Result<()>;
    fn delete(&self, path: &str) -> Result<()>;
}

/// In-memory reference store, generic over the item type it holds. Used as
/// both the `LocalFileDb` and the `PanFileDb` reference implementation.
#[derive(Default)]
pub struct MemoryFileDb<T> {
    entries: Mutex<HashMap<String, T>>,
}

impl<T: Clone> MemoryFileDb<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn seed(&self, path: impl Into<String>, item: T) {
        self.entries.lock().insert(path.into(), item);
    }

    fn children_of(&self, folder: &str) -> Vec<T> {
        let folder = folder.trim_end_matches('/');
        self.entries
            .lock()
            .iter()
            .filter_map(|(path, item)| {
                let rest = path.strip_prefix(folder)?.strip_prefix('/')?;
                if rest.is_empty() || rest.contains('/') {
                    None
                } else {
                    Some(item.clone())
                }
            })
            .collect()
    }
}

impl LocalFileDb for MemoryFileDb<LocalFileItem> {
    fn get(&self, path: &str) -> Result<Option<LocalFileItem>> {
        Ok(self.entries.lock().get(path).cloned())
    }

    fn list_children(&self, folder: &str) -> Result<Vec<LocalFileItem>> {
        Ok(self.children_of(folder))
    }

    fn update(&self, item: LocalFileItem) -> Result<()> {
        self.entries.lock().insert(item.path.clone(), item);
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.entries.lock().remove(path);
        Ok(())
    }
}

impl PanFileDb for MemoryFileDb<PanFileItem> {
    fn get(&self, path: &str) -> Result<Option<PanFileItem>> {
        Ok(self.entries.lock().get(path).cloned())
    }

    fn list_children(&self, folder: &str) -> Result<Vec<PanFileItem>> {
        Ok(self.children_of(folder))
    }

    fn update(&self, item: PanFileItem) -> Result<()> {
        self.entries.lock().insert(item.path.clone(), item);
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.entries.lock().remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScanStatus;

    fn item(path: &str) -> LocalFileItem {
        LocalFileItem {
            path: path.into(),
            is_folder: false,
            size: 1,
            modified_at: 0,
            hash: String::new(),
            scan_status: ScanStatus::Normal,
        }
    }

    #[test]
    fn list_children_returns_only_immediate_children() {
        let db = MemoryFileDb::<LocalFileItem>::new();
        db.seed("/L/a.txt", item("/L/a.txt"));
        db.seed("/L/sub/b.txt", item("/L/sub/b.txt"));

        let children = LocalFileDb::list_children(&db, "/L").unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].path, "/L/a.txt");
    }

    #[test]
    fn delete_removes_the_record() {
        let db = MemoryFileDb::<LocalFileItem>::new();
        db.seed("/L/a.txt", item("/L/a.txt"));
        LocalFileDb::delete(&db, "/L/a.txt").unwrap();
        assert!(LocalFileDb::get(&db, "/L/a.txt").unwrap().is_none());
    }
}
