//! Set algebra over folder pairs: given the children of a local folder and
//! its corresponding remote folder, split them into candidates for create,
//! delete, or per-file comparison, keyed by path relative to the sync root.

use std::collections::HashMap;

use crate::model::InventoryEntry;

pub struct FolderDiff<'a, L, R> {
    /// Local entries with no remote counterpart at the same relative path.
    pub local_only: Vec<&'a L>,
    /// Remote entries with no local counterpart at the same relative path.
    pub remote_only: Vec<&'a R>,
    /// Pairs sharing a relative path, candidates for per-pair comparison.
    pub both: Vec<(&'a L, &'a R)>,
}

/// Computes `L ∖ R`, `R ∖ L`, and `L ∩ R` keyed by relative path. Keys are
/// compared as raw bytes (no case folding), matching host filesystem lexical
/// semantics.
pub fn diff_children<'a, L, R>(
    local_children: &'a [L],
    remote_children: &'a [R],
    local_root: &str,
    remote_root: &str,
) -> FolderDiff<'a, L, R>
where
    L: InventoryEntry,
    R: InventoryEntry,
{
    let mut remote_by_rel: HashMap<&str, &R> = HashMap::new();
    for entry in remote_children {
        let rel = crate::path_mapper::PathMapper::relative_of(entry.path(), remote_root);
        remote_by_rel.insert(rel, entry);
    }

    let mut matched_remote: std::collections::HashSet<&str> = std::collections::HashSet::new();
    let mut local_only = Vec::new();
    let mut both = Vec::new();

    for entry in local_children {
        let rel = crate::path_mapper::PathMapper::relative_of(entry.path(), local_root);
        match remote_by_rel.get(rel) {
            Some(remote_entry) => {
                matched_remote.insert(rel);
                both.push((entry, *remote_entry));
            }
            None => local_only.push(entry),
        }
    }

    let remote_only = remote_children
        .iter()
        .filter(|entry| {
            let rel = crate::path_mapper::PathMapper::relative_of(entry.path(), remote_root);
            !matched_remote.contains(rel)
        })
        .collect();

    FolderDiff {
        local_only,
        remote_only,
        both,
    }
}
