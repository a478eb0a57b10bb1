//! Pure, stateless translation between local and remote absolute paths.

use crate::config::clean_remote;

/// Maps local absolute paths to remote absolute paths and back, using a
/// configured root pair. Both directions normalize backslashes to `/`.
#[derive(Clone, Debug)]
pub struct PathMapper {
    local_root: String,
    remote_root: String,
}

impl PathMapper {
    pub fn new(local_root: impl AsRef<std::path::Path>, remote_root: &str) -> Self {
        Self {
            local_root: normalize(&local_root.as_ref().to_string_lossy()),
            remote_root: clean_remote(remote_root),
        }
    }

    /// `to_remote(local_path)` strips the local root prefix and joins the
    /// remainder onto the cleaned remote root.
    pub fn to_remote(&self, local_path: &str) -> String {
        let local_path = normalize(local_path);
        let rel = strip_root(&local_path, &self.local_root);
        join_remote(&self.remote_root, rel)
    }

    /// Symmetric with `to_remote`.
    pub fn to_local(&self, remote_path: &str) -> String {
        let remote_path = normalize(remote_path);
        let rel = strip_root(&remote_path, &self.remote_root);
        join_remote(&self.local_root, rel)
    }

    /// Returns the cleaned path of `abs_path` relative to `root`; the key
    /// set algebra uses so the two trees compare without absolute roots.
    pub fn relative_of<'a>(abs_path: &'a str, root: &str) -> &'a str {
        strip_root(abs_path, &normalize(root))
    }

    pub fn local_root(&self) -> &str {
        &self.local_root
    }

    pub fn remote_root(&self) -> &str {
        &self.remote_root
    }

    /// Joins a sync-root-relative path onto the local root.
    pub fn local_abs(&self, rel_path: &str) -> String {
        join_remote(&self.local_root, rel_path)
    }

    /// Joins a sync-root-relative path onto the remote root.
    pub fn remote_abs(&self, rel_path: &str) -> String {
        join_remote(&self.remote_root, rel_path)
    }
}

fn normalize(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    if replaced.len() > 1 {
        replaced.trim_end_matches('/').to_string()
    } else {
        replaced
    }
}

fn strip_root<'a>(path: &'a str, root: &str) -> &'a str {
    path.strip_prefix(root)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or(path.trim_start_matches('/'))
}

fn join_remote(root: &str, rel: &str) -> String {
    if rel.is_empty() {
        root.to_string()
    } else if root == "/" {
        format!("/{rel}")
    } else {
        format!("{root}/{rel}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_remote_and_back() {
        let mapper = PathMapper::new("/home/user/docs", "/drive/docs");
        let remote = mapper.to_remote("/home/user/docs/sub/a.txt");
        assert_eq!(remote, "/drive/docs/sub/a.txt");
        assert_eq!(mapper.to_local(&remote), "/home/user/docs/sub/a.txt");
    }

    #[test]
    fn normalizes_backslashes() {
        let mapper = PathMapper::new("/home/user/docs", "/drive/docs");
        let remote = mapper.to_remote("/home/user/docs\\sub\\a.txt");
        assert_eq!(remote, "/drive/docs/sub/a.txt");
    }

    #[test]
    fn maps_the_root_itself() {
        let mapper = PathMapper::new("/home/user/docs", "/drive/docs");
        assert_eq!(mapper.to_remote("/home/user/docs"), "/drive/docs");
        assert_eq!(mapper.to_local("/drive/docs"), "/home/user/docs");
    }

    #[test]
    fn relative_of_strips_the_configured_root() {
        assert_eq!(
            PathMapper::relative_of("/home/user/docs/sub/a.txt", "/home/user/docs"),
            "sub/a.txt"
        );
    }

    #[test]
    fn abs_helpers_join_relative_paths_onto_each_root() {
        let mapper = PathMapper::new("/home/user/docs", "/drive/docs");
        assert_eq!(mapper.local_abs("sub/a.txt"), "/home/user/docs/sub/a.txt");
        assert_eq!(mapper.remote_abs("sub/a.txt"), "/drive/docs/sub/a.txt");
    }
}
