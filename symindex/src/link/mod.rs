// Link stores - symlinks on disk or small objects on a remote provider

pub mod disk;
pub mod remote;

use crate::error::Result;

pub use disk::DiskLinks;
pub use remote::RemoteLinks;

pub trait LinkStore: Send + Sync {
    /// Name of the directory all indices of this backend live under.
    fn index_dir(&self) -> &'static str;

    /// Create a directory and its parents. Succeeds if it already exists.
    fn make_dir_all(&self, path: &str) -> Result<()>;

    /// Create `link` pointing at `target`. Fails with `PathExists` if `link`
    /// is already present.
    fn create_link(&self, target: &str, link: &str) -> Result<()>;

    /// Return the target of `link`, or `PathNotFound`.
    fn resolve_link(&self, link: &str) -> Result<String>;

    /// Remove a single link or an empty directory. `PathNotFound` if absent.
    fn remove(&self, path: &str) -> Result<()>;

    /// Remove a directory and everything under it. Succeeds if absent.
    fn remove_all(&self, path: &str) -> Result<()>;

    /// Names of the entries directly under `path`. `PathNotFound` if absent.
    fn read_dir(&self, path: &str) -> Result<Vec<String>>;
}

/// Join logical path segments with `/`, skipping empty ones.
pub fn join(segments: &[&str]) -> String {
    segments
        .iter()
        .flat_map(|s| s.split('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Last segment of a path; the primary key of a link target.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}
