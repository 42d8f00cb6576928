use super::LinkStore;
use crate::error::{IndexerError, Result};
use crate::index::{
    AutoincrementIndex, Index, IndexKind, IndexOptions, NonUniqueIndex, UniqueIndex,
};
use crate::registry::IndexRegistry;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const BACKEND: &str = "disk";

/// Links realized as symbolic links under a local data directory.
#[derive(Debug, Clone)]
pub struct DiskLinks {
    root: PathBuf,
}

impl DiskLinks {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DiskLinks { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn abs(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

fn map_io(err: std::io::Error, path: &str) -> IndexerError {
    match err.kind() {
        ErrorKind::NotFound => IndexerError::PathNotFound {
            path: path.to_string(),
        },
        ErrorKind::AlreadyExists => IndexerError::PathExists {
            path: path.to_string(),
        },
        _ => IndexerError::Io(err),
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

impl LinkStore for DiskLinks {
    fn index_dir(&self) -> &'static str {
        "index.disk"
    }

    fn make_dir_all(&self, path: &str) -> Result<()> {
        std::fs::create_dir_all(self.abs(path))?;
        Ok(())
    }

    fn create_link(&self, target: &str, link: &str) -> Result<()> {
        // symlink(2) fails if the name exists, which is what makes unique indices unique
        symlink(&self.abs(target), &self.abs(link)).map_err(|e| map_io(e, link))
    }

    fn resolve_link(&self, link: &str) -> Result<String> {
        let target = std::fs::read_link(self.abs(link)).map_err(|e| map_io(e, link))?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn remove(&self, path: &str) -> Result<()> {
        let abs = self.abs(path);
        let meta = std::fs::symlink_metadata(&abs).map_err(|e| map_io(e, path))?;
        if meta.is_dir() {
            std::fs::remove_dir(&abs).map_err(|e| map_io(e, path))
        } else {
            std::fs::remove_file(&abs).map_err(|e| map_io(e, path))
        }
    }

    fn remove_all(&self, path: &str) -> Result<()> {
        match std::fs::remove_dir_all(self.abs(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IndexerError::Io(e)),
        }
    }

    fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(self.abs(path)).map_err(|e| map_io(e, path))?;
        let mut names = Vec::new();
        for entry in entries {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

fn links_for(options: &IndexOptions) -> Result<DiskLinks> {
    if options.data_dir.is_empty() {
        return Err(IndexerError::Config(
            "disk indices require a data directory".into(),
        ));
    }
    Ok(DiskLinks::new(&options.data_dir))
}

fn new_unique(options: &IndexOptions) -> Result<Arc<dyn Index>> {
    Ok(Arc::new(UniqueIndex::new(links_for(options)?, options.clone())))
}

fn new_non_unique(options: &IndexOptions) -> Result<Arc<dyn Index>> {
    Ok(Arc::new(NonUniqueIndex::new(links_for(options)?, options.clone())))
}

fn new_autoincrement(options: &IndexOptions) -> Result<Arc<dyn Index>> {
    Ok(Arc::new(AutoincrementIndex::new(
        links_for(options)?,
        options.clone(),
    )))
}

/// Register the disk constructors for all index kinds.
pub fn register(registry: &mut IndexRegistry) {
    registry.register(BACKEND, IndexKind::Unique, new_unique);
    registry.register(BACKEND, IndexKind::NonUnique, new_non_unique);
    registry.register(BACKEND, IndexKind::Autoincrement, new_autoincrement);
}
