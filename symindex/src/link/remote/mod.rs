// Remote links - symlinks emulated as small objects on a storage provider

pub mod client;
pub mod token;

use super::{base_name, join, LinkStore};
use crate::error::{IndexerError, Result};
use crate::index::{
    AutoincrementIndex, Index, IndexKind, IndexOptions, NonUniqueIndex, UniqueIndex,
};
use crate::registry::IndexRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use client::HttpProvider;
pub use token::TokenManager;

pub const BACKEND: &str = "cs3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    #[default]
    File,
    Container,
}

/// Metadata of a remote file or container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub path: String,
    #[serde(default, rename = "type")]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub size: u64,
}

/// Operations a storage provider offers. Every call authenticates itself.
pub trait Provider: Send + Sync {
    /// Create a container; an existing container is not an error.
    fn create_container(&self, path: &str) -> Result<()>;
    fn list_container(&self, path: &str) -> Result<Vec<ResourceInfo>>;
    fn stat(&self, path: &str) -> Result<ResourceInfo>;
    /// Delete a file or a container with its contents.
    fn delete(&self, path: &str) -> Result<()>;
    fn upload(&self, path: &str, content: &[u8], if_none_match: bool) -> Result<()>;
    fn download(&self, path: &str) -> Result<Vec<u8>>;
}

/// Links stored as objects whose body is the UTF-8 target path.
#[derive(Debug, Clone)]
pub struct RemoteLinks<P> {
    provider: P,
}

impl<P: Provider> RemoteLinks<P> {
    pub fn new(provider: P) -> Self {
        RemoteLinks { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: Provider> LinkStore for RemoteLinks<P> {
    fn index_dir(&self) -> &'static str {
        "index.cs3"
    }

    fn make_dir_all(&self, path: &str) -> Result<()> {
        let normalized = join(&[path]);
        let mut current = String::new();
        for segment in normalized.split('/').filter(|s| !s.is_empty()) {
            current = join(&[current.as_str(), segment]);
            self.provider.create_container(&current)?;
        }
        Ok(())
    }

    fn create_link(&self, target: &str, link: &str) -> Result<()> {
        // Check-then-create is not atomic; If-None-Match closes the gap on
        // providers that honor it.
        match self.resolve_link(link) {
            Ok(_) => {
                return Err(IndexerError::PathExists {
                    path: link.to_string(),
                })
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        self.provider.upload(link, target.as_bytes(), true)
    }

    fn resolve_link(&self, link: &str) -> Result<String> {
        let body = self.provider.download(link)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    fn remove(&self, path: &str) -> Result<()> {
        self.provider.delete(path)
    }

    fn remove_all(&self, path: &str) -> Result<()> {
        match self.provider.delete(path) {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let infos = self.provider.list_container(path)?;
        let mut names: Vec<String> = infos
            .iter()
            .map(|info| base_name(&info.path).to_string())
            .collect();
        names.sort();
        Ok(names)
    }
}

fn links_for(options: &IndexOptions) -> Result<RemoteLinks<HttpProvider>> {
    let provider = HttpProvider::new(&options.remote, &options.service_user)?;
    Ok(RemoteLinks::new(provider))
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

/// Register the remote constructors for all index kinds.
pub fn register(registry: &mut IndexRegistry) {
    registry.register(BACKEND, IndexKind::Unique, new_unique);
    registry.register(BACKEND, IndexKind::NonUnique, new_non_unique);
    registry.register(BACKEND, IndexKind::Autoincrement, new_autoincrement);
}
