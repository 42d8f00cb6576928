use crate::error::{IndexerError, Result};
use crate::index::{Bound, IndexKind};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level indexer configuration, usually parsed from a YAML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub repo: Repo,
    #[serde(default)]
    pub service_user: ServiceUser,
    /// Undo already-applied index mutations when a multi-index write fails.
    #[serde(default)]
    pub rollback_on_failure: bool,
    /// Indices registered by `Indexer::from_config`.
    #[serde(default)]
    pub indices: Vec<IndexDeclaration>,
}

/// Where the indices are persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub disk: DiskConfig,
    #[serde(default)]
    pub cs3: RemoteConfig,
}

impl Default for Repo {
    fn default() -> Self {
        Repo {
            backend: BackendKind::Disk,
            disk: DiskConfig::default(),
            cs3: RemoteConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Disk,
    Cs3,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Disk => "disk",
            BackendKind::Cs3 => "cs3",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskConfig {
    pub path: String,
}

impl Default for DiskConfig {
    fn default() -> Self {
        DiskConfig {
            path: "/var/tmp/symindex".into(),
        }
    }
}

/// Settings for the remote storage provider backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the provider's container API
    pub provider_addr: String,
    /// Base URL of the data-plane (object PUT/GET)
    pub data_url: String,
    #[serde(default)]
    pub data_prefix: String,
    #[serde(default)]
    pub jwt_secret: String,
    /// Deadline applied to every remote request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            provider_addr: "http://localhost:9215".into(),
            data_url: "http://localhost:9216".into(),
            data_prefix: "data".into(),
            jwt_secret: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Identity used as the subject of tokens minted for the remote backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub uid: i64,
    #[serde(default)]
    pub gid: i64,
}

impl Default for ServiceUser {
    fn default() -> Self {
        ServiceUser {
            id: "95cb8724-03b2-11eb-a0a6-c33ef8ef53ad".into(),
            username: "indexer".into(),
            uid: -1,
            gid: -1,
        }
    }
}

/// A declared index, as found under `indices:` in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDeclaration {
    pub type_name: String,
    pub field: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    pub entity_dir: String,
    pub kind: IndexKind,
    #[serde(default)]
    pub bound: Option<Bound>,
    #[serde(default)]
    pub case_insensitive: bool,
}

fn default_primary_key() -> String {
    "Id".into()
}

impl IndexDeclaration {
    pub fn new(
        type_name: impl Into<String>,
        field: impl Into<String>,
        entity_dir: impl Into<String>,
        kind: IndexKind,
    ) -> Self {
        IndexDeclaration {
            type_name: type_name.into(),
            field: field.into(),
            primary_key: default_primary_key(),
            entity_dir: entity_dir.into(),
            kind,
            bound: None,
            case_insensitive: false,
        }
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn with_bound(mut self, lower: i64, upper: i64) -> Self {
        self.bound = Some(Bound { lower, upper });
        self
    }

    pub fn with_case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }
}

impl Config {
    /// Load a configuration file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse a YAML configuration string
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// A disk-backed configuration rooted at `path`.
    pub fn disk(path: impl Into<String>) -> Self {
        let mut config = Config::default();
        config.repo.disk.path = path.into();
        config
    }

    fn validate(&self) -> Result<()> {
        if self.repo.backend == BackendKind::Cs3 {
            if self.repo.cs3.provider_addr.is_empty() || self.repo.cs3.data_url.is_empty() {
                return Err(IndexerError::Config(
                    "cs3 backend requires provider_addr and data_url".into(),
                ));
            }
            if self.repo.cs3.jwt_secret.is_empty() {
                return Err(IndexerError::Config(
                    "cs3 backend requires a jwt_secret".into(),
                ));
            }
        }
        for decl in &self.indices {
            if let Some(bound) = &decl.bound {
                if bound.upper > 0 && bound.upper <= bound.lower {
                    return Err(IndexerError::Config(format!(
                        "index {}.{}: upper bound {} must exceed lower bound {}",
                        decl.type_name, decl.field, bound.upper, bound.lower
                    )));
                }
            }
        }
        Ok(())
    }
}
