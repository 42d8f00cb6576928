use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Entry not found: {type_name}.{field} = '{value}'")]
    NotFound {
        type_name: String,
        field: String,
        value: String,
    },

    #[error("Entry already exists: {type_name}.{field} = '{value}'")]
    AlreadyExists {
        type_name: String,
        field: String,
        value: String,
    },

    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    #[error("Path already exists: {path}")]
    PathExists { path: String },

    #[error("Invalid index value: '{value}'")]
    InvalidValue { value: String },

    #[error("Record of type {type_name} has no field '{field}'")]
    MissingField { type_name: String, field: String },

    #[error("Update types do not match: from {from} to {to}")]
    TypeMismatch { from: String, to: String },

    #[error("Sequence exhausted for {type_name}.{field}: upper bound {upper} reached")]
    SequenceExhausted {
        type_name: String,
        field: String,
        upper: i64,
    },

    #[error("Unknown index kind: {0}")]
    UnknownIndexKind(String),

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Malformed filter: {0}")]
    Filter(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Remote storage returned {status} for {path}")]
    Remote { status: String, path: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// True for both the typed index miss and the raw storage miss.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            IndexerError::NotFound { .. } | IndexerError::PathNotFound { .. }
        )
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            IndexerError::AlreadyExists { .. } | IndexerError::PathExists { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
