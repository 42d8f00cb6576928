pub mod config;
pub mod error;
pub mod index;
pub mod indexer;
pub mod link;
pub mod query;
pub mod record;
pub mod registry;

pub use config::{BackendKind, Config, IndexDeclaration};
pub use error::{IndexerError, Result};
pub use index::{Bound, Index, IndexKind, IndexOptions};
pub use indexer::{AddResult, Field, Indexer};
pub use record::{normalize_field, type_fqn, DynamicRecord, Record};
pub use registry::IndexRegistry;
