//! Error types for a snapshot run
//!
//! Every variant is fatal: the run stops at the first error and no output
//! file is written.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Catalog category a query belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Tables,
    ForeignKeys,
    Functions,
    Triggers,
    Enums,
    Indexes,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Tables => write!(f, "tables"),
            Category::ForeignKeys => write!(f, "foreign_keys"),
            Category::Functions => write!(f, "functions"),
            Category::Triggers => write!(f, "triggers"),
            Category::Enums => write!(f, "enums"),
            Category::Indexes => write!(f, "indexes"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to connect to {host}:{port}/{database}")]
    Connection {
        host: String,
        port: u16,
        database: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("catalog query for {category} failed")]
    Query {
        category: Category,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("unexpected catalog row for {category}: {detail}")]
    UnexpectedShape { category: Category, detail: String },

    #[error("failed to write {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl SnapshotError {
    pub(crate) fn query(category: Category) -> impl FnOnce(tokio_postgres::Error) -> Self {
        move |source| SnapshotError::Query { category, source }
    }

    pub(crate) fn shape(category: Category, detail: impl Into<String>) -> Self {
        SnapshotError::UnexpectedShape {
            category,
            detail: detail.into(),
        }
    }

    /// True for failures to reach or authenticate with the server
    pub fn is_connection(&self) -> bool {
        matches!(self, SnapshotError::Connection { .. })
    }
}
