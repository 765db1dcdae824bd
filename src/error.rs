//! Error types for the record cache and the tiler

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OsmdbError>;

#[derive(Error, Debug)]
pub enum OsmdbError {
    /// Persistent store rejected a statement
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// Record or tile layout is inconsistent
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Caller broke the calling contract (wrong mode, wrong order, ...)
    #[error("Protocol misuse: {0}")]
    Protocol(String),

    /// Worker pool or writer thread failed
    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Invalid tile {zoom}/{x}/{y}")]
    InvalidTile { zoom: i32, x: i32, y: i32 },
}

impl From<std::collections::TryReserveError> for OsmdbError {
    fn from(e: std::collections::TryReserveError) -> Self {
        OsmdbError::Allocation(e.to_string())
    }
}

impl From<quick_xml::Error> for OsmdbError {
    fn from(e: quick_xml::Error) -> Self {
        OsmdbError::Xml(e.to_string())
    }
}
