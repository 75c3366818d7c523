use std::sync::Arc;
use thiserror::Error;

/// Errors raised while reading the tool's XML catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// A single `<table>` element could not be decoded. The reader has already
    /// consumed the rest of that element, so the stream can continue.
    #[error("Malformed table '{}': {reason}", .table.as_deref().unwrap_or("<unnamed>"))]
    Table {
        table: Option<String>,
        reason: String,
    },
    /// The token stream itself is broken; nothing after this point can be trusted.
    #[error("XML syntax error: {0}")]
    Syntax(quick_xml::Error),
    #[error("Failed to read tool output: {0}")]
    Io(Arc<std::io::Error>),
}

impl CatalogError {
    /// Whether the reader can keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CatalogError::Table { .. })
    }
}

impl From<quick_xml::Error> for CatalogError {
    fn from(err: quick_xml::Error) -> Self {
        match err {
            quick_xml::Error::Io(e) => CatalogError::Io(e),
            other => CatalogError::Syntax(other),
        }
    }
}

/// Errors raised by the external tool process.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Standard output of {0} is not available")]
    MissingStdout(String),
    #[error("Failed to kill tool process: {0}")]
    Kill(std::io::Error),
    #[error("Failed to wait for tool process: {0}")]
    Wait(std::io::Error),
}

/// Errors surfaced to the caller before the response is committed.
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error(transparent)]
    Startup(#[from] ProcessError),
}
