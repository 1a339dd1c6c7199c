//! Error types for the report kit
//!
//! Only [`ParseError`] is fatal for a single read attempt. Rendering never
//! fails on missing fields; [`ReportError`] covers writing a report to disk.

use std::path::PathBuf;

/// Errors raised while loading a result document from disk
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The file could not be opened or read
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file content is not valid JSON
    #[error("Invalid JSON in {}: {source}", path.display())]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The file is valid JSON but the root is not an object
    #[error("Expected a JSON object at the root of {}, found {found}", path.display())]
    NotAnObject { path: PathBuf, found: &'static str },
}

/// Errors raised while persisting a rendered report
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Writing the report file failed
    #[error("Failed to write report {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by an analysis provider or the analyzer
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// The prompt exceeded the model context window
    #[error("Prompt exceeds the model context length: {0}")]
    ContextLengthExceeded(String),

    /// The provider is not configured (no credentials, no client)
    #[error("Analysis provider unavailable: {0}")]
    Unavailable(String),

    /// Any other provider failure
    #[error("Analysis provider failed: {0}")]
    Provider(String),

    /// The document contains no failed tests to analyze
    #[error("No failed tests to analyze")]
    NothingToAnalyze,
}
