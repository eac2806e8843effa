use std::path::PathBuf;

use thiserror::Error;

use crate::registry::Diagnostic;

#[derive(Debug, Error)]
pub enum SpriteLedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Malformed record in {path}: {reason}")]
    Schema { path: String, reason: String },
    #[error("Mapping file {0} not found; prior history cannot be reconstructed without it")]
    MissingMapping(PathBuf),
    #[error("Registry already holds {pages} page(s); initial import would re-allocate their ranges")]
    AlreadyInitialized { pages: usize },
    #[error("Registry is inconsistent: {}", format_diagnostics(.0))]
    InconsistentRegistry(Vec<Diagnostic>),
    #[error("Unknown page id {0}")]
    UnknownPage(u32),
    #[error("Upload of {filename} failed: {reason}")]
    Upload { filename: String, reason: String },
    #[error("Nothing to pack")]
    Empty,
}

impl SpriteLedgerError {
    pub(crate) fn schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

fn format_diagnostics(diags: &[Diagnostic]) -> String {
    diags
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, SpriteLedgerError>;
