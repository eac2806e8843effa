//! Upload orchestration. The transport is behind [`Uploader`]; this module
//! decides what to upload, parses host responses and collects per-file results.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::error::{Result, SpriteLedgerError};

/// A page that reached the content host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub url: String,
    pub oss_type: Option<String>,
}

/// Sends one file to the content host.
pub trait Uploader {
    fn upload(&self, path: &Path) -> Result<UploadedFile>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadData {
    #[serde(default)]
    pub url: String,
    #[serde(rename = "ossType", default)]
    pub oss_type: Option<String>,
}

/// Response body of the upload endpoint: `{code, msg, data: {url, ossType}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<UploadData>,
}

impl UploadResponse {
    /// Interprets an HTTP status plus body. Non-200 status, non-zero `code` or
    /// a missing URL is a failure for this file.
    pub fn interpret(status: u16, body: &str, filename: &str) -> Result<UploadedFile> {
        let fail = |reason: String| SpriteLedgerError::Upload {
            filename: filename.to_string(),
            reason,
        };
        if status != 200 {
            return Err(fail(format!("HTTP {status}")));
        }
        let resp: UploadResponse =
            serde_json::from_str(body).map_err(|e| fail(format!("invalid response: {e}")))?;
        if resp.code != 0 {
            return Err(fail(resp.msg));
        }
        match resp.data {
            Some(data) if !data.url.is_empty() => Ok(UploadedFile {
                filename: filename.to_string(),
                url: data.url,
                oss_type: data.oss_type,
            }),
            _ => Err(fail("response carries no url".into())),
        }
    }
}

/// Result of uploading one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded(UploadedFile),
    Failed { filename: String, error: String },
}

/// Per-file results of a batch upload, in upload order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub outcomes: Vec<UploadOutcome>,
}

impl UploadReport {
    pub fn succeeded(&self) -> Vec<&UploadedFile> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                UploadOutcome::Uploaded(f) => Some(f),
                UploadOutcome::Failed { .. } => None,
            })
            .collect()
    }

    pub fn uploaded_files(&self) -> Vec<UploadedFile> {
        self.succeeded().into_iter().cloned().collect()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.len() - self.succeeded().len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failure_count() == 0
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string()
}

/// Uploads each file independently; a failure is recorded and the batch continues.
/// `on_done` is called after every file.
pub fn upload_all<U: Uploader + ?Sized>(
    uploader: &U,
    paths: &[PathBuf],
    mut on_done: impl FnMut(&UploadOutcome),
) -> UploadReport {
    let mut outcomes = Vec::with_capacity(paths.len());
    for path in paths {
        let outcome = match uploader.upload(path) {
            Ok(file) => {
                info!(file = %file.filename, url = %file.url, "uploaded");
                UploadOutcome::Uploaded(file)
            }
            Err(e) => {
                let filename = file_name_of(path);
                warn!(file = %filename, error = %e, "upload failed");
                UploadOutcome::Failed {
                    filename,
                    error: e.to_string(),
                }
            }
        };
        on_done(&outcome);
        outcomes.push(outcome);
    }
    UploadReport { outcomes }
}

/// Page image files in `dir`, ordered by page id.
pub fn find_page_files(dir: &Path, cfg: &LedgerConfig) -> Result<Vec<PathBuf>> {
    let mut found: Vec<(u32, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(id) = cfg.page_id_from_filename(&file_name_of(&path)) {
            found.push((id, path));
        }
    }
    found.sort_by_key(|(id, _)| *id);
    Ok(found.into_iter().map(|(_, p)| p).collect())
}
