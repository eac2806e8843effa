//! Discovery of legacy asset files and selection of the ones not yet mapped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::mapping::MappingStore;
use crate::model::LegacyKey;

/// One legacy asset file (`s<id>.png`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyAsset {
    pub legacy_id: u64,
    pub source: PathBuf,
}

impl LegacyAsset {
    pub fn key(&self) -> LegacyKey {
        LegacyKey(self.legacy_id)
    }

    pub fn file_name(&self) -> &str {
        self.source
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }
}

/// Legacy id encoded in a file name like `s123.png`.
pub fn parse_legacy_filename(name: &str) -> Option<u64> {
    let digits = name.strip_prefix('s')?.strip_suffix(".png")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Ordered batch of assets; order decides both placement and index assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetBatch {
    assets: Vec<LegacyAsset>,
}

impl AssetBatch {
    /// Batch in exactly the given order.
    pub fn new(assets: Vec<LegacyAsset>) -> Self {
        Self { assets }
    }

    /// Builds a batch from candidate paths: names that are not `s<digits>.png`
    /// are skipped with a warning, the rest are ordered by legacy id.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut assets: Vec<LegacyAsset> = Vec::with_capacity(paths.len());
        for p in paths {
            let p = p.as_ref();
            let name = p.file_name().and_then(|s| s.to_str()).unwrap_or("");
            match parse_legacy_filename(name) {
                Some(legacy_id) => assets.push(LegacyAsset {
                    legacy_id,
                    source: p.to_path_buf(),
                }),
                None => warn!(path = ?p, "skip file: not a legacy asset name"),
            }
        }
        assets.sort_by(|a, b| {
            a.legacy_id
                .cmp(&b.legacy_id)
                .then_with(|| a.source.cmp(&b.source))
        });
        debug!(count = assets.len(), "legacy assets found");
        Self { assets }
    }

    /// Keeps assets whose legacy key is absent from `mapping`, restricted to
    /// `only` file names when given. Duplicate legacy ids keep their first occurrence.
    pub fn select_new(&self, mapping: &MappingStore, only: Option<&[String]>) -> AssetBatch {
        let wanted: Option<HashSet<&str>> = only.map(|o| o.iter().map(String::as_str).collect());
        let mut seen = HashSet::new();
        let assets = self
            .assets
            .iter()
            .filter(|a| !mapping.contains(a.key()))
            .filter(|a| wanted.as_ref().is_none_or(|w| w.contains(a.file_name())))
            .filter(|a| seen.insert(a.legacy_id))
            .cloned()
            .collect();
        AssetBatch { assets }
    }

    pub fn assets(&self) -> &[LegacyAsset] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
