//! Versioned range allocator.
//!
//! The registry owns the global index counter and the list of atlas pages.
//! Every page owns the contiguous block of indices that was free when it was
//! added, so pages sorted by `range_start` always tile `[0, total)` as long as
//! pages are only ever appended through [`Registry::add_page`].

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::ValidationPolicy;
use crate::error::{Result, SpriteLedgerError};
use crate::mapping::MappingStore;
use crate::model::{
    AtlasPage, GlobalKey, LegacyKey, RawVersionRecord, Version, VersionRecord, now,
};

/// A contiguity problem found by [`Registry::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Indices `expected..found` belong to no page.
    Gap { page_id: u32, expected: u64, found: u64 },
    /// The page starts inside the range of an earlier page.
    Overlap { page_id: u32, expected: u64, found: u64 },
    /// Pages cover `covered` indices but the counter says `total`.
    CountMismatch { covered: u64, total: u64 },
    /// A mapping entry points past the allocated index space.
    UnallocatedKey {
        legacy: LegacyKey,
        global: GlobalKey,
        total: u64,
    },
    /// Two legacy keys share one global key.
    SharedKey {
        global: GlobalKey,
        first: LegacyKey,
        second: LegacyKey,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Gap {
                page_id,
                expected,
                found,
            } => write!(
                f,
                "page {page_id} range gap: expected start {expected}, got {found}"
            ),
            Diagnostic::Overlap {
                page_id,
                expected,
                found,
            } => write!(
                f,
                "page {page_id} range overlap: expected start {expected}, got {found}"
            ),
            Diagnostic::CountMismatch { covered, total } => write!(
                f,
                "total count mismatch: pages cover {covered}, total is {total}"
            ),
            Diagnostic::UnallocatedKey {
                legacy,
                global,
                total,
            } => write!(
                f,
                "mapping {legacy} -> {global} lies outside the allocated range [0, {total})"
            ),
            Diagnostic::SharedKey {
                global,
                first,
                second,
            } => write!(f, "{global} is mapped from both {first} and {second}"),
        }
    }
}

/// Persisted versioned state: index counter, pages, version and description.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    record: VersionRecord,
}

impl Registry {
    /// Empty registry at `v1.0`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_record(record: VersionRecord) -> Self {
        Self { record }
    }

    /// Loads the registry file, or returns an empty registry if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(?path, "no registry file, starting from an empty registry");
            return Ok(Self::new());
        }
        let origin = path.display().to_string();
        let text = fs::read_to_string(path)?;
        let raw: RawVersionRecord = serde_json::from_str(&text)
            .map_err(|e| SpriteLedgerError::schema(origin.as_str(), e.to_string()))?;
        let record = VersionRecord::from_raw(raw, &origin)?;
        debug!(?path, version = %record.version, pages = record.pages.len(), "registry loaded");
        Ok(Self { record })
    }

    /// Writes the registry as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&self.record.to_raw())?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn record(&self) -> &VersionRecord {
        &self.record
    }

    pub fn version(&self) -> Version {
        self.record.version
    }

    pub fn total(&self) -> u64 {
        self.record.total
    }

    pub fn description(&self) -> &str {
        &self.record.description
    }

    pub fn pages(&self) -> &[AtlasPage] {
        &self.record.pages
    }

    pub fn page(&self, id: u32) -> Option<&AtlasPage> {
        self.record.pages.iter().find(|p| p.id == id)
    }

    /// Page whose range holds global index `index`.
    pub fn page_for_index(&self, index: u64) -> Option<&AtlasPage> {
        self.record.pages.iter().find(|p| p.contains(index))
    }

    pub fn range_of(&self, id: u32) -> Option<(u64, u64)> {
        self.page(id).map(|p| (p.range_start, p.range_end))
    }

    pub fn unfrozen_pages(&self) -> Vec<&AtlasPage> {
        self.record.pages.iter().filter(|p| !p.frozen).collect()
    }

    /// 0 when there are no pages, otherwise one past the largest id.
    /// Scans the pages so hand-edited files with sparse ids stay usable.
    pub fn next_page_id(&self) -> u32 {
        self.record
            .pages
            .iter()
            .map(|p| p.id)
            .max()
            .map_or(0, |m| m + 1)
    }

    pub fn next_global_index(&self) -> u64 {
        self.record.total
    }

    /// Appends a page owning the next `count` global indices and advances the counter.
    ///
    /// Only mutates memory; call [`save`](Self::save) to persist.
    pub fn add_page(
        &mut self,
        filename: impl Into<String>,
        url: impl Into<String>,
        count: u64,
        size: (u32, u32),
        frozen: bool,
    ) -> Result<AtlasPage> {
        if count == 0 {
            return Err(SpriteLedgerError::InvalidInput(
                "a page must hold at least one asset".into(),
            ));
        }
        let range_start = self.next_global_index();
        let page = AtlasPage {
            id: self.next_page_id(),
            filename: filename.into(),
            url: url.into(),
            range_start,
            range_end: range_start + count - 1,
            frozen,
            created_at: now(),
            size,
        };
        debug!(
            id = page.id,
            start = page.range_start,
            end = page.range_end,
            "page added"
        );
        self.record.pages.push(page.clone());
        self.record.total += count;
        Ok(page)
    }

    /// Marks one page as frozen. Returns false if no page has that id.
    pub fn freeze_page(&mut self, id: u32) -> bool {
        match self.record.pages.iter_mut().find(|p| p.id == id) {
            Some(p) => {
                p.frozen = true;
                true
            }
            None => false,
        }
    }

    pub fn freeze_all(&mut self) {
        for p in &mut self.record.pages {
            p.frozen = true;
        }
    }

    /// Records the public URL of an uploaded page. Returns false if no page has that id.
    pub fn set_page_url(&mut self, id: u32, url: impl Into<String>) -> bool {
        match self.record.pages.iter_mut().find(|p| p.id == id) {
            Some(p) => {
                p.url = url.into();
                true
            }
            None => false,
        }
    }

    /// Bumps the minor version and stamps time and description.
    pub fn promote_version(&mut self, description: &str) -> Version {
        let next = self.record.version.next_minor();
        self.record.version = next;
        self.record.created_at = now();
        self.record.description = if description.is_empty() {
            format!("Updated to {next}")
        } else {
            description.to_string()
        };
        next
    }

    /// Checks that pages tile `[0, total)` exactly. Never fails; an empty list means consistent.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut sorted: Vec<&AtlasPage> = self.record.pages.iter().collect();
        sorted.sort_by_key(|p| (p.range_start, p.id));

        let mut diags = Vec::new();
        let mut expected = 0u64;
        for p in sorted {
            if p.range_start > expected {
                diags.push(Diagnostic::Gap {
                    page_id: p.id,
                    expected,
                    found: p.range_start,
                });
            } else if p.range_start < expected {
                diags.push(Diagnostic::Overlap {
                    page_id: p.id,
                    expected,
                    found: p.range_start,
                });
            }
            expected = p.range_end + 1;
        }
        if expected != self.record.total {
            diags.push(Diagnostic::CountMismatch {
                covered: expected,
                total: self.record.total,
            });
        }
        diags
    }

    /// Checks a mapping against the index space: every global key must have
    /// been allocated (`< total`) and belong to one legacy key only.
    pub fn check_mapping(&self, mapping: &MappingStore) -> Vec<Diagnostic> {
        let total = self.record.total;
        let mut owners: HashMap<GlobalKey, LegacyKey> = HashMap::new();
        let mut diags = Vec::new();
        for (legacy, global) in mapping.iter() {
            if global.index() >= total {
                diags.push(Diagnostic::UnallocatedKey {
                    legacy,
                    global,
                    total,
                });
            }
            if let Some(first) = owners.insert(global, legacy) {
                diags.push(Diagnostic::SharedKey {
                    global,
                    first,
                    second: legacy,
                });
            }
        }
        diags
    }

    /// Runs [`validate`](Self::validate) under `policy`: strict turns any diagnostic into an error,
    /// lenient logs and returns them.
    pub fn check(&self, policy: ValidationPolicy) -> Result<Vec<Diagnostic>> {
        let diags = self.validate();
        if diags.is_empty() {
            return Ok(diags);
        }
        match policy {
            ValidationPolicy::Strict => Err(SpriteLedgerError::InconsistentRegistry(diags)),
            ValidationPolicy::Lenient => {
                for d in &diags {
                    warn!(diagnostic = %d, "registry validation");
                }
                Ok(diags)
            }
        }
    }

    /// Human-readable status: version, counts, per-page ranges and validation outcome.
    pub fn status_report(&self) -> String {
        let r = &self.record;
        let mut out = String::new();
        out.push_str("=== Registry status ===\n");
        out.push_str(&format!("version: {}\n", r.version));
        out.push_str(&format!("total assets: {}\n", r.total));
        out.push_str(&format!("pages: {}\n", r.pages.len()));
        out.push_str(&format!(
            "created at: {}\n",
            crate::model::format_timestamp(&r.created_at)
        ));
        out.push_str(&format!("description: {}\n", r.description));
        out.push_str("\n=== Pages ===\n");
        for p in &r.pages {
            let state = if p.frozen { "frozen" } else { "open" };
            out.push_str(&format!(
                "id {}: {} ({}-{}) {}\n",
                p.id, p.filename, p.range_start, p.range_end, state
            ));
        }
        let diags = self.validate();
        if diags.is_empty() {
            out.push_str("\nvalidation: ok\n");
        } else {
            out.push_str("\nvalidation errors:\n");
            for d in diags {
                out.push_str(&format!("  - {d}\n"));
            }
        }
        out
    }
}
