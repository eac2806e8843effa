//! Output-directory layout and the run entry points that read and write it.
//!
//! A run loads the registry and mapping once, works in memory, writes page
//! images and styles, and persists registry and mapping once at the end.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::batch::AssetBatch;
use crate::config::{LedgerConfig, ValidationPolicy};
use crate::error::{Result, SpriteLedgerError};
use crate::export::{frontend_config, upload_config};
use crate::images::{ImageSource, save_png};
use crate::mapping::MappingStore;
use crate::model::{AtlasPage, Version, now};
use crate::pipeline::apply_incremental;
use crate::registry::{Diagnostic, Registry};
use crate::script::{render_forward_script, render_rollback_script};
use crate::style::{incremental_css_filename, render_registry_css};
use crate::upload::{UploadReport, find_page_files};

pub const REGISTRY_FILE: &str = "emoji_version.json";
pub const MAPPING_FILE: &str = "emoji_frontend_mapping.json";
pub const FRONTEND_CONFIG_FILE: &str = "emoji_config.json";
pub const UPLOAD_CONFIG_FILE: &str = "emoji-config.json";
pub const CDN_CSS_FILE: &str = "emoji-sprites-cdn.css";
pub const FORWARD_SCRIPT_FILE: &str = "migrate_emoji.sql";
pub const ROLLBACK_SCRIPT_FILE: &str = "rollback_emoji.sql";

/// Summary of a finished incremental run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub version: Version,
    pub new_assets: usize,
    pub pages: Vec<AtlasPage>,
    pub css_path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
}

/// Summary of an initial import.
#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub mapped: usize,
    pub pages: Vec<AtlasPage>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Summary of recording an upload batch.
#[derive(Debug, Clone)]
pub struct UploadSummary {
    pub recorded: usize,
    pub failed: usize,
    pub cdn_css_path: PathBuf,
    pub config_path: PathBuf,
}

/// An output directory together with the settings used to build it.
#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
    cfg: LedgerConfig,
}

impl Workspace {
    pub fn new(dir: impl Into<PathBuf>, cfg: LedgerConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            dir: dir.into(),
            cfg,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.cfg
    }

    pub fn registry_path(&self) -> PathBuf {
        self.dir.join(REGISTRY_FILE)
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.dir.join(MAPPING_FILE)
    }

    pub fn load_registry(&self) -> Result<Registry> {
        Registry::load(&self.registry_path())
    }

    pub fn load_mapping(&self) -> Result<MappingStore> {
        MappingStore::load(&self.mapping_path())
    }

    fn write_json(&self, name: &str, value: &Value) -> Result<PathBuf> {
        let path = self.dir.join(name);
        fs::write(&path, serde_json::to_string_pretty(value)?)?;
        Ok(path)
    }

    /// Writes `emoji_config.json` from the registry.
    pub fn write_frontend_config(&self, registry: &Registry) -> Result<PathBuf> {
        self.write_json(FRONTEND_CONFIG_FILE, &frontend_config(registry))
    }

    /// Persists the registry, then the mapping. A crash in between leaves a
    /// recorded range with no mapping entries (wasted indices), never a
    /// mapping entry without a range. Callers run the lenient check themselves.
    fn persist(&self, registry: &Registry, mapping: Option<&MappingStore>) -> Result<()> {
        if self.cfg.validation == ValidationPolicy::Strict {
            registry.check(ValidationPolicy::Strict)?;
        }
        registry.save(&self.registry_path())?;
        if let Some(mapping) = mapping {
            mapping.save(&self.mapping_path())?;
        }
        self.write_frontend_config(registry)?;
        Ok(())
    }

    #[instrument(skip_all, fields(dir = %self.dir.display()))]
    /// Packs every asset of `candidates` that is not mapped yet (restricted to
    /// `only` file names when given) and writes pages, stylesheet, registry,
    /// mapping and frontend config. Returns `None` if there was nothing new.
    pub fn run_incremental(
        &self,
        candidates: &AssetBatch,
        only: Option<&[String]>,
        images: &dyn ImageSource,
    ) -> Result<Option<RunSummary>> {
        fs::create_dir_all(&self.dir)?;
        let mut registry = self.load_registry()?;
        let mut mapping = self.load_mapping()?;

        let batch = candidates.select_new(&mapping, only);
        info!(
            found = candidates.len(),
            new = batch.len(),
            "scanned legacy assets"
        );
        let Some(update) = apply_incremental(&batch, &mut registry, &mut mapping, &self.cfg, images)?
        else {
            return Ok(None);
        };

        for page in &update.packed.pages {
            let path = self.dir.join(&page.layout.filename);
            save_png(&page.rgba, &path)?;
            info!(?path, count = page.layout.count(), "page written");
        }
        let css_path = self.dir.join(incremental_css_filename(update.version));
        fs::write(&css_path, &update.css)?;

        self.persist(&registry, Some(&mapping))?;
        info!(version = %update.version, total = registry.total(), "registry saved");

        Ok(Some(RunSummary {
            version: update.version,
            new_assets: update.delta.len(),
            pages: update.pages,
            css_path,
            diagnostics: update.diagnostics,
        }))
    }

    #[instrument(skip_all, fields(dir = %self.dir.display()))]
    /// Records page images produced before the registry existed. The mapping
    /// must already exist; pages are taken in id order, filled to capacity, and
    /// marked frozen.
    ///
    /// Page files must be numbered from 0 without gaps, and together they must
    /// cover every mapping entry; otherwise nothing is written.
    pub fn run_initial_import(&self, images: &dyn ImageSource) -> Result<ImportSummary> {
        let mapping = MappingStore::load_required(&self.mapping_path())?;
        let mut registry = self.load_registry()?;
        if !registry.pages().is_empty() {
            return Err(SpriteLedgerError::AlreadyInitialized {
                pages: registry.pages().len(),
            });
        }

        let files = find_page_files(&self.dir, &self.cfg)?;
        info!(mapped = mapping.len(), files = files.len(), "importing existing pages");
        let capacity = self.cfg.capacity as u64;
        let mut remaining = mapping.len() as u64;
        let mut pages = Vec::new();
        for path in files {
            if remaining == 0 {
                break;
            }
            let filename = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let expected = registry.next_page_id();
            if self.cfg.page_id_from_filename(&filename) != Some(expected) {
                return Err(SpriteLedgerError::InvalidInput(format!(
                    "page files must be numbered from 0 without gaps: expected {}, found {filename}",
                    self.cfg.page_filename(expected)
                )));
            }
            let count = remaining.min(capacity);
            let size = images.dimensions(&path)?;
            pages.push(registry.add_page(filename, "", count, size, true)?);
            remaining -= count;
        }
        if remaining > 0 {
            return Err(SpriteLedgerError::InvalidInput(format!(
                "{} page file(s) hold {} assets but the mapping has {} entries",
                pages.len(),
                registry.total(),
                mapping.len()
            )));
        }
        let stale = registry.check_mapping(&mapping);
        if !stale.is_empty() {
            return Err(SpriteLedgerError::InconsistentRegistry(stale));
        }

        let diagnostics = registry.check(self.cfg.validation)?;
        self.persist(&registry, None)?;
        Ok(ImportSummary {
            mapped: mapping.len(),
            pages,
            diagnostics,
        })
    }

    /// Loads, changes and persists the registry (e.g. freeze, version bump).
    pub fn modify_registry<T>(&self, f: impl FnOnce(&mut Registry) -> T) -> Result<T> {
        fs::create_dir_all(&self.dir)?;
        let mut registry = self.load_registry()?;
        let out = f(&mut registry);
        registry.check(self.cfg.validation)?;
        self.persist(&registry, None)?;
        Ok(out)
    }

    /// Writes the forward and rollback SQL scripts for the persisted mapping.
    pub fn write_migration_scripts(&self) -> Result<(PathBuf, PathBuf)> {
        let mapping = MappingStore::load_required(&self.mapping_path())?;
        let forward = self.dir.join(FORWARD_SCRIPT_FILE);
        let rollback = self.dir.join(ROLLBACK_SCRIPT_FILE);
        fs::write(&forward, render_forward_script(&mapping, &self.cfg))?;
        fs::write(&rollback, render_rollback_script(&mapping, &self.cfg))?;
        info!(entries = mapping.len(), ?forward, ?rollback, "migration scripts written");
        Ok((forward, rollback))
    }

    /// Page image files currently in the output directory.
    pub fn page_files(&self) -> Result<Vec<PathBuf>> {
        find_page_files(&self.dir, &self.cfg)
    }

    /// Stores uploaded URLs in the registry and writes the CDN stylesheet and
    /// upload config from the successful subset.
    pub fn record_uploads(&self, report: &UploadReport) -> Result<UploadSummary> {
        let mut registry = self.load_registry()?;
        let uploaded = report.uploaded_files();
        let mut recorded = 0;
        // uploads touch urls only, ranges are unchanged
        for up in &uploaded {
            let known = self
                .cfg
                .page_id_from_filename(&up.filename)
                .is_some_and(|id| registry.set_page_url(id, up.url.clone()));
            if known {
                recorded += 1;
            } else {
                warn!(file = %up.filename, "uploaded file matches no registry page");
            }
        }
        self.persist(&registry, None)?;

        let cdn_css_path = self.dir.join(CDN_CSS_FILE);
        fs::write(&cdn_css_path, render_registry_css(&registry, &self.cfg))?;
        let config_path = self.write_json(
            UPLOAD_CONFIG_FILE,
            &upload_config(&uploaded, &self.cfg, &now()),
        )?;
        Ok(UploadSummary {
            recorded,
            failed: report.failure_count(),
            cdn_css_path,
            config_path,
        })
    }
}
