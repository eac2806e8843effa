use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What a run does with registry diagnostics before persisting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Report gaps/overlaps as warnings and keep going.
    #[default]
    Lenient,
    /// Refuse to persist a registry that fails validation.
    Strict,
}

impl FromStr for ValidationPolicy {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            _ => Err(()),
        }
    }
}

/// Sheet geometry, naming and script settings shared by every stage of a run.
///
/// Key notes:
///   - `capacity`, `row_width` and `cell_size` fully determine page geometry
///   - `display_ratio` divides pixel sizes/offsets when emitting styles (64px cells shown at 32px)
///   - `validation` decides whether registry diagnostics block persistence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Maximum number of assets per page.
    pub capacity: u32,
    /// Assets per physical row within a page.
    pub row_width: u32,
    /// Edge length in pixels every asset is normalized to.
    pub cell_size: u32,
    /// Source pixels per displayed CSS pixel.
    #[serde(default = "default_display_ratio")]
    pub display_ratio: u32,
    /// Page file name prefix; the page id and `.png` are appended.
    #[serde(default = "default_page_prefix")]
    pub page_prefix: String,
    /// URL prefix used for page images in generated styles.
    #[serde(default = "default_asset_base_url")]
    pub asset_base_url: String,
    #[serde(default)]
    pub validation: ValidationPolicy,
    /// Table rewritten by migration scripts.
    #[serde(default = "default_script_table")]
    pub script_table: String,
    /// Text column rewritten by migration scripts.
    #[serde(default = "default_script_column")]
    pub script_column: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            capacity: 128,
            row_width: 16,
            cell_size: 64,
            display_ratio: default_display_ratio(),
            page_prefix: default_page_prefix(),
            asset_base_url: default_asset_base_url(),
            validation: ValidationPolicy::default(),
            script_table: default_script_table(),
            script_column: default_script_column(),
        }
    }
}

impl LedgerConfig {
    /// Validates the configuration parameters.
    ///
    /// Returns an error if:
    /// - Capacity, row width, cell size or display ratio is zero
    /// - A row is wider than a whole page
    /// - Cell size is not a multiple of the display ratio (offsets would be fractional)
    /// - Script table or column is not a plain identifier
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::SpriteLedgerError;

        if self.capacity == 0 || self.row_width == 0 || self.cell_size == 0 {
            return Err(SpriteLedgerError::InvalidConfig(format!(
                "capacity ({}), row_width ({}) and cell_size ({}) must be non-zero",
                self.capacity, self.row_width, self.cell_size
            )));
        }
        if self.row_width > self.capacity {
            return Err(SpriteLedgerError::InvalidConfig(format!(
                "row_width ({}) exceeds capacity ({})",
                self.row_width, self.capacity
            )));
        }
        if self.display_ratio == 0 || self.cell_size % self.display_ratio != 0 {
            return Err(SpriteLedgerError::InvalidConfig(format!(
                "cell_size ({}) must be a multiple of display_ratio ({})",
                self.cell_size, self.display_ratio
            )));
        }
        if self.page_prefix.is_empty() {
            return Err(SpriteLedgerError::InvalidConfig(
                "page_prefix must not be empty".into(),
            ));
        }
        for (name, ident) in [
            ("script_table", &self.script_table),
            ("script_column", &self.script_column),
        ] {
            let plain = !ident.is_empty()
                && ident
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
            if !plain {
                return Err(SpriteLedgerError::InvalidConfig(format!(
                    "{name} must be a plain SQL identifier, got {ident:?}"
                )));
            }
        }
        Ok(())
    }

    /// File name of page `id`, e.g. `emoji-sprite-3.png`.
    pub fn page_filename(&self, id: u32) -> String {
        format!("{}{}.png", self.page_prefix, id)
    }

    /// Inverse of [`page_filename`](Self::page_filename).
    pub fn page_id_from_filename(&self, filename: &str) -> Option<u32> {
        filename
            .strip_prefix(self.page_prefix.as_str())?
            .strip_suffix(".png")?
            .parse()
            .ok()
    }
}

fn default_display_ratio() -> u32 {
    2
}
fn default_page_prefix() -> String {
    "emoji-sprite-".into()
}
fn default_asset_base_url() -> String {
    "/emoji/".into()
}
fn default_script_table() -> String {
    "comments".into()
}
fn default_script_column() -> String {
    "content".into()
}

/// Builder for `LedgerConfig` for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct LedgerConfigBuilder {
    cfg: LedgerConfig,
}

impl LedgerConfigBuilder {
    pub fn new() -> Self {
        Self {
            cfg: LedgerConfig::default(),
        }
    }
    pub fn capacity(mut self, v: u32) -> Self {
        self.cfg.capacity = v;
        self
    }
    pub fn row_width(mut self, v: u32) -> Self {
        self.cfg.row_width = v;
        self
    }
    pub fn cell_size(mut self, v: u32) -> Self {
        self.cfg.cell_size = v;
        self
    }
    pub fn display_ratio(mut self, v: u32) -> Self {
        self.cfg.display_ratio = v;
        self
    }
    pub fn page_prefix(mut self, v: impl Into<String>) -> Self {
        self.cfg.page_prefix = v.into();
        self
    }
    pub fn asset_base_url(mut self, v: impl Into<String>) -> Self {
        self.cfg.asset_base_url = v.into();
        self
    }
    pub fn validation(mut self, v: ValidationPolicy) -> Self {
        self.cfg.validation = v;
        self
    }
    pub fn script_target(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.cfg.script_table = table.into();
        self.cfg.script_column = column.into();
        self
    }
    pub fn build(self) -> LedgerConfig {
        self.cfg
    }
}

impl LedgerConfig {
    /// Create a fluent builder for `LedgerConfig`.
    pub fn builder() -> LedgerConfigBuilder {
        LedgerConfigBuilder::new()
    }
}
