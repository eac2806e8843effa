//! Core library for incremental emoji sprite sheets.
//!
//! - Registry: versioned range allocator; every page owns a contiguous block of global indices
//! - Mapping: append-only `s<legacy id>` -> `e<global index>` store
//! - Packing: fixed grid pages (`capacity`, `row_width`, `cell_size`), deterministic offsets
//! - Outputs: CSS position rules, frontend config, SQL forward/rollback migration scripts
//! - Rewriting: in-place conversion of legacy references in text
//!
//! Quick example:
//! ```ignore
//! use sprite_ledger_core::prelude::*;
//! # fn main() -> sprite_ledger_core::Result<()> {
//! let cfg = LedgerConfig::builder().capacity(128).row_width(16).cell_size(64).build();
//! let ws = Workspace::new("emoji_output", cfg)?;
//! let batch = AssetBatch::from_paths(&["emoji/s1.png", "emoji/s2.png"]);
//! if let Some(run) = ws.run_incremental(&batch, None, &FileImageSource)? {
//!     println!("{}: {} new assets", run.version, run.new_assets);
//! }
//! # Ok(()) }
//! ```

pub mod batch;
pub mod builder;
pub mod compositing;
pub mod config;
pub mod error;
pub mod export;
pub mod images;
pub mod layout;
pub mod mapping;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod rewrite;
pub mod script;
pub mod style;
pub mod upload;
pub mod workspace;

pub use config::*;
pub use error::*;
pub use export::*;
pub use model::*;
pub use pipeline::*;

/// Convenience prelude for common types and functions.
/// Importing `sprite_ledger_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::batch::{AssetBatch, LegacyAsset, parse_legacy_filename};
    pub use crate::builder::{Assignment, MappingDelta, build_delta};
    pub use crate::config::{LedgerConfig, LedgerConfigBuilder, ValidationPolicy};
    pub use crate::images::{FileImageSource, ImageSource};
    pub use crate::layout::{CellPlacement, PageLayout, plan_pages};
    pub use crate::mapping::MappingStore;
    pub use crate::model::{AtlasPage, GlobalKey, LegacyKey, Version, VersionRecord};
    pub use crate::registry::{Diagnostic, Registry};
    pub use crate::rewrite::{ReferenceForm, Rewrite, Rewriter};
    pub use crate::upload::{UploadOutcome, UploadReport, UploadedFile, Uploader};
    pub use crate::workspace::Workspace;
    pub use crate::{
        IncrementalUpdate, OutputPage, PackOutput, apply_incremental, pack_batch, pack_layout,
    };
}
