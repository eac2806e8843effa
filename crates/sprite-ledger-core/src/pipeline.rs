use std::collections::HashMap;
use std::path::Path;

use image::RgbaImage;
use tracing::{debug, info, instrument};

use crate::batch::AssetBatch;
use crate::builder::{Assignment, MappingDelta, build_delta};
use crate::compositing::blit_over;
use crate::config::LedgerConfig;
use crate::error::{Result, SpriteLedgerError};
use crate::images::ImageSource;
use crate::layout::{CellPlacement, PageLayout, plan_pages};
use crate::mapping::MappingStore;
use crate::model::{AtlasPage, GlobalKey, Version};
use crate::registry::{Diagnostic, Registry};

/// Output RGBA page and its layout record.
#[derive(Debug)]
pub struct OutputPage {
    pub layout: PageLayout,
    pub rgba: RgbaImage,
}

/// Output of a packing run: composed pages in page-id order.
#[derive(Debug)]
pub struct PackOutput {
    pub pages: Vec<OutputPage>,
}

impl PackOutput {
    /// Every placed cell across all pages, in assignment order.
    pub fn placements(&self) -> impl Iterator<Item = (u32, &CellPlacement)> {
        self.pages
            .iter()
            .flat_map(|p| p.layout.cells.iter().map(move |c| (p.layout.id, c)))
    }

    pub fn layouts(&self) -> Vec<PageLayout> {
        self.pages.iter().map(|p| p.layout.clone()).collect()
    }
}

#[instrument(skip_all, fields(assets = assignments.len(), first_page_id = first_page_id))]
/// Packs newly assigned assets into pages numbered from `first_page_id` and
/// composes each page through `images`.
///
/// Notes:
/// - Order of `assignments` is kept; geometry comes from [`plan_pages`].
/// - Any asset that fails to load aborts the whole pack so nothing half-built is recorded.
pub fn pack_batch(
    assignments: &[Assignment],
    cfg: &LedgerConfig,
    first_page_id: u32,
    images: &dyn ImageSource,
) -> Result<PackOutput> {
    if assignments.is_empty() {
        return Err(SpriteLedgerError::Empty);
    }
    let keys: Vec<GlobalKey> = assignments.iter().map(|a| a.global).collect();
    let sources: HashMap<GlobalKey, &Path> = assignments
        .iter()
        .map(|a| (a.global, a.source.as_path()))
        .collect();

    let mut pages = Vec::new();
    for layout in plan_pages(&keys, cfg, first_page_id)? {
        let rgba = compose_page(&layout, &sources, cfg, images)?;
        debug!(
            id = layout.id,
            count = layout.count(),
            width = layout.width,
            height = layout.height,
            "page composed"
        );
        pages.push(OutputPage { layout, rgba });
    }
    Ok(PackOutput { pages })
}

/// Composes one page: transparent canvas, each cell normalized to `cell_size` and blended in.
pub fn compose_page(
    layout: &PageLayout,
    sources: &HashMap<GlobalKey, &Path>,
    cfg: &LedgerConfig,
    images: &dyn ImageSource,
) -> Result<RgbaImage> {
    let mut canvas = RgbaImage::new(layout.width, layout.height);
    for cell in &layout.cells {
        let path = sources.get(&cell.key).ok_or_else(|| {
            SpriteLedgerError::InvalidInput(format!("no source image for {}", cell.key))
        })?;
        let img = images.load_cell(path, cfg.cell_size)?;
        blit_over(&img, &mut canvas, cell.x, cell.y);
    }
    Ok(canvas)
}

// ---------------- Layout-only API ----------------

/// Computes page geometry for `keys` without touching pixel data.
pub fn pack_layout(keys: &[GlobalKey], cfg: &LedgerConfig, first_page_id: u32) -> Result<Vec<PageLayout>> {
    if keys.is_empty() {
        return Err(SpriteLedgerError::Empty);
    }
    plan_pages(keys, cfg, first_page_id)
}

// ---------------- Incremental run ----------------

/// Everything one incremental run changed, ready to be written out.
#[derive(Debug)]
pub struct IncrementalUpdate {
    /// Registry version after promotion.
    pub version: Version,
    pub delta: MappingDelta,
    /// Pages recorded in the registry by this run.
    pub pages: Vec<AtlasPage>,
    pub packed: PackOutput,
    pub css: String,
    /// Registry diagnostics tolerated under the lenient policy.
    pub diagnostics: Vec<Diagnostic>,
}

#[instrument(skip_all, fields(candidates = batch.len()))]
/// Assigns identifiers to the unmapped assets of `batch`, packs them, records
/// the pages, promotes the version, renders the incremental stylesheet and
/// merges the new entries into `mapping`.
///
/// Only memory is touched; returns `None` when every asset is already mapped.
/// `registry` and `mapping` are updated only when the whole step succeeds.
/// A mapping holding keys the registry never allocated is rejected before
/// any index is handed out.
pub fn apply_incremental(
    batch: &AssetBatch,
    registry: &mut Registry,
    mapping: &mut MappingStore,
    cfg: &LedgerConfig,
    images: &dyn ImageSource,
) -> Result<Option<IncrementalUpdate>> {
    cfg.validate()?;
    let stale = registry.check_mapping(mapping);
    if !stale.is_empty() {
        return Err(SpriteLedgerError::InconsistentRegistry(stale));
    }
    let delta = build_delta(batch, mapping, registry);
    if delta.is_empty() {
        info!("no new assets");
        return Ok(None);
    }

    let packed = pack_batch(&delta.assignments, cfg, registry.next_page_id(), images)?;
    let mut next_registry = registry.clone();
    let mut pages = Vec::with_capacity(packed.pages.len());
    for out in &packed.pages {
        let layout = &out.layout;
        let page = next_registry.add_page(
            layout.filename.clone(),
            "",
            layout.count() as u64,
            (layout.width, layout.height),
            false,
        )?;
        debug_assert_eq!(page.id, layout.id);
        debug_assert_eq!(Some(page.range_start), layout.cells.first().map(|c| c.key.index()));
        pages.push(page);
    }

    let version = next_registry.promote_version(&format!("Added {} new emojis", delta.len()));
    let css = crate::style::render_incremental_css(
        &packed.layouts(),
        cfg,
        version,
        &next_registry.record().created_at,
    );
    let mut next_mapping = mapping.clone();
    let added = next_mapping.merge(delta.pairs());
    let diagnostics = next_registry.check(cfg.validation)?;

    *registry = next_registry;
    *mapping = next_mapping;
    info!(
        %version,
        assets = added,
        pages = pages.len(),
        total = registry.total(),
        "incremental update prepared"
    );

    Ok(Some(IncrementalUpdate {
        version,
        delta,
        pages,
        packed,
        css,
        diagnostics,
    }))
}
