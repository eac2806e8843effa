//! Grid geometry of sprite pages. Pure functions of `(order, capacity, row width, cell size)`.

use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;
use crate::error::Result;
use crate::model::{AtlasPage, GlobalKey};

/// Pixel offset of one asset inside its page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CellPlacement {
    pub key: GlobalKey,
    /// Left edge in page pixels.
    pub x: u32,
    /// Top edge in page pixels.
    pub y: u32,
}

/// Planned page: id, file name, pixel size and the cells it holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageLayout {
    pub id: u32,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub cells: Vec<CellPlacement>,
}

impl PageLayout {
    pub fn count(&self) -> usize {
        self.cells.len()
    }
}

/// Offset of the `i`-th asset of a page: row-major, `row_width` cells per row.
pub fn cell_offset(i: u32, cfg: &LedgerConfig) -> (u32, u32) {
    let row = i / cfg.row_width;
    let col = i % cfg.row_width;
    (col * cfg.cell_size, row * cfg.cell_size)
}

/// Pixel size of a page holding `n` assets: full row width, as many rows as needed.
pub fn page_size(n: u32, cfg: &LedgerConfig) -> (u32, u32) {
    let rows = n.div_ceil(cfg.row_width);
    (cfg.row_width * cfg.cell_size, rows * cfg.cell_size)
}

/// Splits `keys` into pages of at most `capacity` assets, in order, numbering
/// pages from `first_page_id`.
pub fn plan_pages(keys: &[GlobalKey], cfg: &LedgerConfig, first_page_id: u32) -> Result<Vec<PageLayout>> {
    cfg.validate()?;
    let pages = keys
        .chunks(cfg.capacity as usize)
        .enumerate()
        .map(|(n, group)| {
            let id = first_page_id + n as u32;
            let (width, height) = page_size(group.len() as u32, cfg);
            let cells = group
                .iter()
                .enumerate()
                .map(|(i, key)| {
                    let (x, y) = cell_offset(i as u32, cfg);
                    CellPlacement { key: *key, x, y }
                })
                .collect();
            PageLayout {
                id,
                filename: cfg.page_filename(id),
                width,
                height,
                cells,
            }
        })
        .collect();
    Ok(pages)
}

/// Rebuilds the layout of a page already recorded in the registry: cell `i`
/// holds global index `range_start + i`.
pub fn layout_from_page(page: &AtlasPage, cfg: &LedgerConfig) -> PageLayout {
    let cells = page
        .range()
        .enumerate()
        .map(|(i, index)| {
            let (x, y) = cell_offset(i as u32, cfg);
            CellPlacement {
                key: GlobalKey(index),
                x,
                y,
            }
        })
        .collect();
    PageLayout {
        id: page.id,
        filename: page.filename.clone(),
        width: page.size.0,
        height: page.size.1,
        cells,
    }
}
