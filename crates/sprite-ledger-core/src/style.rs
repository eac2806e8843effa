//! CSS generation for sprite pages and per-asset positions.
//!
//! Cells are stored at `cell_size` pixels but shown at `cell_size / display_ratio`,
//! so background sizes and positions are divided by the ratio. Positions are
//! negative so a fixed-size viewport reveals exactly one asset.

use std::fmt::Write as _;

use chrono::NaiveDateTime;

use crate::config::LedgerConfig;
use crate::layout::{PageLayout, layout_from_page};
use crate::model::{Version, format_timestamp};
use crate::registry::Registry;
use crate::upload::UploadedFile;

/// Class name of a page background rule.
pub fn page_class(id: u32) -> String {
    format!("emoji-sprite-{id}")
}

/// Background rule for one page.
pub fn page_rule(page: &PageLayout, cfg: &LedgerConfig) -> String {
    let r = cfg.display_ratio;
    format!(
        ".{} {{\n  background-image: url('{}{}');\n  background-size: {}px {}px;\n}}\n",
        page_class(page.id),
        cfg.asset_base_url,
        page.filename,
        page.width / r,
        page.height / r,
    )
}

/// Position rules for every cell of `page`.
pub fn position_rules(page: &PageLayout, cfg: &LedgerConfig) -> String {
    let r = cfg.display_ratio;
    let mut out = String::new();
    for cell in &page.cells {
        let _ = write!(
            out,
            ".emoji-{} {{\n  background-position: -{}px -{}px;\n}}\n\n",
            cell.key,
            cell.x / r,
            cell.y / r,
        );
    }
    out
}

/// Stylesheet for one incremental run: header, page rules, then position rules.
pub fn render_incremental_css(
    pages: &[PageLayout],
    cfg: &LedgerConfig,
    version: Version,
    generated_at: &NaiveDateTime,
) -> String {
    render_css("Incremental emoji sprites", pages, cfg, version, generated_at)
}

fn render_css(
    title: &str,
    pages: &[PageLayout],
    cfg: &LedgerConfig,
    version: Version,
    generated_at: &NaiveDateTime,
) -> String {
    let mut css = format!(
        "/* {title} - {version} */\n/* Generated at: {} */\n\n",
        format_timestamp(generated_at)
    );
    for page in pages {
        css.push_str(&page_rule(page, cfg));
        css.push('\n');
    }
    for page in pages {
        css.push_str(&position_rules(page, cfg));
    }
    css
}

/// File name of the stylesheet written for `version`.
pub fn incremental_css_filename(version: Version) -> String {
    format!("emoji-sprites-incremental-{version}.css")
}

/// Replaces local page URLs with the uploaded ones. Pages that were not
/// uploaded keep their local URL.
pub fn rewrite_css_urls(css: &str, uploads: &[UploadedFile], cfg: &LedgerConfig) -> String {
    let mut out = css.to_string();
    for up in uploads {
        let local = format!("url('{}{}')", cfg.asset_base_url, up.filename);
        let remote = format!("url('{}')", up.url);
        out = out.replace(&local, &remote);
    }
    out
}

/// Stylesheet covering every page in the registry. Pages with a recorded URL
/// point at it; the rest use the local asset path.
pub fn render_registry_css(registry: &Registry, cfg: &LedgerConfig) -> String {
    let layouts: Vec<PageLayout> = registry
        .pages()
        .iter()
        .map(|p| layout_from_page(p, cfg))
        .collect();
    let css = render_css(
        "Emoji sprites",
        &layouts,
        cfg,
        registry.version(),
        &registry.record().created_at,
    );
    let uploaded: Vec<UploadedFile> = registry
        .pages()
        .iter()
        .filter(|p| !p.url.is_empty())
        .map(|p| UploadedFile {
            filename: p.filename.clone(),
            url: p.url.clone(),
            oss_type: None,
        })
        .collect();
    rewrite_css_urls(&css, &uploaded, cfg)
}
