use chrono::NaiveDateTime;
use serde_json::{Map, Value, json};

use crate::config::LedgerConfig;
use crate::model::format_timestamp;
use crate::registry::Registry;
use crate::upload::UploadedFile;

/// Frontend view of the registry:
/// `{ version, total_emojis, sprites: [{ id, filename, url, range, frozen, size }], updated_at }`.
pub fn frontend_config(registry: &Registry) -> Value {
    let sprites: Vec<Value> = registry
        .pages()
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "filename": p.filename,
                "url": p.url,
                "range": [p.range_start, p.range_end],
                "frozen": p.frozen,
                "size": [p.size.0, p.size.1],
            })
        })
        .collect();
    json!({
        "version": registry.version().to_string(),
        "total_emojis": registry.total(),
        "sprites": sprites,
        "updated_at": format_timestamp(&registry.record().created_at),
    })
}

/// Upload summary consumed by the frontend loader:
/// `{ sprite_urls: { "<page id>": url }, sprite_info: {..}, upload_time }`.
/// Files whose name does not carry a page id are left out.
pub fn upload_config(uploads: &[UploadedFile], cfg: &LedgerConfig, uploaded_at: &NaiveDateTime) -> Value {
    let mut urls = Map::new();
    for up in uploads {
        if let Some(id) = cfg.page_id_from_filename(&up.filename) {
            urls.insert(id.to_string(), Value::String(up.url.clone()));
        }
    }
    json!({
        "sprite_urls": urls,
        "sprite_info": {
            "target_size": cfg.cell_size,
            "sprites_per_row": cfg.row_width,
            "emojis_per_sprite": cfg.capacity,
        },
        "upload_time": format_timestamp(uploaded_at),
    })
}
