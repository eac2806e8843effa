//! Offline SQL migration scripts driven by the mapping.
//!
//! The forward script replaces every legacy form of every mapped key inside a
//! single transaction and ends with two advisory counts. The rollback script
//! only restores the tag form: once a path reference is converted, nothing in
//! the new tag encodes which path spelling it came from.

use crate::config::LedgerConfig;
use crate::mapping::MappingStore;
use crate::rewrite::{ReferenceForm, new_tag};

/// One literal `REPLACE(column, from, to)` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub form: ReferenceForm,
    pub from: String,
    pub to: String,
}

impl Substitution {
    /// Same semantics as SQL `REPLACE`: every non-overlapping occurrence, left to right.
    pub fn apply(&self, text: &str) -> String {
        text.replace(&self.from, &self.to)
    }
}

/// Applies substitutions in order, as the generated script would.
pub fn apply_all(subs: &[Substitution], text: &str) -> String {
    subs.iter().fold(text.to_string(), |acc, s| s.apply(&acc))
}

/// Three substitutions per mapping entry, one per legacy form, in mapping order.
pub fn forward_substitutions(mapping: &MappingStore) -> Vec<Substitution> {
    mapping
        .iter()
        .flat_map(|(legacy, global)| {
            ReferenceForm::ALL.into_iter().map(move |form| Substitution {
                form,
                from: form.legacy_text(legacy),
                to: new_tag(global),
            })
        })
        .collect()
}

/// Inverse of the tag-form substitutions only.
pub fn rollback_substitutions(mapping: &MappingStore) -> Vec<Substitution> {
    mapping
        .iter()
        .map(|(legacy, global)| Substitution {
            form: ReferenceForm::Tag,
            from: new_tag(global),
            to: ReferenceForm::Tag.legacy_text(legacy),
        })
        .collect()
}

/// Quotes `s` as a SQL string literal.
pub fn sql_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn update_statement(sub: &Substitution, cfg: &LedgerConfig) -> String {
    format!(
        "UPDATE {table} SET {col} = REPLACE({col}, {from}, {to});",
        table = cfg.script_table,
        col = cfg.script_column,
        from = sql_literal(&sub.from),
        to = sql_literal(&sub.to),
    )
}

/// Advisory queries run after the forward script: remaining legacy references
/// (expected 0) and packed references (expected the mapped count).
pub fn verification_queries(cfg: &LedgerConfig) -> [String; 2] {
    let col = &cfg.script_column;
    let table = &cfg.script_table;
    let like = |prefix: &str| format!("{col} LIKE '%{prefix}%'");
    [
        format!(
            "SELECT COUNT(*) AS old_format_count FROM {table} WHERE {} OR {} OR {};",
            like(":emoji:s"),
            like("![](emoji/s"),
            like("![](/emoji/s"),
        ),
        format!(
            "SELECT COUNT(*) AS new_format_count FROM {table} WHERE {};",
            like(":emoji:e"),
        ),
    ]
}

/// Full forward migration script.
pub fn render_forward_script(mapping: &MappingStore, cfg: &LedgerConfig) -> String {
    let mut lines: Vec<String> = vec![
        "-- Emoji reference migration".into(),
        "-- Converts legacy emoji references to packed sprite tags.".into(),
        "-- Back up the database before running.".into(),
        format!("-- Mapped entries: {}", mapping.len()),
        String::new(),
        "START TRANSACTION;".into(),
        String::new(),
    ];
    for sub in forward_substitutions(mapping) {
        lines.push(format!("-- {} -> {}", sub.from, sub.to));
        lines.push(update_statement(&sub, cfg));
        lines.push(String::new());
    }
    lines.push("COMMIT;".into());
    lines.push(String::new());
    lines.push(format!(
        "-- Verification: old_format_count should be 0, new_format_count should be {}",
        mapping.len()
    ));
    lines.extend(verification_queries(cfg));
    lines.join("\n")
}

/// Rollback script: tag form only.
pub fn render_rollback_script(mapping: &MappingStore, cfg: &LedgerConfig) -> String {
    let mut lines: Vec<String> = vec![
        "-- Emoji reference rollback".into(),
        "-- Restores :emoji:s<N>: tags from :emoji:e<M>: tags.".into(),
        "-- Image-path references (![](/emoji/s<N>.png), ![](emoji/s<N>.png)) converted by".into(),
        "-- the forward script are NOT restored: they come back as :emoji:s<N>: tags.".into(),
        "-- Run only if the migration has to be undone.".into(),
        String::new(),
        "START TRANSACTION;".into(),
        String::new(),
    ];
    for sub in rollback_substitutions(mapping) {
        lines.push(format!("-- {} -> {}", sub.from, sub.to));
        lines.push(update_statement(&sub, cfg));
        lines.push(String::new());
    }
    lines.push("COMMIT;".into());
    lines.join("\n")
}
