//! In-place conversion of legacy emoji references to the packed tag form.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::mapping::MappingStore;
use crate::model::{GlobalKey, LegacyKey, canonical_digits};

/// Legacy reference shapes, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceForm {
    /// `:emoji:s<N>:`
    Tag,
    /// `![](/emoji/s<N>.png)`
    AbsolutePath,
    /// `![](emoji/s<N>.png)`
    RelativePath,
}

impl ReferenceForm {
    pub const ALL: [ReferenceForm; 3] = [Self::Tag, Self::AbsolutePath, Self::RelativePath];

    /// Literal legacy text for `legacy` in this form.
    pub fn legacy_text(self, legacy: LegacyKey) -> String {
        match self {
            Self::Tag => format!(":emoji:{legacy}:"),
            Self::AbsolutePath => format!("![](/emoji/{legacy}.png)"),
            Self::RelativePath => format!("![](emoji/{legacy}.png)"),
        }
    }

    /// Only the tag form can be restored; path forms lose their original text.
    pub fn is_reversible(self) -> bool {
        matches!(self, Self::Tag)
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Self::Tag => &TAG_RE,
            Self::AbsolutePath => &ABSOLUTE_RE,
            Self::RelativePath => &RELATIVE_RE,
        }
    }
}

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":emoji:s(\d+):").expect("static regex"));
static ABSOLUTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[\]\(/emoji/s(\d+)\.png\)").expect("static regex"));
static RELATIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[\]\(emoji/s(\d+)\.png\)").expect("static regex"));

/// Canonical packed reference for `global`.
pub fn new_tag(global: GlobalKey) -> String {
    format!(":emoji:{global}:")
}

/// One replaced span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub form: ReferenceForm,
    pub from: String,
    pub to: String,
}

/// Rewritten text plus the replacements that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub text: String,
    pub changes: Vec<Change>,
}

impl Rewrite {
    pub fn changed(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Applies the mapping to legacy references in text.
#[derive(Debug, Clone, Copy)]
pub struct Rewriter<'a> {
    mapping: &'a MappingStore,
}

impl<'a> Rewriter<'a> {
    pub fn new(mapping: &'a MappingStore) -> Self {
        Self { mapping }
    }

    /// Rewrites every mapped legacy reference; unmapped ones are left as they are.
    ///
    /// The ordered pass over the three forms repeats until it replaces nothing,
    /// so a span that becomes legacy-shaped only after a neighbour was replaced
    /// is converted too and `rewrite(rewrite(t)) == rewrite(t)`. Each replacement
    /// consumes one `s<digit>` occurrence and emits none, which bounds the loop.
    pub fn rewrite(&self, text: &str) -> Rewrite {
        let mut current = text.to_string();
        let mut changes = Vec::new();
        loop {
            let before = changes.len();
            for form in ReferenceForm::ALL {
                current = self.apply_form(form, &current, &mut changes);
            }
            if changes.len() == before {
                break;
            }
        }
        Rewrite {
            text: current,
            changes,
        }
    }

    /// Convenience for callers that only need the text.
    pub fn rewrite_text(&self, text: &str) -> String {
        self.rewrite(text).text
    }

    fn apply_form(&self, form: ReferenceForm, text: &str, changes: &mut Vec<Change>) -> String {
        form.pattern()
            .replace_all(text, |caps: &Captures<'_>| {
                let whole = &caps[0];
                let mapped = canonical_digits(&caps[1])
                    .map(LegacyKey)
                    .and_then(|legacy| self.mapping.get(legacy));
                match mapped {
                    Some(global) => {
                        let to = new_tag(global);
                        changes.push(Change {
                            form,
                            from: whole.to_string(),
                            to: to.clone(),
                        });
                        to
                    }
                    None => whole.to_string(),
                }
            })
            .into_owned()
    }
}
