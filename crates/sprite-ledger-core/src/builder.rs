use std::collections::HashSet;
use std::path::PathBuf;

use tracing::debug;

use crate::batch::AssetBatch;
use crate::mapping::MappingStore;
use crate::model::{GlobalKey, LegacyKey};
use crate::registry::Registry;

/// A global index handed to one legacy asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub legacy: LegacyKey,
    pub global: GlobalKey,
    pub source: PathBuf,
}

/// Identifiers assigned in one run, in batch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingDelta {
    pub assignments: Vec<Assignment>,
}

impl MappingDelta {
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (LegacyKey, GlobalKey)> + '_ {
        self.assignments.iter().map(|a| (a.legacy, a.global))
    }
}

/// Assigns `next_global_index() + n` to the n-th asset of `batch` that `mapping`
/// does not know yet. Already-mapped and repeated legacy ids are skipped, so the
/// assigned indices are contiguous and start exactly at the registry counter.
pub fn build_delta(batch: &AssetBatch, mapping: &MappingStore, registry: &Registry) -> MappingDelta {
    let base = registry.next_global_index();
    let mut seen = HashSet::new();
    let assignments: Vec<Assignment> = batch
        .assets()
        .iter()
        .filter(|a| !mapping.contains(a.key()) && seen.insert(a.legacy_id))
        .enumerate()
        .map(|(i, a)| Assignment {
            legacy: a.key(),
            global: GlobalKey(base + i as u64),
            source: a.source.clone(),
        })
        .collect();
    for a in &assignments {
        debug!(legacy = %a.legacy, global = %a.global, "new mapping");
    }
    MappingDelta { assignments }
}
