use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use indexmap::map::Entry;
use tracing::debug;

use crate::error::{Result, SpriteLedgerError};
use crate::model::{GlobalKey, LegacyKey};

/// Flat, append-only mapping from legacy keys to global keys.
///
/// Insertion order is kept so diagnostics and generated scripts list entries
/// in the order they were assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingStore {
    entries: IndexMap<LegacyKey, GlobalKey>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the mapping file, or an empty store if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(?path, "no mapping file, starting from an empty mapping");
            return Ok(Self::new());
        }
        Self::load_required(path)
    }

    /// Loads the mapping file, failing with `MissingMapping` if it does not exist.
    pub fn load_required(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SpriteLedgerError::MissingMapping(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        let entries: IndexMap<LegacyKey, GlobalKey> = serde_json::from_str(&text)
            .map_err(|e| SpriteLedgerError::schema(path.display().to_string(), e.to_string()))?;
        debug!(?path, entries = entries.len(), "mapping loaded");
        Ok(Self { entries })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, legacy: LegacyKey) -> bool {
        self.entries.contains_key(&legacy)
    }

    pub fn get(&self, legacy: LegacyKey) -> Option<GlobalKey> {
        self.entries.get(&legacy).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LegacyKey, GlobalKey)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }

    /// Inserts `legacy -> global` unless `legacy` is already mapped.
    /// Returns true if the entry was added.
    pub fn insert_new(&mut self, legacy: LegacyKey, global: GlobalKey) -> bool {
        match self.entries.entry(legacy) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(global);
                true
            }
        }
    }

    /// Union with `delta`; existing keys are never overwritten.
    /// Returns the number of entries added.
    pub fn merge<I>(&mut self, delta: I) -> usize
    where
        I: IntoIterator<Item = (LegacyKey, GlobalKey)>,
    {
        delta
            .into_iter()
            .filter(|(legacy, global)| self.insert_new(*legacy, *global))
            .count()
    }
}

impl FromIterator<(LegacyKey, GlobalKey)> for MappingStore {
    fn from_iter<T: IntoIterator<Item = (LegacyKey, GlobalKey)>>(iter: T) -> Self {
        let mut store = Self::new();
        store.merge(iter);
        store
    }
}
