use crate::error::Result;
use crate::table::CanonicalTable;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Memoized loads, one slot per dataset id.
///
/// Loading happens outside the lock: two callers asking for the same
/// unloaded dataset may both load it, and the first stored table wins.
/// Entries live until they are invalidated or the cache is dropped.
#[derive(Default)]
pub struct TableCache {
    slots: RwLock<HashMap<String, Arc<CanonicalTable>>>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dataset: &str) -> Option<Arc<CanonicalTable>> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots.get(dataset).cloned()
    }

    pub fn get_or_load<F>(&self, dataset: &str, load: F) -> Result<Arc<CanonicalTable>>
    where
        F: FnOnce() -> Result<CanonicalTable>,
    {
        if let Some(table) = self.get(dataset) {
            debug!("Cache hit for '{}'", dataset);
            return Ok(table);
        }

        let table = Arc::new(load()?);
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        Ok(slots.entry(dataset.to_string()).or_insert(table).clone())
    }

    /// Returns whether an entry was present.
    pub fn invalidate(&self, dataset: &str) -> bool {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots.remove(dataset).is_some()
    }

    pub fn clear(&self) {
        self.slots.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DashboardError;
    use std::cell::Cell;
    use std::collections::BTreeMap;

    fn table(dataset: &str) -> CanonicalTable {
        CanonicalTable {
            dataset: dataset.to_string(),
            kind: None,
            measure_kinds: BTreeMap::new(),
            derived: Vec::new(),
            records: Vec::new(),
            served_by: "memory".to_string(),
            warnings: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_loads_once_until_invalidated() {
        let cache = TableCache::new();
        let loads = Cell::new(0);
        let load = || {
            loads.set(loads.get() + 1);
            Ok(table("pension"))
        };

        cache.get_or_load("pension", load).unwrap();
        cache.get_or_load("pension", load).unwrap();
        assert_eq!(loads.get(), 1);
        assert_eq!(cache.len(), 1);

        assert!(cache.invalidate("pension"));
        assert!(!cache.invalidate("pension"));
        cache.get_or_load("pension", load).unwrap();
        assert_eq!(loads.get(), 2);
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let cache = TableCache::new();
        let err = cache
            .get_or_load("banking", || Err(DashboardError::UnknownDataset("banking".to_string())))
            .unwrap_err();
        assert!(matches!(err, DashboardError::UnknownDataset(_)));
        assert!(cache.is_empty());
        cache.clear();
        assert!(cache.get("banking").is_none());
    }
}
