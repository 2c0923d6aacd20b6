//! Owner of every loaded dataset.
//!
//! Datasets are stored behind `Arc` so readers (plotting, fitting workers) can hold
//! one while the manager keeps accepting changes. A dataset is never mutated in
//! place once inserted: conversions build a new `Dataset` and `replace` swaps it in.
//!
//! Concurrent use goes through `SharedDataManager`: a single writer at a time
//! (`RwLock::write`) for add/remove/replace, any number of readers.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use log::{debug, info};

use crate::domain::{Condition, Dataset, DatasetId};
use crate::error::TireError;

pub type SharedDataManager = Arc<RwLock<DataManager>>;

#[derive(Debug, Default)]
pub struct DataManager {
    datasets: HashMap<DatasetId, Arc<Dataset>>,
    /// Insertion order, for listing.
    order: Vec<DatasetId>,
}

impl DataManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedDataManager {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &DatasetId) -> bool {
        self.datasets.contains_key(id)
    }

    /// Insert a dataset under its own id.
    pub fn add_dataset(&mut self, dataset: Dataset) -> Result<Arc<Dataset>, TireError> {
        if self.contains(&dataset.id) {
            return Err(TireError::validation(Some(&dataset.id), "a dataset with this id already exists"));
        }
        let id = dataset.id.clone();
        let stored = Arc::new(dataset);
        self.datasets.insert(id.clone(), Arc::clone(&stored));
        self.order.push(id.clone());
        debug!("Added dataset '{id}' ({} rows)", stored.len());
        Ok(stored)
    }

    /// Read-only handle to a dataset.
    pub fn get_dataset(&self, id: &DatasetId) -> Result<Arc<Dataset>, TireError> {
        self.datasets
            .get(id)
            .cloned()
            .ok_or_else(|| TireError::validation(Some(id), "no such dataset"))
    }

    pub fn remove_dataset(&mut self, id: &DatasetId) -> Result<Arc<Dataset>, TireError> {
        let removed = self
            .datasets
            .remove(id)
            .ok_or_else(|| TireError::validation(Some(id), "no such dataset"))?;
        self.order.retain(|o| o != id);
        info!("Removed dataset '{id}'");
        Ok(removed)
    }

    /// Swap in a transformed version of an existing dataset (same id).
    pub fn replace_dataset(&mut self, dataset: Dataset) -> Result<Arc<Dataset>, TireError> {
        let Some(slot) = self.datasets.get_mut(&dataset.id) else {
            return Err(TireError::validation(Some(&dataset.id), "no such dataset to replace"));
        };
        let stored = Arc::new(dataset);
        *slot = Arc::clone(&stored);
        Ok(stored)
    }

    pub fn rename_dataset(&mut self, id: &DatasetId, new_id: DatasetId) -> Result<(), TireError> {
        if self.contains(&new_id) {
            return Err(TireError::validation(Some(&new_id), "a dataset with this id already exists"));
        }
        let current = self
            .datasets
            .remove(id)
            .ok_or_else(|| TireError::validation(Some(id), "no such dataset"))?;
        let mut renamed = (*current).clone();
        renamed.id = new_id.clone();
        renamed.meta.name = new_id.to_string();
        self.datasets.insert(new_id.clone(), Arc::new(renamed));
        for o in &mut self.order {
            if o == id {
                *o = new_id.clone();
            }
        }
        info!("Renamed dataset '{id}' to '{new_id}'");
        Ok(())
    }

    /// Ids in insertion order.
    pub fn list_datasets(&self) -> Vec<DatasetId> {
        self.order.clone()
    }

    /// `base`, or `base (1)`, `base (2)`, ... whichever is free first.
    pub fn unique_id(&self, base: &str) -> DatasetId {
        let plain = DatasetId::from(base);
        if !self.contains(&plain) {
            return plain;
        }
        (1..)
            .map(|i| DatasetId::from(format!("{base} ({i})")))
            .find(|id| !self.contains(id))
            .unwrap_or(plain)
    }

    /// Union of channel names across every dataset, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self
            .datasets
            .values()
            .flat_map(|d| d.channels().iter().map(|c| c.name.as_str()))
            .collect();
        names.into_iter().map(String::from).collect()
    }

    /// Subset of a dataset whose rows satisfy every condition.
    pub fn parse_dataset(&self, id: &DatasetId, conditions: &[Condition]) -> Result<Dataset, TireError> {
        let dataset = self.get_dataset(id)?;
        let rows = dataset.rows_matching(conditions)?;
        debug!("Parsed '{id}': {} of {} rows match", rows.len(), dataset.len());
        dataset.select_rows(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Channel, DatasetMeta, QuantityKind, SignConvention, UnitSystem};
    use std::path::PathBuf;

    fn dataset(id: &str) -> Dataset {
        Dataset::new(
            DatasetId::from(id),
            PathBuf::from(format!("{id}.dat")),
            vec![
                Channel::new("CmdFZ", "N", QuantityKind::Force, vec![-445.0, -445.0, -667.0, f64::NAN]),
                Channel::new("FY", "N", QuantityKind::Force, vec![1.0, 2.0, 3.0, 4.0]),
            ],
            Some(UnitSystem::Metric),
            SignConvention::Sae,
            DatasetMeta::default(),
        )
        .unwrap()
    }

    #[test]
    fn ids_are_unique() {
        let mut m = DataManager::new();
        m.add_dataset(dataset("run")).unwrap();
        assert!(m.add_dataset(dataset("run")).is_err());
        assert_eq!(m.unique_id("run"), DatasetId::from("run (1)"));
        m.add_dataset(dataset("run (1)")).unwrap();
        assert_eq!(m.unique_id("run"), DatasetId::from("run (2)"));
        assert_eq!(m.unique_id("other"), DatasetId::from("other"));
    }

    #[test]
    fn list_keeps_insertion_order_after_rename_and_remove() {
        let mut m = DataManager::new();
        for id in ["b", "a", "c"] {
            m.add_dataset(dataset(id)).unwrap();
        }
        m.rename_dataset(&DatasetId::from("a"), DatasetId::from("z")).unwrap();
        m.remove_dataset(&DatasetId::from("b")).unwrap();
        assert_eq!(m.list_datasets(), vec![DatasetId::from("z"), DatasetId::from("c")]);
        assert_eq!(m.get_dataset(&DatasetId::from("z")).unwrap().id, DatasetId::from("z"));
        assert!(m.get_dataset(&DatasetId::from("a")).is_err());
    }

    #[test]
    fn handles_survive_replacement() {
        let mut m = DataManager::new();
        m.add_dataset(dataset("run")).unwrap();
        let before = m.get_dataset(&DatasetId::from("run")).unwrap();
        let mut changed = dataset("run");
        changed.sign_convention = SignConvention::Iso;
        m.replace_dataset(changed).unwrap();
        assert_eq!(before.sign_convention, SignConvention::Sae);
        assert_eq!(m.get_dataset(&DatasetId::from("run")).unwrap().sign_convention, SignConvention::Iso);
    }

    #[test]
    fn parse_selects_condition_rows() {
        let mut m = DataManager::new();
        m.add_dataset(dataset("run")).unwrap();
        let subset = m
            .parse_dataset(&DatasetId::from("run"), &[Condition::new("CmdFZ", vec![-445.0])])
            .unwrap();
        assert_eq!(subset.values("FY").unwrap(), &[1.0, 2.0]);
        assert_eq!(m.channel_names(), vec!["CmdFZ".to_string(), "FY".to_string()]);
    }
}
