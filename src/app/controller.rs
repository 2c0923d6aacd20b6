//! Outward-facing mutation entry points over the shared dataset store.
//!
//! Updates of a stored dataset hold the write lock from read to swap. Readers keep
//! the `Arc` they were handed, so they never see a half-converted table.

use std::path::PathBuf;
use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info};
use rayon::prelude::*;

use crate::convert::{
    CmdChannelGenerator, CommandOptions, ConventionConverter, ConversionTable, SignTable, UnitSystemConverter,
    unit_label,
};
use crate::data::{DataManager, SharedDataManager};
use crate::domain::{Condition, Dataset, DatasetId, SignConvention, UnitSystem};
use crate::error::TireError;
use crate::io::import_file;

#[derive(Debug, Clone)]
pub struct DataController {
    manager: SharedDataManager,
    units: UnitSystemConverter,
    convention: ConventionConverter,
    commands: CmdChannelGenerator,
}

impl DataController {
    pub fn new(manager: SharedDataManager, options: CommandOptions) -> Self {
        let signs = SignTable::shared();
        Self {
            manager,
            units: UnitSystemConverter::new(ConversionTable::shared()),
            convention: ConventionConverter::new(Arc::clone(&signs)),
            commands: CmdChannelGenerator::new(ConventionConverter::new(signs), options),
        }
    }

    pub fn manager(&self) -> &SharedDataManager {
        &self.manager
    }

    pub fn get_dataset(&self, id: &DatasetId) -> Result<Arc<Dataset>, TireError> {
        self.read()?.get_dataset(id)
    }

    pub fn list_datasets(&self) -> Result<Vec<DatasetId>, TireError> {
        Ok(self.read()?.list_datasets())
    }

    /// Import every file, then insert them all. A single bad file aborts the whole
    /// batch before anything is stored.
    ///
    /// Datasets with a USCS or Metric unit system get their command channels here.
    pub fn import_data(&self, paths: &[PathBuf]) -> Result<Vec<DatasetId>, TireError> {
        let parsed = paths
            .par_iter()
            .map(|p| {
                let ds = import_file(p)?;
                match ds.unit_system {
                    Some(UnitSystem::Uscs | UnitSystem::Metric) => self.commands.with_command_channels(&ds),
                    _ => {
                        debug!("'{}': command channels deferred until a unit system is set", ds.id);
                        Ok(ds)
                    }
                }
            })
            .collect::<Result<Vec<_>, TireError>>()?;

        let mut manager = self.write()?;
        let mut ids = Vec::with_capacity(parsed.len());
        for mut ds in parsed {
            let id = manager.unique_id(ds.id.as_str());
            if id != ds.id {
                debug!("Dataset id '{}' taken; stored as '{id}'", ds.id);
                ds.meta.name = id.to_string();
                ds.id = id.clone();
            }
            manager.add_dataset(ds)?;
            ids.push(id);
        }
        info!("Imported {} dataset(s)", ids.len());
        Ok(ids)
    }

    pub fn remove_dataset(&self, id: &DatasetId) -> Result<(), TireError> {
        self.write()?.remove_dataset(id).map(|_| ())
    }

    /// Row subset matching every condition; the stored dataset is unchanged.
    pub fn parse_dataset(&self, id: &DatasetId, conditions: &[Condition]) -> Result<Dataset, TireError> {
        self.read()?.parse_dataset(id, conditions)
    }

    /// Declare the unit system of a dataset imported without one. Empty unit labels
    /// are filled in from the system.
    pub fn assign_unit_system(&self, id: &DatasetId, system: UnitSystem) -> Result<Arc<Dataset>, TireError> {
        self.update(id, |current| {
            if let Some(existing) = current.unit_system {
                return Err(TireError::validation(
                    Some(id),
                    format!("unit system is already {existing}; use a conversion instead"),
                ));
            }
            let mut ds = current.clone();
            ds.unit_system = Some(system);
            for ch in ds.channels_mut() {
                if ch.unit.is_empty() {
                    if let Some(label) = unit_label(ch.kind, system) {
                        ch.unit = label.to_string();
                    }
                }
            }
            info!("Assigned unit system {system} to '{id}'");
            Ok(ds)
        })
    }

    pub fn convert_units(&self, id: &DatasetId, to: UnitSystem) -> Result<Arc<Dataset>, TireError> {
        self.update(id, |current| self.units.convert_dataset(current, to))
    }

    pub fn convert_convention(&self, id: &DatasetId, to: SignConvention) -> Result<Arc<Dataset>, TireError> {
        self.update(id, |current| Ok(self.convention.convert_dataset_convention(current, to)))
    }

    /// Generate any missing command channels for a stored dataset.
    pub fn add_command_channels(&self, id: &DatasetId) -> Result<Arc<Dataset>, TireError> {
        self.update(id, |current| self.commands.with_command_channels(current))
    }

    pub fn rename_dataset(&self, id: &DatasetId, new_id: DatasetId) -> Result<(), TireError> {
        self.write()?.rename_dataset(id, new_id)
    }

    /// Channel names across every stored dataset.
    pub fn channel_names(&self) -> Result<Vec<String>, TireError> {
        Ok(self.read()?.channel_names())
    }

    /// Read, transform and swap under one write lock so concurrent updates of the
    /// same dataset apply in sequence.
    fn update<F>(&self, id: &DatasetId, f: F) -> Result<Arc<Dataset>, TireError>
    where
        F: FnOnce(&Dataset) -> Result<Dataset, TireError>,
    {
        let mut manager = self.write()?;
        let current = manager.get_dataset(id)?;
        let next = f(&current)?;
        manager.replace_dataset(next)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, DataManager>, TireError> {
        self.manager
            .read()
            .map_err(|_| TireError::validation(None, "dataset store is poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, DataManager>, TireError> {
        self.manager
            .write()
            .map_err(|_| TireError::validation(None, "dataset store is poisoned"))
    }
}
