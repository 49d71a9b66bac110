//! Record persistence behind an injectable trait
//!
//! [`YamlStore`] is the production implementation, keeping one
//! `<id>.cmt.yaml` file per record in the project's collection
//! directories. [`MemoryStore`] backs tests and dry runs. Writes are
//! last-write-wins upserts; each editing session works on a private
//! in-memory copy.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::core::identity::RecordPrefix;
use crate::core::project::Project;
use crate::entities::{BudgetRecord, CalibrationRecord, Equipment};
use crate::yaml::diagnostics::YamlSyntaxError;

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] YamlSyntaxError),

    #[error("failed to serialize {id}")]
    Serialize {
        id: String,
        #[source]
        source: serde_yml::Error,
    },

    #[error("{collection} record not found: {id}")]
    #[diagnostic(code(cmt::store::not_found))]
    NotFound { collection: &'static str, id: String },
}

/// Persistence operations over the three collections. Upserts create or
/// replace by id; reads reflect the latest write within a process.
pub trait Store {
    fn list_equipment(&self) -> Result<Vec<Equipment>, StoreError>;
    fn get_equipment(&self, id: &str) -> Result<Option<Equipment>, StoreError>;
    fn upsert_equipment(&self, equipment: &Equipment) -> Result<(), StoreError>;
    fn delete_equipment(&self, id: &str) -> Result<(), StoreError>;
    fn delete_equipment_batch(&self, ids: &[String]) -> Result<(), StoreError>;

    /// Calibrations, newest first; optionally only one equipment's history
    fn list_calibrations(
        &self,
        equipment_id: Option<&str>,
    ) -> Result<Vec<CalibrationRecord>, StoreError>;
    fn get_calibration(&self, id: &str) -> Result<Option<CalibrationRecord>, StoreError>;
    fn upsert_calibration(&self, record: &CalibrationRecord) -> Result<(), StoreError>;
    fn delete_calibration(&self, id: &str) -> Result<(), StoreError>;

    /// Budgets, newest first
    fn list_budgets(&self) -> Result<Vec<BudgetRecord>, StoreError>;
    fn get_budget(&self, id: &str) -> Result<Option<BudgetRecord>, StoreError>;
    fn upsert_budget(&self, budget: &BudgetRecord) -> Result<(), StoreError>;
    fn delete_budget(&self, id: &str) -> Result<(), StoreError>;
}

/// One YAML file per record under the project tree
pub struct YamlStore {
    root: PathBuf,
}

impl YamlStore {
    pub fn new(project: &Project) -> Self {
        Self {
            root: project.root().to_path_buf(),
        }
    }

    fn dir(&self, prefix: RecordPrefix) -> PathBuf {
        self.root.join(Project::collection_directory(prefix))
    }

    fn record_path(&self, prefix: RecordPrefix, id: &str) -> PathBuf {
        self.dir(prefix).join(format!("{}.cmt.yaml", id))
    }

    fn read_record<T: DeserializeOwned + 'static>(path: &Path) -> Result<T, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yml::from_str(&content).map_err(|err| {
            let filename = path.to_string_lossy().into_owned();
            YamlSyntaxError::from_serde_error(&err, &content, &filename).into()
        })
    }

    fn write_record<T: Serialize>(
        &self,
        prefix: RecordPrefix,
        id: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let dir = self.dir(prefix);
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|source| StoreError::Write {
                path: dir.clone(),
                source,
            })?;
        }

        let yaml = serde_yml::to_string(value).map_err(|source| StoreError::Serialize {
            id: id.to_string(),
            source,
        })?;
        let path = self.record_path(prefix, id);
        std::fs::write(&path, yaml).map_err(|source| StoreError::Write { path, source })
    }

    fn load_all<T: DeserializeOwned + 'static>(&self, prefix: RecordPrefix) -> Result<Vec<T>, StoreError> {
        let dir = self.dir(prefix);
        let mut records = Vec::new();
        if !dir.exists() {
            return Ok(records);
        }
        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(&dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().to_string_lossy().ends_with(".cmt.yaml"))
            .map(|e| e.path().to_path_buf())
            .collect();
        paths.sort();
        for path in paths {
            records.push(Self::read_record(&path)?);
        }
        Ok(records)
    }

    fn load_one<T: DeserializeOwned + 'static>(
        &self,
        prefix: RecordPrefix,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let path = self.record_path(prefix, id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Self::read_record(&path)?))
    }

    fn remove(
        &self,
        prefix: RecordPrefix,
        collection: &'static str,
        id: &str,
    ) -> Result<(), StoreError> {
        let path = self.record_path(prefix, id);
        if !path.exists() {
            return Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            });
        }
        std::fs::remove_file(&path).map_err(|source| StoreError::Write { path, source })
    }
}

impl Store for YamlStore {
    fn list_equipment(&self) -> Result<Vec<Equipment>, StoreError> {
        let mut list: Vec<Equipment> = self.load_all(RecordPrefix::Equipment)?;
        list.sort_by(|a, b| a.tag.cmp(&b.tag));
        Ok(list)
    }

    fn get_equipment(&self, id: &str) -> Result<Option<Equipment>, StoreError> {
        self.load_one(RecordPrefix::Equipment, id)
    }

    fn upsert_equipment(&self, equipment: &Equipment) -> Result<(), StoreError> {
        self.write_record(RecordPrefix::Equipment, &equipment.id, equipment)
    }

    fn delete_equipment(&self, id: &str) -> Result<(), StoreError> {
        self.remove(RecordPrefix::Equipment, "equipment", id)
    }

    fn delete_equipment_batch(&self, ids: &[String]) -> Result<(), StoreError> {
        for id in ids {
            self.remove(RecordPrefix::Equipment, "equipment", id)?;
        }
        Ok(())
    }

    fn list_calibrations(
        &self,
        equipment_id: Option<&str>,
    ) -> Result<Vec<CalibrationRecord>, StoreError> {
        let list: Vec<CalibrationRecord> = self.load_all(RecordPrefix::Calibration)?;
        let mut list: Vec<CalibrationRecord> = list
            .into_iter()
            .filter(|r| equipment_id.map_or(true, |id| r.equipment_id == id))
            .map(CalibrationRecord::migrated)
            .collect();
        list.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(list)
    }

    fn get_calibration(&self, id: &str) -> Result<Option<CalibrationRecord>, StoreError> {
        Ok(self
            .load_one::<CalibrationRecord>(RecordPrefix::Calibration, id)?
            .map(CalibrationRecord::migrated))
    }

    fn upsert_calibration(&self, record: &CalibrationRecord) -> Result<(), StoreError> {
        self.write_record(RecordPrefix::Calibration, &record.id, record)
    }

    fn delete_calibration(&self, id: &str) -> Result<(), StoreError> {
        self.remove(RecordPrefix::Calibration, "calibration", id)
    }

    fn list_budgets(&self) -> Result<Vec<BudgetRecord>, StoreError> {
        let list: Vec<BudgetRecord> = self.load_all(RecordPrefix::Budget)?;
        let mut list: Vec<BudgetRecord> = list.into_iter().map(BudgetRecord::migrated).collect();
        list.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(list)
    }

    fn get_budget(&self, id: &str) -> Result<Option<BudgetRecord>, StoreError> {
        Ok(self
            .load_one::<BudgetRecord>(RecordPrefix::Budget, id)?
            .map(BudgetRecord::migrated))
    }

    fn upsert_budget(&self, budget: &BudgetRecord) -> Result<(), StoreError> {
        self.write_record(RecordPrefix::Budget, &budget.id, budget)
    }

    fn delete_budget(&self, id: &str) -> Result<(), StoreError> {
        self.remove(RecordPrefix::Budget, "budget", id)
    }
}

/// In-memory store for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    equipment: RefCell<BTreeMap<String, Equipment>>,
    calibrations: RefCell<BTreeMap<String, CalibrationRecord>>,
    budgets: RefCell<BTreeMap<String, BudgetRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn list_equipment(&self) -> Result<Vec<Equipment>, StoreError> {
        let mut list: Vec<Equipment> = self.equipment.borrow().values().cloned().collect();
        list.sort_by(|a, b| a.tag.cmp(&b.tag));
        Ok(list)
    }

    fn get_equipment(&self, id: &str) -> Result<Option<Equipment>, StoreError> {
        Ok(self.equipment.borrow().get(id).cloned())
    }

    fn upsert_equipment(&self, equipment: &Equipment) -> Result<(), StoreError> {
        self.equipment
            .borrow_mut()
            .insert(equipment.id.clone(), equipment.clone());
        Ok(())
    }

    fn delete_equipment(&self, id: &str) -> Result<(), StoreError> {
        self.equipment
            .borrow_mut()
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound {
                collection: "equipment",
                id: id.to_string(),
            })
    }

    fn delete_equipment_batch(&self, ids: &[String]) -> Result<(), StoreError> {
        for id in ids {
            self.delete_equipment(id)?;
        }
        Ok(())
    }

    fn list_calibrations(
        &self,
        equipment_id: Option<&str>,
    ) -> Result<Vec<CalibrationRecord>, StoreError> {
        let mut list: Vec<CalibrationRecord> = self
            .calibrations
            .borrow()
            .values()
            .filter(|r| equipment_id.map_or(true, |id| r.equipment_id == id))
            .cloned()
            .map(CalibrationRecord::migrated)
            .collect();
        list.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(list)
    }

    fn get_calibration(&self, id: &str) -> Result<Option<CalibrationRecord>, StoreError> {
        Ok(self
            .calibrations
            .borrow()
            .get(id)
            .cloned()
            .map(CalibrationRecord::migrated))
    }

    fn upsert_calibration(&self, record: &CalibrationRecord) -> Result<(), StoreError> {
        self.calibrations
            .borrow_mut()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn delete_calibration(&self, id: &str) -> Result<(), StoreError> {
        self.calibrations
            .borrow_mut()
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound {
                collection: "calibration",
                id: id.to_string(),
            })
    }

    fn list_budgets(&self) -> Result<Vec<BudgetRecord>, StoreError> {
        let mut list: Vec<BudgetRecord> = self
            .budgets
            .borrow()
            .values()
            .cloned()
            .map(BudgetRecord::migrated)
            .collect();
        list.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(list)
    }

    fn get_budget(&self, id: &str) -> Result<Option<BudgetRecord>, StoreError> {
        Ok(self
            .budgets
            .borrow()
            .get(id)
            .cloned()
            .map(BudgetRecord::migrated))
    }

    fn upsert_budget(&self, budget: &BudgetRecord) -> Result<(), StoreError> {
        self.budgets
            .borrow_mut()
            .insert(budget.id.clone(), budget.clone());
        Ok(())
    }

    fn delete_budget(&self, id: &str) -> Result<(), StoreError> {
        self.budgets
            .borrow_mut()
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound {
                collection: "budget",
                id: id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::calibration::{PointUpdate, LEGACY_GROUP_ID};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn yaml_store() -> (tempfile::TempDir, YamlStore) {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        let store = YamlStore::new(&project);
        (tmp, store)
    }

    #[test]
    fn test_equipment_upsert_get_delete() {
        let (_tmp, store) = yaml_store();
        let eq = Equipment::new("MAN-003", "Manômetro", date(2026, 1, 1));

        store.upsert_equipment(&eq).unwrap();
        let loaded = store.get_equipment(&eq.id).unwrap().unwrap();
        assert_eq!(loaded.tag, "MAN-003");

        store.delete_equipment(&eq.id).unwrap();
        assert!(store.get_equipment(&eq.id).unwrap().is_none());
        assert!(matches!(
            store.delete_equipment(&eq.id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_calibration_round_trip_preserves_groups_and_errors() {
        let (_tmp, store) = yaml_store();

        let record = CalibrationRecord::new("EQ-1", "Técnico", date(2025, 3, 10))
            .add_group_named("Tração")
            .add_group_named("Compressão");
        let g1 = record.measurement_groups[0].id.clone();
        let record = record.add_point(&g1).unwrap();
        let p1 = record.measurement_groups[0].measurements[0].id.clone();
        let record = record
            .update_point(
                &g1,
                &p1,
                PointUpdate {
                    reference_value: Some(10.0),
                    measured_value: Some(10.012),
                    uncertainty: Some(0.02),
                },
            )
            .unwrap()
            .with_regenerated_flat_list();

        store.upsert_calibration(&record).unwrap();
        let loaded = store.get_calibration(&record.id).unwrap().unwrap();

        assert_eq!(loaded.measurement_groups.len(), 2);
        assert_eq!(loaded.measurement_groups[0].name, "Tração");
        assert_eq!(loaded.measurement_groups[1].name, "Compressão");
        let point = &loaded.measurement_groups[0].measurements[0];
        assert_eq!(point.reference_value, 10.0);
        assert_eq!(point.measured_value, 10.012);
        assert_eq!(point.error, 0.012);
        assert_eq!(point.uncertainty, 0.02);
    }

    #[test]
    fn test_legacy_calibration_file_gains_synthetic_group() {
        let (tmp, store) = yaml_store();

        // a file written before test groups existed
        let yaml = "
id: CAL-OLD
equipment_id: MAN-003
date: 2023-08-01
technician: Ana
temperature: 21.0
humidity: 48.0
measurements:
  - id: p1
    reference_value: 0.0
    measured_value: 0.01
    error: 0.01
  - id: p2
    reference_value: 5.0
    measured_value: 5.0
    error: 0.0
result: Aprovado
created: 2023-08-01T12:00:00Z
";
        std::fs::write(
            tmp.path().join("calibrations/CAL-OLD.cmt.yaml"),
            yaml.trim_start(),
        )
        .unwrap();

        let loaded = store.get_calibration("CAL-OLD").unwrap().unwrap();
        assert_eq!(loaded.measurement_groups.len(), 1);
        assert_eq!(loaded.measurement_groups[0].id, LEGACY_GROUP_ID);
        assert_eq!(loaded.measurement_groups[0].measurements.len(), 2);
        assert_eq!(loaded.measurements.len(), 2);
    }

    #[test]
    fn test_calibrations_listed_newest_first() {
        let store = MemoryStore::new();
        let older = CalibrationRecord::new("EQ-1", "Ana", date(2024, 5, 1));
        let newer = CalibrationRecord::new("EQ-1", "Ana", date(2025, 2, 1));
        let other = CalibrationRecord::new("EQ-2", "Ana", date(2025, 6, 1));

        store.upsert_calibration(&older).unwrap();
        store.upsert_calibration(&newer).unwrap();
        store.upsert_calibration(&other).unwrap();

        let all = store.list_calibrations(None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].date, date(2025, 6, 1));
        assert_eq!(all[2].date, date(2024, 5, 1));

        let for_eq1 = store.list_calibrations(Some("EQ-1")).unwrap();
        assert_eq!(for_eq1.len(), 2);
        assert_eq!(for_eq1[0].id, newer.id);
    }

    #[test]
    fn test_unparsable_file_is_reported_not_skipped() {
        let (tmp, store) = yaml_store();
        std::fs::write(
            tmp.path().join("equipment/BAD.cmt.yaml"),
            "tag: [unclosed",
        )
        .unwrap();

        assert!(store.list_equipment().is_err());
    }
}
