//! Calibration record entity - measurement points, test groups and the
//! record-level aggregation feeding the acceptance verdict

use chrono::{DateTime, NaiveDate, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::core::identity::RecordPrefix;
use crate::core::uncertainty::ApplyTo;

/// Fixed id of the group materialized from a pre-group flat record
pub const LEGACY_GROUP_ID: &str = "legacy";

/// Name given to the group materialized from a pre-group flat record
pub const LEGACY_GROUP_NAME: &str = "Dados de Medição";

/// Round to 4 decimal places, the reporting precision used everywhere
/// in this crate (errors, uncertainties, combined values).
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Errors from group/point mutations. Every mutation is pure: on `Err`
/// the input record is returned untouched to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum CalibrationError {
    #[error("at least one measurement group must remain")]
    #[diagnostic(
        code(cmt::calibration::last_group),
        help("a calibration record always carries one group; rename it instead of removing it")
    )]
    LastGroup,

    #[error("unknown measurement group: {0}")]
    #[diagnostic(code(cmt::calibration::unknown_group))]
    UnknownGroup(String),

    #[error("unknown measurement point: {0}")]
    #[diagnostic(code(cmt::calibration::unknown_point))]
    UnknownPoint(String),
}

/// Final verdict of a calibration. Always operator-assigned; the computed
/// worst-case combined value only informs the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CalibrationResult {
    #[default]
    #[serde(rename = "Aprovado")]
    Approved,
    #[serde(rename = "Aprovado com Restrições")]
    ApprovedWithRestrictions,
    #[serde(rename = "Reprovado")]
    Rejected,
}

impl std::fmt::Display for CalibrationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationResult::Approved => write!(f, "Aprovado"),
            CalibrationResult::ApprovedWithRestrictions => write!(f, "Aprovado com Restrições"),
            CalibrationResult::Rejected => write!(f, "Reprovado"),
        }
    }
}

impl std::str::FromStr for CalibrationResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aprovado" | "approved" => Ok(CalibrationResult::Approved),
            "aprovado com restrições" | "aprovado com restricoes" | "conditional" => {
                Ok(CalibrationResult::ApprovedWithRestrictions)
            }
            "reprovado" | "rejected" => Ok(CalibrationResult::Rejected),
            _ => Err(format!("Unknown calibration result: {}", s)),
        }
    }
}

/// One reference/measured pair with its derived error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementPoint {
    /// Diff key only, no semantics beyond identity in a list
    pub id: String,

    pub reference_value: f64,

    pub measured_value: f64,

    /// Always `round4(measured - reference)`, never edited directly
    pub error: f64,

    /// Expanded uncertainty applied to this point
    #[serde(default)]
    pub uncertainty: f64,
}

impl MeasurementPoint {
    /// New zero-initialized point
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            reference_value: 0.0,
            measured_value: 0.0,
            error: 0.0,
            uncertainty: 0.0,
        }
    }

    pub fn set_reference(&mut self, value: f64) {
        self.reference_value = value;
        self.recompute_error();
    }

    pub fn set_measured(&mut self, value: f64) {
        self.measured_value = value;
        self.recompute_error();
    }

    /// Uncertainty never feeds back into the error
    pub fn set_uncertainty(&mut self, value: f64) {
        self.uncertainty = value;
    }

    fn recompute_error(&mut self) {
        self.error = round4(self.measured_value - self.reference_value);
    }

    /// Combined indicator `√(error² + uncertainty²)`, the quantity judged
    /// against the (free-text) acceptance criterion by the reviewer.
    pub fn combined_error(&self) -> f64 {
        round4((self.error.powi(2) + self.uncertainty.powi(2)).sqrt())
    }
}

impl Default for MeasurementPoint {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial update of a point; only the given fields are touched
#[derive(Debug, Clone, Copy, Default)]
pub struct PointUpdate {
    pub reference_value: Option<f64>,
    pub measured_value: Option<f64>,
    pub uncertainty: Option<f64>,
}

/// A named test set ("Tração", "Compressão", ...) within a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub measurements: Vec<MeasurementPoint>,
}

impl MeasurementGroup {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            name: name.into(),
            measurements: Vec::new(),
        }
    }
}

fn default_temperature() -> f64 {
    20.0
}

fn default_humidity() -> f64 {
    50.0
}

/// Record-level maxima and the worst-case combined value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationSummary {
    pub max_error: f64,
    pub max_uncertainty: f64,
    pub worst_case_combined: f64,
}

/// Calibration record entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub id: String,

    /// Owning equipment (store id)
    pub equipment_id: String,

    pub date: NaiveDate,

    pub technician: String,

    /// Ambient temperature in °C
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Relative humidity in %
    #[serde(default = "default_humidity")]
    pub humidity: f64,

    /// Reference standard used (e.g. "Bloco Padrão #123")
    #[serde(default)]
    pub standard_used: String,

    #[serde(default)]
    pub measurement_groups: Vec<MeasurementGroup>,

    /// Flat view of all points, regenerated on every save. Files written
    /// before test groups existed carry only this list.
    #[serde(default)]
    pub measurements: Vec<MeasurementPoint>,

    #[serde(default)]
    pub result: CalibrationResult,

    #[serde(default)]
    pub notes: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<String>,

    pub created: DateTime<Utc>,
}

impl CalibrationRecord {
    /// New record with no groups yet; callers seed groups right after
    /// (see `CalibrationSession::start`).
    pub fn new(equipment_id: impl Into<String>, technician: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: RecordPrefix::Calibration.new_id(),
            equipment_id: equipment_id.into(),
            date,
            technician: technician.into(),
            temperature: 20.0,
            humidity: 50.0,
            standard_used: String::new(),
            measurement_groups: Vec::new(),
            measurements: Vec::new(),
            result: CalibrationResult::Approved,
            notes: String::new(),
            ai_analysis: None,
            created: Utc::now(),
        }
    }

    /// Materialize one synthetic group from the flat list when the record
    /// predates test groups. Idempotent; a record with groups is returned
    /// unchanged.
    pub fn migrated(mut self) -> Self {
        if self.measurement_groups.is_empty() {
            self.measurement_groups.push(MeasurementGroup {
                id: LEGACY_GROUP_ID.to_string(),
                name: LEGACY_GROUP_NAME.to_string(),
                measurements: self.measurements.clone(),
            });
        }
        self
    }

    /// Regenerate the flat compatibility list from the groups
    pub fn with_regenerated_flat_list(mut self) -> Self {
        self.measurements = self.flattened();
        self
    }

    /// All points across all groups, in group order
    pub fn flattened(&self) -> Vec<MeasurementPoint> {
        self.measurement_groups
            .iter()
            .flat_map(|g| g.measurements.iter().cloned())
            .collect()
    }

    /// `max(|error|)` over all points, 0 when there are none
    pub fn max_error(&self) -> f64 {
        self.measurement_groups
            .iter()
            .flat_map(|g| &g.measurements)
            .fold(0.0, |max, m| f64::max(max, m.error.abs()))
    }

    /// `max(uncertainty)` over all points, 0 when there are none
    pub fn max_uncertainty(&self) -> f64 {
        self.measurement_groups
            .iter()
            .flat_map(|g| &g.measurements)
            .fold(0.0, |max, m| f64::max(max, m.uncertainty))
    }

    /// Worst-case combined value shown next to the verdict. The verdict
    /// itself stays operator-assigned.
    pub fn summary(&self) -> CalibrationSummary {
        let max_error = self.max_error();
        let max_uncertainty = self.max_uncertainty();
        CalibrationSummary {
            max_error,
            max_uncertainty,
            worst_case_combined: round4((max_error.powi(2) + max_uncertainty.powi(2)).sqrt()),
        }
    }

    /// Append a group auto-named "Teste N"
    pub fn add_group(&self) -> Self {
        self.add_group_named(format!("Teste {}", self.measurement_groups.len() + 1))
    }

    pub fn add_group_named(&self, name: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.measurement_groups.push(MeasurementGroup::named(name));
        next
    }

    pub fn rename_group(&self, group_id: &str, name: &str) -> Result<Self, CalibrationError> {
        let mut next = self.clone();
        let group = next
            .measurement_groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| CalibrationError::UnknownGroup(group_id.to_string()))?;
        group.name = name.to_string();
        Ok(next)
    }

    pub fn remove_group(&self, group_id: &str) -> Result<Self, CalibrationError> {
        if self.measurement_groups.len() <= 1 {
            return Err(CalibrationError::LastGroup);
        }
        if !self.measurement_groups.iter().any(|g| g.id == group_id) {
            return Err(CalibrationError::UnknownGroup(group_id.to_string()));
        }
        let mut next = self.clone();
        next.measurement_groups.retain(|g| g.id != group_id);
        Ok(next)
    }

    /// Append a zero-initialized point to a group
    pub fn add_point(&self, group_id: &str) -> Result<Self, CalibrationError> {
        let mut next = self.clone();
        let group = next
            .measurement_groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| CalibrationError::UnknownGroup(group_id.to_string()))?;
        group.measurements.push(MeasurementPoint::new());
        Ok(next)
    }

    pub fn remove_point(&self, group_id: &str, point_id: &str) -> Result<Self, CalibrationError> {
        let mut next = self.clone();
        let group = next
            .measurement_groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| CalibrationError::UnknownGroup(group_id.to_string()))?;
        if !group.measurements.iter().any(|m| m.id == point_id) {
            return Err(CalibrationError::UnknownPoint(point_id.to_string()));
        }
        group.measurements.retain(|m| m.id != point_id);
        Ok(next)
    }

    /// Apply a partial update to a point. Reference/measured changes
    /// recompute the error; an uncertainty change never does.
    pub fn update_point(
        &self,
        group_id: &str,
        point_id: &str,
        update: PointUpdate,
    ) -> Result<Self, CalibrationError> {
        let mut next = self.clone();
        let group = next
            .measurement_groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| CalibrationError::UnknownGroup(group_id.to_string()))?;
        let point = group
            .measurements
            .iter_mut()
            .find(|m| m.id == point_id)
            .ok_or_else(|| CalibrationError::UnknownPoint(point_id.to_string()))?;

        if let Some(v) = update.reference_value {
            point.set_reference(v);
        }
        if let Some(v) = update.measured_value {
            point.set_measured(v);
        }
        if let Some(v) = update.uncertainty {
            point.set_uncertainty(v);
        }
        Ok(next)
    }

    /// Overwrite the uncertainty of every point in the target group(s).
    /// There is no per-point override once applied.
    pub fn apply_uncertainty(&self, value: f64, target: &ApplyTo) -> Result<Self, CalibrationError> {
        if let ApplyTo::Group(id) = target {
            if !self.measurement_groups.iter().any(|g| &g.id == id) {
                return Err(CalibrationError::UnknownGroup(id.clone()));
            }
        }
        let mut next = self.clone();
        for group in &mut next.measurement_groups {
            let selected = match target {
                ApplyTo::AllGroups => true,
                ApplyTo::Group(id) => &group.id == id,
            };
            if selected {
                for point in &mut group.measurements {
                    point.set_uncertainty(value);
                }
            }
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record_with_one_group() -> CalibrationRecord {
        CalibrationRecord::new("EQ-1", "Técnico", date(2025, 3, 10)).add_group_named("Tração")
    }

    #[test]
    fn test_error_recomputed_from_values() {
        let mut point = MeasurementPoint::new();
        point.set_reference(10.0);
        point.set_measured(10.0123456);
        assert_eq!(point.error, 0.0123);

        point.set_reference(10.01);
        assert_eq!(point.error, 0.0023);
    }

    #[test]
    fn test_uncertainty_change_leaves_error_alone() {
        let mut point = MeasurementPoint::new();
        point.set_reference(5.0);
        point.set_measured(5.2);
        let error_before = point.error;

        point.set_uncertainty(0.33);
        assert_eq!(point.error, error_before);
    }

    #[test]
    fn test_combined_error_bounds() {
        let mut point = MeasurementPoint::new();
        point.set_measured(0.03);
        point.set_uncertainty(0.04);

        let combined = point.combined_error();
        assert_eq!(combined, 0.05);
        assert!(combined >= point.error.abs());
        assert!(combined >= point.uncertainty);
    }

    #[test]
    fn test_add_group_auto_numbering() {
        let record = record_with_one_group().add_group();
        assert_eq!(record.measurement_groups.len(), 2);
        assert_eq!(record.measurement_groups[1].name, "Teste 2");
    }

    #[test]
    fn test_remove_last_group_rejected_and_record_unchanged() {
        let record = record_with_one_group();
        let group_id = record.measurement_groups[0].id.clone();

        let err = record.remove_group(&group_id).unwrap_err();
        assert!(matches!(err, CalibrationError::LastGroup));
        // the input is untouched
        assert_eq!(record.measurement_groups.len(), 1);
        assert_eq!(record.measurement_groups[0].name, "Tração");
    }

    #[test]
    fn test_remove_group() {
        let record = record_with_one_group().add_group_named("Compressão");
        let second = record.measurement_groups[1].id.clone();

        let next = record.remove_group(&second).unwrap();
        assert_eq!(next.measurement_groups.len(), 1);
        assert_eq!(next.measurement_groups[0].name, "Tração");
    }

    #[test]
    fn test_unknown_group_errors() {
        let record = record_with_one_group();
        assert!(matches!(
            record.add_point("nope"),
            Err(CalibrationError::UnknownGroup(_))
        ));
        assert!(matches!(
            record.rename_group("nope", "x"),
            Err(CalibrationError::UnknownGroup(_))
        ));
    }

    #[test]
    fn test_point_lifecycle() {
        let record = record_with_one_group();
        let group_id = record.measurement_groups[0].id.clone();

        let record = record.add_point(&group_id).unwrap();
        let point_id = record.measurement_groups[0].measurements[0].id.clone();

        let record = record
            .update_point(
                &group_id,
                &point_id,
                PointUpdate {
                    reference_value: Some(100.0),
                    measured_value: Some(100.05),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(record.measurement_groups[0].measurements[0].error, 0.05);

        let record = record.remove_point(&group_id, &point_id).unwrap();
        assert!(record.measurement_groups[0].measurements.is_empty());
    }

    #[test]
    fn test_summary_over_all_groups() {
        let record = record_with_one_group().add_group_named("Compressão");
        let g1 = record.measurement_groups[0].id.clone();
        let g2 = record.measurement_groups[1].id.clone();

        let record = record.add_point(&g1).unwrap().add_point(&g2).unwrap();
        let p1 = record.measurement_groups[0].measurements[0].id.clone();
        let p2 = record.measurement_groups[1].measurements[0].id.clone();

        let record = record
            .update_point(
                &g1,
                &p1,
                PointUpdate {
                    measured_value: Some(-0.03),
                    uncertainty: Some(0.01),
                    ..Default::default()
                },
            )
            .unwrap()
            .update_point(
                &g2,
                &p2,
                PointUpdate {
                    measured_value: Some(0.02),
                    uncertainty: Some(0.04),
                    ..Default::default()
                },
            )
            .unwrap();

        let summary = record.summary();
        assert_eq!(summary.max_error, 0.03);
        assert_eq!(summary.max_uncertainty, 0.04);
        assert_eq!(summary.worst_case_combined, 0.05);
    }

    #[test]
    fn test_summary_of_empty_record_is_zero() {
        let summary = record_with_one_group().summary();
        assert_eq!(summary.max_error, 0.0);
        assert_eq!(summary.max_uncertainty, 0.0);
        assert_eq!(summary.worst_case_combined, 0.0);
    }

    #[test]
    fn test_apply_uncertainty_to_one_group() {
        let record = record_with_one_group().add_group_named("Compressão");
        let g1 = record.measurement_groups[0].id.clone();
        let g2 = record.measurement_groups[1].id.clone();
        let record = record.add_point(&g1).unwrap().add_point(&g2).unwrap();

        let next = record
            .apply_uncertainty(0.0208, &ApplyTo::Group(g1.clone()))
            .unwrap();
        assert_eq!(next.measurement_groups[0].measurements[0].uncertainty, 0.0208);
        assert_eq!(next.measurement_groups[1].measurements[0].uncertainty, 0.0);

        let next = next.apply_uncertainty(0.01, &ApplyTo::AllGroups).unwrap();
        assert_eq!(next.measurement_groups[0].measurements[0].uncertainty, 0.01);
        assert_eq!(next.measurement_groups[1].measurements[0].uncertainty, 0.01);
    }

    #[test]
    fn test_apply_uncertainty_unknown_group() {
        let record = record_with_one_group();
        assert!(matches!(
            record.apply_uncertainty(0.01, &ApplyTo::Group("nope".into())),
            Err(CalibrationError::UnknownGroup(_))
        ));
    }

    #[test]
    fn test_migration_materializes_exactly_one_group() {
        let mut legacy = CalibrationRecord::new("EQ-1", "Técnico", date(2024, 1, 5));
        let mut p = MeasurementPoint::new();
        p.set_reference(1.0);
        p.set_measured(1.1);
        legacy.measurements = vec![p.clone(), MeasurementPoint::new()];

        let migrated = legacy.migrated();
        assert_eq!(migrated.measurement_groups.len(), 1);
        let group = &migrated.measurement_groups[0];
        assert_eq!(group.id, LEGACY_GROUP_ID);
        assert_eq!(group.name, LEGACY_GROUP_NAME);
        assert_eq!(group.measurements.len(), 2);
        assert_eq!(group.measurements[0], p);

        // no duplication on a second pass
        let again = migrated.migrated();
        assert_eq!(again.measurement_groups.len(), 1);
        assert_eq!(again.measurement_groups[0].measurements.len(), 2);
    }

    #[test]
    fn test_flat_list_regeneration() {
        let record = record_with_one_group().add_group_named("Compressão");
        let g1 = record.measurement_groups[0].id.clone();
        let g2 = record.measurement_groups[1].id.clone();
        let record = record.add_point(&g1).unwrap().add_point(&g2).unwrap();

        let saved = record.clone().with_regenerated_flat_list();
        assert_eq!(saved.measurements.len(), 2);
        assert_eq!(saved.measurements[0].id, record.measurement_groups[0].measurements[0].id);
        assert_eq!(saved.measurements[1].id, record.measurement_groups[1].measurements[0].id);
    }

    #[test]
    fn test_result_strings_round_trip() {
        let yaml = serde_yml::to_string(&CalibrationResult::ApprovedWithRestrictions).unwrap();
        assert_eq!(yaml.trim(), "Aprovado com Restrições");
        let back: CalibrationResult = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(back, CalibrationResult::ApprovedWithRestrictions);

        assert!(serde_yml::from_str::<CalibrationResult>("Emprestado").is_err());
    }
}
