//! Entity type definitions
//!
//! CMT manages three record types:
//!
//! - [`Equipment`] - measurement instruments under calibration control
//! - [`CalibrationRecord`] - test-group measurements with derived errors
//! - [`BudgetRecord`] - service costs linked to one or more equipments

pub mod budget;
pub mod calibration;
pub mod equipment;

pub use budget::{BudgetRecord, BudgetStatus, EquipmentLink, ServiceType};
pub use calibration::{
    CalibrationRecord, CalibrationResult, CalibrationSummary, MeasurementGroup, MeasurementPoint,
};
pub use equipment::{DueStatus, Equipment, EquipmentStatus};
