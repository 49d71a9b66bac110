//! Type-B expanded uncertainty evaluation
//!
//! Combines the standard uncertainty stated on a reference certificate
//! (already expanded by its coverage factor) with the rectangular
//! contribution of the device resolution:
//!
//! ```text
//! u_standard   = u_s / k
//! u_resolution = r / √12
//! u_combined   = √(u_standard² + u_resolution²)
//! U            = u_combined · k
//! ```

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::entities::calibration::round4;

/// Default coverage factor (≈95% confidence)
pub const DEFAULT_COVERAGE_FACTOR: f64 = 2.0;

#[derive(Debug, Error, Diagnostic)]
pub enum UncertaintyError {
    #[error("coverage factor must be non-zero")]
    #[diagnostic(
        code(cmt::uncertainty::zero_coverage_factor),
        help("k divides the certificate uncertainty; the usual value is 2")
    )]
    ZeroCoverageFactor,
}

/// Which points receive a computed uncertainty value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyTo {
    /// One group, by id
    Group(String),
    /// Every point across every group
    AllGroups,
}

/// Inputs to the evaluation, as entered by the operator
#[derive(Debug, Clone, Copy)]
pub struct UncertaintyInputs {
    /// Expanded uncertainty from the reference certificate
    pub standard_uncertainty: f64,
    /// Device resolution (numeric value, see `Equipment::resolution_value`)
    pub resolution: f64,
    /// Coverage factor k
    pub coverage_factor: f64,
}

impl UncertaintyInputs {
    pub fn new(standard_uncertainty: f64, resolution: f64) -> Self {
        Self {
            standard_uncertainty,
            resolution,
            coverage_factor: DEFAULT_COVERAGE_FACTOR,
        }
    }

    pub fn with_coverage_factor(mut self, k: f64) -> Self {
        self.coverage_factor = k;
        self
    }

    /// Full breakdown of the evaluation, each term at reporting precision
    pub fn breakdown(&self) -> Result<UncertaintyBreakdown, UncertaintyError> {
        if self.coverage_factor == 0.0 {
            return Err(UncertaintyError::ZeroCoverageFactor);
        }
        let u_standard = self.standard_uncertainty / self.coverage_factor;
        let u_resolution = self.resolution / 12f64.sqrt();
        let u_combined = (u_standard.powi(2) + u_resolution.powi(2)).sqrt();
        Ok(UncertaintyBreakdown {
            u_standard: round4(u_standard),
            u_resolution: round4(u_resolution),
            u_combined: round4(u_combined),
            expanded: round4(u_combined * self.coverage_factor),
        })
    }

    /// The expanded uncertainty U applied to measurement points
    pub fn expanded(&self) -> Result<f64, UncertaintyError> {
        Ok(self.breakdown()?.expanded)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct UncertaintyBreakdown {
    pub u_standard: f64,
    pub u_resolution: f64,
    pub u_combined: f64,
    pub expanded: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_worked_example() {
        // u_s = 0.02, r = 0.01, k = 2
        let inputs = UncertaintyInputs::new(0.02, 0.01);
        let breakdown = inputs.breakdown().unwrap();

        assert_eq!(breakdown.u_standard, 0.01);
        assert_eq!(breakdown.u_resolution, 0.0029);
        assert_eq!(breakdown.u_combined, 0.0104);
        assert_eq!(breakdown.expanded, 0.0208);
        assert_eq!(inputs.expanded().unwrap(), 0.0208);
    }

    #[test]
    fn test_zero_resolution_keeps_certificate_value() {
        let inputs = UncertaintyInputs::new(0.05, 0.0);
        assert_eq!(inputs.expanded().unwrap(), 0.05);
    }

    #[test]
    fn test_zero_coverage_factor_rejected() {
        let err = UncertaintyInputs::new(0.02, 0.01)
            .with_coverage_factor(0.0)
            .expanded()
            .unwrap_err();
        assert!(matches!(err, UncertaintyError::ZeroCoverageFactor));
    }

    #[test]
    fn test_non_default_coverage_factor() {
        // k = 1: certificate value is already standard
        let inputs = UncertaintyInputs::new(0.02, 0.0).with_coverage_factor(1.0);
        assert_eq!(inputs.expanded().unwrap(), 0.02);
    }
}
