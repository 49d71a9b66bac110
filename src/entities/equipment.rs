//! Equipment entity - measurement instruments under calibration control

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::identity::RecordPrefix;

/// Lifecycle status of a piece of equipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EquipmentStatus {
    #[default]
    #[serde(rename = "Ativo")]
    Active,
    #[serde(rename = "Inativo")]
    Inactive,
    #[serde(rename = "Descartado")]
    Discarded,
}

impl std::fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EquipmentStatus::Active => write!(f, "Ativo"),
            EquipmentStatus::Inactive => write!(f, "Inativo"),
            EquipmentStatus::Discarded => write!(f, "Descartado"),
        }
    }
}

impl std::str::FromStr for EquipmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ativo" | "active" => Ok(EquipmentStatus::Active),
            "inativo" | "inactive" => Ok(EquipmentStatus::Inactive),
            "descartado" | "discarded" => Ok(EquipmentStatus::Discarded),
            _ => Err(format!("Unknown equipment status: {}", s)),
        }
    }
}

/// Where an active instrument stands against its next calibration date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueStatus {
    /// Next calibration date has passed (days overdue)
    Overdue(i64),
    /// Due within the 30-day warning window (days remaining)
    DueSoon(i64),
    /// More than 30 days of validity left
    Current,
}

/// Number of days ahead of the due date that counts as "due soon"
pub const DUE_SOON_WINDOW_DAYS: i64 = 30;

/// Equipment entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equipment {
    /// Stable store id. "EQ-<ULID>" for interactively created records,
    /// the sanitized tag for imported ones.
    pub id: String,

    /// Human-facing identification tag (not guaranteed unique)
    pub tag: String,

    /// Description / instrument name
    pub name: String,

    #[serde(default)]
    pub manufacturer: String,

    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub serial_number: String,

    /// Measuring range, free text (e.g. "0-500 kN")
    #[serde(default)]
    pub range: String,

    /// Resolution, free text; only the leading numeric token is parsed
    #[serde(default)]
    pub resolution: String,

    /// Acceptance criterion / accuracy class, free text, never machine-parsed
    #[serde(default)]
    pub accuracy: String,

    #[serde(default)]
    pub location: String,

    /// Calibration provider / laboratory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,

    /// Relief-valve opening pressure, carried verbatim from imports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_pressure: Option<String>,

    /// Relief-valve closing (blowdown) pressure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closing_pressure: Option<String>,

    #[serde(default)]
    pub status: EquipmentStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_calibration_date: Option<NaiveDate>,

    pub next_calibration_date: NaiveDate,

    /// Test-group names used to seed new calibration records
    /// (e.g. ["Tração", "Compressão"] for a universal testing machine)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_test_groups: Option<Vec<String>>,

    /// Creation timestamp
    pub created: DateTime<Utc>,
}

impl Equipment {
    /// Create a new active equipment record with a generated id
    pub fn new(
        tag: impl Into<String>,
        name: impl Into<String>,
        next_calibration_date: NaiveDate,
    ) -> Self {
        Self {
            id: RecordPrefix::Equipment.new_id(),
            tag: tag.into(),
            name: name.into(),
            manufacturer: String::new(),
            model: String::new(),
            serial_number: String::new(),
            range: String::new(),
            resolution: String::new(),
            accuracy: String::new(),
            location: String::new(),
            supplier: None,
            opening_pressure: None,
            closing_pressure: None,
            status: EquipmentStatus::Active,
            last_calibration_date: None,
            next_calibration_date,
            default_test_groups: None,
            created: Utc::now(),
        }
    }

    /// Numeric value of the resolution string, if one can be extracted
    /// ("0.01 mm" -> 0.01). Used to pre-fill the uncertainty calculator.
    pub fn resolution_value(&self) -> Option<f64> {
        parse_leading_number(&self.resolution)
    }

    /// Due status against `today`. Only active equipment is tracked;
    /// inactive and discarded instruments return `None`.
    pub fn due_status(&self, today: NaiveDate) -> Option<DueStatus> {
        if self.status != EquipmentStatus::Active {
            return None;
        }
        let days = (self.next_calibration_date - today).num_days();
        Some(if days < 0 {
            DueStatus::Overdue(-days)
        } else if days <= DUE_SOON_WINDOW_DAYS {
            DueStatus::DueSoon(days)
        } else {
            DueStatus::Current
        })
    }

    /// Case-insensitive substring search over the identifying fields
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.tag.to_lowercase().contains(&term)
            || self.name.to_lowercase().contains(&term)
            || self.serial_number.to_lowercase().contains(&term)
            || self.manufacturer.to_lowercase().contains(&term)
            || self.model.to_lowercase().contains(&term)
            || self
                .supplier
                .as_deref()
                .map(|s| s.to_lowercase().contains(&term))
                .unwrap_or(false)
    }
}

/// One calibration interval (a year) after the given date. Feb 29 rolls
/// over to Mar 1 of the following year.
pub fn one_year_after(date: NaiveDate) -> NaiveDate {
    date.with_year(date.year() + 1)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(date.year() + 1, 3, 1).unwrap())
}

/// Extract the first numeric token from a free-text string.
///
/// Scans for the first run of digits and dots, so "±0.5 %FE" yields 0.5
/// and "res. 0.01mm" yields 0.01.
pub fn parse_leading_number(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit() || c == '.')?;
    let token: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    token.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_leading_number() {
        assert_eq!(parse_leading_number("0.01 mm"), Some(0.01));
        assert_eq!(parse_leading_number("±0.5 %FE"), Some(0.5));
        assert_eq!(parse_leading_number("res. 1"), Some(1.0));
        assert_eq!(parse_leading_number("digital"), None);
        assert_eq!(parse_leading_number(""), None);
    }

    #[test]
    fn test_resolution_value_from_free_text() {
        let mut eq = Equipment::new("MAN-001", "Manômetro", date(2026, 1, 1));
        eq.resolution = "0.02 bar".to_string();
        assert_eq!(eq.resolution_value(), Some(0.02));
    }

    #[test]
    fn test_one_year_after() {
        assert_eq!(one_year_after(date(2025, 3, 15)), date(2026, 3, 15));
        assert_eq!(one_year_after(date(2024, 2, 29)), date(2025, 3, 1));
    }

    #[test]
    fn test_due_status_windows() {
        let mut eq = Equipment::new("T-1", "Termômetro", date(2025, 6, 30));
        let today = date(2025, 6, 1);
        assert_eq!(eq.due_status(today), Some(DueStatus::DueSoon(29)));

        eq.next_calibration_date = date(2025, 5, 20);
        assert_eq!(eq.due_status(today), Some(DueStatus::Overdue(12)));

        eq.next_calibration_date = date(2025, 12, 1);
        assert_eq!(eq.due_status(today), Some(DueStatus::Current));
    }

    #[test]
    fn test_due_status_ignores_inactive() {
        let mut eq = Equipment::new("T-1", "Termômetro", date(2020, 1, 1));
        eq.status = EquipmentStatus::Discarded;
        assert_eq!(eq.due_status(date(2025, 6, 1)), None);
    }

    #[test]
    fn test_search_covers_identifying_fields() {
        let mut eq = Equipment::new("AV-101", "Válvula de Alívio", date(2026, 1, 1));
        eq.manufacturer = "Ashcroft".to_string();
        eq.supplier = Some("Lab Cal".to_string());

        assert!(eq.matches_search("av-101"));
        assert!(eq.matches_search("válvula"));
        assert!(eq.matches_search("ashcroft"));
        assert!(eq.matches_search("lab cal"));
        assert!(!eq.matches_search("torquímetro"));
    }

    #[test]
    fn test_status_rejects_unknown_strings() {
        assert!("Emprestado".parse::<EquipmentStatus>().is_err());
        assert_eq!(
            "Ativo".parse::<EquipmentStatus>().unwrap(),
            EquipmentStatus::Active
        );
    }

    #[test]
    fn test_status_yaml_round_trip() {
        let yaml = serde_yml::to_string(&EquipmentStatus::Discarded).unwrap();
        assert_eq!(yaml.trim(), "Descartado");
        let back: EquipmentStatus = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(back, EquipmentStatus::Discarded);
    }
}
