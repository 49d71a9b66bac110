//! Record identity - prefixed ULIDs and import tag sanitizing

use std::fmt;
use ulid::Ulid;

/// Record type prefixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordPrefix {
    /// Measurement equipment
    Equipment,
    /// Calibration record
    Calibration,
    /// Budget / service cost record
    Budget,
}

impl RecordPrefix {
    /// Get the string representation of the prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordPrefix::Equipment => "EQ",
            RecordPrefix::Calibration => "CAL",
            RecordPrefix::Budget => "BDG",
        }
    }

    /// Generate a fresh prefixed id (e.g. "EQ-01HQ3K...")
    ///
    /// Imported equipment does not use this: its id is the sanitized
    /// spreadsheet tag, so re-imports land on the same record.
    pub fn new_id(&self) -> String {
        format!("{}-{}", self.as_str(), Ulid::new())
    }
}

impl fmt::Display for RecordPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sanitize a spreadsheet tag into a store-id-safe token.
///
/// Anything outside `[A-Za-z0-9-_]` becomes `_`, and the result is
/// uppercased so "av-101" and "AV-101" reconcile to the same record.
pub fn sanitize_tag(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_carries_prefix() {
        let id = RecordPrefix::Equipment.new_id();
        assert!(id.starts_with("EQ-"));
        assert_eq!(id.len(), 29); // EQ- (3) + ULID (26)

        let id = RecordPrefix::Calibration.new_id();
        assert!(id.starts_with("CAL-"));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = RecordPrefix::Budget.new_id();
        let b = RecordPrefix::Budget.new_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sanitize_tag_replaces_and_uppercases() {
        assert_eq!(sanitize_tag("av 101/b"), "AV_101_B");
        assert_eq!(sanitize_tag("  MAN-003  "), "MAN-003");
        assert_eq!(sanitize_tag("térmico"), "T_RMICO");
    }

    #[test]
    fn test_sanitize_tag_keeps_underscores_and_dashes() {
        assert_eq!(sanitize_tag("a_b-c"), "A_B-C");
    }
}
