//! YAML error diagnostics for hand-edited record files

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// YAML syntax error with source location, rendered by miette when a
/// record file (usually one edited by hand) fails to parse
#[derive(Debug, Error, Diagnostic)]
#[error("YAML syntax error")]
#[diagnostic(code(cmt::yaml::syntax))]
pub struct YamlSyntaxError {
    #[source_code]
    src: NamedSource<String>,

    #[label("{message}")]
    span: SourceSpan,

    #[help]
    help: Option<String>,

    /// The underlying error message
    message: String,
}

impl YamlSyntaxError {
    /// Create a syntax error from a serde_yml error
    pub fn from_serde_error(err: &serde_yml::Error, source: &str, filename: &str) -> Self {
        let (line, column) = err
            .location()
            .map(|loc| (loc.line(), loc.column()))
            .unwrap_or((1, 1));

        let offset = line_col_to_offset(source, line, column);
        let message = err.to_string();
        let help = generate_help(&message);

        Self {
            src: NamedSource::new(filename, source.to_string()),
            span: SourceSpan::from(offset..offset.saturating_add(1)),
            help,
            message,
        }
    }
}

/// Convert line/column to byte offset
fn line_col_to_offset(source: &str, line: usize, column: usize) -> usize {
    let mut offset = 0;
    let mut current_line = 1;

    for (i, ch) in source.char_indices() {
        if current_line == line {
            let line_start = i;
            let mut col = 1;
            for (j, c) in source[line_start..].char_indices() {
                if col == column {
                    return line_start + j;
                }
                if c == '\n' {
                    break;
                }
                col += 1;
            }
            return line_start + column.saturating_sub(1);
        }
        if ch == '\n' {
            current_line += 1;
        }
        offset = i;
    }

    offset
}

/// Suggestions for the mistakes that show up in edited record files
fn generate_help(message: &str) -> Option<String> {
    let msg_lower = message.to_lowercase();

    if msg_lower.contains("tab") {
        return Some(
            "YAML requires spaces for indentation, not tabs. Replace tabs with spaces.".to_string(),
        );
    }

    if msg_lower.contains("duplicate key") {
        return Some(
            "Each field can only appear once per record. Remove the duplicate line.".to_string(),
        );
    }

    if msg_lower.contains("expected block end") {
        return Some("Check your indentation - it may be inconsistent.".to_string());
    }

    if msg_lower.contains("mapping values are not allowed") {
        return Some(
            "You may be missing a space after ':' or have incorrect indentation.".to_string(),
        );
    }

    if msg_lower.contains("invalid type") && msg_lower.contains("string") {
        return Some(
            "Free-text values with symbols (e.g. an accuracy like ±0.5%) need quotes: \"±0.5%\""
                .to_string(),
        );
    }

    if msg_lower.contains("unknown variant") {
        return Some(
            "Statuses and results are fixed lists (e.g. Ativo/Inativo/Descartado); check the spelling and accents.".to_string(),
        );
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col_to_offset() {
        let source = "line1\nline2\nline3";
        assert_eq!(line_col_to_offset(source, 1, 1), 0);
        assert_eq!(line_col_to_offset(source, 2, 1), 6);
        assert_eq!(line_col_to_offset(source, 3, 1), 12);
    }

    #[test]
    fn test_help_for_common_editing_mistakes() {
        assert!(generate_help("found tab character").is_some());
        assert!(generate_help("duplicate key").is_some());
        assert!(generate_help("unknown variant `Emprestado`").is_some());
        assert!(generate_help("some random error").is_none());
    }

    #[test]
    fn test_error_carries_location_from_serde() {
        let bad = "tag: MAN-003\nstatus: [unclosed";
        let err = serde_yml::from_str::<serde_yml::Value>(bad).unwrap_err();
        let diag = YamlSyntaxError::from_serde_error(&err, bad, "equipment/MAN-003.cmt.yaml");
        assert_eq!(diag.message, err.to_string());
    }
}
