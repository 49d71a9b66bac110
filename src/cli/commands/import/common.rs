//! Common utilities for spreadsheet import - header normalization and
//! fuzzy column matching

use std::path::Path;

use csv::ReaderBuilder;
use miette::{IntoDiagnostic, Result};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// A spreadsheet read into memory: one header row plus string cells
#[derive(Debug, Clone)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Read a CSV file into a [`Sheet`]. Cells are kept as displayed text so
/// symbols like "±" and date formatting survive.
pub fn read_sheet(path: &Path) -> Result<Sheet> {
    let file = std::fs::File::open(path).into_diagnostic()?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(std::io::BufReader::new(file));

    let headers: Vec<String> = rdr
        .headers()
        .into_diagnostic()?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.into_diagnostic()?;
        rows.push(record.iter().map(|c| c.to_string()).collect());
    }

    Ok(Sheet { headers, rows })
}

/// Aggressive header normalization:
/// 1. trim and lowercase
/// 2. strip diacritics (NFD, drop combining marks)
/// 3. drop everything that is not a letter or digit
///
/// "Valor Tolerância (mm)" becomes "valortoleranciamm".
pub fn normalize(text: &str) -> String {
    text.trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Resolve a cell by fuzzy header matching.
///
/// Candidates are tried in priority order; a header matches when its
/// normalized form *contains* the normalized candidate, so "tolerancia"
/// matches a "Valor Tolerância (mm)" column. The first candidate with a
/// matching header wins, even if that row's cell is blank - callers
/// treat an empty return as "not provided" and fall back.
pub fn find_column(headers: &[String], row: &[String], candidates: &[&str]) -> String {
    for candidate in candidates {
        let target = normalize(candidate);
        if target.is_empty() {
            continue;
        }
        if let Some(idx) = headers.iter().position(|h| normalize(h).contains(&target)) {
            return row.get(idx).map(|s| s.trim().to_string()).unwrap_or_default();
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(headers: &[&str], row: &[&str]) -> (Vec<String>, Vec<String>) {
        (
            headers.iter().map(|s| s.to_string()).collect(),
            row.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_normalize_strips_accents_and_symbols() {
        assert_eq!(normalize("Valor Tolerância (mm)"), "valortoleranciamm");
        assert_eq!(normalize("  Próx. Calibração  "), "proxcalibracao");
        assert_eq!(normalize("Nº Série"), "nserie");
    }

    #[test]
    fn test_accented_header_matches_plain_candidate() {
        let (headers, row) = sheet(&["Tolerância (mm)", "Outro"], &["±0.5", "x"]);
        assert_eq!(find_column(&headers, &row, &["tolerancia"]), "±0.5");
    }

    #[test]
    fn test_unrelated_header_does_not_match() {
        let (headers, row) = sheet(&["Observação Geral"], &["texto"]);
        assert_eq!(find_column(&headers, &row, &["tolerancia"]), "");
    }

    #[test]
    fn test_candidates_tried_in_priority_order() {
        let (headers, row) = sheet(&["Fabricante", "Marca"], &["Instron", "X"]);
        // "marca" comes first in the candidate list, so the Marca column wins
        assert_eq!(find_column(&headers, &row, &["marca", "fabricante"]), "X");
    }

    #[test]
    fn test_first_matching_header_wins_even_when_blank() {
        // the Tipo column exists but is blank on this row; the caller is
        // expected to fall back, not to read Ensaio instead
        let (headers, row) = sheet(&["Tipo", "Ensaio"], &["", "Dureza"]);
        assert_eq!(
            find_column(&headers, &row, &["tipo", "ensaio"]),
            ""
        );
    }

    #[test]
    fn test_missing_cell_on_short_row() {
        let (headers, _) = sheet(&["Codigo", "Descricao"], &[]);
        let short_row = vec!["MAN-1".to_string()];
        assert_eq!(find_column(&headers, &short_row, &["descricao"]), "");
    }
}
