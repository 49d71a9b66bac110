//! Equipment reconciliation - fold weak spreadsheet rows into records
//!
//! One equipment per distinct identifying tag; additional rows with the
//! same tag become additional default test groups on that equipment
//! (e.g. a universal testing machine listed once per test type).

use chrono::NaiveDate;
use console::style;
use miette::{Diagnostic, Result};
use std::path::Path;
use thiserror::Error;
use ulid::Ulid;

use super::common::{find_column, read_sheet, Sheet};
use crate::core::identity::sanitize_tag;
use crate::core::store::{Store, StoreError};
use crate::entities::equipment::{one_year_after, Equipment};

/// Records written per store round; keeps peak concurrent writes bounded
pub const BATCH_SIZE: usize = 20;

/// A batch write failure. Batches already committed stay committed.
#[derive(Debug, Error, Diagnostic)]
#[error("import aborted after {committed} of {total} records")]
#[diagnostic(
    code(cmt::import::batch_failed),
    help("records already written remain in the store; fix the problem and re-import (re-imports upsert by tag)")
)]
pub struct ImportError {
    pub committed: usize,
    pub total: usize,
    #[source]
    pub source: StoreError,
}

/// Normalize a next-calibration cell. Accepts DD/MM/YYYY (Brazilian
/// spreadsheets), ISO YYYY-MM-DD, or a bare spreadsheet date serial
/// (> 20000, days since 1899-12-30). Anything else, including a blank
/// cell, defaults to one year from `today`.
pub fn normalize_date(raw: &str, today: NaiveDate) -> NaiveDate {
    let s = raw.trim();
    if s.is_empty() {
        return one_year_after(today);
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%d/%m/%Y") {
        return date;
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date;
    }

    if let Ok(serial) = s.parse::<f64>() {
        if serial > 20000.0 {
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap();
            if let Some(date) = epoch.checked_add_days(chrono::Days::new(serial as u64)) {
                return date;
            }
        }
    }

    one_year_after(today)
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.trim().to_string()
    }
}

fn optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Aggregate spreadsheet rows into equipment records, one per distinct
/// sanitized tag, applying merged-cell fill-down for blank tags.
pub fn reconcile(sheet: &Sheet, today: NaiveDate) -> Vec<Equipment> {
    let mut records: Vec<Equipment> = Vec::new();
    let mut index_by_id: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut last_valid_tag = String::new();

    for (index, row) in sheet.rows.iter().enumerate() {
        let raw_tag = find_column(&sheet.headers, row, &["codigo", "tag", "id", "identificacao"]);
        let tag = if raw_tag.is_empty() {
            if last_valid_tag.is_empty() {
                // no tag anywhere yet: synthesize one, and let following
                // blank rows fold into it like a merged cell would
                last_valid_tag = format!("IMP-{}", Ulid::new());
            }
            last_valid_tag.clone()
        } else {
            last_valid_tag = raw_tag;
            last_valid_tag.clone()
        };
        let doc_id = sanitize_tag(&tag);

        // test name for this row: explicit type, else the range, else a
        // numbered placeholder
        let mut test_name = find_column(
            &sheet.headers,
            row,
            &["tipo", "ensaio", "grandeza", "complemento", "subtipo"],
        );
        if test_name.is_empty() {
            test_name = find_column(&sheet.headers, row, &["faixa", "range"]);
        }
        let test_name = non_empty_or(test_name, &format!("Teste {}", index + 1));

        if let Some(&i) = index_by_id.get(&doc_id) {
            // same tag again: accumulate another test group
            let groups = records[i].default_test_groups.get_or_insert_with(Vec::new);
            if !groups.contains(&test_name) {
                groups.push(test_name);
            }
            continue;
        }

        let name = non_empty_or(
            find_column(
                &sheet.headers,
                row,
                &["descricao", "nome", "equipamento", "instrumento"],
            ),
            "Sem Nome",
        );
        let next_cal_raw = find_column(&sheet.headers, row, &["proxima", "vencimento", "validade"]);

        let mut eq = Equipment::new(tag.as_str(), name, normalize_date(&next_cal_raw, today));
        eq.id = doc_id.clone();
        eq.manufacturer = find_column(&sheet.headers, row, &["marca", "fabricante"]);
        eq.model = find_column(&sheet.headers, row, &["modelo"]);
        eq.serial_number = find_column(&sheet.headers, row, &["serie", "serial", "sn"]);
        eq.range = find_column(&sheet.headers, row, &["faixa", "range", "capacidade"]);
        eq.resolution = find_column(&sheet.headers, row, &["resolucao"]);
        eq.location = find_column(&sheet.headers, row, &["localizacao", "setor", "area"]);
        eq.accuracy = find_column(
            &sheet.headers,
            row,
            &[
                "criterio", "tolerancia", "tol", "erro", "ema", "exatidao", "classe", "accuracy",
                "limite",
            ],
        );
        eq.supplier = optional(find_column(
            &sheet.headers,
            row,
            &["fornecedor", "laboratorio", "calibrado"],
        ));
        eq.opening_pressure = optional(find_column(&sheet.headers, row, &["abertura", "pressure"]));
        eq.closing_pressure = optional(find_column(&sheet.headers, row, &["fechamento", "blowdown"]));
        eq.default_test_groups = Some(vec![test_name]);

        index_by_id.insert(doc_id, records.len());
        records.push(eq);
    }

    // a record that never received an explicit test name should not keep
    // a meaningless numbered placeholder
    for eq in &mut records {
        if let Some(groups) = &eq.default_test_groups {
            if groups.len() == 1 && groups[0].starts_with("Teste ") {
                eq.default_test_groups = None;
            }
        }
    }

    records
}

/// Persist reconciled records in fixed-size batches, sequentially, each
/// batch completed before the next begins. A failing batch aborts the
/// remainder; there is no rollback of committed batches.
pub fn persist_batches<F>(
    store: &dyn Store,
    records: &[Equipment],
    mut progress: F,
) -> Result<usize, ImportError>
where
    F: FnMut(usize, usize),
{
    let total = records.len();
    let mut committed = 0;

    for chunk in records.chunks(BATCH_SIZE) {
        for eq in chunk {
            if let Err(source) = store.upsert_equipment(eq) {
                return Err(ImportError {
                    committed,
                    total,
                    source,
                });
            }
        }
        committed += chunk.len();
        progress(committed, total);
    }

    Ok(committed)
}

/// Reconcile a CSV file and persist the result (unless dry-running)
pub fn import(store: &dyn Store, file_path: &Path, dry_run: bool) -> Result<usize> {
    let sheet = read_sheet(file_path)?;
    let today = chrono::Local::now().date_naive();
    let records = reconcile(&sheet, today);

    println!(
        "  {} row(s) reconciled into {} equipment record(s)",
        sheet.rows.len(),
        style(records.len()).cyan()
    );
    for eq in &records {
        let groups = eq
            .default_test_groups
            .as_ref()
            .map(|g| g.join(", "))
            .unwrap_or_default();
        if groups.is_empty() {
            println!("  {} {} {}", style("→").blue(), style(&eq.id).cyan(), eq.name);
        } else {
            println!(
                "  {} {} {} [{}]",
                style("→").blue(),
                style(&eq.id).cyan(),
                eq.name,
                style(groups).yellow()
            );
        }
    }

    if dry_run {
        return Ok(records.len());
    }

    println!();
    let committed = persist_batches(store, &records, |done, total| {
        println!("  Processando {} de {} equipamentos...", done, total);
    })
    .map_err(|e| miette::Report::new(e))?;

    Ok(committed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;
    use crate::entities::{BudgetRecord, CalibrationRecord};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sheet(headers: &[&str], rows: &[&[&str]]) -> Sheet {
        Sheet {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_date_normalization_shapes() {
        let today = date(2025, 8, 5);
        assert_eq!(normalize_date("15/03/2025", today), date(2025, 3, 15));
        assert_eq!(normalize_date("5/3/2025", today), date(2025, 3, 5));
        assert_eq!(normalize_date("2025-03-15", today), date(2025, 3, 15));
        // spreadsheet serial: days since 1899-12-30
        assert_eq!(normalize_date("45000", today), date(2023, 3, 15));
        // blank and junk default to one year out
        assert_eq!(normalize_date("", today), date(2026, 8, 5));
        assert_eq!(normalize_date("em breve", today), date(2026, 8, 5));
        // small numbers are not serials
        assert_eq!(normalize_date("123", today), date(2026, 8, 5));
    }

    #[test]
    fn test_fill_down_aggregates_by_tag() {
        let sheet = sheet(
            &["Código", "Descrição", "Tipo"],
            &[
                &["A", "Máquina Universal", "T1"],
                &["", "", "T2"],
                &["B", "Manômetro", "T3"],
            ],
        );
        let records = reconcile(&sheet, date(2025, 8, 5));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "A");
        assert_eq!(
            records[0].default_test_groups,
            Some(vec!["T1".to_string(), "T2".to_string()])
        );
        assert_eq!(records[1].id, "B");
        assert_eq!(records[1].default_test_groups, Some(vec!["T3".to_string()]));
    }

    #[test]
    fn test_duplicate_test_groups_skipped() {
        let sheet = sheet(
            &["Tag", "Nome", "Ensaio"],
            &[
                &["MU-01", "Máquina", "Tração"],
                &["MU-01", "", "Tração"],
                &["MU-01", "", "Compressão"],
            ],
        );
        let records = reconcile(&sheet, date(2025, 8, 5));

        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].default_test_groups,
            Some(vec!["Tração".to_string(), "Compressão".to_string()])
        );
    }

    #[test]
    fn test_test_name_falls_back_to_range() {
        let sheet = sheet(
            &["Tag", "Faixa"],
            &[&["PRE-01", "0-10 bar"], &["PRE-01", "0-100 bar"]],
        );
        let records = reconcile(&sheet, date(2025, 8, 5));

        assert_eq!(
            records[0].default_test_groups,
            Some(vec!["0-10 bar".to_string(), "0-100 bar".to_string()])
        );
        // range also fills the range field
        assert_eq!(records[0].range, "0-10 bar");
    }

    #[test]
    fn test_single_placeholder_group_cleared() {
        let sheet = sheet(
            &["Tag", "Nome"],
            &[&["T-01", "Termômetro"], &["P-02", "Paquímetro"]],
        );
        let records = reconcile(&sheet, date(2025, 8, 5));

        assert_eq!(records[0].default_test_groups, None);
        assert_eq!(records[1].default_test_groups, None);
    }

    #[test]
    fn test_tagless_rows_get_synthesized_tag() {
        let sheet = sheet(&["Nome"], &[&["Sem Identificação"]]);
        let records = reconcile(&sheet, date(2025, 8, 5));

        assert_eq!(records.len(), 1);
        assert!(records[0].id.starts_with("IMP-"));
        assert_eq!(records[0].name, "Sem Identificação");
    }

    #[test]
    fn test_tag_sanitized_into_store_id() {
        let sheet = sheet(&["Código", "Nome"], &[&["av 101/b", "Válvula"]]);
        let records = reconcile(&sheet, date(2025, 8, 5));

        assert_eq!(records[0].id, "AV_101_B");
        // the display tag keeps the spreadsheet spelling
        assert_eq!(records[0].tag, "av 101/b");
    }

    #[test]
    fn test_descriptive_fields_populated_from_first_row_only() {
        let sheet = sheet(
            &["Tag", "Nome", "Marca", "Resolução", "Tolerância (mm)", "Tipo"],
            &[
                &["MU-01", "Máquina", "Instron", "0.01 mm", "±0.5", "Tração"],
                &["MU-01", "Outra Coisa", "Outra", "9", "9", "Compressão"],
            ],
        );
        let records = reconcile(&sheet, date(2025, 8, 5));

        assert_eq!(records.len(), 1);
        let eq = &records[0];
        assert_eq!(eq.name, "Máquina");
        assert_eq!(eq.manufacturer, "Instron");
        assert_eq!(eq.resolution, "0.01 mm");
        assert_eq!(eq.accuracy, "±0.5");
    }

    /// Store whose equipment upserts fail after a countdown
    struct FailingStore {
        inner: MemoryStore,
        remaining: std::cell::Cell<usize>,
    }

    impl Store for FailingStore {
        fn list_equipment(&self) -> Result<Vec<Equipment>, StoreError> {
            self.inner.list_equipment()
        }
        fn get_equipment(&self, id: &str) -> Result<Option<Equipment>, StoreError> {
            self.inner.get_equipment(id)
        }
        fn upsert_equipment(&self, equipment: &Equipment) -> Result<(), StoreError> {
            if self.remaining.get() == 0 {
                return Err(StoreError::NotFound {
                    collection: "equipment",
                    id: "write failure".to_string(),
                });
            }
            self.remaining.set(self.remaining.get() - 1);
            self.inner.upsert_equipment(equipment)
        }
        fn delete_equipment(&self, id: &str) -> Result<(), StoreError> {
            self.inner.delete_equipment(id)
        }
        fn delete_equipment_batch(&self, ids: &[String]) -> Result<(), StoreError> {
            self.inner.delete_equipment_batch(ids)
        }
        fn list_calibrations(
            &self,
            equipment_id: Option<&str>,
        ) -> Result<Vec<CalibrationRecord>, StoreError> {
            self.inner.list_calibrations(equipment_id)
        }
        fn get_calibration(&self, id: &str) -> Result<Option<CalibrationRecord>, StoreError> {
            self.inner.get_calibration(id)
        }
        fn upsert_calibration(&self, record: &CalibrationRecord) -> Result<(), StoreError> {
            self.inner.upsert_calibration(record)
        }
        fn delete_calibration(&self, id: &str) -> Result<(), StoreError> {
            self.inner.delete_calibration(id)
        }
        fn list_budgets(&self) -> Result<Vec<BudgetRecord>, StoreError> {
            self.inner.list_budgets()
        }
        fn get_budget(&self, id: &str) -> Result<Option<BudgetRecord>, StoreError> {
            self.inner.get_budget(id)
        }
        fn upsert_budget(&self, budget: &BudgetRecord) -> Result<(), StoreError> {
            self.inner.upsert_budget(budget)
        }
        fn delete_budget(&self, id: &str) -> Result<(), StoreError> {
            self.inner.delete_budget(id)
        }
    }

    fn many_records(n: usize) -> Vec<Equipment> {
        (0..n)
            .map(|i| Equipment::new(format!("EQ-{i:03}"), "Instrumento", date(2026, 1, 1)))
            .collect()
    }

    #[test]
    fn test_batches_report_progress_sequentially() {
        let store = MemoryStore::new();
        let records = many_records(45);
        let mut reports = Vec::new();

        let committed = persist_batches(&store, &records, |done, total| {
            reports.push((done, total));
        })
        .unwrap();

        assert_eq!(committed, 45);
        assert_eq!(reports, vec![(20, 45), (40, 45), (45, 45)]);
        assert_eq!(store.list_equipment().unwrap().len(), 45);
    }

    #[test]
    fn test_batch_failure_keeps_committed_batches() {
        // 45 records, writes start failing at the 25th: batch 1 commits,
        // batch 2 fails, batch 3 never starts
        let store = FailingStore {
            inner: MemoryStore::new(),
            remaining: std::cell::Cell::new(24),
        };
        let records = many_records(45);

        let err = persist_batches(&store, &records, |_, _| {}).unwrap_err();
        assert_eq!(err.committed, 20);
        assert_eq!(err.total, 45);

        // the first batch (and the partial second) remain committed
        assert!(store.inner.list_equipment().unwrap().len() >= 20);
    }
}
