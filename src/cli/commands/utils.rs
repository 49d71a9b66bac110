//! Shared command utilities - record resolution and confirmation prompts

use miette::Result;

use crate::core::store::Store;
use crate::entities::{BudgetRecord, CalibrationRecord, Equipment};

/// Resolve an equipment by exact id, tag, or unique id prefix
pub fn resolve_equipment(store: &dyn Store, query: &str) -> Result<Equipment> {
    if let Some(eq) = store.get_equipment(query).map_err(|e| miette::Report::new(e))? {
        return Ok(eq);
    }

    let list = store.list_equipment().map_err(|e| miette::Report::new(e))?;
    let q = query.to_uppercase();
    let matches: Vec<Equipment> = list
        .into_iter()
        .filter(|e| e.id.to_uppercase().starts_with(&q) || e.tag.to_uppercase() == q)
        .collect();

    match matches.len() {
        0 => Err(miette::miette!("No equipment matches '{}'", query)),
        1 => Ok(matches.into_iter().next().unwrap()),
        n => Err(miette::miette!(
            "'{}' is ambiguous ({} equipments match). Use the full id.",
            query,
            n
        )),
    }
}

/// Resolve a calibration record by exact id or unique id prefix
pub fn resolve_calibration(store: &dyn Store, query: &str) -> Result<CalibrationRecord> {
    if let Some(record) = store.get_calibration(query).map_err(|e| miette::Report::new(e))? {
        return Ok(record);
    }

    let list = store.list_calibrations(None).map_err(|e| miette::Report::new(e))?;
    let q = query.to_uppercase();
    let matches: Vec<CalibrationRecord> = list
        .into_iter()
        .filter(|r| r.id.to_uppercase().starts_with(&q))
        .collect();

    match matches.len() {
        0 => Err(miette::miette!("No calibration matches '{}'", query)),
        1 => Ok(matches.into_iter().next().unwrap()),
        n => Err(miette::miette!(
            "'{}' is ambiguous ({} calibrations match). Use the full id.",
            query,
            n
        )),
    }
}

/// Resolve a budget by exact id or unique id prefix
pub fn resolve_budget(store: &dyn Store, query: &str) -> Result<BudgetRecord> {
    if let Some(budget) = store.get_budget(query).map_err(|e| miette::Report::new(e))? {
        return Ok(budget);
    }

    let list = store.list_budgets().map_err(|e| miette::Report::new(e))?;
    let q = query.to_uppercase();
    let matches: Vec<BudgetRecord> = list
        .into_iter()
        .filter(|b| b.id.to_uppercase().starts_with(&q))
        .collect();

    match matches.len() {
        0 => Err(miette::miette!("No budget matches '{}'", query)),
        1 => Ok(matches.into_iter().next().unwrap()),
        n => Err(miette::miette!(
            "'{}' is ambiguous ({} budgets match). Use the full id.",
            query,
            n
        )),
    }
}

/// Ask for confirmation unless `yes` was passed
pub fn confirm(prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| miette::miette!("confirmation failed: {}", e))
}
