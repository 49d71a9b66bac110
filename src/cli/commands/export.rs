//! `cmt export` command - CSV projections for spreadsheets
//!
//! Emits the flat row-per-record projections used for quoting: the
//! equipment list a provider prices from, and the yearly cost sheet.

use std::path::PathBuf;

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::core::project::Project;
use crate::core::store::{Store, YamlStore};

#[derive(Subcommand, Debug)]
pub enum ExportCommands {
    /// Export the equipment list
    Equipment(ExportArgs),

    /// Export the budget cost sheet
    Budgets(ExportArgs),
}

#[derive(clap::Args, Debug)]
pub struct ExportArgs {
    /// Write to a file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Filter budgets by year (ignored for equipment)
    #[arg(long, short = 'y')]
    pub year: Option<i32>,
}

pub fn run(cmd: ExportCommands) -> Result<()> {
    match cmd {
        ExportCommands::Equipment(args) => run_equipment(args),
        ExportCommands::Budgets(args) => run_budgets(args),
    }
}

fn writer(output: &Option<PathBuf>) -> Result<csv::Writer<Box<dyn std::io::Write>>> {
    let target: Box<dyn std::io::Write> = match output {
        Some(path) => Box::new(std::fs::File::create(path).into_diagnostic()?),
        None => Box::new(std::io::stdout()),
    };
    Ok(csv::Writer::from_writer(target))
}

fn run_equipment(args: ExportArgs) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);
    let list = store.list_equipment().map_err(|e| miette::Report::new(e))?;

    let mut wtr = writer(&args.output)?;
    wtr.write_record([
        "Tag",
        "Descrição",
        "Fabricante",
        "Modelo",
        "Fornecedor",
        "Nº Série",
        "Faixa de Medição",
        "Resolução",
        "Critério de Aceitação",
        "Próx. Calibração",
        "Status",
    ])
    .into_diagnostic()?;

    for eq in &list {
        wtr.write_record([
            eq.tag.clone(),
            eq.name.clone(),
            eq.manufacturer.clone(),
            eq.model.clone(),
            eq.supplier.clone().unwrap_or_default(),
            eq.serial_number.clone(),
            eq.range.clone(),
            eq.resolution.clone(),
            eq.accuracy.clone(),
            eq.next_calibration_date.to_string(),
            eq.status.to_string(),
        ])
        .into_diagnostic()?;
    }
    wtr.flush().into_diagnostic()?;

    if let Some(path) = &args.output {
        eprintln!(
            "{} Exported {} equipment(s) to {}",
            style("✓").green(),
            list.len(),
            style(path.display()).cyan()
        );
    }
    Ok(())
}

fn run_budgets(args: ExportArgs) -> Result<()> {
    use chrono::Datelike;

    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);
    let budgets: Vec<_> = store
        .list_budgets()
        .map_err(|e| miette::Report::new(e))?
        .into_iter()
        .filter(|b| args.year.map_or(true, |y| b.date.year() == y))
        .collect();

    let mut wtr = writer(&args.output)?;
    wtr.write_record([
        "Data",
        "Equipamentos (Tags)",
        "Equipamentos (Nomes)",
        "Qtd Equip.",
        "Tipo",
        "Fornecedor",
        "Status",
        "Valor Total (R$)",
        "Observações",
    ])
    .into_diagnostic()?;

    for b in &budgets {
        let tags: Vec<&str> = b.equipments.iter().map(|e| e.tag.as_str()).collect();
        let names: Vec<&str> = b.equipments.iter().map(|e| e.name.as_str()).collect();
        wtr.write_record([
            b.date.format("%d/%m/%Y").to_string(),
            tags.join(", "),
            names.join(", "),
            b.equipments.len().to_string(),
            b.service.to_string(),
            b.provider.clone(),
            b.status.to_string(),
            format!("{:.2}", b.cost),
            b.notes.clone(),
        ])
        .into_diagnostic()?;
    }
    wtr.flush().into_diagnostic()?;

    if let Some(path) = &args.output {
        eprintln!(
            "{} Exported {} budget(s) to {}",
            style("✓").green(),
            budgets.len(),
            style(path.display()).cyan()
        );
    }
    Ok(())
}
