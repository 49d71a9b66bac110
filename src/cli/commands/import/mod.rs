//! `cmt import` command - Import equipment from CSV spreadsheets

mod common;
mod equipment;

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::core::project::Project;
use crate::core::store::YamlStore;

pub use common::{find_column, normalize, read_sheet, Sheet};
pub use equipment::{normalize_date, persist_batches, reconcile, ImportError, BATCH_SIZE};

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Record type to import (currently: equipment)
    #[arg(value_parser = parse_import_kind)]
    pub kind: ImportKind,

    /// CSV file to import
    pub file: PathBuf,

    /// Reconcile and print without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum ImportKind {
    Equipment,
}

fn parse_import_kind(s: &str) -> Result<ImportKind, String> {
    match s.to_lowercase().as_str() {
        "equipment" | "equip" | "equipamento" => Ok(ImportKind::Equipment),
        _ => Err(format!(
            "Unsupported record type: '{}'. Supported: equipment",
            s
        )),
    }
}

pub fn run(args: ImportArgs) -> Result<()> {
    if !args.file.exists() {
        return Err(miette::miette!("File not found: {}", args.file.display()));
    }

    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);

    println!(
        "{} Importing equipment from {}{}",
        style("→").blue(),
        style(args.file.display()).yellow(),
        if args.dry_run {
            style(" (dry run)").dim().to_string()
        } else {
            String::new()
        }
    );
    println!();

    let count = match args.kind {
        ImportKind::Equipment => equipment::import(&store, &args.file, args.dry_run)?,
    };

    println!();
    println!("{}", style("─".repeat(50)).dim());
    if args.dry_run {
        println!(
            "{} equipment record(s) reconciled. No files were created.",
            style(count).cyan()
        );
    } else {
        println!(
            "{} {} equipamentos processados com sucesso!",
            style("✓").green(),
            style(count).cyan()
        );
    }

    Ok(())
}
