//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};

use crate::cli::commands::{
    budget::BudgetCommands,
    cal::CalCommands,
    completions::CompletionsArgs,
    equip::EquipCommands,
    export::ExportCommands,
    import::ImportArgs,
    init::InitArgs,
};

#[derive(Parser)]
#[command(name = "cmt")]
#[command(author, version, about = "Candela Metrology Toolkit")]
#[command(
    long_about = "A Unix-style toolkit for managing measurement equipment, calibration records and service budgets as plain text files."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new CMT project
    Init(InitArgs),

    /// Measurement equipment management
    #[command(subcommand)]
    Equip(EquipCommands),

    /// Calibration record management
    #[command(subcommand)]
    Cal(CalCommands),

    /// Service budget management
    #[command(subcommand)]
    Budget(BudgetCommands),

    /// Import equipment from CSV spreadsheets
    Import(ImportArgs),

    /// Export records to CSV
    #[command(subcommand)]
    Export(ExportCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Automatically detect based on context (yaml for show, tsv for list)
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// Tab-separated values (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
    /// Just IDs, one per line
    Id,
}
