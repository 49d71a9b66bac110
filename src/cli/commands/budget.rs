//! `cmt budget` command - Service cost management

use clap::{Subcommand, ValueEnum};
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::commands::utils::{confirm, resolve_budget, resolve_equipment};
use crate::cli::helpers::{format_short_id, truncate_str};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::project::Project;
use crate::core::store::{Store, YamlStore};
use crate::entities::budget::{BudgetRecord, BudgetStatus, EquipmentLink, ServiceType};

/// CLI-friendly service type
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliService {
    Calibracao,
    Manutencao,
    Reparo,
    Pecas,
}

impl From<CliService> for ServiceType {
    fn from(cli: CliService) -> Self {
        match cli {
            CliService::Calibracao => ServiceType::Calibration,
            CliService::Manutencao => ServiceType::Maintenance,
            CliService::Reparo => ServiceType::Repair,
            CliService::Pecas => ServiceType::Parts,
        }
    }
}

/// CLI-friendly budget status
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliBudgetStatus {
    Pendente,
    Aprovado,
    Concluido,
    Cancelado,
}

impl From<CliBudgetStatus> for BudgetStatus {
    fn from(cli: CliBudgetStatus) -> Self {
        match cli {
            CliBudgetStatus::Pendente => BudgetStatus::Pending,
            CliBudgetStatus::Aprovado => BudgetStatus::Approved,
            CliBudgetStatus::Concluido => BudgetStatus::Completed,
            CliBudgetStatus::Cancelado => BudgetStatus::Cancelled,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum BudgetCommands {
    /// List budgets with yearly cost roll-ups
    List(ListArgs),

    /// Create a new budget
    New(NewArgs),

    /// Show a budget's details
    Show(ShowArgs),

    /// Update a budget's status
    Status(StatusArgs),

    /// Delete a budget
    Delete(DeleteArgs),
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Filter by year
    #[arg(long, short = 'y')]
    pub year: Option<i32>,

    /// Search in linked equipment tags/names and provider
    #[arg(long)]
    pub search: Option<String>,

    /// Show only count
    #[arg(long)]
    pub count: bool,
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Equipment to link (id or tag; repeatable)
    #[arg(long, short = 'e', required = true)]
    pub equipment: Vec<String>,

    /// Service provider
    #[arg(long, short = 'p')]
    pub provider: String,

    /// Total cost (R$)
    #[arg(long, short = 'c')]
    pub cost: f64,

    /// Service type
    #[arg(long, short = 's', default_value = "calibracao")]
    pub service: CliService,

    /// Budget date (default: today)
    #[arg(long)]
    pub date: Option<chrono::NaiveDate>,

    /// Initial status
    #[arg(long, default_value = "pendente")]
    pub status: CliBudgetStatus,

    /// Free-text notes
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Budget id
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct StatusArgs {
    /// Budget id
    pub id: String,

    /// New status
    pub status: CliBudgetStatus,
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Budget id
    pub id: String,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Run a budget subcommand
pub fn run(cmd: BudgetCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        BudgetCommands::List(args) => run_list(args, global),
        BudgetCommands::New(args) => run_new(args, global),
        BudgetCommands::Show(args) => run_show(args, global),
        BudgetCommands::Status(args) => run_status(args),
        BudgetCommands::Delete(args) => run_delete(args),
    }
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    use chrono::Datelike;

    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);

    let budgets: Vec<BudgetRecord> = store
        .list_budgets()
        .map_err(|e| miette::Report::new(e))?
        .into_iter()
        .filter(|b| args.year.map_or(true, |y| b.date.year() == y))
        .filter(|b| {
            args.search
                .as_deref()
                .map_or(true, |term| b.matches_search(term))
        })
        .collect();

    if args.count {
        println!("{}", budgets.len());
        return Ok(());
    }
    if budgets.is_empty() {
        println!("No budgets found.");
        return Ok(());
    }

    let format = match global.format {
        OutputFormat::Auto => OutputFormat::Tsv,
        f => f,
    };

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&budgets).into_diagnostic()?
            );
            return Ok(());
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&budgets).into_diagnostic()?);
            return Ok(());
        }
        OutputFormat::Id => {
            for b in &budgets {
                println!("{}", b.id);
            }
            return Ok(());
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(std::io::stdout());
            wtr.write_record(["id", "date", "equipments", "provider", "service", "status", "cost"])
                .into_diagnostic()?;
            for b in &budgets {
                let tags: Vec<&str> = b.equipments.iter().map(|e| e.tag.as_str()).collect();
                wtr.write_record([
                    b.id.clone(),
                    b.date.to_string(),
                    tags.join(", "),
                    b.provider.clone(),
                    b.service.to_string(),
                    b.status.to_string(),
                    format!("{:.2}", b.cost),
                ])
                .into_diagnostic()?;
            }
            wtr.flush().into_diagnostic()?;
            return Ok(());
        }
        OutputFormat::Tsv | OutputFormat::Auto => {}
    }

    println!(
        "{:<17} {:<12} {:<24} {:<18} {:<12} {:<11} {}",
        style("ID").bold(),
        style("DATE").bold(),
        style("EQUIPMENT").bold(),
        style("PROVIDER").bold(),
        style("SERVICE").bold(),
        style("STATUS").bold(),
        style("COST (R$)").bold()
    );
    println!("{}", "-".repeat(108));

    for b in &budgets {
        let tags: Vec<&str> = b.equipments.iter().map(|e| e.tag.as_str()).collect();
        let status_styled = match b.status {
            BudgetStatus::Pending => style(b.status.to_string()).yellow(),
            BudgetStatus::Approved => style(b.status.to_string()).green(),
            BudgetStatus::Completed => style(b.status.to_string()).cyan(),
            BudgetStatus::Cancelled => style(b.status.to_string()).dim(),
        };
        println!(
            "{:<17} {:<12} {:<24} {:<18} {:<12} {:<11} {:.2}",
            format_short_id(&b.id),
            b.date,
            truncate_str(&tags.join(", "), 22),
            truncate_str(&b.provider, 16),
            b.service,
            status_styled,
            b.cost
        );
    }

    // realized vs pending roll-up over the listed records
    let realized: f64 = budgets
        .iter()
        .filter(|b| b.status.is_realized())
        .map(|b| b.cost)
        .sum();
    let pending: f64 = budgets
        .iter()
        .filter(|b| b.status == BudgetStatus::Pending)
        .map(|b| b.cost)
        .sum();

    println!();
    match args.year {
        Some(year) => println!(
            "Total Gasto ({}): {}   Pendente: {}",
            year,
            style(format!("R$ {:.2}", realized)).green(),
            style(format!("R$ {:.2}", pending)).yellow()
        ),
        None => println!(
            "Total Gasto: {}   Pendente: {}",
            style(format!("R$ {:.2}", realized)).green(),
            style(format!("R$ {:.2}", pending)).yellow()
        ),
    }
    println!("{} budget(s) found.", style(budgets.len()).cyan());

    Ok(())
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);

    let date = args
        .date
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    let mut budget = BudgetRecord::new(args.provider.as_str(), date, args.service.into(), args.cost);
    budget.status = args.status.into();
    budget.notes = args.notes.unwrap_or_default();

    for query in &args.equipment {
        let eq = resolve_equipment(&store, query)?;
        if budget.equipments.iter().any(|link| link.id == eq.id) {
            continue;
        }
        budget.equipments.push(EquipmentLink {
            id: eq.id,
            tag: eq.tag,
            name: eq.name,
        });
    }

    // validation failures abort before any write
    budget.validate().map_err(|e| miette::Report::new(e))?;
    store.upsert_budget(&budget).map_err(|e| miette::Report::new(e))?;

    match global.format {
        OutputFormat::Id => println!("{}", budget.id),
        _ => {
            println!(
                "{} Created budget {} ({} - R$ {:.2})",
                style("✓").green(),
                style(&budget.id).cyan(),
                budget.service,
                budget.cost
            );
            for link in &budget.equipments {
                println!("   {} | {}", style(&link.tag).yellow(), link.name);
            }
        }
    }
    Ok(())
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);
    let budget = resolve_budget(&store, &args.id)?;

    match global.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&budget).into_diagnostic()?
            );
        }
        OutputFormat::Id => println!("{}", budget.id),
        _ => {
            print!("{}", serde_yml::to_string(&budget).into_diagnostic()?);
        }
    }
    Ok(())
}

fn run_status(args: StatusArgs) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);

    let mut budget = resolve_budget(&store, &args.id)?;
    budget.status = args.status.into();
    store.upsert_budget(&budget).map_err(|e| miette::Report::new(e))?;

    println!(
        "{} Budget {} is now {}",
        style("✓").green(),
        format_short_id(&budget.id),
        style(budget.status.to_string()).cyan()
    );
    Ok(())
}

fn run_delete(args: DeleteArgs) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);
    let budget = resolve_budget(&store, &args.id)?;

    if !confirm(
        &format!(
            "Delete budget {} ({} - R$ {:.2})?",
            budget.id, budget.provider, budget.cost
        ),
        args.yes,
    )? {
        println!("Aborted.");
        return Ok(());
    }

    store
        .delete_budget(&budget.id)
        .map_err(|e| miette::Report::new(e))?;
    println!(
        "{} Deleted budget {}",
        style("✓").green(),
        style(&budget.id).cyan()
    );
    Ok(())
}
