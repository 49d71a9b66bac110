//! `cmt equip` command - Measurement equipment management

use clap::{Subcommand, ValueEnum};
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::commands::utils::{confirm, resolve_equipment};
use crate::cli::helpers::{due_status_label, format_short_id, truncate_str};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::RecordPrefix;
use crate::core::project::Project;
use crate::core::store::{Store, YamlStore};
use crate::core::Config;
use crate::entities::equipment::{one_year_after, DueStatus, Equipment, EquipmentStatus};

/// Equipment deleted per store round during `equip clear`
const CLEAR_BATCH_SIZE: usize = 50;

#[derive(Subcommand, Debug)]
pub enum EquipCommands {
    /// List equipment with filtering
    List(ListArgs),

    /// Register a new equipment
    New(NewArgs),

    /// Show an equipment's details
    Show(ShowArgs),

    /// Edit an equipment file in your editor
    Edit(EditArgs),

    /// Delete an equipment
    Delete(DeleteArgs),

    /// Print the calibration-due notification body
    Alerts(AlertsArgs),

    /// Delete ALL equipment records
    Clear(ClearArgs),
}

/// Equipment status filter
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusFilter {
    Ativo,
    Inativo,
    Descartado,
    All,
}

impl StatusFilter {
    fn matches(&self, status: EquipmentStatus) -> bool {
        match self {
            StatusFilter::Ativo => status == EquipmentStatus::Active,
            StatusFilter::Inativo => status == EquipmentStatus::Inactive,
            StatusFilter::Descartado => status == EquipmentStatus::Discarded,
            StatusFilter::All => true,
        }
    }
}

/// List column for sorting
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortColumn {
    Tag,
    Name,
    NextCal,
    Created,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Filter by lifecycle status
    #[arg(long, short = 's', default_value = "all")]
    pub status: StatusFilter,

    /// Search in tag, name, serial, manufacturer, model and supplier
    #[arg(long)]
    pub search: Option<String>,

    /// Show only overdue or due-soon equipment
    #[arg(long)]
    pub due: bool,

    /// Sort by column
    #[arg(long, default_value = "tag")]
    pub sort: SortColumn,

    /// Reverse sort order
    #[arg(long, short = 'r')]
    pub reverse: bool,

    /// Limit number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Show only count
    #[arg(long)]
    pub count: bool,
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Identification tag (e.g. MAN-001)
    #[arg(long, short = 't')]
    pub tag: String,

    /// Instrument name / description
    #[arg(long, short = 'N')]
    pub name: String,

    /// Next calibration date (YYYY-MM-DD, default: one year from today)
    #[arg(long)]
    pub next_calibration: Option<chrono::NaiveDate>,

    #[arg(long)]
    pub manufacturer: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub serial: Option<String>,

    /// Measuring range (free text, e.g. "0-10 bar")
    #[arg(long)]
    pub range: Option<String>,

    /// Resolution (free text, e.g. "0.01 mm")
    #[arg(long)]
    pub resolution: Option<String>,

    /// Acceptance criterion / accuracy class (free text)
    #[arg(long)]
    pub accuracy: Option<String>,

    #[arg(long)]
    pub location: Option<String>,

    /// Calibration provider / laboratory
    #[arg(long)]
    pub supplier: Option<String>,

    /// Test-group names seeded into new calibrations (comma-separated,
    /// e.g. "Tração,Compressão")
    #[arg(long, value_delimiter = ',')]
    pub test_groups: Vec<String>,

    /// Open in editor after creation
    #[arg(long, short = 'e')]
    pub edit: bool,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Equipment id or tag
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct EditArgs {
    /// Equipment id or tag
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Equipment id or tag
    pub id: String,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(clap::Args, Debug)]
pub struct AlertsArgs {}

#[derive(clap::Args, Debug)]
pub struct ClearArgs {
    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Run an equip subcommand
pub fn run(cmd: EquipCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        EquipCommands::List(args) => run_list(args, global),
        EquipCommands::New(args) => run_new(args, global),
        EquipCommands::Show(args) => run_show(args, global),
        EquipCommands::Edit(args) => run_edit(args),
        EquipCommands::Delete(args) => run_delete(args),
        EquipCommands::Alerts(_) => run_alerts(),
        EquipCommands::Clear(args) => run_clear(args),
    }
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);
    let today = chrono::Local::now().date_naive();

    let mut list: Vec<Equipment> = store
        .list_equipment()
        .map_err(|e| miette::Report::new(e))?
        .into_iter()
        .filter(|e| args.status.matches(e.status))
        .filter(|e| {
            args.search
                .as_deref()
                .map_or(true, |term| e.matches_search(term))
        })
        .filter(|e| {
            if args.due {
                matches!(
                    e.due_status(today),
                    Some(DueStatus::Overdue(_)) | Some(DueStatus::DueSoon(_))
                )
            } else {
                true
            }
        })
        .collect();

    match args.sort {
        SortColumn::Tag => list.sort_by(|a, b| a.tag.cmp(&b.tag)),
        SortColumn::Name => list.sort_by(|a, b| a.name.cmp(&b.name)),
        SortColumn::NextCal => {
            list.sort_by(|a, b| a.next_calibration_date.cmp(&b.next_calibration_date))
        }
        SortColumn::Created => list.sort_by(|a, b| a.created.cmp(&b.created)),
    }
    if args.reverse {
        list.reverse();
    }
    if let Some(limit) = args.limit {
        list.truncate(limit);
    }

    if args.count {
        println!("{}", list.len());
        return Ok(());
    }

    if list.is_empty() {
        println!("No equipment found.");
        return Ok(());
    }

    let format = match global.format {
        OutputFormat::Auto => OutputFormat::Tsv,
        f => f,
    };

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&list).into_diagnostic()?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml = serde_yml::to_string(&list).into_diagnostic()?;
            print!("{}", yaml);
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(std::io::stdout());
            wtr.write_record(["id", "tag", "name", "location", "next_calibration", "status"])
                .into_diagnostic()?;
            for eq in &list {
                wtr.write_record([
                    eq.id.clone(),
                    eq.tag.clone(),
                    eq.name.clone(),
                    eq.location.clone(),
                    eq.next_calibration_date.to_string(),
                    eq.status.to_string(),
                ])
                .into_diagnostic()?;
            }
            wtr.flush().into_diagnostic()?;
        }
        OutputFormat::Id => {
            for eq in &list {
                println!("{}", eq.id);
            }
        }
        OutputFormat::Tsv | OutputFormat::Auto => {
            let widths = [17, 12, 26, 12, 11];
            let headers = ["ID", "TAG", "NAME", "NEXT CAL", "STATUS"];
            for (header, width) in headers.iter().zip(widths) {
                print!("{:<width$} ", style(header).bold(), width = width);
            }
            println!("{}", style("CALIBRATION").bold());
            println!("{}", "-".repeat(widths.iter().sum::<usize>() + 24));

            for eq in &list {
                let status_styled = match eq.status {
                    EquipmentStatus::Active => style(eq.status.to_string()).green(),
                    EquipmentStatus::Inactive => style(eq.status.to_string()).yellow(),
                    EquipmentStatus::Discarded => style(eq.status.to_string()).red(),
                };
                print!("{:<17} ", format_short_id(&eq.id));
                print!("{:<12} ", truncate_str(&eq.tag, 10));
                print!("{:<26} ", truncate_str(&eq.name, 24));
                print!("{:<12} ", eq.next_calibration_date);
                print!("{:<11} ", status_styled);
                println!("{}", due_status_label(eq.due_status(today)));
            }

            println!();
            println!("{} equipment(s) found.", style(list.len()).cyan());
        }
    }

    Ok(())
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);
    let config = Config::load();

    let next_calibration = args
        .next_calibration
        .unwrap_or_else(|| one_year_after(chrono::Local::now().date_naive()));

    let mut eq = Equipment::new(args.tag.as_str(), args.name.as_str(), next_calibration);
    eq.manufacturer = args.manufacturer.unwrap_or_default();
    eq.model = args.model.unwrap_or_default();
    eq.serial_number = args.serial.unwrap_or_default();
    eq.range = args.range.unwrap_or_default();
    eq.resolution = args.resolution.unwrap_or_default();
    eq.accuracy = args.accuracy.unwrap_or_default();
    eq.location = args.location.unwrap_or_default();
    eq.supplier = args.supplier.filter(|s| !s.is_empty());
    if !args.test_groups.is_empty() {
        eq.default_test_groups = Some(args.test_groups.clone());
    }

    store.upsert_equipment(&eq).map_err(|e| miette::Report::new(e))?;
    let file_path = project.record_path(RecordPrefix::Equipment, &eq.id);

    match global.format {
        OutputFormat::Id => println!("{}", eq.id),
        _ => {
            println!(
                "{} Created equipment {}",
                style("✓").green(),
                style(&eq.id).cyan()
            );
            println!("   {}", style(file_path.display()).dim());
            println!(
                "   {} | {}",
                style(&eq.tag).yellow(),
                style(&eq.name).white()
            );
        }
    }

    if args.edit {
        println!();
        println!("Opening in {}...", style(config.editor()).yellow());
        config.run_editor(&file_path).into_diagnostic()?;
    }

    Ok(())
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);
    let eq = resolve_equipment(&store, &args.id)?;

    match global.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&eq).into_diagnostic()?);
        }
        OutputFormat::Id => println!("{}", eq.id),
        _ => {
            print!("{}", serde_yml::to_string(&eq).into_diagnostic()?);
        }
    }
    Ok(())
}

fn run_edit(args: EditArgs) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);
    let config = Config::load();

    let eq = resolve_equipment(&store, &args.id)?;
    let file_path = project.record_path(RecordPrefix::Equipment, &eq.id);

    config.run_editor(&file_path).into_diagnostic()?;

    // Surface syntax errors right away instead of at the next command
    if let Err(e) = store.get_equipment(&eq.id) {
        return Err(miette::Report::new(e));
    }
    Ok(())
}

fn run_delete(args: DeleteArgs) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);
    let eq = resolve_equipment(&store, &args.id)?;

    if !confirm(
        &format!("Delete equipment {} ({})?", eq.tag, eq.name),
        args.yes,
    )? {
        println!("Aborted.");
        return Ok(());
    }

    store
        .delete_equipment(&eq.id)
        .map_err(|e| miette::Report::new(e))?;
    println!(
        "{} Deleted equipment {}",
        style("✓").green(),
        style(&eq.tag).cyan()
    );
    Ok(())
}

fn run_alerts() -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);
    let today = chrono::Local::now().date_naive();

    let mut expired: Vec<Equipment> = Vec::new();
    let mut warning: Vec<Equipment> = Vec::new();
    for eq in store.list_equipment().map_err(|e| miette::Report::new(e))? {
        match eq.due_status(today) {
            Some(DueStatus::Overdue(_)) => expired.push(eq),
            Some(DueStatus::DueSoon(_)) => warning.push(eq),
            _ => {}
        }
    }

    if expired.is_empty() && warning.is_empty() {
        println!(
            "{} Nenhum equipamento vencido ou próximo do vencimento.",
            style("✓").green()
        );
        return Ok(());
    }

    // Plain-text notification body, ready to paste into an email
    println!("ALERTA: Equipamentos com Calibração Vencida");
    println!();
    println!("Os seguintes equipamentos necessitam de atenção imediata:");
    println!();

    if !expired.is_empty() {
        println!("--- VENCIDOS ---");
        for eq in &expired {
            println!(
                "[{}] {} - Venceu em: {}",
                eq.tag,
                eq.name,
                eq.next_calibration_date.format("%d/%m/%Y")
            );
        }
        println!();
    }

    if !warning.is_empty() {
        println!("--- PRÓXIMOS DO VENCIMENTO (30 Dias) ---");
        for eq in &warning {
            println!(
                "[{}] {} - Vence em: {}",
                eq.tag,
                eq.name,
                eq.next_calibration_date.format("%d/%m/%Y")
            );
        }
        println!();
    }

    println!("Favor providenciar a calibração.");
    Ok(())
}

fn run_clear(args: ClearArgs) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);

    let ids: Vec<String> = store
        .list_equipment()
        .map_err(|e| miette::Report::new(e))?
        .into_iter()
        .map(|e| e.id)
        .collect();

    if ids.is_empty() {
        println!("No equipment to delete.");
        return Ok(());
    }

    if !confirm(
        &format!(
            "ATENÇÃO: delete ALL {} equipment records? This cannot be undone",
            ids.len()
        ),
        args.yes,
    )? {
        println!("Aborted.");
        return Ok(());
    }

    for chunk in ids.chunks(CLEAR_BATCH_SIZE) {
        store
            .delete_equipment_batch(chunk)
            .map_err(|e| miette::Report::new(e))?;
        println!("Lote de {} equipamentos apagado.", chunk.len());
    }

    println!(
        "{} {} equipment records deleted.",
        style("✓").green(),
        style(ids.len()).cyan()
    );
    Ok(())
}
