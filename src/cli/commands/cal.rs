//! `cmt cal` command - Calibration record management
//!
//! Every mutating subcommand resumes an editing session over the stored
//! record, applies a pure transformation and saves the new snapshot.

use std::collections::HashMap;

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::cli::commands::utils::{confirm, resolve_calibration, resolve_equipment};
use crate::cli::helpers::format_short_id;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::analysis::{build_prompt, generate_or_fallback, with_analysis, CommandNarrative};
use crate::core::session::CalibrationSession;
use crate::core::store::{Store, YamlStore};
use crate::core::uncertainty::{ApplyTo, UncertaintyInputs, DEFAULT_COVERAGE_FACTOR};
use crate::core::{Config, Project};
use crate::entities::calibration::{
    CalibrationRecord, CalibrationResult, MeasurementGroup, PointUpdate,
};

#[derive(Subcommand, Debug)]
pub enum CalCommands {
    /// List calibration records (newest first)
    List(ListArgs),

    /// Start a calibration record for an equipment
    New(NewArgs),

    /// Show a calibration record
    Show(ShowArgs),

    /// Manage test groups
    #[command(subcommand)]
    Group(GroupCommands),

    /// Manage measurement points
    #[command(subcommand)]
    Point(PointCommands),

    /// Compute an expanded uncertainty and apply it to a group or all groups
    Uncertainty(UncertaintyArgs),

    /// Generate the narrative analysis and append it to the notes
    Analyze(AnalyzeArgs),

    /// Update record fields (result, notes, conditions)
    Set(SetArgs),

    /// Delete a calibration record
    Delete(DeleteArgs),
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Only records of this equipment (id or tag)
    #[arg(long, short = 'e')]
    pub equipment: Option<String>,

    /// Limit number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Show only count
    #[arg(long)]
    pub count: bool,
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Equipment being calibrated (id or tag)
    #[arg(long, short = 'e')]
    pub equipment: String,

    /// Calibration date (default: today)
    #[arg(long)]
    pub date: Option<chrono::NaiveDate>,

    /// Technician (default: configured author)
    #[arg(long)]
    pub technician: Option<String>,

    /// Reference standard used (e.g. "Bloco Padrão #123")
    #[arg(long)]
    pub standard: Option<String>,

    /// Ambient temperature in °C
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Relative humidity in %
    #[arg(long)]
    pub humidity: Option<f64>,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Calibration id
    pub id: String,
}

#[derive(Subcommand, Debug)]
pub enum GroupCommands {
    /// Add a test group (auto-named "Teste N" unless --name is given)
    Add(GroupAddArgs),

    /// Rename a test group
    Rename(GroupRenameArgs),

    /// Remove a test group and its measurements
    Remove(GroupRemoveArgs),
}

#[derive(clap::Args, Debug)]
pub struct GroupAddArgs {
    /// Calibration id
    pub id: String,

    /// Group name (e.g. "Tração")
    #[arg(long, short = 'N')]
    pub name: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct GroupRenameArgs {
    /// Calibration id
    pub id: String,

    /// Group (name, 1-based index, or group id)
    pub group: String,

    /// New name
    #[arg(long, short = 'N')]
    pub name: String,
}

#[derive(clap::Args, Debug)]
pub struct GroupRemoveArgs {
    /// Calibration id
    pub id: String,

    /// Group (name, 1-based index, or group id)
    pub group: String,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum PointCommands {
    /// Add a measurement point to a group
    Add(PointAddArgs),

    /// Update a measurement point
    Set(PointSetArgs),

    /// Remove a measurement point
    Remove(PointRemoveArgs),
}

#[derive(clap::Args, Debug)]
pub struct PointAddArgs {
    /// Calibration id
    pub id: String,

    /// Group (name, 1-based index, or group id)
    #[arg(long, short = 'g')]
    pub group: String,

    /// Reference (standard) value
    #[arg(long, short = 'R')]
    pub reference: Option<f64>,

    /// Measured value
    #[arg(long, short = 'M')]
    pub measured: Option<f64>,

    /// Expanded uncertainty for this point
    #[arg(long, short = 'U')]
    pub uncertainty: Option<f64>,
}

#[derive(clap::Args, Debug)]
pub struct PointSetArgs {
    /// Calibration id
    pub id: String,

    /// Group (name, 1-based index, or group id)
    #[arg(long, short = 'g')]
    pub group: String,

    /// Point (1-based index within the group)
    #[arg(long, short = 'p')]
    pub point: usize,

    /// Reference (standard) value
    #[arg(long, short = 'R')]
    pub reference: Option<f64>,

    /// Measured value
    #[arg(long, short = 'M')]
    pub measured: Option<f64>,

    /// Expanded uncertainty for this point
    #[arg(long, short = 'U')]
    pub uncertainty: Option<f64>,
}

#[derive(clap::Args, Debug)]
pub struct PointRemoveArgs {
    /// Calibration id
    pub id: String,

    /// Group (name, 1-based index, or group id)
    #[arg(long, short = 'g')]
    pub group: String,

    /// Point (1-based index within the group)
    #[arg(long, short = 'p')]
    pub point: usize,
}

#[derive(clap::Args, Debug)]
pub struct UncertaintyArgs {
    /// Calibration id
    pub id: String,

    /// Standard uncertainty from the reference certificate
    #[arg(long, short = 'u')]
    pub standard_uncertainty: f64,

    /// Device resolution (default: parsed from the equipment's resolution)
    #[arg(long)]
    pub resolution: Option<f64>,

    /// Coverage factor k
    #[arg(long, short = 'k', default_value_t = DEFAULT_COVERAGE_FACTOR)]
    pub coverage_factor: f64,

    /// Apply to one group (name, 1-based index, or group id)
    #[arg(long, short = 'g', conflicts_with = "all")]
    pub group: Option<String>,

    /// Apply to every group
    #[arg(long)]
    pub all: bool,
}

#[derive(clap::Args, Debug)]
pub struct AnalyzeArgs {
    /// Calibration id
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Calibration id
    pub id: String,

    /// Final result (aprovado, "aprovado com restrições", reprovado)
    #[arg(long)]
    pub result: Option<CalibrationResult>,

    /// Free-text notes (replaces existing notes)
    #[arg(long)]
    pub notes: Option<String>,

    /// Reference standard used
    #[arg(long)]
    pub standard: Option<String>,

    /// Ambient temperature in °C
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Relative humidity in %
    #[arg(long)]
    pub humidity: Option<f64>,

    /// Calibration date
    #[arg(long)]
    pub date: Option<chrono::NaiveDate>,
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Calibration id
    pub id: String,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Run a cal subcommand
pub fn run(cmd: CalCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        CalCommands::List(args) => run_list(args, global),
        CalCommands::New(args) => run_new(args, global),
        CalCommands::Show(args) => run_show(args, global),
        CalCommands::Group(cmd) => run_group(cmd),
        CalCommands::Point(cmd) => run_point(cmd),
        CalCommands::Uncertainty(args) => run_uncertainty(args),
        CalCommands::Analyze(args) => run_analyze(args),
        CalCommands::Set(args) => run_set(args),
        CalCommands::Delete(args) => run_delete(args),
    }
}

/// Resolve a group selector (id, unique name, or 1-based index)
fn resolve_group_id(record: &CalibrationRecord, selector: &str) -> Result<String> {
    if let Some(group) = record.measurement_groups.iter().find(|g| g.id == selector) {
        return Ok(group.id.clone());
    }

    let by_name: Vec<&MeasurementGroup> = record
        .measurement_groups
        .iter()
        .filter(|g| g.name.eq_ignore_ascii_case(selector))
        .collect();
    match by_name.len() {
        1 => return Ok(by_name[0].id.clone()),
        n if n > 1 => {
            return Err(miette::miette!(
                "group name '{}' is ambiguous; use its index or id",
                selector
            ))
        }
        _ => {}
    }

    if let Ok(index) = selector.parse::<usize>() {
        if index >= 1 && index <= record.measurement_groups.len() {
            return Ok(record.measurement_groups[index - 1].id.clone());
        }
    }

    Err(miette::miette!(
        "no group '{}' in this record (groups: {})",
        selector,
        record
            .measurement_groups
            .iter()
            .map(|g| g.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    ))
}

/// Resolve a 1-based point index within a group to the point id
fn resolve_point_id(record: &CalibrationRecord, group_id: &str, index: usize) -> Result<String> {
    let group = record
        .measurement_groups
        .iter()
        .find(|g| g.id == group_id)
        .ok_or_else(|| miette::miette!("no group '{}' in this record", group_id))?;
    group
        .measurements
        .get(index.checked_sub(1).unwrap_or(usize::MAX))
        .map(|m| m.id.clone())
        .ok_or_else(|| {
            miette::miette!(
                "group '{}' has {} point(s); no point #{}",
                group.name,
                group.measurements.len(),
                index
            )
        })
}

/// Resume, transform, save, confirm - the shape of every mutation below
fn edit_and_save<F>(id: &str, mutate: F) -> Result<CalibrationRecord>
where
    F: FnOnce(&CalibrationRecord) -> Result<CalibrationRecord>,
{
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);

    let record = resolve_calibration(&store, id)?;
    let mut session = CalibrationSession::resume(record);

    // outer Result: selector resolution; inner apply: domain validation
    let next = mutate(session.record())?;
    session
        .apply(|_| Ok(next))
        .map_err(|e| miette::Report::new(e))?;
    session.save(&store).map_err(|e| miette::Report::new(e))?;

    Ok(session.record().clone())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);

    let equipment_id = match args.equipment.as_deref() {
        Some(query) => Some(resolve_equipment(&store, query)?.id),
        None => None,
    };

    let mut records = store
        .list_calibrations(equipment_id.as_deref())
        .map_err(|e| miette::Report::new(e))?;
    if let Some(limit) = args.limit {
        records.truncate(limit);
    }

    if args.count {
        println!("{}", records.len());
        return Ok(());
    }
    if records.is_empty() {
        println!("No calibrations found.");
        return Ok(());
    }

    let tags: HashMap<String, String> = store
        .list_equipment()
        .map_err(|e| miette::Report::new(e))?
        .into_iter()
        .map(|e| (e.id, e.tag))
        .collect();

    let format = match global.format {
        OutputFormat::Auto => OutputFormat::Tsv,
        f => f,
    };

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&records).into_diagnostic()?
            );
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&records).into_diagnostic()?);
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(std::io::stdout());
            wtr.write_record(["id", "equipment", "date", "technician", "result", "combined"])
                .into_diagnostic()?;
            for r in &records {
                wtr.write_record([
                    r.id.clone(),
                    tags.get(&r.equipment_id).unwrap_or(&r.equipment_id).clone(),
                    r.date.to_string(),
                    r.technician.clone(),
                    r.result.to_string(),
                    format!("{:.4}", r.summary().worst_case_combined),
                ])
                .into_diagnostic()?;
            }
            wtr.flush().into_diagnostic()?;
        }
        OutputFormat::Id => {
            for r in &records {
                println!("{}", r.id);
            }
        }
        OutputFormat::Tsv | OutputFormat::Auto => {
            println!(
                "{:<17} {:<12} {:<12} {:<16} {:<24} {}",
                style("ID").bold(),
                style("EQUIPMENT").bold(),
                style("DATE").bold(),
                style("TECHNICIAN").bold(),
                style("RESULT").bold(),
                style("COMBINED").bold()
            );
            println!("{}", "-".repeat(95));
            for r in &records {
                let result_styled = match r.result {
                    CalibrationResult::Approved => style(r.result.to_string()).green(),
                    CalibrationResult::ApprovedWithRestrictions => {
                        style(r.result.to_string()).yellow()
                    }
                    CalibrationResult::Rejected => style(r.result.to_string()).red(),
                };
                println!(
                    "{:<17} {:<12} {:<12} {:<16} {:<24} {:.4}",
                    format_short_id(&r.id),
                    tags.get(&r.equipment_id).unwrap_or(&r.equipment_id),
                    r.date,
                    r.technician,
                    result_styled,
                    r.summary().worst_case_combined
                );
            }
            println!();
            println!("{} calibration(s) found.", style(records.len()).cyan());
        }
    }

    Ok(())
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);
    let config = Config::load();

    let equipment = resolve_equipment(&store, &args.equipment)?;
    let technician = args.technician.unwrap_or_else(|| config.technician());
    let date = args
        .date
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    let mut session = CalibrationSession::start(&equipment, &technician, date);
    if args.standard.is_some() || args.temperature.is_some() || args.humidity.is_some() {
        session
            .apply(|r| {
                let mut next = r.clone();
                if let Some(ref s) = args.standard {
                    next.standard_used = s.clone();
                }
                if let Some(t) = args.temperature {
                    next.temperature = t;
                }
                if let Some(h) = args.humidity {
                    next.humidity = h;
                }
                Ok(next)
            })
            .map_err(|e| miette::Report::new(e))?;
    }
    session.save(&store).map_err(|e| miette::Report::new(e))?;

    let record = session.record();
    match global.format {
        OutputFormat::Id => println!("{}", record.id),
        _ => {
            println!(
                "{} Created calibration {} for {}",
                style("✓").green(),
                style(&record.id).cyan(),
                style(&equipment.tag).yellow()
            );
            for (i, group) in record.measurement_groups.iter().enumerate() {
                println!("   #{} {}", i + 1, group.name);
            }
        }
    }
    Ok(())
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);
    let record = resolve_calibration(&store, &args.id)?;

    match global.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&record).into_diagnostic()?
            );
            return Ok(());
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&record).into_diagnostic()?);
            return Ok(());
        }
        OutputFormat::Id => {
            println!("{}", record.id);
            return Ok(());
        }
        _ => {}
    }

    let equipment_tag = store
        .get_equipment(&record.equipment_id)
        .map_err(|e| miette::Report::new(e))?
        .map(|e| format!("{} — {}", e.tag, e.name))
        .unwrap_or_else(|| record.equipment_id.clone());

    println!(
        "{} {}  [{}]",
        style("Calibração").bold(),
        style(&record.id).cyan(),
        match record.result {
            CalibrationResult::Approved => style(record.result.to_string()).green(),
            CalibrationResult::ApprovedWithRestrictions => style(record.result.to_string()).yellow(),
            CalibrationResult::Rejected => style(record.result.to_string()).red(),
        }
    );
    println!("Equipamento: {}", equipment_tag);
    println!(
        "Data: {}   Técnico: {}   Temp: {}°C   Umid: {}%",
        record.date, record.technician, record.temperature, record.humidity
    );
    if !record.standard_used.is_empty() {
        println!("Padrão Utilizado: {}", record.standard_used);
    }

    for (i, group) in record.measurement_groups.iter().enumerate() {
        println!();
        println!("#{} {}", i + 1, style(&group.name).bold());
        if group.measurements.is_empty() {
            println!("{}", style("  (nenhum ponto neste grupo)").dim());
            continue;
        }

        let mut builder = Builder::default();
        builder.push_record(["#", "V. Padrão", "V. Medido", "Erro", "Incerteza", "Combinado"]);
        for (j, m) in group.measurements.iter().enumerate() {
            builder.push_record([
                (j + 1).to_string(),
                m.reference_value.to_string(),
                m.measured_value.to_string(),
                format!("{:.4}", m.error),
                format!("{:.4}", m.uncertainty),
                format!("{:.4}", m.combined_error()),
            ]);
        }
        println!("{}", builder.build().with(Style::sharp()));
    }

    let summary = record.summary();
    println!();
    println!(
        "Maior Erro: {:.4}   Incerteza Max: {:.4}   {} {:.4}",
        summary.max_error,
        summary.max_uncertainty,
        style("VALOR CALCULADO:").bold(),
        style(summary.worst_case_combined).cyan()
    );

    if !record.notes.is_empty() {
        println!();
        println!("{}", style("Observações:").bold());
        println!("{}", record.notes);
    }

    Ok(())
}

fn run_group(cmd: GroupCommands) -> Result<()> {
    match cmd {
        GroupCommands::Add(args) => {
            let record = edit_and_save(&args.id, |r| {
                Ok(match args.name.as_deref() {
                    Some(name) => r.add_group_named(name),
                    None => r.add_group(),
                })
            })?;
            let group = record.measurement_groups.last().unwrap();
            println!(
                "{} Added group #{} {}",
                style("✓").green(),
                record.measurement_groups.len(),
                style(&group.name).cyan()
            );
        }
        GroupCommands::Rename(args) => {
            let record = edit_and_save(&args.id, |r| {
                let group_id = resolve_group_id(r, &args.group)?;
                r.rename_group(&group_id, &args.name)
                    .map_err(|e| miette::Report::new(e))
            })?;
            println!(
                "{} Renamed group to {} ({})",
                style("✓").green(),
                style(&args.name).cyan(),
                format_short_id(&record.id)
            );
        }
        GroupCommands::Remove(args) => {
            if !confirm(
                &format!("Remove group '{}' and all its measurements?", args.group),
                args.yes,
            )? {
                println!("Aborted.");
                return Ok(());
            }
            edit_and_save(&args.id, |r| {
                let group_id = resolve_group_id(r, &args.group)?;
                r.remove_group(&group_id).map_err(|e| miette::Report::new(e))
            })?;
            println!(
                "{} Removed group {}",
                style("✓").green(),
                style(&args.group).cyan()
            );
        }
    }
    Ok(())
}

fn run_point(cmd: PointCommands) -> Result<()> {
    match cmd {
        PointCommands::Add(args) => {
            let record = edit_and_save(&args.id, |r| {
                let group_id = resolve_group_id(r, &args.group)?;
                let next = r.add_point(&group_id).map_err(|e| miette::Report::new(e))?;

                // apply the optional initial values to the fresh point
                let point_id = next
                    .measurement_groups
                    .iter()
                    .find(|g| g.id == group_id)
                    .and_then(|g| g.measurements.last())
                    .map(|m| m.id.clone())
                    .expect("point was just added");
                next.update_point(
                    &group_id,
                    &point_id,
                    PointUpdate {
                        reference_value: args.reference,
                        measured_value: args.measured,
                        uncertainty: args.uncertainty,
                    },
                )
                .map_err(|e| miette::Report::new(e))
            })?;

            let group_id = resolve_group_id(&record, &args.group)?;
            let group = record
                .measurement_groups
                .iter()
                .find(|g| g.id == group_id)
                .expect("group exists");
            let point = group.measurements.last().expect("point exists");
            println!(
                "{} Added point #{} to {} (erro: {:.4})",
                style("✓").green(),
                group.measurements.len(),
                style(&group.name).cyan(),
                point.error
            );
        }
        PointCommands::Set(args) => {
            let record = edit_and_save(&args.id, |r| {
                let group_id = resolve_group_id(r, &args.group)?;
                let point_id = resolve_point_id(r, &group_id, args.point)?;
                r.update_point(
                    &group_id,
                    &point_id,
                    PointUpdate {
                        reference_value: args.reference,
                        measured_value: args.measured,
                        uncertainty: args.uncertainty,
                    },
                )
                .map_err(|e| miette::Report::new(e))
            })?;

            let group_id = resolve_group_id(&record, &args.group)?;
            let group = record
                .measurement_groups
                .iter()
                .find(|g| g.id == group_id)
                .expect("group exists");
            let point = &group.measurements[args.point - 1];
            println!(
                "{} Point #{}: padrão {}, medido {}, erro {:.4}, incerteza {:.4}",
                style("✓").green(),
                args.point,
                point.reference_value,
                point.measured_value,
                point.error,
                point.uncertainty
            );
        }
        PointCommands::Remove(args) => {
            edit_and_save(&args.id, |r| {
                let group_id = resolve_group_id(r, &args.group)?;
                let point_id = resolve_point_id(r, &group_id, args.point)?;
                r.remove_point(&group_id, &point_id)
                    .map_err(|e| miette::Report::new(e))
            })?;
            println!(
                "{} Removed point #{} from {}",
                style("✓").green(),
                args.point,
                style(&args.group).cyan()
            );
        }
    }
    Ok(())
}

fn run_uncertainty(args: UncertaintyArgs) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);

    let record = resolve_calibration(&store, &args.id)?;
    let equipment = store
        .get_equipment(&record.equipment_id)
        .map_err(|e| miette::Report::new(e))?;

    // device resolution defaults from the equipment's free-text field
    let resolution = args
        .resolution
        .or_else(|| equipment.as_ref().and_then(|e| e.resolution_value()))
        .unwrap_or(0.0);

    let inputs = UncertaintyInputs::new(args.standard_uncertainty, resolution)
        .with_coverage_factor(args.coverage_factor);
    let breakdown = inputs.breakdown().map_err(|e| miette::Report::new(e))?;

    let target = if args.all {
        ApplyTo::AllGroups
    } else {
        match args.group.as_deref() {
            Some(selector) => ApplyTo::Group(resolve_group_id(&record, selector)?),
            None => {
                return Err(miette::miette!(
                    "select a target: --group <name> or --all"
                ))
            }
        }
    };

    let mut session = CalibrationSession::resume(record);
    session
        .apply(|r| r.apply_uncertainty(breakdown.expanded, &target))
        .map_err(|e| miette::Report::new(e))?;
    session.save(&store).map_err(|e| miette::Report::new(e))?;

    println!(
        "  u_padrão = {:.4}   u_resolução = {:.4}   u_combinada = {:.4}",
        breakdown.u_standard, breakdown.u_resolution, breakdown.u_combined
    );
    let target_name = match &target {
        ApplyTo::AllGroups => "TODOS os grupos".to_string(),
        ApplyTo::Group(_) => format!("o grupo '{}'", args.group.as_deref().unwrap_or("?")),
    };
    println!(
        "{} Incerteza expandida U = {} aplicada a {}.",
        style("✓").green(),
        style(format!("{:.4}", breakdown.expanded)).cyan(),
        target_name
    );
    Ok(())
}

fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);
    let config = Config::load();

    let command = config.analysis_command.clone().ok_or_else(|| {
        miette::miette!(
            "no analysis command configured. Set analysis_command in .cmt/config.yaml or CMT_ANALYSIS_CMD."
        )
    })?;

    let record = resolve_calibration(&store, &args.id)?;
    let equipment = store
        .get_equipment(&record.equipment_id)
        .map_err(|e| miette::Report::new(e))?
        .ok_or_else(|| miette::miette!("equipment {} not found", record.equipment_id))?;

    let prompt = build_prompt(&equipment, &record);
    let service = CommandNarrative::new(command);
    let analysis = generate_or_fallback(&service, &prompt);

    let mut session = CalibrationSession::resume(record);
    session
        .apply(|r| Ok(with_analysis(r, &analysis)))
        .map_err(|e| miette::Report::new(e))?;
    session.save(&store).map_err(|e| miette::Report::new(e))?;

    println!("{}", analysis);
    Ok(())
}

fn run_set(args: SetArgs) -> Result<()> {
    let record = edit_and_save(&args.id, |r| {
        let mut next = r.clone();
        if let Some(result) = args.result {
            next.result = result;
        }
        if let Some(ref notes) = args.notes {
            next.notes = notes.clone();
        }
        if let Some(ref standard) = args.standard {
            next.standard_used = standard.clone();
        }
        if let Some(t) = args.temperature {
            next.temperature = t;
        }
        if let Some(h) = args.humidity {
            next.humidity = h;
        }
        if let Some(d) = args.date {
            next.date = d;
        }
        Ok(next)
    })?;

    println!(
        "{} Updated {} (resultado: {})",
        style("✓").green(),
        format_short_id(&record.id),
        record.result
    );
    Ok(())
}

fn run_delete(args: DeleteArgs) -> Result<()> {
    let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
    let store = YamlStore::new(&project);
    let record = resolve_calibration(&store, &args.id)?;

    if !confirm(
        &format!("Delete calibration {} ({})?", record.id, record.date),
        args.yes,
    )? {
        println!("Aborted.");
        return Ok(());
    }

    store
        .delete_calibration(&record.id)
        .map_err(|e| miette::Report::new(e))?;
    println!(
        "{} Deleted calibration {}",
        style("✓").green(),
        style(&record.id).cyan()
    );
    Ok(())
}
