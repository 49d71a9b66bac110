//! `cmt init` command - Initialize a new CMT project

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::Path;

use crate::core::project::{Project, ProjectError};

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (default: current directory)
    #[arg(default_value = ".")]
    pub path: std::path::PathBuf,

    /// Also initialize a git repository
    #[arg(long)]
    pub git: bool,

    /// Force initialization even if .cmt/ already exists
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    let path = if args.path.as_os_str() == "." {
        std::env::current_dir().into_diagnostic()?
    } else {
        args.path.clone()
    };

    if !path.exists() {
        std::fs::create_dir_all(&path).into_diagnostic()?;
        println!(
            "{} Created directory {}",
            style("✓").green(),
            style(path.display()).cyan()
        );
    }

    if args.git {
        init_git(&path)?;
    }

    let project = if args.force {
        Project::init_force(&path)
    } else {
        Project::init(&path)
    };

    match project {
        Ok(project) => {
            println!(
                "{} Initialized CMT project at {}",
                style("✓").green(),
                style(project.root().display()).cyan()
            );
            println!();
            println!("Created project structure:");
            println!("  .cmt/           project config");
            println!("  equipment/      measurement instruments");
            println!("  calibrations/   calibration records");
            println!("  budgets/        service cost records");
            println!();
            println!("Next steps:");
            println!(
                "  {} Register an instrument",
                style("cmt equip new --tag MAN-001 --name \"Manômetro\"").yellow()
            );
            println!(
                "  {} Import a spreadsheet",
                style("cmt import equipment planilha.csv").yellow()
            );
            println!(
                "  {} Record a calibration",
                style("cmt cal new --equipment MAN-001").yellow()
            );
            Ok(())
        }
        Err(ProjectError::AlreadyExists(path)) => {
            println!(
                "{} CMT project already exists at {}",
                style("!").yellow(),
                style(path.display()).cyan()
            );
            println!();
            println!("Use {} to reinitialize", style("cmt init --force").yellow());
            Ok(())
        }
        Err(e) => Err(miette::miette!("{}", e)),
    }
}

fn init_git(path: &Path) -> Result<()> {
    let git_dir = path.join(".git");
    if git_dir.exists() {
        println!(
            "{} Git repository already exists",
            style("!").yellow()
        );
        return Ok(());
    }

    let status = std::process::Command::new("git")
        .arg("init")
        .current_dir(path)
        .status()
        .into_diagnostic()?;

    if status.success() {
        println!("{} Initialized git repository", style("✓").green());
    } else {
        println!("{} git init failed", style("!").yellow());
    }

    Ok(())
}
