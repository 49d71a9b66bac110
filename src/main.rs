use clap::Parser;
use cmt::cli::{Cli, Commands};
use miette::Result;

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    // This is standard practice for CLI tools that output to stdout.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    // Install miette's fancy error handler for beautiful diagnostics
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    match cli.command {
        Commands::Init(args) => cmt::cli::commands::init::run(args),
        Commands::Equip(cmd) => cmt::cli::commands::equip::run(cmd, &global),
        Commands::Cal(cmd) => cmt::cli::commands::cal::run(cmd, &global),
        Commands::Budget(cmd) => cmt::cli::commands::budget::run(cmd, &global),
        Commands::Import(args) => cmt::cli::commands::import::run(args),
        Commands::Export(cmd) => cmt::cli::commands::export::run(cmd),
        Commands::Completions(args) => cmt::cli::commands::completions::run(args),
    }
}
