use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wf_cli::commands::{check, new, run, sample, show};
use wf_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so command output stays machine-readable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = std::io::stdout().lock();
    match &cli.command {
        Some(Commands::New(args)) => new::run(&mut stdout, args, &config)?,
        Some(Commands::Run(args)) => run::run(&mut stdout, args, &config)?,
        Some(Commands::Show(args)) => show::run(&mut stdout, args)?,
        Some(Commands::Sample(args)) => sample::run(&mut stdout, args)?,
        Some(Commands::Check(args)) => check::run(&mut stdout, args)?,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
