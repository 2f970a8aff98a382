//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::{check::CheckArgs, new::NewArgs, run::RunArgs, sample::SampleArgs, show::ShowArgs};

/// Waveform program console.
///
/// Edits multi-channel waveform programs: named time markers partition every
/// channel into intervals, each valued by a shared constant or function
/// quantity.
#[derive(Debug, Parser)]
#[command(name = "wf", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write a new program with the configured channels.
    New(NewArgs),

    /// Execute a console script against a program.
    Run(RunArgs),

    /// Print a program's markers, quantities and partitions.
    Show(ShowArgs),

    /// Sample a channel at nanosecond ticks.
    Sample(SampleArgs),

    /// Load a program and verify every invariant.
    Check(CheckArgs),
}
