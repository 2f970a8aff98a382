//! Check command for validating a program file.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::program;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Program file to validate.
    pub program: PathBuf,
}

/// Loads the program, which validates its structure, then evaluates every
/// channel once so broken expressions are reported too.
pub fn run<W: Write>(writer: &mut W, args: &CheckArgs) -> Result<()> {
    let timeline = program::load(&args.program)?;
    timeline.validate().context("program failed validation")?;
    for channel in timeline.channels() {
        timeline
            .channel_samples(channel.name())
            .with_context(|| format!("channel {} cannot be evaluated", channel.name()))?;
    }

    writeln!(
        writer,
        "ok: {} markers, {} quantities, {} channels",
        timeline.markers().len(),
        timeline.quantities().len(),
        timeline.channels().len()
    )?;
    Ok(())
}
