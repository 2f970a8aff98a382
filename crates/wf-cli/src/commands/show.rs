//! Show command for printing a program.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use wf_core::Timeline;

use crate::program;

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Program file to print.
    pub program: PathBuf,
}

pub fn run<W: Write>(writer: &mut W, args: &ShowArgs) -> Result<()> {
    let timeline = program::load(&args.program)?;
    render(writer, &timeline)
}

/// Writes markers in time order, quantities with their reference counts,
/// variables, then each channel's partition.
pub fn render<W: Write>(writer: &mut W, timeline: &Timeline) -> Result<()> {
    writeln!(writer, "markers:")?;
    for (_, marker) in timeline.markers_by_time() {
        let lock = if marker.is_locked() { " locked" } else { "" };
        writeln!(writer, "  {} @ {}ns{lock}", marker.name(), marker.instant())?;
    }

    writeln!(writer, "quantities:")?;
    for (id, quantity) in timeline.quantities().iter() {
        let body = quantity.expression_text().map_or_else(
            || quantity.constant_value().to_string(),
            |text| format!("fn {text}"),
        );
        let lock = if quantity.is_locked() { " locked" } else { "" };
        writeln!(
            writer,
            "  {} = {body} (used by {}){lock}",
            quantity.name(),
            timeline.reference_count(id)
        )?;
    }

    if !timeline.variables().is_empty() {
        writeln!(writer, "variables:")?;
        for (name, value) in timeline.variables() {
            writeln!(writer, "  {name} = {value}")?;
        }
    }

    let markers = timeline.markers();
    for channel in timeline.channels() {
        let scale = match timeline.display_range(channel.name()) {
            Ok(range) => format!("scale {}..{}", range.min, range.max),
            Err(err) => {
                tracing::debug!(channel = channel.name(), error = %err, "no display range");
                "scale unavailable".to_string()
            }
        };
        writeln!(writer, "channel {} ({scale}):", channel.name())?;
        for interval in channel.intervals() {
            let lock = if interval.is_locked() { " locked" } else { "" };
            writeln!(
                writer,
                "  {} [{}, {}) = {}{lock}",
                interval.name(),
                markers.name_of(interval.start()),
                markers.name_of(interval.end()),
                timeline.quantities().name_of(interval.value())
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    #[test]
    fn render_lists_every_entity() {
        let mut timeline = Timeline::with_channels(1000, &["i", "q"], 1.0).unwrap();
        timeline.insert_time("mid", 400).unwrap();
        timeline.add_function("ramp", "t * 1e6").unwrap();
        timeline.assign_value("q", "initial_b", "ramp").unwrap();
        timeline.set_variable("gain", 0.5).unwrap();
        timeline.set_interval_locked("i", "initial_a", true).unwrap();

        let mut output = Vec::new();
        render(&mut output, &timeline).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        markers:
          start @ 0ns locked
          mid @ 400ns
          end @ 1000ns locked
        quantities:
          initial = 1 (used by 3)
          ramp = fn t * 1e6 (used by 1)
        variables:
          gain = 0.5
        channel i (scale 0..1.25):
          initial_a [start, mid) = initial locked
          initial_b [mid, end) = initial
        channel q (scale 0..1.25):
          initial_a [start, mid) = initial
          initial_b [mid, end) = ramp
        ");
    }

    #[test]
    fn show_reads_a_program_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("program.json");
        let timeline = Timeline::with_channels(10, &["x"], 2.0).unwrap();
        program::save(&path, &timeline).unwrap();

        let mut output = Vec::new();
        run(&mut output, &ShowArgs { program: path }).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        markers:
          start @ 0ns locked
          end @ 10ns locked
        quantities:
          initial = 2 (used by 1)
        channel x (scale 0..2.5):
          initial [start, end) = initial
        ");
    }
}
