//! Sample command for evaluating a channel.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::program;

#[derive(Debug, Args)]
pub struct SampleArgs {
    /// Program file to sample.
    pub program: PathBuf,

    /// Channel to sample.
    #[arg(long)]
    pub channel: String,

    /// Instants in nanoseconds. Every tick of the program when omitted.
    #[arg(long = "at")]
    pub at: Vec<i64>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct Sample {
    instant: i64,
    value: f64,
}

pub fn run<W: Write>(writer: &mut W, args: &SampleArgs) -> Result<()> {
    let timeline = program::load(&args.program)?;

    let samples: Vec<Sample> = if args.at.is_empty() {
        let values = timeline.channel_samples(&args.channel)?;
        (timeline.start_instant()..)
            .zip(values)
            .map(|(instant, value)| Sample { instant, value })
            .collect()
    } else {
        args.at
            .iter()
            .map(|&instant| {
                let value = timeline.value_at(&args.channel, instant)?;
                Ok(Sample { instant, value })
            })
            .collect::<Result<_>>()?
    };

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&samples)?)?;
    } else {
        for sample in &samples {
            writeln!(writer, "{}\t{}", sample.instant, sample.value)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use wf_core::Timeline;

    fn program_file() -> (tempfile::TempDir, PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("program.json");
        let mut timeline = Timeline::with_channels(4, &["x"], 1.0).unwrap();
        timeline.insert_time("mid", 2).unwrap();
        timeline.drag_value("x", "initial_b", 3.0).unwrap();
        program::save(&path, &timeline).unwrap();
        (temp, path)
    }

    #[test]
    fn sample_every_tick() {
        let (_temp, path) = program_file();
        let args = SampleArgs {
            program: path,
            channel: "x".to_string(),
            at: Vec::new(),
            json: false,
        };
        let mut output = Vec::new();
        run(&mut output, &args).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        0	1
        1	1
        2	3
        3	3
        ");
    }

    #[test]
    fn sample_selected_instants_as_json() {
        let (_temp, path) = program_file();
        let args = SampleArgs {
            program: path,
            channel: "x".to_string(),
            at: vec![1, 2],
            json: true,
        };
        let mut output = Vec::new();
        run(&mut output, &args).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r#"
        [
          {
            "instant": 1,
            "value": 1.0
          },
          {
            "instant": 2,
            "value": 3.0
          }
        ]
        "#);
    }

    #[test]
    fn sample_outside_the_program_fails() {
        let (_temp, path) = program_file();
        let args = SampleArgs {
            program: path,
            channel: "x".to_string(),
            at: vec![4],
            json: false,
        };
        assert!(run(&mut Vec::new(), &args).is_err());
    }
}
