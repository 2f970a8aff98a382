//! New command for writing a fresh program.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;

use crate::{Config, program};

#[derive(Debug, Args)]
pub struct NewArgs {
    /// Where to write the program.
    pub program: PathBuf,
    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

pub fn run<W: Write>(writer: &mut W, args: &NewArgs, config: &Config) -> Result<()> {
    if args.program.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            args.program.display()
        );
    }

    let timeline = program::create(config)?;
    program::save(&args.program, &timeline)?;
    writeln!(
        writer,
        "Created program with {} channel(s) over {}ns",
        timeline.channels().len(),
        timeline.end_instant()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    #[test]
    fn new_writes_configured_channels() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("program.json");
        let config = Config {
            end_instant: 2000,
            channels: vec!["i".to_string(), "q".to_string()],
            ..Config::default()
        };
        let mut output = Vec::new();
        let args = NewArgs {
            program: path.clone(),
            force: false,
        };

        run(&mut output, &args, &config).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @"Created program with 2 channel(s) over 2000ns");

        let timeline = program::load(&path).unwrap();
        assert_eq!(timeline.end_instant(), 2000);
        assert_eq!(timeline.channels().len(), 2);
    }

    #[test]
    fn new_refuses_to_overwrite() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("program.json");
        std::fs::write(&path, "{}").unwrap();
        let args = NewArgs {
            program: path.clone(),
            force: false,
        };

        let err = run(&mut Vec::new(), &args, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");

        let args = NewArgs {
            program: path,
            force: true,
        };
        run(&mut Vec::new(), &args, &Config::default()).unwrap();
    }
}
