//! Run command: a line-oriented console for editing programs.
//!
//! Each line is one command; blank lines and `#` comments are skipped. The
//! first failing line aborts the script, and the program is written only
//! after every line succeeded.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;

use wf_core::{INITIAL_QUANTITY, Timeline};

use crate::commands::show;
use crate::{Config, program};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Script to execute, or `-` for stdin.
    pub script: PathBuf,

    /// Program to edit. A fresh program from the configuration otherwise.
    #[arg(long)]
    pub program: Option<PathBuf>,

    /// Where to write the result. Defaults to `--program`.
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Ignore rejected moves and value edits instead of failing.
    #[arg(long)]
    pub lenient: bool,
}

/// Console commands and their arguments.
const USAGE: &[(&str, &str)] = &[
    ("channel", "channel <name> [quantity]"),
    ("quantity", "quantity <name> <value | expression>"),
    ("time", "time <name> <ns>"),
    ("delete-time", "delete-time <name>"),
    ("set-time", "set-time <name> <ns>"),
    ("rename-time", "rename-time <name> <new-name>"),
    ("end", "end <ns>"),
    ("value", "value <quantity> <value>"),
    ("expr", "expr <quantity> <expression>"),
    ("constant", "constant <quantity>"),
    ("assign", "assign <channel> <interval> <quantity>"),
    ("drag", "drag <channel> <interval> <value>"),
    ("fork", "fork <channel> <interval>"),
    ("detach", "detach <channel> <interval> <new-quantity>"),
    ("merge", "merge <keep> <absorb>"),
    ("rename-quantity", "rename-quantity <name> <new-name>"),
    ("rename-interval", "rename-interval <channel> <name> <new-name>"),
    ("lock", "lock marker <name> | quantity <name> | interval <channel> <name>"),
    ("unlock", "unlock marker <name> | quantity <name> | interval <channel> <name>"),
    ("var", "var <name> <value>"),
    ("unset", "unset <name>"),
    ("gc", "gc"),
    ("sample", "sample <channel> <ns>"),
    ("show", "show"),
    ("help", "help"),
];

pub fn run<W: Write>(writer: &mut W, args: &RunArgs, config: &Config) -> Result<()> {
    let script = read_script(&args.script)?;
    let mut timeline = match &args.program {
        Some(path) => program::load(path)?,
        None => program::create(config)?,
    };

    let strict = config.strict && !args.lenient;
    execute_script(writer, &mut timeline, &script, strict)?;

    if let Some(path) = args.save.as_ref().or(args.program.as_ref()) {
        program::save(path, &timeline)?;
    }
    Ok(())
}

fn read_script(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("failed to read script from stdin")
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))
    }
}

/// Runs every line of `script`, stopping at the first failure.
pub fn execute_script<W: Write>(
    writer: &mut W,
    timeline: &mut Timeline,
    script: &str,
    strict: bool,
) -> Result<()> {
    for (index, raw) in script.lines().enumerate() {
        let number = index + 1;
        let line = raw.split_once('#').map_or(raw, |(code, _)| code).trim();
        if line.is_empty() {
            continue;
        }

        let words: Vec<&str> = line.split_whitespace().collect();
        execute(writer, timeline, &words, strict).with_context(|| format!("line {number}: {line}"))?;
        for change in timeline.drain_changes() {
            tracing::trace!(line = number, ?change, "timeline changed");
        }
    }
    tracing::debug!(revision = timeline.revision(), "script finished");
    Ok(())
}

fn execute<W: Write>(
    writer: &mut W,
    timeline: &mut Timeline,
    words: &[&str],
    strict: bool,
) -> Result<()> {
    match words {
        [] => {}

        // === Structure ===
        ["channel", name] => timeline.add_channel(name, INITIAL_QUANTITY)?,
        ["channel", name, quantity] => timeline.add_channel(name, quantity)?,
        ["quantity", name, value] if value.parse::<f64>().is_ok() => {
            timeline.add_constant(name, number(value, "value")?)?;
        }
        ["quantity", name, expression @ ..] if !expression.is_empty() => {
            timeline.add_function(name, &expression.join(" "))?;
        }

        // === Markers ===
        ["time", name, instant] => {
            timeline.insert_time(name, number(instant, "instant")?)?;
        }
        ["delete-time", name] => timeline.delete_time(name)?,
        ["set-time", name, instant] => {
            if !timeline.set_time(name, number(instant, "instant")?, strict)? {
                writeln!(writer, "ignored: {}", words.join(" "))?;
            }
        }
        ["rename-time", name, new_name] => timeline.rename_marker(name, new_name)?,
        ["end", instant] => timeline.set_end_instant(number(instant, "instant")?)?,

        // === Quantities ===
        ["value", name, value] => {
            if !timeline.set_quantity_value(name, number(value, "value")?, strict)? {
                writeln!(writer, "ignored: {}", words.join(" "))?;
            }
        }
        ["expr", name, expression @ ..] if !expression.is_empty() => {
            timeline.set_quantity_expression(name, &expression.join(" "))?;
        }
        ["constant", name] => timeline.set_constant_mode(name)?,
        ["rename-quantity", name, new_name] => timeline.rename_quantity(name, new_name)?,
        ["merge", keep, absorb] => {
            let repointed = timeline.merge_quantities(keep, absorb)?;
            writeln!(writer, "merged {absorb} into {keep}: {repointed} interval(s) repointed")?;
        }
        ["gc"] => {
            let collected = timeline.garbage_collect_quantities();
            if collected.is_empty() {
                writeln!(writer, "nothing to collect")?;
            } else {
                writeln!(writer, "collected {}", collected.join(", "))?;
            }
        }

        // === Intervals ===
        ["assign", channel, interval, quantity] => {
            timeline.assign_value(channel, interval, quantity)?;
        }
        ["drag", channel, interval, value] => {
            timeline.drag_value(channel, interval, number(value, "value")?)?;
        }
        ["fork", channel, interval] => match timeline.fork_if_shared(channel, interval)? {
            Some(id) => writeln!(writer, "forked {}", timeline.quantities().name_of(id))?,
            None => writeln!(writer, "{channel}/{interval} is not shared")?,
        },
        ["detach", channel, interval, new_name] => {
            timeline.detach_value(channel, interval, new_name)?;
        }
        ["rename-interval", channel, name, new_name] => {
            timeline.rename_interval(channel, name, new_name)?;
        }

        // === Locks ===
        [verb @ ("lock" | "unlock"), target @ ..] => {
            let locked = *verb == "lock";
            match target {
                ["marker", name] => timeline.set_marker_locked(name, locked)?,
                ["quantity", name] => timeline.set_quantity_locked(name, locked)?,
                ["interval", channel, name] => timeline.set_interval_locked(channel, name, locked)?,
                _ => bail!("usage: {}", usage(verb).unwrap_or_default()),
            }
        }

        // === Variables ===
        ["var", name, value] => timeline.set_variable(name, number(value, "value")?)?,
        ["unset", name] => {
            timeline.remove_variable(name)?;
        }

        // === Inspection ===
        ["sample", channel, instant] => {
            let value = timeline.value_at(channel, number(instant, "instant")?)?;
            writeln!(writer, "{channel} @ {instant}ns = {value}")?;
        }
        ["show"] => show::render(writer, timeline)?,
        ["help"] => {
            for (_, line) in USAGE {
                writeln!(writer, "{line}")?;
            }
        }

        [command, ..] => match usage(command) {
            Some(usage) => bail!("usage: {usage}"),
            None => bail!("unknown command {command:?} (try `help`)"),
        },
    }
    Ok(())
}

fn usage(command: &str) -> Option<&'static str> {
    USAGE
        .iter()
        .find(|(name, _)| *name == command)
        .map(|(_, usage)| *usage)
}

fn number<T>(word: &str, what: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    word.parse()
        .with_context(|| format!("invalid {what}: {word:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    fn console(script: &str, strict: bool) -> (Timeline, Result<String>) {
        let mut timeline = program::create(&Config::default()).unwrap();
        let mut output = Vec::new();
        let result = execute_script(&mut output, &mut timeline, script, strict)
            .map(|()| String::from_utf8(output).unwrap());
        (timeline, result)
    }

    #[test]
    fn script_edits_and_inspects_a_program() {
        let script = "
            # split the trace and give the tail its own value
            time mid 400
            quantity A 5
            assign trace initial_b A
            drag trace initial_a 2   # initial is no longer shared
            sample trace 100
            sample trace 500
            show
        ";
        let (_, output) = console(script, true);
        assert_snapshot!(output.unwrap(), @r"
        trace @ 100ns = 2
        trace @ 500ns = 5
        markers:
          start @ 0ns locked
          mid @ 400ns
          end @ 1000ns locked
        quantities:
          initial = 2 (used by 1)
          A = 5 (used by 1)
        channel trace (scale 0..6.25):
          initial_a [start, mid) = initial
          initial_b [mid, end) = A
        ");
    }

    #[test]
    fn fork_merge_and_gc_report_their_effect() {
        let script = "
            channel aux
            fork trace initial
            fork trace initial
            merge initial initial1
            gc
        ";
        let (timeline, output) = console(script, true);
        assert_snapshot!(output.unwrap(), @r"
        forked initial1
        trace/initial is not shared
        merged initial1 into initial: 1 interval(s) repointed
        nothing to collect
        ");
        assert_eq!(timeline.quantities().len(), 1);
    }

    #[test]
    fn expressions_follow_variables_and_the_end_marker() {
        let script = "
            var amp 3
            expr initial amp * (t / end)
            end 2000
            sample trace 1000
        ";
        let (_, output) = console(script, true);
        assert_snapshot!(output.unwrap(), @"trace @ 1000ns = 1.5");
    }

    #[test]
    fn failing_line_reports_its_number() {
        let script = "time mid 400\n\ndelete-time start\ntime late 900\n";
        let (timeline, result) = console(script, true);
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "line 3: delete-time start");
        // earlier lines ran, later ones did not
        assert!(timeline.marker_named("mid").is_ok());
        assert!(timeline.marker_named("late").is_err());
    }

    #[test]
    fn lenient_scripts_skip_rejected_edits() {
        let script = "
            time mid 400
            lock marker mid
            set-time mid 300
            set-time mid 300
        ";
        let (_, result) = console(script, true);
        assert!(result.unwrap_err().to_string().starts_with("line 4"));

        let (timeline, output) = console(script, false);
        assert_snapshot!(output.unwrap(), @r"
        ignored: set-time mid 300
        ignored: set-time mid 300
        ");
        assert_eq!(timeline.marker_named("mid").unwrap().instant(), 400);
    }

    #[test]
    fn malformed_lines_show_usage() {
        let (_, result) = console("drag trace", true);
        assert_eq!(
            format!("{:#}", result.unwrap_err()),
            "line 1: drag trace: usage: drag <channel> <interval> <value>"
        );

        let (_, result) = console("lock interval trace", true);
        assert!(format!("{:#}", result.unwrap_err()).contains("usage: lock marker"));

        let (_, result) = console("explode", true);
        assert!(format!("{:#}", result.unwrap_err()).contains("unknown command \"explode\""));

        let (_, result) = console("time mid soon", true);
        assert!(format!("{:#}", result.unwrap_err()).contains("invalid instant: \"soon\""));
    }

    #[test]
    fn run_saves_only_after_success() {
        let temp = tempfile::tempdir().unwrap();
        let good = temp.path().join("good.wf");
        let bad = temp.path().join("bad.wf");
        let saved = temp.path().join("program.json");
        std::fs::write(&good, "time mid 400\n").unwrap();
        std::fs::write(&bad, "time late 900\nvalue ghost 1\n").unwrap();

        let args = RunArgs {
            script: bad,
            program: None,
            save: Some(saved.clone()),
            lenient: false,
        };
        assert!(run(&mut Vec::new(), &args, &Config::default()).is_err());
        assert!(!saved.exists());

        let args = RunArgs {
            script: good,
            program: None,
            save: Some(saved.clone()),
            lenient: false,
        };
        run(&mut Vec::new(), &args, &Config::default()).unwrap();
        let timeline = program::load(&saved).unwrap();
        assert_eq!(timeline.marker_named("mid").unwrap().instant(), 400);
    }
}
