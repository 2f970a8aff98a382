//! Program files: the JSON encoding of a timeline snapshot.

use std::path::Path;

use anyhow::{Context, Result};
use wf_core::{ProgramSnapshot, Timeline};

use crate::Config;

/// A fresh program shaped by the configuration.
pub fn create(config: &Config) -> Result<Timeline> {
    Timeline::with_channels(config.end_instant, &config.channels, config.initial_value)
        .context("invalid program settings in configuration")
}

/// Reads and fully validates a program file.
pub fn load(path: &Path) -> Result<Timeline> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let snapshot: ProgramSnapshot = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let timeline = Timeline::from_snapshot(&snapshot)
        .with_context(|| format!("invalid program {}", path.display()))?;
    tracing::debug!(path = %path.display(), channels = timeline.channels().len(), "loaded program");
    Ok(timeline)
}

pub fn save(path: &Path, timeline: &Timeline) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut json = serde_json::to_string_pretty(&timeline.snapshot())
        .context("failed to encode program")?;
    json.push('\n');
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), "saved program");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_program_loads_back() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested/program.json");
        let mut timeline = create(&Config::default()).unwrap();
        timeline.insert_time("mid", 250).unwrap();

        save(&path, &timeline).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.snapshot(), timeline.snapshot());
    }

    #[test]
    fn load_reports_the_path() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse"));
    }

    #[test]
    fn create_rejects_a_non_positive_length() {
        let config = Config {
            end_instant: 0,
            ..Config::default()
        };
        assert!(create(&config).is_err());
    }
}
