//! Replay a recorded event log through a fresh engine.

use anyhow::{Context, Result};
use optimist_engine::{Engine, EngineConfig, Event};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    pub config: Option<PathBuf>,
    pub json: bool,
    pub verbose: bool,
}

/// Outcome of feeding one log into an engine
#[derive(Debug, Default)]
pub struct ReplayReport {
    pub applied: usize,
    /// `(line number, message)` for every line that was rejected
    pub errors: Vec<(usize, String)>,
}

/// Dispatch every non-blank line of `log`; bad lines are recorded, not fatal
pub fn replay(engine: &mut Engine, log: &str) -> ReplayReport {
    let mut report = ReplayReport::default();

    for (index, line) in log.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let outcome = Event::from_json(line).and_then(|event| engine.dispatch(&event));
        match outcome {
            Ok(revision) => {
                debug!(line = line_no, revision = %revision, "applied event");
                report.applied += 1;
            }
            Err(err) => report.errors.push((line_no, err.to_string())),
        }
    }

    report
}

/// `optimist replay`
pub fn replay_log(events: &Path, opts: ReplayOptions) -> Result<()> {
    let config = match &opts.config {
        Some(path) => EngineConfig::from_file(path).context("Failed to load configuration")?,
        None => EngineConfig::default(),
    };
    let log = fs::read_to_string(events)
        .with_context(|| format!("Failed to read event log {}", events.display()))?;

    let mut engine = Engine::with_config(config);
    let report = replay(&mut engine, &log);
    info!(applied = report.applied, rejected = report.errors.len(), "replay finished");

    for (line, message) in &report.errors {
        eprintln!("line {line}: {message}");
    }

    let snapshot = engine.snapshot();
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{snapshot}");
    }

    if opts.verbose {
        eprintln!("{}", engine.metrics().snapshot());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_skips_blank_lines_and_counts_errors() {
        let log = r#"
{"type": "listener-response", "meta": "todos", "payload": {"data": [{"id": "t1"}]}}

not json
{"type": "mutate-start", "payload": {"args": {"collection": "todos", "doc": "t1", "data": {"done": true}}}}
"#;
        let mut engine = Engine::new();
        let report = replay(&mut engine, log);

        assert_eq!(report.applied, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, 4);
        assert!(engine.query("todos").is_some());
    }
}
