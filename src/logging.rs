//! Tracing subscriber setup.
//!
//! One-shot runs log to stderr. The TUI owns the terminal, so it logs to a file.

use std::{fs, sync::Mutex};

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File,
}

pub fn init(cfg: &Config, verbosity: u8, target: LogTarget) -> Result<()> {
    let filter = build_filter(cfg, verbosity);

    match target {
        LogTarget::Stderr => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogTarget::File => {
            let path = cfg.log_file_path();
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating log directory {}", dir.display()))?;
            }
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
    }
    Ok(())
}

/// `RUST_LOG` wins; otherwise `LOG_LEVEL` raised one step per `-v`.
fn build_filter(cfg: &Config, verbosity: u8) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let base = cfg.get("LOG_LEVEL").unwrap_or_else(|| "warn".into());
    EnvFilter::new(raise_level(&base, verbosity))
}

fn raise_level(base: &str, verbosity: u8) -> String {
    const LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
    let start = LEVELS
        .iter()
        .position(|l| l.eq_ignore_ascii_case(base.trim()))
        .unwrap_or(1);
    let idx = (start + verbosity as usize).min(LEVELS.len() - 1);
    format!("vizchat={}", LEVELS[idx])
}
