//! Python interpreter discovery and process bootstrap.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use super::SandboxError;

const CANDIDATES: &[&str] = &["python3", "python"];

/// `configured` is a path, a program name on `PATH`, or `auto`/unset.
pub fn locate_interpreter(configured: Option<&str>) -> Result<PathBuf, SandboxError> {
    match configured.map(str::trim).filter(|c| !c.is_empty() && *c != "auto") {
        Some(c) => {
            let as_path = Path::new(c);
            if as_path.components().count() > 1 {
                if as_path.is_file() {
                    return Ok(as_path.to_path_buf());
                }
                return Err(SandboxError::InterpreterNotFound(c.to_string()));
            }
            which::which(c).map_err(|_| SandboxError::InterpreterNotFound(c.to_string()))
        }
        None => CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| SandboxError::InterpreterNotFound(CANDIDATES.join(", "))),
    }
}

/// Base command: optional wrapper prefix, then the interpreter without bytecode writes.
pub fn command(python: &Path, wrapper: &[String]) -> Command {
    let mut cmd = match wrapper.split_first() {
        Some((program, args)) => {
            let mut c = Command::new(program);
            c.args(args).arg(python);
            c
        }
        None => Command::new(python),
    };
    cmd.arg("-B");
    cmd
}

/// Wrapper string from config, split on whitespace (`unshare -rn`).
pub fn parse_wrapper(raw: Option<&str>) -> Vec<String> {
    raw.map(|w| w.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}
