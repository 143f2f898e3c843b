//! Execution sandbox: runs generated code in a throwaway Python process.
//!
//! Each run gets a fresh scratch directory, a cleared environment, rlimits
//! applied by the harness, and a wall-clock timeout enforced here. Nothing is
//! shared between runs.

use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use serde::Deserialize;
use thiserror::Error;
use tokio::time::timeout;

use crate::config::Config;

pub mod python;

const HARNESS: &str = include_str!("harness.py");
const HARNESS_FILE: &str = "vizchat_harness.py";
const SNIPPET_FILE: &str = "snippet.py";
const REPORT_FILE: &str = "vizchat_report.json";
const CHART_FILE: &str = "vizchat_chart.png";
const MAX_STDOUT_BYTES: usize = 64 * 1024;
const MAX_CHART_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    /// PNG of the open matplotlib figure, only when one was drawn.
    pub rendered_image: Option<Vec<u8>>,
    pub result_value: Option<String>,
    pub error_trace: Option<String>,
    pub stdout: String,
}

impl ExecutionResult {
    fn failure(trace: String, stdout: String) -> Self {
        Self {
            status: ExecutionStatus::Error,
            rendered_image: None,
            result_value: None,
            error_trace: Some(trace),
            stdout,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    pub fn summary(&self) -> String {
        match self.status {
            ExecutionStatus::Success => format!(
                "Execution Successful. Output: {}",
                self.result_value.as_deref().unwrap_or("No output variable defined")
            ),
            ExecutionStatus::Error => format!(
                "Error during execution:\n{}",
                self.error_trace.as_deref().unwrap_or_default()
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    pub wall_time: Duration,
    /// 0 disables the limit.
    pub cpu_seconds: u64,
    /// 0 disables the limit.
    pub memory_mb: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self { wall_time: Duration::from_secs(30), cpu_seconds: 20, memory_mb: 1024 }
    }
}

/// A file copied into the scratch directory under `file_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub source: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub code: String,
    /// Also preloaded as `dataframe` when pandas is importable.
    pub dataset: Option<Attachment>,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into(), dataset: None }
    }
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("no Python interpreter found (tried {0}); set PYTHON_PATH")]
    InterpreterNotFound(String),

    #[error("failed to prepare sandbox directory: {0}")]
    Workspace(#[source] io::Error),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("sandbox I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct HarnessReport {
    status: ExecutionStatus,
    result: Option<String>,
    error_type: Option<String>,
    traceback: Option<String>,
    /// Set when the harness saved a figure to `CHART_FILE`.
    #[serde(default)]
    chart: bool,
    dataset_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    python: PathBuf,
    wrapper: Vec<String>,
    limits: SandboxLimits,
}

impl Sandbox {
    pub fn from_config(cfg: &Config) -> Result<Self, SandboxError> {
        let python = python::locate_interpreter(cfg.get("PYTHON_PATH").as_deref())?;
        let defaults = SandboxLimits::default();
        let limits = SandboxLimits {
            wall_time: cfg.get_secs("EXEC_TIMEOUT").unwrap_or(defaults.wall_time),
            cpu_seconds: cfg.get_u64("EXEC_CPU_SECONDS").unwrap_or(defaults.cpu_seconds),
            memory_mb: cfg.get_u64("EXEC_MEMORY_MB").unwrap_or(defaults.memory_mb),
        };
        let wrapper = python::parse_wrapper(cfg.get("EXEC_WRAPPER").as_deref());
        tracing::debug!(python = %python.display(), ?limits, ?wrapper, "sandbox configured");
        Ok(Self::new(python, limits).with_wrapper(wrapper))
    }

    pub fn new(python: PathBuf, limits: SandboxLimits) -> Self {
        Self { python, wrapper: Vec::new(), limits }
    }

    pub fn with_wrapper(mut self, wrapper: Vec<String>) -> Self {
        self.wrapper = wrapper;
        self
    }

    pub fn python(&self) -> &Path {
        &self.python
    }

    /// Run one snippet. Code failures come back as an error `ExecutionResult`;
    /// only problems starting the interpreter are `Err`.
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, SandboxError> {
        let workdir = tempfile::Builder::new()
            .prefix("vizchat-run-")
            .tempdir()
            .map_err(SandboxError::Workspace)?;
        let dir = workdir.path();
        fs::write(dir.join(HARNESS_FILE), HARNESS).map_err(SandboxError::Workspace)?;
        fs::write(dir.join(SNIPPET_FILE), &request.code).map_err(SandboxError::Workspace)?;
        if let Some(att) = &request.dataset {
            fs::copy(&att.source, dir.join(&att.file_name)).map_err(SandboxError::Workspace)?;
        }

        let mut cmd = python::command(&self.python, &self.wrapper);
        cmd.arg(HARNESS_FILE)
            .arg(SNIPPET_FILE)
            .current_dir(dir)
            .env_clear()
            .envs(self.environment(dir, request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let program = cmd.as_std().get_program().to_string_lossy().into_owned();
        let child = cmd
            .spawn()
            .map_err(|source| SandboxError::Spawn { program, source })?;

        let started = Instant::now();
        let output = match timeout(self.limits.wall_time, child.wait_with_output()).await {
            Ok(out) => out?,
            Err(_) => {
                tracing::warn!(limit = ?self.limits.wall_time, "execution timed out, child killed");
                return Ok(ExecutionResult::failure(
                    format!(
                        "TimeoutError: execution exceeded the {}s wall-clock limit",
                        self.limits.wall_time.as_secs()
                    ),
                    String::new(),
                ));
            }
        };
        tracing::info!(elapsed = ?started.elapsed(), status = %output.status, "execution finished");

        let mut stdout = truncate_utf8(&output.stdout, MAX_STDOUT_BYTES);
        let report = fs::read_to_string(dir.join(REPORT_FILE))
            .ok()
            .and_then(|text| serde_json::from_str::<HarnessReport>(&text).ok());

        let Some(report) = report else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Ok(ExecutionResult::failure(
                format!(
                    "ProcessExit: interpreter exited ({}) before reporting a result\n{}",
                    output.status,
                    stderr.trim_end()
                ),
                stdout,
            ));
        };

        if let Some(reason) = &report.dataset_error {
            tracing::warn!(%reason, "dataset not preloaded");
            stdout = format!("[dataframe not loaded: {}]\n{}", reason, stdout);
        }

        match report.status {
            ExecutionStatus::Success => {
                let rendered_image = if report.chart {
                    match read_chart(dir) {
                        Ok(png) => Some(png),
                        Err(e) => {
                            return Ok(ExecutionResult::failure(
                                format!("ChartError: could not read the saved figure: {}", e),
                                stdout,
                            ))
                        }
                    }
                } else {
                    None
                };
                Ok(ExecutionResult {
                    status: ExecutionStatus::Success,
                    rendered_image,
                    result_value: report.result,
                    error_trace: None,
                    stdout,
                })
            }
            ExecutionStatus::Error => {
                let trace = report
                    .traceback
                    .or(report.error_type)
                    .unwrap_or_else(|| "UnknownError".to_string());
                Ok(ExecutionResult::failure(trace, stdout))
            }
        }
    }

    fn environment(&self, dir: &Path, request: &ExecutionRequest) -> Vec<(String, String)> {
        let mpl_dir = dir.join("matplotlib");
        let mut env = vec![
            ("PATH".to_string(), std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".into())),
            ("HOME".to_string(), dir.to_string_lossy().into_owned()),
            ("MPLCONFIGDIR".to_string(), mpl_dir.to_string_lossy().into_owned()),
            ("MPLBACKEND".to_string(), "Agg".to_string()),
            ("PYTHONIOENCODING".to_string(), "utf-8".to_string()),
            ("VIZCHAT_CPU_SECONDS".to_string(), self.limits.cpu_seconds.to_string()),
            ("VIZCHAT_MEMORY_MB".to_string(), self.limits.memory_mb.to_string()),
        ];
        if let Some(att) = &request.dataset {
            env.push(("VIZCHAT_DATASET".to_string(), att.file_name.clone()));
        }
        if cfg!(windows) {
            if let Ok(root) = std::env::var("SYSTEMROOT") {
                env.push(("SYSTEMROOT".to_string(), root));
            }
        }
        env
    }
}

/// Read the fixed chart file. The child owns the directory, so refuse links
/// and anything that changed between the check and the open.
fn read_chart(dir: &Path) -> io::Result<Vec<u8>> {
    let path = dir.join(CHART_FILE);
    let meta = fs::symlink_metadata(&path)?;
    if !meta.file_type().is_file() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "not a regular file"));
    }
    if meta.len() > MAX_CHART_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "figure too large"));
    }
    let mut file = fs::File::open(&path)?;
    let opened = file.metadata()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if opened.dev() != meta.dev() || opened.ino() != meta.ino() || opened.nlink() != 1 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "figure file was swapped or linked"));
        }
    }
    let mut png = Vec::with_capacity(opened.len() as usize);
    (&mut file).take(MAX_CHART_BYTES).read_to_end(&mut png)?;
    Ok(png)
}

fn truncate_utf8(bytes: &[u8], max: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= max {
        return text.into_owned();
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}\n[output truncated]", &text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox_with(limits: SandboxLimits) -> Option<Sandbox> {
        match python::locate_interpreter(None) {
            Ok(p) => Some(Sandbox::new(p, limits)),
            Err(_) => {
                println!("Skipping: no Python interpreter on PATH");
                None
            }
        }
    }

    fn sandbox() -> Option<Sandbox> {
        sandbox_with(SandboxLimits::default())
    }

    fn has_matplotlib(python: &Path) -> bool {
        std::process::Command::new(python)
            .args(["-c", "import matplotlib"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[test]
    fn summary_formats() {
        let ok = ExecutionResult {
            status: ExecutionStatus::Success,
            rendered_image: None,
            result_value: Some("4".into()),
            error_trace: None,
            stdout: String::new(),
        };
        assert_eq!(ok.summary(), "Execution Successful. Output: 4");
        let none = ExecutionResult { result_value: None, ..ok };
        assert_eq!(none.summary(), "Execution Successful. Output: No output variable defined");
        let err = ExecutionResult::failure("Traceback...\nValueError: x".into(), String::new());
        assert_eq!(err.summary(), "Error during execution:\nTraceback...\nValueError: x");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "ééé".as_bytes();
        assert_eq!(truncate_utf8(s, 3), "é\n[output truncated]");
        assert_eq!(truncate_utf8(b"abc", 10), "abc");
    }

    #[tokio::test]
    async fn result_variable_is_reported() {
        let Some(sb) = sandbox() else { return };
        let res = sb.execute(&ExecutionRequest::new("result=2+2")).await.unwrap();
        assert!(res.is_success(), "{:?}", res);
        assert_eq!(res.summary(), "Execution Successful. Output: 4");
        assert!(res.rendered_image.is_none());
    }

    #[tokio::test]
    async fn missing_result_variable() {
        let Some(sb) = sandbox() else { return };
        let res = sb.execute(&ExecutionRequest::new("x = 1\nprint('hello')")).await.unwrap();
        assert_eq!(res.summary(), "Execution Successful. Output: No output variable defined");
        assert_eq!(res.stdout, "hello\n");
    }

    #[tokio::test]
    async fn raised_exception_names_its_type() {
        let Some(sb) = sandbox() else { return };
        let res = sb
            .execute(&ExecutionRequest::new("def f():\n    raise ValueError('bad column')\nf()"))
            .await
            .unwrap();
        assert_eq!(res.status, ExecutionStatus::Error);
        let trace = res.error_trace.as_deref().unwrap();
        assert!(trace.contains("ValueError"), "{trace}");
        assert!(trace.contains("bad column"));
        assert!(res.summary().starts_with("Error during execution:\n"));
    }

    #[tokio::test]
    async fn syntax_errors_and_exit_are_errors() {
        let Some(sb) = sandbox() else { return };
        let res = sb.execute(&ExecutionRequest::new("def (:")).await.unwrap();
        assert!(res.error_trace.unwrap().contains("SyntaxError"));

        let res = sb.execute(&ExecutionRequest::new("import sys\nsys.exit(3)")).await.unwrap();
        assert!(res.error_trace.unwrap().contains("SystemExit"));
    }

    #[tokio::test]
    async fn wall_clock_limit_kills_the_run() {
        let limits = SandboxLimits { wall_time: Duration::from_secs(1), ..SandboxLimits::default() };
        let Some(sb) = sandbox_with(limits) else { return };
        let started = Instant::now();
        let res = sb
            .execute(&ExecutionRequest::new("import time\ntime.sleep(30)\nresult = 1"))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(res.error_trace.unwrap().contains("TimeoutError"));
    }

    #[tokio::test]
    async fn runs_are_isolated_from_each_other_and_the_parent_env() {
        let Some(sb) = sandbox() else { return };
        sb.execute(&ExecutionRequest::new("leaked = 42")).await.unwrap();
        let res = sb
            .execute(&ExecutionRequest::new(
                "import os\nresult = ('leaked' in globals(), os.path.realpath(os.getcwd()) == os.path.realpath(os.environ['HOME']), os.environ.get('CARGO'))",
            ))
            .await
            .unwrap();
        assert_eq!(res.result_value.as_deref(), Some("(False, True, None)"));
    }

    #[tokio::test]
    async fn dataset_is_copied_into_the_run_directory() -> anyhow::Result<()> {
        let Some(sb) = sandbox() else { return Ok(()) };
        let dir = tempfile::tempdir()?;
        let csv_path = dir.path().join("upload.csv");
        fs::write(&csv_path, "month,total\njan,10\nfeb,12\n")?;
        let request = ExecutionRequest {
            code: "with open('sales.csv') as fh:\n    result = len(fh.read().splitlines())".into(),
            dataset: Some(Attachment { source: csv_path, file_name: "sales.csv".into() }),
        };
        let res = sb.execute(&request).await?;
        assert_eq!(res.result_value.as_deref(), Some("3"));
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn memory_limit_surfaces_as_memory_error() {
        let limits = SandboxLimits { memory_mb: 256, ..SandboxLimits::default() };
        let Some(sb) = sandbox_with(limits) else { return };
        let res = sb
            .execute(&ExecutionRequest::new("block = bytearray(2 * 1024 ** 3)"))
            .await
            .unwrap();
        assert_eq!(res.status, ExecutionStatus::Error);
        assert!(res.error_trace.unwrap().contains("MemoryError"));
    }

    #[tokio::test]
    async fn chart_captured_only_when_drawn() {
        let Some(sb) = sandbox() else { return };
        if !has_matplotlib(sb.python()) {
            println!("Skipping: matplotlib not installed");
            return;
        }
        let drawn = sb
            .execute(&ExecutionRequest::new(
                "import matplotlib.pyplot as plt\nplt.bar(['a', 'b'], [3, 5])\nresult = 'ok'",
            ))
            .await
            .unwrap();
        assert!(drawn.is_success(), "{:?}", drawn.error_trace);
        let png = drawn.rendered_image.expect("chart expected");
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);

        let idle = sb
            .execute(&ExecutionRequest::new("import matplotlib.pyplot as plt\nresult = 1"))
            .await
            .unwrap();
        assert!(idle.is_success());
        assert!(idle.rendered_image.is_none());
    }

    fn forge_report(report: &str, setup: &str) -> String {
        format!(
            "import atexit, json, os\n{setup}\ndef forge():\n    with open('vizchat_report.json', 'w') as fh:\n        fh.write({report:?})\natexit.register(forge)\nresult = 'real'"
        )
    }

    #[tokio::test]
    async fn rewritten_report_cannot_pull_host_files() -> anyhow::Result<()> {
        let Some(sb) = sandbox() else { return Ok(()) };
        let host = tempfile::tempdir()?;
        let secret = host.path().join("secret.txt");
        fs::write(&secret, "host-only")?;
        let secret = secret.display().to_string();

        let path_in_report = forge_report(
            &format!(r#"{{"status": "success", "result": "forged", "chart": {:?}}}"#, secret),
            "",
        );
        let symlinked = forge_report(
            r#"{"status": "success", "result": "forged", "chart": true}"#,
            &format!("atexit.register(lambda: os.symlink({:?}, 'vizchat_chart.png'))", secret),
        );
        let hard_linked = forge_report(
            r#"{"status": "success", "result": "forged", "chart": true}"#,
            &format!("atexit.register(lambda: os.link({:?}, 'vizchat_chart.png'))", secret),
        );

        for code in [path_in_report, symlinked, hard_linked] {
            let res = sb.execute(&ExecutionRequest::new(code)).await?;
            assert!(res.rendered_image.is_none(), "{:?}", res);
            assert_eq!(res.status, ExecutionStatus::Error, "{:?}", res);
        }
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_chart_is_an_execution_error() -> anyhow::Result<()> {
        let Some(sb) = sandbox() else { return Ok(()) };
        let code = forge_report(r#"{"status": "success", "result": "x", "chart": true}"#, "");
        let res = sb.execute(&ExecutionRequest::new(code)).await?;
        assert_eq!(res.status, ExecutionStatus::Error);
        assert!(res.error_trace.unwrap().starts_with("ChartError:"));
        Ok(())
    }

    #[tokio::test]
    async fn matplotlib_config_dir_is_fresh_per_run() {
        let Some(sb) = sandbox() else { return };
        let plant = "import os\nd = os.environ['MPLCONFIGDIR']\nos.makedirs(d, exist_ok=True)\nopen(os.path.join(d, 'matplotlibrc'), 'w').write('backend: foo')\nresult = d";
        let first = sb.execute(&ExecutionRequest::new(plant)).await.unwrap();
        assert!(first.is_success(), "{:?}", first);

        let check = "import os\nd = os.environ['MPLCONFIGDIR']\nresult = (d, os.path.exists(os.path.join(d, 'matplotlibrc')))";
        let second = sb.execute(&ExecutionRequest::new(check)).await.unwrap();
        let value = second.result_value.unwrap();
        assert!(value.ends_with("False)"), "{value}");
        assert!(!value.contains(first.result_value.as_deref().unwrap()));
    }

    fn has_pandas(python: &Path) -> bool {
        std::process::Command::new(python)
            .args(["-c", "import pandas"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn dataset_request(dir: &Path, csv: &str, code: &str) -> anyhow::Result<ExecutionRequest> {
        let source = dir.join("upload.csv");
        fs::write(&source, csv)?;
        Ok(ExecutionRequest {
            code: code.into(),
            dataset: Some(Attachment { source, file_name: "sales.csv".into() }),
        })
    }

    #[tokio::test]
    async fn dataset_is_preloaded_as_dataframe() -> anyhow::Result<()> {
        let Some(sb) = sandbox() else { return Ok(()) };
        if !has_pandas(sb.python()) {
            println!("Skipping: pandas not installed");
            return Ok(());
        }
        let dir = tempfile::tempdir()?;
        let request = dataset_request(dir.path(), "month,total\njan,10\nfeb,12\n", "result = len(dataframe)")?;
        let res = sb.execute(&request).await?;
        assert_eq!(res.result_value.as_deref(), Some("2"), "{:?}", res);
        Ok(())
    }

    #[tokio::test]
    async fn unparsable_dataset_is_reported() -> anyhow::Result<()> {
        let Some(sb) = sandbox() else { return Ok(()) };
        if !has_pandas(sb.python()) {
            println!("Skipping: pandas not installed");
            return Ok(());
        }
        let dir = tempfile::tempdir()?;
        let request = dataset_request(dir.path(), "", "result = 'dataframe' in globals()")?;
        let res = sb.execute(&request).await?;
        assert_eq!(res.result_value.as_deref(), Some("False"));
        assert!(res.stdout.starts_with("[dataframe not loaded: EmptyDataError"), "{}", res.stdout);
        Ok(())
    }

    #[tokio::test]
    async fn missing_wrapper_program_is_a_spawn_error() {
        let Some(sb) = sandbox() else { return };
        let sb = sb.with_wrapper(vec!["vizchat-no-such-wrapper".into()]);
        let err = sb.execute(&ExecutionRequest::new("result = 1")).await.unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { .. }));
    }
}
