use anyhow::Result;
use std::{fs, path::Path, process::Command};

fn vizchat(workdir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vizchat"));
    cmd.env("CHART_OUTPUT_PATH", workdir.join("charts"))
        .env("LOG_FILE", workdir.join("vizchat.log"))
        .env("EXEC_TIMEOUT", "20")
        .env_remove("PYTHON_PATH")
        .env_remove("EXEC_WRAPPER");
    cmd
}

fn python_available() -> bool {
    which::which("python3").or_else(|_| which::which("python")).is_ok()
}

#[test]
fn exec_prints_result_summary() -> Result<()> {
    if !python_available() {
        println!("python not found, skipping");
        return Ok(());
    }
    let dir = tempfile::tempdir()?;
    let script = dir.path().join("sum.py");
    fs::write(&script, "print('adding')\nresult = sum(range(5))\n")?;

    let output = vizchat(dir.path()).arg("--exec").arg(&script).output()?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("adding"));
    assert!(stdout.contains("Execution Successful. Output: 10"));
    Ok(())
}

#[test]
fn exec_failure_exits_nonzero_with_trace() -> Result<()> {
    if !python_available() {
        println!("python not found, skipping");
        return Ok(());
    }
    let dir = tempfile::tempdir()?;
    let script = dir.path().join("boom.py");
    fs::write(&script, "raise ValueError('bad column')\n")?;

    let output = vizchat(dir.path()).arg("--exec").arg(&script).output()?;
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Error during execution:"));
    assert!(stderr.contains("ValueError: bad column"));
    Ok(())
}

#[test]
fn exec_sees_attached_csv() -> Result<()> {
    if !python_available() {
        println!("python not found, skipping");
        return Ok(());
    }
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("sales.csv"), "month,total\njan,10\nfeb,12\n")?;
    let script = dir.path().join("lines.py");
    fs::write(&script, "result = len(open('sales.csv').read().splitlines())\n")?;

    let output = vizchat(dir.path())
        .arg("--exec")
        .arg(&script)
        .arg("--csv")
        .arg(dir.path().join("sales.csv"))
        .output()?;

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Output: 3"));
    Ok(())
}

#[test]
fn missing_script_is_an_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let output = vizchat(dir.path())
        .arg("--exec")
        .arg(dir.path().join("nope.py"))
        .output()?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope.py"));
    Ok(())
}
