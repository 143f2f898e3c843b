//! `--exec FILE`: run a local script through the sandbox.

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use owo_colors::OwoColorize;

use crate::{
    config::Config,
    sandbox::{Attachment, ExecutionRequest, Sandbox},
};

pub async fn run(cfg: &Config, script: &Path, csv: Option<&Path>) -> Result<()> {
    let code = fs::read_to_string(script)
        .with_context(|| format!("reading {}", script.display()))?;
    let sandbox = Sandbox::from_config(cfg)?;

    let mut request = ExecutionRequest::new(code);
    if let Some(path) = csv {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("dataset path has no file name")?;
        request.dataset = Some(Attachment { source: path.to_path_buf(), file_name });
    }

    let result = sandbox.execute(&request).await?;
    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
    }
    if result.is_success() {
        println!("{}", result.summary().green());
        if let Some(png) = &result.rendered_image {
            let dir = cfg.chart_output_path();
            fs::create_dir_all(&dir)?;
            let stem = script
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "chart".into());
            let path = dir.join(format!("{}.png", stem));
            fs::write(&path, png)?;
            println!("{} {}", "chart:".magenta(), path.display());
        }
        Ok(())
    } else {
        eprintln!("{}", result.summary().red());
        bail!("script {} failed", script.display())
    }
}
