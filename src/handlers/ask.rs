//! One-shot turn: send the prompt, print reply and code, optionally run it.

use std::path::Path;

use anyhow::{bail, Result};
use owo_colors::OwoColorize;

use crate::{printer, session::Session};

pub async fn run(
    session: &mut Session,
    prompt: &str,
    csv: Option<&Path>,
    execute: bool,
    markdown: bool,
) -> Result<()> {
    if prompt.trim().is_empty() {
        bail!("empty prompt");
    }
    if let Some(path) = csv {
        let (rows, cols) = session.attach_dataset(path)?.shape();
        tracing::info!(path = %path.display(), rows, cols, "dataset attached");
    }

    let turn = session.submit(prompt).await?;
    printer::print_turn(&turn, markdown);

    if execute {
        if session.current_code().is_none() {
            eprintln!("{}", "No code block in the reply; nothing to run.".yellow());
            return Ok(());
        }
        let run = session.run_code().await?;
        printer::print_run(run);
    }
    Ok(())
}
