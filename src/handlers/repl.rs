//! REPL handler with TUI interface using Ratatui.

use std::{io, path::Path};

use anyhow::Result;
use is_terminal::IsTerminal;

use crate::{session::Session, tui::run_tui_repl};

pub async fn run(session: Session, init_prompt: Option<&str>, csv: Option<&Path>) -> Result<()> {
    if !io::stdout().is_terminal() {
        eprintln!("Warning: TUI mode not available in this environment. REPL requires a proper terminal.");
        eprintln!("Try running in a terminal instead of an IDE or redirected output.");
        return Err(anyhow::anyhow!("TUI mode requires a proper terminal environment"));
    }

    run_tui_repl(session, init_prompt, csv).await
}
