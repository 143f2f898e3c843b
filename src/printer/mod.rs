//! Printers: plain/colored text and markdown (termimad).

use owo_colors::OwoColorize;
use termimad::MadSkin;

use crate::session::{RunOutcome, TurnOutcome};

pub struct MarkdownPrinter {
    pub skin: MadSkin,
}

impl Default for MarkdownPrinter {
    fn default() -> Self {
        Self { skin: MadSkin::default() }
    }
}

impl MarkdownPrinter {
    pub fn print(&self, text: &str) {
        self.skin.print_text(text);
        println!();
    }
}

/// Reply, then the code the model returned (if any).
pub fn print_turn(turn: &TurnOutcome, markdown: bool) {
    if markdown {
        MarkdownPrinter::default().print(&turn.reply);
    } else {
        println!("{}", turn.reply);
    }
    if let Some(code) = &turn.code {
        println!("{}", "### Code returned by the model:".cyan());
        if code.is_empty() {
            println!("{}", "(empty code block)".dimmed());
        } else {
            println!("{}", code);
        }
    }
}

pub fn print_run(run: &RunOutcome) {
    println!("{}", "### Code Execution Output:".cyan());
    if !run.result.stdout.is_empty() {
        print!("{}", run.result.stdout);
        if !run.result.stdout.ends_with('\n') {
            println!();
        }
    }
    if run.result.is_success() {
        println!("{}", run.result.summary().green());
    } else {
        println!("{}", run.result.summary().red());
    }
    if let Some(path) = &run.chart_path {
        println!("{} {}", "chart:".magenta(), path.display());
    }
}
