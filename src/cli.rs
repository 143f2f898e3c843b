use std::path::PathBuf;

use clap::{ArgGroup, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "vizchat", about = "Chat with a local LLM and run the chart code it writes", version)]
#[command(group(ArgGroup::new("mode").args(["repl", "exec"]).multiple(false)))]
#[command(group(ArgGroup::new("md_switch").args(["md", "no_md"]).multiple(false)))]
pub struct Cli {
    /// The request to send. Piped stdin is prepended to it.
    #[arg(value_name = "PROMPT")]
    pub prompt: Option<String>,

    /// Model identifier served by the completion endpoint.
    #[arg(long)]
    pub model: Option<String>,

    /// Randomness of generated output.
    #[arg(long, default_value_t = 0.0, value_parser = clap::value_parser!(f32))]
    pub temperature: f32,

    /// Limits highest probable tokens (words).
    #[arg(long = "top-p", default_value_t = 1.0, value_parser = clap::value_parser!(f32))]
    pub top_p: f32,

    /// Maximum tokens in the reply (endpoint default when omitted).
    #[arg(long = "max-tokens")]
    pub max_tokens: Option<u32>,

    /// Attach a CSV file; its table dump is appended to the request.
    #[arg(long, value_name = "FILE")]
    pub csv: Option<PathBuf>,

    /// Execute the extracted code block after the reply (one-shot mode).
    #[arg(long)]
    pub run: bool,

    /// Start the interactive chat (default when no prompt is given on a terminal).
    #[arg(long)]
    pub repl: bool,

    /// Run a local Python file in the sandbox and print the result.
    #[arg(long, value_name = "FILE")]
    pub exec: Option<PathBuf>,

    /// System role name (file under the roles directory).
    #[arg(long)]
    pub role: Option<String>,

    /// Create role from the prompt text or stdin.
    #[arg(long = "create-role", value_name = "NAME")]
    pub create_role: Option<String>,

    /// Show role.
    #[arg(long = "show-role", value_name = "NAME")]
    pub show_role: Option<String>,

    /// List roles.
    #[arg(short = 'r', long = "list-roles", visible_alias = "lr")]
    pub list_roles: bool,

    /// Prettify Markdown output.
    #[arg(long)]
    pub md: bool,
    /// Disable Markdown prettifying.
    #[arg(long = "no-md")]
    pub no_md: bool,

    /// Python interpreter used by the sandbox.
    #[arg(long, value_name = "PATH")]
    pub python: Option<String>,

    /// Wall-clock limit for one code run, in seconds.
    #[arg(long = "exec-timeout", value_name = "SECS")]
    pub exec_timeout: Option<u64>,

    /// More logging (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
