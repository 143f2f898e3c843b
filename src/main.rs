mod cli;
mod config;
mod dataset;
mod extract;
mod handlers;
mod llm;
mod logging;
mod printer;
mod role;
mod sandbox;
mod session;
mod transcript;
mod tui;

use anyhow::{bail, Result};
use config::Config;
use handlers::SessionArgs;
use is_terminal::IsTerminal;
use logging::LogTarget;
use std::io::{self, Read};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // Load config; CLI flags override it
    let mut cfg = Config::load();
    if let Some(model) = &args.model {
        cfg.set("DEFAULT_MODEL", model.as_str());
    }
    if let Some(python) = &args.python {
        cfg.set("PYTHON_PATH", python.as_str());
    }
    if let Some(secs) = args.exec_timeout {
        cfg.set("EXEC_TIMEOUT", secs.to_string());
    }

    // stdin handling (pipe support)
    let stdin_is_tty = io::stdin().is_terminal();
    let mut prompt_from_stdin = String::new();
    if !stdin_is_tty && args.exec.is_none() {
        io::stdin().read_to_string(&mut prompt_from_stdin)?;
    }

    let arg_prompt = args.prompt.clone().unwrap_or_default();
    let prompt = match (prompt_from_stdin.trim().is_empty(), arg_prompt.is_empty()) {
        (false, false) => format!("{}\n\n{}", prompt_from_stdin.trim_end(), arg_prompt),
        (false, true) => prompt_from_stdin,
        _ => arg_prompt,
    };

    let role_shortcut = args.list_roles || args.show_role.is_some() || args.create_role.is_some();
    let tui_mode = args.repl
        || (!role_shortcut && args.exec.is_none() && prompt.trim().is_empty() && stdin_is_tty);

    logging::init(
        &cfg,
        args.verbose,
        if tui_mode { LogTarget::File } else { LogTarget::Stderr },
    )?;
    tracing::debug!(path = %cfg.config_path.display(), tui = tui_mode, "config loaded");

    // Role management shortcuts
    if args.list_roles {
        for p in role::list(&cfg) {
            println!("{}", p.display());
        }
        return Ok(());
    }
    if let Some(name) = &args.show_role {
        println!("{}", role::show(&cfg, name)?);
        return Ok(());
    }
    if let Some(name) = &args.create_role {
        if prompt.trim().is_empty() {
            bail!("Provide the role text as the prompt or via stdin");
        }
        let path = role::create(&cfg, name, &prompt)?;
        println!("Created/updated role: {}", path.display());
        return Ok(());
    }

    if let Some(script) = &args.exec {
        return handlers::exec::run(&cfg, script, args.csv.as_deref()).await;
    }

    let md = if args.no_md {
        false
    } else if args.md {
        true
    } else {
        cfg.get_bool("PRETTIFY_MARKDOWN")
    };

    let session_args = SessionArgs {
        temperature: args.temperature,
        top_p: args.top_p,
        max_tokens: args.max_tokens,
        role_name: args.role.as_deref(),
    };
    let mut session = handlers::build_session(&cfg, &session_args)?;

    if tui_mode {
        let init = (!prompt.trim().is_empty()).then_some(prompt.as_str());
        handlers::repl::run(session, init, args.csv.as_deref()).await
    } else {
        handlers::ask::run(&mut session, &prompt, args.csv.as_deref(), args.run, md).await
    }
}
