pub mod ask;
pub mod exec;
pub mod repl;

use anyhow::{Context, Result};

use crate::{
    config::Config,
    llm::{ChatOptions, LlmClient},
    role,
    sandbox::Sandbox,
    session::{Session, SessionSettings},
};

/// Per-run knobs that come from the command line rather than the rc file.
#[derive(Debug, Clone)]
pub struct SessionArgs<'a> {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: Option<u32>,
    pub role_name: Option<&'a str>,
}

pub fn build_session(cfg: &Config, args: &SessionArgs<'_>) -> Result<Session> {
    let client = LlmClient::from_config(cfg).context("building HTTP client")?;
    let sandbox = match Sandbox::from_config(cfg) {
        Ok(sandbox) => {
            tracing::debug!(python = %sandbox.python().display(), "code execution enabled");
            Some(sandbox)
        }
        Err(e) => {
            tracing::warn!(error = %e, "code execution disabled");
            None
        }
    };
    let options = ChatOptions {
        model: cfg
            .get("DEFAULT_MODEL")
            .unwrap_or_else(|| "llama3.2:1b".to_string()),
        temperature: args.temperature,
        top_p: args.top_p,
        max_tokens: args
            .max_tokens
            .or_else(|| cfg.get_u64("MAX_TOKENS").and_then(|n| u32::try_from(n).ok())),
        system_prompt: role::resolve_role_text(cfg, args.role_name)?,
        send_images: cfg.get_bool("SEND_CHART_IMAGES"),
    };
    tracing::info!(model = %options.model, endpoint = client.base_url(), "session ready");
    Ok(Session::new(client, sandbox, options, SessionSettings::from_config(cfg)))
}
