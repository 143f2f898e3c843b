//! Conversation context: transcript, attached dataset, current code block and
//! last execution output for one chat. Handlers receive it explicitly.

use std::{
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{anyhow, bail, Context, Result};

use crate::{
    config::Config,
    dataset::{compose_prompt, DataTable},
    extract::{extract_code_block, has_fence, CodeBlock, SOURCE_LANGUAGE},
    llm::{ChatMessage, ChatOptions, LlmClient, Role},
    sandbox::{Attachment, ExecutionRequest, ExecutionResult, Sandbox},
    transcript::Transcript,
};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Show only the typed text in the chat view, not the appended table dump.
    pub hide_data_dump: bool,
    pub chart_dir: PathBuf,
}

impl SessionSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            hide_data_dump: cfg.get_bool("HIDE_DATA_DUMP"),
            chart_dir: cfg.chart_output_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub reply: String,
    /// Set when the reply carried a fence; the block became the current code.
    pub code: Option<CodeBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub result: ExecutionResult,
    pub chart_path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct Session {
    client: LlmClient,
    sandbox: Option<Sandbox>,
    options: ChatOptions,
    settings: SessionSettings,
    transcript: Transcript,
    dataset: Option<DataTable>,
    current_code: Option<CodeBlock>,
    last_run: Option<RunOutcome>,
    charts_written: usize,
}

impl Session {
    pub fn new(
        client: LlmClient,
        sandbox: Option<Sandbox>,
        options: ChatOptions,
        settings: SessionSettings,
    ) -> Self {
        let transcript = Transcript::with_system(options.system_prompt.clone());
        Self {
            client,
            sandbox,
            options,
            settings,
            transcript,
            dataset: None,
            current_code: None,
            last_run: None,
            charts_written: 0,
        }
    }

    pub fn client(&self) -> &LlmClient {
        &self.client
    }

    pub fn options(&self) -> &ChatOptions {
        &self.options
    }

    pub fn sandbox(&self) -> Result<&Sandbox> {
        self.sandbox
            .as_ref()
            .ok_or_else(|| anyhow!("code execution unavailable: no Python interpreter configured (set PYTHON_PATH)"))
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn dataset(&self) -> Option<&DataTable> {
        self.dataset.as_ref()
    }

    pub fn current_code(&self) -> Option<&CodeBlock> {
        self.current_code.as_ref()
    }

    pub fn last_run(&self) -> Option<&RunOutcome> {
        self.last_run.as_ref()
    }

    pub fn attach_dataset(&mut self, path: &Path) -> Result<&DataTable> {
        let table = DataTable::from_csv_path(path)?;
        Ok(self.dataset.insert(table))
    }

    pub fn detach_dataset(&mut self) -> Option<DataTable> {
        self.dataset.take()
    }

    /// Append the user message and return the messages to send.
    pub fn begin_turn(&mut self, input: &str) -> Vec<ChatMessage> {
        self.transcript.ensure_system(&self.options.system_prompt);
        let text = compose_prompt(input, self.dataset.as_ref());
        let mut message = ChatMessage::new(Role::User, text);
        if self.settings.hide_data_dump && self.dataset.is_some() {
            message = message.with_display(input);
        }
        self.transcript.push(message);
        self.transcript.messages().to_vec()
    }

    /// Record the reply. A reply without a fence leaves the current code alone.
    pub fn finish_turn(&mut self, reply: String) -> TurnOutcome {
        self.transcript.push(ChatMessage::new(Role::Assistant, reply.clone()));
        let code = has_fence(&reply).then(|| extract_code_block(&reply, SOURCE_LANGUAGE));
        if let Some(block) = &code {
            tracing::debug!(chars = block.as_str().len(), "code block extracted");
            self.current_code = Some(block.clone());
        }
        TurnOutcome { reply, code }
    }

    pub async fn submit(&mut self, input: &str) -> Result<TurnOutcome> {
        let messages = self.begin_turn(input);
        let reply = self
            .client
            .complete(&messages, &self.options)
            .await
            .context("completion request failed")?;
        Ok(self.finish_turn(reply))
    }

    pub fn prepare_run(&self) -> Result<ExecutionRequest> {
        let Some(code) = &self.current_code else {
            bail!("no code block to run yet");
        };
        let dataset = self.dataset.as_ref().and_then(|t| {
            t.source.as_ref().map(|source| Attachment {
                source: source.clone(),
                file_name: t.name.clone(),
            })
        });
        Ok(ExecutionRequest { code: code.as_str().to_string(), dataset })
    }

    /// Store the result; a captured chart is written to disk and shown in the chat.
    pub fn record_execution(&mut self, result: ExecutionResult) -> Result<&RunOutcome> {
        let chart_path = match &result.rendered_image {
            Some(png) => {
                let path = self.write_chart(png)?;
                self.transcript.push(
                    ChatMessage::image(Role::Assistant, png.clone())
                        .with_display(format!("[chart saved to {}]", path.display())),
                );
                Some(path)
            }
            None => None,
        };
        Ok(self.last_run.insert(RunOutcome { result, chart_path }))
    }

    pub async fn run_code(&mut self) -> Result<&RunOutcome> {
        let request = self.prepare_run()?;
        let result = self.sandbox()?.execute(&request).await?;
        self.record_execution(result)
    }

    /// Start the conversation over; the dataset stays attached.
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.current_code = None;
        self.last_run = None;
    }

    fn write_chart(&mut self, png: &[u8]) -> Result<PathBuf> {
        let dir = &self.settings.chart_dir;
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        self.charts_written += 1;
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let path = dir.join(format!("chart-{}-{}.png", stamp, self.charts_written));
        fs::write(&path, png).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "chart saved");
        Ok(path)
    }
}
