//! TUI application state management.

use std::{collections::VecDeque, path::Path};

use anyhow::{bail, Result};

use crate::{
    llm::{ChatMessage, Role},
    sandbox::{ExecutionRequest, ExecutionResult, Sandbox},
    session::Session,
};

/// Input mode for the TUI
#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    /// Normal single-line input mode
    Normal,
    /// Multi-line input mode (activated by """)
    MultiLine,
}

/// Popup display state
#[derive(Debug, Clone, PartialEq)]
pub enum PopupState {
    None,
    ExecutionResult {
        summary: String,
        stdout: String,
        chart: Option<String>,
        success: bool,
    },
    Code(String),
    Error(String),
}

/// What a line typed into the input box asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    Send(String),
    AttachCsv(String),
    DetachCsv,
    Run,
    ShowCode,
    Clear,
    Help,
    Quit,
    Unknown(String),
}

impl InputAction {
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed == "exit()" {
            return Self::Quit;
        }
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Self::Send(input.to_string());
        };
        let (cmd, arg) = match rest.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (rest, ""),
        };
        match cmd {
            "csv" if arg.is_empty() => Self::DetachCsv,
            "csv" => Self::AttachCsv(arg.to_string()),
            "run" => Self::Run,
            "code" => Self::ShowCode,
            "clear" => Self::Clear,
            "help" => Self::Help,
            "exit" | "quit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Application state for the TUI
#[derive(Debug)]
pub struct App {
    pub session: Session,
    /// Input buffer
    pub input: String,
    /// Cursor position in input (byte index, always on a char boundary)
    pub input_cursor: usize,
    pub input_mode: InputMode,
    pub multiline_buffer: Vec<String>,
    pub input_history: Vec<String>,
    /// Current history index when navigating (None = new line)
    pub history_index: Option<usize>,
    /// A completion request is in flight
    pub is_waiting: bool,
    /// A sandbox run is in flight
    pub is_running: bool,
    /// Bumped by `/clear`; background results tagged with an older value are dropped
    pub generation: u64,
    /// Inputs typed while waiting for a reply
    pub message_queue: VecDeque<String>,
    pub status_message: String,
    pub show_help: bool,
    /// Lines scrolled up from the bottom of the chat
    pub chat_scroll_offset: usize,
    pub popup_state: PopupState,
}

impl App {
    pub fn new(session: Session) -> Self {
        let mut app = Self {
            session,
            input: String::new(),
            input_cursor: 0,
            input_mode: InputMode::Normal,
            multiline_buffer: Vec::new(),
            input_history: Vec::new(),
            history_index: None,
            is_waiting: false,
            is_running: false,
            generation: 0,
            message_queue: VecDeque::new(),
            status_message: String::new(),
            show_help: false,
            chat_scroll_offset: 0,
            popup_state: PopupState::None,
        };
        app.update_status_message();
        app
    }

    pub fn model(&self) -> &str {
        &self.session.options().model
    }

    /// Messages shown in the chat area (system prompt excluded)
    pub fn visible_messages(&self) -> Vec<&ChatMessage> {
        self.session.transcript().visible().collect()
    }

    /// Record the user message and hand back what must be sent.
    pub fn begin_turn(&mut self, input: &str) -> Vec<ChatMessage> {
        self.is_waiting = true;
        let messages = self.session.begin_turn(input);
        self.scroll_to_bottom();
        self.update_status_message();
        messages
    }

    /// Returns false when the reply belongs to a conversation cleared meanwhile.
    pub fn finish_turn(&mut self, generation: u64, reply: Result<String, String>) -> bool {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "dropping reply from cleared conversation");
            return false;
        }
        self.is_waiting = false;
        match reply {
            Ok(text) => {
                let turn = self.session.finish_turn(text);
                if turn.code.is_some() {
                    tracing::debug!("reply carried a code block");
                }
            }
            Err(e) => self.show_error(format!("Completion failed:\n{}", e)),
        }
        self.scroll_to_bottom();
        self.update_status_message();
        true
    }

    /// Snapshot what a background run needs.
    pub fn begin_run(&mut self) -> Result<(Sandbox, ExecutionRequest)> {
        if self.is_running {
            bail!("code is already running");
        }
        let request = self.session.prepare_run()?;
        let sandbox = self.session.sandbox()?.clone();
        self.is_running = true;
        self.update_status_message();
        Ok((sandbox, request))
    }

    pub fn finish_run(&mut self, generation: u64, outcome: Result<ExecutionResult, String>) {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "dropping run from cleared conversation");
            return;
        }
        self.is_running = false;
        let recorded = outcome.map_err(anyhow::Error::msg).and_then(|result| {
            self.session.record_execution(result).map(|run| PopupState::ExecutionResult {
                summary: run.result.summary(),
                stdout: run.result.stdout.clone(),
                chart: run.chart_path.as_ref().map(|p| p.display().to_string()),
                success: run.result.is_success(),
            })
        });
        match recorded {
            Ok(popup) => self.popup_state = popup,
            Err(e) => self.show_error(format!("Execution failed:\n{:#}", e)),
        }
        self.scroll_to_bottom();
        self.update_status_message();
    }

    pub fn attach_csv(&mut self, path: &Path) {
        match self.session.attach_dataset(path) {
            Ok(table) => {
                let (rows, cols) = table.shape();
                tracing::info!(path = %path.display(), rows, cols, "dataset attached");
            }
            Err(e) => self.show_error(format!("Could not load {}:\n{:#}", path.display(), e)),
        }
        self.update_status_message();
    }

    pub fn detach_csv(&mut self) {
        self.session.detach_dataset();
        self.update_status_message();
    }

    pub fn show_code(&mut self) {
        match self.session.current_code() {
            Some(code) => self.popup_state = PopupState::Code(code.to_string()),
            None => self.show_error("No code block yet. Ask for a chart first.".to_string()),
        }
    }

    pub fn reset(&mut self) {
        self.session.reset();
        self.generation += 1;
        self.is_waiting = false;
        self.is_running = false;
        self.message_queue.clear();
        self.scroll_to_bottom();
        self.update_status_message();
    }

    pub fn show_error(&mut self, message: String) {
        tracing::warn!(%message, "shown to user");
        self.popup_state = PopupState::Error(message);
    }

    /// Clear input buffers
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.input_cursor = 0;
        self.multiline_buffer.clear();
        self.input_mode = InputMode::Normal;
        self.history_index = None;
    }

    /// Get the current input text
    pub fn get_input_text(&self) -> String {
        match self.input_mode {
            InputMode::MultiLine => {
                let mut lines = self.multiline_buffer.clone();
                lines.push(self.input.clone());
                lines.join("\n")
            }
            InputMode::Normal => self.input.clone(),
        }
    }

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll_offset += 1;
    }

    pub fn scroll_down(&mut self) {
        self.chat_scroll_offset = self.chat_scroll_offset.saturating_sub(1);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll_offset = 0;
    }

    // ----- Input editing helpers -----
    pub fn move_cursor_left(&mut self) {
        if let Some((i, _)) = self.input[..self.input_cursor].char_indices().next_back() {
            self.input_cursor = i;
        }
    }

    pub fn move_cursor_right(&mut self) {
        if let Some(c) = self.input[self.input_cursor..].chars().next() {
            self.input_cursor += c.len_utf8();
        }
    }

    pub fn move_cursor_home(&mut self) {
        self.input_cursor = 0;
    }

    pub fn move_cursor_end(&mut self) {
        self.input_cursor = self.input.len();
    }

    pub fn insert_char(&mut self, c: char) {
        self.input.insert(self.input_cursor, c);
        self.input_cursor += c.len_utf8();
    }

    pub fn backspace(&mut self) {
        if self.input_cursor > 0 {
            self.move_cursor_left();
            self.input.remove(self.input_cursor);
        } else if self.input_mode == InputMode::MultiLine {
            // Merge with the previous line
            if let Some(previous) = self.multiline_buffer.pop() {
                self.input_cursor = previous.len();
                self.input = previous + &self.input;
            }
        }
    }

    pub fn delete(&mut self) {
        if self.input_cursor < self.input.len() {
            self.input.remove(self.input_cursor);
        }
    }

    pub fn push_history(&mut self, line: String) {
        if !line.trim().is_empty() && self.input_history.last() != Some(&line) {
            self.input_history.push(line);
        }
        self.history_index = None;
    }

    pub fn history_prev(&mut self) {
        if self.input_history.is_empty() {
            return;
        }
        let i = match self.history_index {
            None => self.input_history.len() - 1,
            Some(i) => i.saturating_sub(1),
        };
        self.history_index = Some(i);
        self.input = self.input_history[i].clone();
        self.move_cursor_end();
    }

    pub fn history_next(&mut self) {
        match self.history_index {
            None => {}
            Some(i) if i + 1 < self.input_history.len() => {
                self.history_index = Some(i + 1);
                self.input = self.input_history[i + 1].clone();
                self.move_cursor_end();
            }
            Some(_) => {
                self.history_index = None;
                self.input.clear();
                self.input_cursor = 0;
            }
        }
    }

    pub fn hide_popup(&mut self) {
        self.popup_state = PopupState::None;
    }

    pub fn is_popup_shown(&self) -> bool {
        self.popup_state != PopupState::None
    }

    /// Add message to queue if currently processing, otherwise return false to process immediately
    pub fn try_queue_message(&mut self, message: String) -> bool {
        if self.is_waiting {
            self.message_queue.push_back(message);
            self.update_status_message();
            true
        } else {
            false
        }
    }

    pub fn dequeue_message(&mut self) -> Option<String> {
        let msg = self.message_queue.pop_front();
        self.update_status_message();
        msg
    }

    fn update_status_message(&mut self) {
        let mut parts = vec![format!("Model: {}", self.model())];
        match self.session.dataset() {
            Some(table) => {
                let (rows, cols) = table.shape();
                parts.push(format!("Data: {} ({}x{})", table.name, rows, cols));
            }
            None => parts.push("Data: none (/csv PATH)".to_string()),
        }
        if self.is_waiting {
            parts.push("thinking...".to_string());
        }
        if self.is_running {
            parts.push("running code...".to_string());
        } else if self.session.current_code().is_some() {
            parts.push("F5 run".to_string());
        }
        if !self.message_queue.is_empty() {
            parts.push(format!("queued: {}", self.message_queue.len()));
        }
        parts.push("F1 help".to_string());
        self.status_message = parts.join(" | ");
    }

    /// Chat-area text for a message: the display override, else the text.
    pub fn message_text(message: &ChatMessage) -> &str {
        message
            .display
            .as_deref()
            .or_else(|| message.text())
            .unwrap_or("[image]")
    }

    pub fn message_prefix(role: Role) -> &'static str {
        match role {
            Role::User => ">>> ",
            Role::Assistant | Role::System => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        llm::{ChatOptions, LlmClient},
        sandbox::ExecutionStatus,
        session::SessionSettings,
    };

    fn app(chart_dir: &Path) -> App {
        let options = ChatOptions {
            model: "llama3.2:1b".into(),
            temperature: 0.0,
            top_p: 1.0,
            max_tokens: None,
            system_prompt: "sys".into(),
            send_images: false,
        };
        let session = Session::new(
            LlmClient::new("http://localhost:11434", None, None).unwrap(),
            None,
            options,
            SessionSettings { hide_data_dump: true, chart_dir: chart_dir.to_path_buf() },
        );
        App::new(session)
    }

    #[test]
    fn slash_commands_parse() {
        assert_eq!(InputAction::parse("/csv data/sales.csv"), InputAction::AttachCsv("data/sales.csv".into()));
        assert_eq!(InputAction::parse("/csv"), InputAction::DetachCsv);
        assert_eq!(InputAction::parse(" /run "), InputAction::Run);
        assert_eq!(InputAction::parse("exit()"), InputAction::Quit);
        assert_eq!(InputAction::parse("/plot"), InputAction::Unknown("plot".into()));
        assert_eq!(InputAction::parse("pie chart please"), InputAction::Send("pie chart please".into()));
    }

    #[test]
    fn inputs_queue_while_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        assert!(!app.try_queue_message("first".into()));

        app.begin_turn("first");
        assert!(app.try_queue_message("second".into()));
        assert!(app.status_message.contains("queued: 1"));

        assert!(app.finish_turn(0, Ok("```python\nresult = 1\n```".into())));
        assert!(!app.is_waiting);
        assert_eq!(app.dequeue_message().as_deref(), Some("second"));
        assert!(app.status_message.contains("F5 run"));
        assert_eq!(app.visible_messages().len(), 2);
    }

    #[test]
    fn failed_completion_keeps_user_message_and_shows_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.begin_turn("plot");
        app.finish_turn(0, Err("HTTP 500: boom".into()));
        assert!(matches!(&app.popup_state, PopupState::Error(m) if m.contains("boom")));
        assert_eq!(app.visible_messages().len(), 1);
    }

    #[test]
    fn run_without_interpreter_or_code_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        assert!(app.begin_run().is_err());
        app.session.finish_turn("```\nresult = 2\n```".into());
        assert!(app.begin_run().is_err());
        assert!(!app.is_running);
    }

    #[test]
    fn finished_run_opens_result_popup() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.is_running = true;
        app.finish_run(0, Ok(ExecutionResult {
            status: ExecutionStatus::Success,
            rendered_image: None,
            result_value: Some("4".into()),
            error_trace: None,
            stdout: "hi\n".into(),
        }));
        assert!(!app.is_running);
        assert_eq!(
            app.popup_state,
            PopupState::ExecutionResult {
                summary: "Execution Successful. Output: 4".into(),
                stdout: "hi\n".into(),
                chart: None,
                success: true,
            }
        );
    }

    #[test]
    fn results_arriving_after_clear_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.begin_turn("plot");
        let stale = app.generation;
        app.is_running = true;

        app.reset();
        assert!(!app.is_waiting);
        assert!(!app.is_running);

        assert!(!app.finish_turn(stale, Ok("late reply".into())));
        app.finish_run(stale, Err("late run".into()));
        assert!(app.visible_messages().is_empty());
        assert!(!app.is_popup_shown());

        app.begin_turn("again");
        assert!(app.finish_turn(app.generation, Ok("fresh".into())));
        assert_eq!(app.visible_messages().len(), 2);
    }

    #[test]
    fn editing_respects_multibyte_chars() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        for c in "año".chars() {
            app.insert_char(c);
        }
        app.move_cursor_left();
        app.backspace();
        assert_eq!(app.input, "ao");
        assert_eq!(app.input_cursor, 1);
    }

    #[test]
    fn history_walks_back_and_forth() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.push_history("one".into());
        app.push_history("two".into());
        app.history_prev();
        assert_eq!(app.input, "two");
        app.history_prev();
        assert_eq!(app.input, "one");
        app.history_next();
        assert_eq!(app.input, "two");
        app.history_next();
        assert_eq!(app.input, "");
    }
}
