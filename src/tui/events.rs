//! Custom event types for TUI application.

use crossterm::event::KeyEvent;

use crate::sandbox::ExecutionResult;

/// Events that can occur in the TUI application
#[derive(Debug)]
pub enum TuiEvent {
    /// User keyboard input
    Key(KeyEvent),
    /// User input text (processed from keyboard events)
    UserInput(String),
    /// Completion request finished; errors arrive already formatted
    CompletionFinished {
        generation: u64,
        reply: Result<String, String>,
    },
    /// Run the current code block
    RunCode,
    /// Sandbox run finished
    ExecutionFinished {
        generation: u64,
        outcome: Result<ExecutionResult, String>,
    },
    /// Process next message from queue
    ProcessNextMessage,
    /// Request to quit the application
    Quit,
}
