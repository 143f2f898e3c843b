//! Async event handler for TUI REPL mode.

use std::{io, path::Path, time::Duration};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use tokio::sync::mpsc;

use super::{
    app::{App, InputAction, InputMode},
    events::TuiEvent,
    ui::render_ui,
};
use crate::session::Session;

/// Run the TUI-based REPL
pub async fn run_tui_repl(session: Session, init_prompt: Option<&str>, csv: Option<&Path>) -> Result<()> {
    if !io::IsTerminal::is_terminal(&io::stdout()) {
        return Err(anyhow::anyhow!("TUI mode requires a proper terminal environment"));
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(session);
    if let Some(path) = csv {
        app.attach_csv(path);
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel::<TuiEvent>();
    if let Some(prompt) = init_prompt {
        let _ = event_tx.send(TuiEvent::UserInput(prompt.to_string()));
    }

    let result = run_app(&mut terminal, &mut app, event_tx, event_rx).await;

    // Restore terminal
    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Main application loop
async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    event_tx: mpsc::UnboundedSender<TuiEvent>,
    mut event_rx: mpsc::UnboundedReceiver<TuiEvent>,
) -> Result<()> {
    // Spawn input handler; it stops once the receiver is gone
    let input_tx = event_tx.clone();
    tokio::task::spawn_blocking(move || {
        while !input_tx.is_closed() {
            if event::poll(Duration::from_millis(100)).unwrap_or(false) {
                if let Ok(Event::Key(key)) = event::read() {
                    if input_tx.send(TuiEvent::Key(key)).is_err() {
                        break;
                    }
                }
            }
        }
    });

    loop {
        terminal.draw(|frame| render_ui(frame, app))?;

        while let Ok(tui_event) = event_rx.try_recv() {
            if handle_event(app, tui_event, &event_tx) {
                return Ok(());
            }
        }

        // Small delay to prevent busy waiting
        tokio::time::sleep(Duration::from_millis(16)).await;
    }
}

/// Returns true when the app should quit.
fn handle_event(app: &mut App, tui_event: TuiEvent, event_tx: &mpsc::UnboundedSender<TuiEvent>) -> bool {
    match tui_event {
        TuiEvent::Key(key) => return handle_key_event(app, key, event_tx),
        TuiEvent::UserInput(input) => {
            if !app.try_queue_message(input.clone()) {
                start_completion(app, &input, event_tx.clone());
            }
        }
        TuiEvent::ProcessNextMessage => {
            if let Some(next_message) = app.dequeue_message() {
                start_completion(app, &next_message, event_tx.clone());
            }
        }
        TuiEvent::CompletionFinished { generation, reply } => {
            if app.finish_turn(generation, reply) {
                let _ = event_tx.send(TuiEvent::ProcessNextMessage);
            }
        }
        TuiEvent::RunCode => start_run(app, event_tx.clone()),
        TuiEvent::ExecutionFinished { generation, outcome } => app.finish_run(generation, outcome),
        TuiEvent::Quit => return true,
    }
    false
}

/// Handle keyboard events
fn handle_key_event(app: &mut App, key: KeyEvent, event_tx: &mpsc::UnboundedSender<TuiEvent>) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    if ctrl && key.code == KeyCode::Char('c') {
        return true;
    }
    // If any popup is shown, any key closes it
    if app.is_popup_shown() {
        app.hide_popup();
        return false;
    }
    if app.show_help && key.code != KeyCode::F(1) {
        app.show_help = false;
        return false;
    }

    match key.code {
        KeyCode::F(1) => app.toggle_help(),
        KeyCode::F(5) => {
            let _ = event_tx.send(TuiEvent::RunCode);
        }
        KeyCode::Char('r') if ctrl => {
            let _ = event_tx.send(TuiEvent::RunCode);
        }
        KeyCode::Char('p') if ctrl => app.history_prev(),
        KeyCode::Char('n') if ctrl => app.history_next(),
        KeyCode::Up => app.scroll_up(),
        KeyCode::Down => app.scroll_down(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Home => app.move_cursor_home(),
        KeyCode::End => app.move_cursor_end(),
        KeyCode::Backspace => app.backspace(),
        KeyCode::Delete => app.delete(),
        KeyCode::Enter => return handle_enter(app, event_tx),
        KeyCode::Char(c) if !ctrl => app.insert_char(c),
        _ => {}
    }
    false
}

fn handle_enter(app: &mut App, event_tx: &mpsc::UnboundedSender<TuiEvent>) -> bool {
    // Multiline toggle
    if app.input.trim() == "\"\"\"" {
        match app.input_mode {
            InputMode::Normal => {
                app.clear_input();
                app.input_mode = InputMode::MultiLine;
            }
            InputMode::MultiLine => {
                let multiline_input = app.multiline_buffer.join("\n");
                app.clear_input();
                if !multiline_input.trim().is_empty() {
                    app.push_history(multiline_input.clone());
                    let _ = event_tx.send(TuiEvent::UserInput(multiline_input));
                }
            }
        }
        return false;
    }
    if app.input_mode == InputMode::MultiLine {
        app.multiline_buffer.push(std::mem::take(&mut app.input));
        app.input_cursor = 0;
        return false;
    }

    let input = app.get_input_text();
    app.clear_input();
    if input.trim().is_empty() {
        return false;
    }
    app.push_history(input.clone());

    match InputAction::parse(&input) {
        InputAction::Send(text) => {
            let _ = event_tx.send(TuiEvent::UserInput(text));
        }
        InputAction::AttachCsv(path) => app.attach_csv(Path::new(&path)),
        InputAction::DetachCsv => app.detach_csv(),
        InputAction::Run => {
            let _ = event_tx.send(TuiEvent::RunCode);
        }
        InputAction::ShowCode => app.show_code(),
        InputAction::Clear => app.reset(),
        InputAction::Help => app.toggle_help(),
        InputAction::Quit => {
            let _ = event_tx.send(TuiEvent::Quit);
        }
        InputAction::Unknown(cmd) => app.show_error(format!("Unknown command: /{} (try /help)", cmd)),
    }
    false
}

fn start_completion(app: &mut App, input: &str, event_tx: mpsc::UnboundedSender<TuiEvent>) {
    let messages = app.begin_turn(input);
    let client = app.session.client().clone();
    let options = app.session.options().clone();
    let generation = app.generation;
    tokio::spawn(async move {
        let reply = client
            .complete(&messages, &options)
            .await
            .map_err(|e| e.to_string());
        let _ = event_tx.send(TuiEvent::CompletionFinished { generation, reply });
    });
}

fn start_run(app: &mut App, event_tx: mpsc::UnboundedSender<TuiEvent>) {
    let (sandbox, request) = match app.begin_run() {
        Ok(job) => job,
        Err(e) => {
            app.show_error(format!("{:#}", e));
            return;
        }
    };
    let generation = app.generation;
    tokio::spawn(async move {
        let outcome = sandbox.execute(&request).await.map_err(|e| e.to_string());
        let _ = event_tx.send(TuiEvent::ExecutionFinished { generation, outcome });
    });
}
