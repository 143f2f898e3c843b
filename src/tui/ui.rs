//! UI layout and rendering logic for the TUI.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use super::app::{App, InputMode, PopupState};
use crate::llm::Role;

/// Render the main UI
pub fn render_ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Chat area
            Constraint::Length(input_height(app)),
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    render_chat_area(frame, app, main_layout[0]);
    render_input_area(frame, app, main_layout[1]);
    render_status_bar(frame, app, main_layout[2]);

    if app.show_help {
        render_help_overlay(frame);
    }

    match &app.popup_state {
        PopupState::ExecutionResult { summary, stdout, chart, success } => {
            render_execution_result_popup(frame, summary, stdout, chart.as_deref(), *success);
        }
        PopupState::Code(code) => render_text_popup(frame, "Current Code", code, Color::Green),
        PopupState::Error(message) => render_text_popup(frame, "Error", message, Color::Red),
        PopupState::None => {}
    }
}

fn input_height(app: &App) -> u16 {
    let lines = match app.input_mode {
        InputMode::Normal => 1,
        InputMode::MultiLine => app.multiline_buffer.len() + 1,
    };
    (lines.min(8) as u16) + 2
}

/// Render the chat conversation area
fn render_chat_area(frame: &mut Frame, app: &App, area: Rect) {
    let mut content_lines = Vec::new();

    for msg in app.visible_messages() {
        let style = match msg.role {
            Role::User => Style::default().fg(Color::Green),
            Role::Assistant => Style::default().fg(Color::Cyan),
            Role::System => Style::default().fg(Color::Yellow),
        };
        let content = format!("{}{}", App::message_prefix(msg.role), App::message_text(msg));

        for line in content.lines() {
            content_lines.push(Line::from(vec![Span::styled(line.to_string(), style)]));
        }
        if !content.is_empty() {
            content_lines.push(Line::from(""));
        }
    }

    if app.is_waiting {
        content_lines.push(Line::from(Span::styled(
            "... waiting for the model",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let title = match app.session.dataset() {
        Some(table) => format!("Chat | Model: {} | Data: {}", app.model(), table.name),
        None => format!("Chat | Model: {}", app.model()),
    };

    // Wrapped line count, so auto-scroll lands on the last line
    let inner_width = area.width.saturating_sub(2).max(1) as usize;
    let total_lines: usize = content_lines
        .iter()
        .map(|line| {
            let width: usize = line.spans.iter().map(|s| s.content.width()).sum();
            width.max(1).div_ceil(inner_width)
        })
        .sum();
    let available_height = area.height.saturating_sub(2) as usize;

    let mut paragraph = Paragraph::new(Text::from(content_lines))
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });

    if total_lines > available_height {
        // Offset 0 shows the bottom
        let max_scroll = total_lines - available_height;
        let scroll_y = max_scroll - app.chat_scroll_offset.min(max_scroll);
        paragraph = paragraph.scroll((scroll_y as u16, 0));
    }

    frame.render_widget(paragraph, area);
}

/// Render the input area
fn render_input_area(frame: &mut Frame, app: &App, area: Rect) {
    let input_text = match app.input_mode {
        InputMode::Normal => app.input.clone(),
        InputMode::MultiLine if app.multiline_buffer.is_empty() => app.input.clone(),
        InputMode::MultiLine => format!("{}\n{}", app.multiline_buffer.join("\n"), app.input),
    };

    let title = match app.input_mode {
        InputMode::Normal => "Input (type \"\"\" for multiline, /help for commands)",
        InputMode::MultiLine => "Multi-line Input (\"\"\" to finish)",
    };

    let input_paragraph = Paragraph::new(input_text)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });

    frame.render_widget(input_paragraph, area);

    if !app.is_popup_shown() && !app.show_help {
        let row = match app.input_mode {
            InputMode::Normal => 0,
            InputMode::MultiLine => app.multiline_buffer.len().min(7) as u16,
        };
        let col = u16::try_from(app.input[..app.input_cursor].width()).unwrap_or(u16::MAX);
        let x = area.x.saturating_add(1).saturating_add(col);
        frame.set_cursor_position((
            x.min(area.right().saturating_sub(2)),
            area.y.saturating_add(1).saturating_add(row),
        ));
    }
}

/// Render the status bar
fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let status_paragraph = Paragraph::new(app.status_message.as_str())
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    frame.render_widget(status_paragraph, area);
}

/// Render help overlay
fn render_help_overlay(frame: &mut Frame) {
    let popup_area = centered_rect(80, 70, frame.area());
    frame.render_widget(Clear, popup_area);

    let help_lines = vec![
        Line::from("vizchat Help"),
        Line::from(""),
        Line::from("Commands:"),
        Line::from("  /csv PATH  - Attach a CSV file (its table goes with every request)"),
        Line::from("  /csv       - Detach the dataset"),
        Line::from("  /run       - Run the current code block (also F5 / Ctrl+R)"),
        Line::from("  /code      - Show the current code block"),
        Line::from("  /clear     - Start the conversation over"),
        Line::from("  exit()     - Quit"),
        Line::from(""),
        Line::from("Navigation:"),
        Line::from("  ↑/↓        - Scroll chat history"),
        Line::from("  Ctrl+P/N   - Previous/next input"),
        Line::from("  Ctrl+C     - Quit"),
        Line::from("  F1         - Toggle this help"),
        Line::from(""),
        Line::from("Input:"),
        Line::from("  Enter      - Send message"),
        Line::from("  \"\"\"        - Start/end multi-line input"),
    ];

    let help_paragraph = Paragraph::new(Text::from(help_lines))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Help")
                .title_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        )
        .wrap(Wrap { trim: true });

    frame.render_widget(help_paragraph, popup_area);
}

/// Helper function to create a centered rectangle
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Render execution result popup
fn render_execution_result_popup(
    frame: &mut Frame,
    summary: &str,
    stdout: &str,
    chart: Option<&str>,
    success: bool,
) {
    let popup_area = centered_rect(85, 75, frame.area());
    frame.render_widget(Clear, popup_area);

    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),    // Summary / trace
            Constraint::Length(7), // Printed output
            Constraint::Length(3), // Chart path + instructions
        ])
        .split(popup_area);

    let color = if success { Color::Green } else { Color::Red };
    let summary_paragraph = Paragraph::new(summary)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Code Execution Output")
                .title_style(Style::default().fg(color).add_modifier(Modifier::BOLD)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(summary_paragraph, popup_layout[0]);

    let printed = if stdout.is_empty() { "(nothing printed)" } else { stdout };
    let stdout_paragraph = Paragraph::new(printed)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("stdout")
                .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(stdout_paragraph, popup_layout[1]);

    let footer = match chart {
        Some(path) => format!("Chart: {} | Press any key to close", path),
        None => "Press any key to close".to_string(),
    };
    let instructions = Paragraph::new(footer)
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(instructions, popup_layout[2]);
}

fn render_text_popup(frame: &mut Frame, title: &str, body: &str, color: Color) {
    let popup_area = centered_rect(85, 75, frame.area());
    frame.render_widget(Clear, popup_area);

    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(3)])
        .split(popup_area);

    let body_paragraph = Paragraph::new(body)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .title_style(Style::default().fg(color).add_modifier(Modifier::BOLD)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(body_paragraph, popup_layout[0]);

    let instructions = Paragraph::new("Press any key to close")
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(instructions, popup_layout[1]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        llm::{ChatOptions, LlmClient},
        session::{Session, SessionSettings},
    };
    use ratatui::{backend::TestBackend, Terminal};

    fn app() -> App {
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
            SessionSettings { hide_data_dump: true, chart_dir: std::env::temp_dir() },
        );
        App::new(session)
    }

    #[test]
    fn very_long_input_keeps_cursor_inside_the_box() {
        let mut app = app();
        app.input = "x".repeat(usize::from(u16::MAX));
        app.move_cursor_end();

        let mut terminal = Terminal::new(TestBackend::new(40, 12)).unwrap();
        terminal.draw(|frame| render_ui(frame, &app)).unwrap();
        let cursor = terminal.get_cursor_position().unwrap();
        assert!(cursor.x < 40);
        assert!(cursor.y < 12);
    }

    #[test]
    fn centered_rect_stays_inside() {
        let outer = Rect::new(0, 0, 100, 40);
        let inner = centered_rect(80, 50, outer);
        assert_eq!(inner.width, 80);
        assert_eq!(inner.height, 20);
        assert_eq!(inner.x, 10);
        assert_eq!(inner.y, 10);
    }
}
