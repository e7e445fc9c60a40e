use crate::core::app::{App, Focus, PromptMode};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

/// Width of the saved-chats sidebar, including its border.
pub const SIDEBAR_WIDTH: u16 = 26;

/// Styled pane lines. Mirrors [`App::display_text_lines`] line for line so
/// the saved transcript and the rendered pane can never disagree.
pub fn build_display_lines(app: &App) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    for msg in &app.messages {
        if msg.is_user() {
            lines.push(Line::from(vec![
                Span::styled("You: ", app.theme.user_prefix_style),
                Span::styled(msg.content.as_str(), app.theme.user_text_style),
            ]));
            lines.push(Line::from(""));
        } else if msg.is_assistant() {
            if msg.content.is_empty() {
                continue;
            }
            for content_line in msg.content.lines() {
                lines.push(Line::from(Span::styled(
                    content_line,
                    app.theme.assistant_text_style,
                )));
            }
            lines.push(Line::from(""));
        } else {
            let style = match msg.role {
                crate::core::message::TranscriptRole::AppError => app.theme.app_error_text_style,
                _ => app.theme.app_info_text_style,
            };
            for content_line in msg.content.lines() {
                lines.push(Line::from(Span::styled(content_line, style)));
            }
            lines.push(Line::from(""));
        }
    }
    lines
}

fn streaming_indicator(app: &App) -> &'static str {
    // Pulse through three phases, two cycles per second
    let elapsed = app.pulse_start.elapsed().as_millis() as f32 / 1000.0;
    let pulse_phase = (elapsed * 2.0) % 2.0;
    let pulse_intensity = if pulse_phase < 1.0 {
        pulse_phase
    } else {
        2.0 - pulse_phase
    };
    if pulse_intensity < 0.33 {
        "○"
    } else if pulse_intensity < 0.66 {
        "◐"
    } else {
        "●"
    }
}

pub fn ui(f: &mut Frame, app: &App) {
    // Paint the frame background first
    f.render_widget(
        Block::default().style(Style::default().bg(app.theme.background_color)),
        f.area(),
    );

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(0)])
        .split(f.area());

    render_sidebar(f, app, columns[0]);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(columns[1]);

    render_chat_pane(f, app, chunks[0]);
    render_input(f, app, chunks[1]);
}

fn render_sidebar(f: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let items: Vec<ListItem> = app
        .transcripts
        .iter()
        .map(|entry| ListItem::new(entry.name.as_str()))
        .collect();

    let border_style = if app.focus == Focus::Sidebar {
        app.theme.selection_highlight_style
    } else {
        app.theme.input_border_style
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title("Saved Chats")
                .title_style(app.theme.title_style),
        )
        .highlight_style(app.theme.selection_highlight_style);

    let mut state = ListState::default();
    if !app.transcripts.is_empty() {
        state.select(Some(app.sidebar_selected));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn render_chat_pane(f: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let lines = build_display_lines(app);

    let available_height = area.height.saturating_sub(1); // Account for title
    let max_offset = app.calculate_max_scroll_offset(available_height, area.width);
    let scroll_offset = app.scroll_offset.min(max_offset);

    let mut title = format!(
        "charla v{} - {} ({})",
        env!("CARGO_PKG_VERSION"),
        app.current_model(),
        app.document_label()
    );
    if app.is_streaming {
        title.push(' ');
        title.push_str(streaming_indicator(app));
    }

    let messages_paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title(title)
                .title_style(app.theme.title_style),
        )
        .wrap(Wrap { trim: true })
        .scroll((scroll_offset, 0));

    f.render_widget(messages_paragraph, area);
}

fn render_input(f: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let input_title = match app.prompt_mode {
        PromptMode::DocumentPath => "Path to .txt or .pdf document (Enter to load, Esc to cancel)",
        PromptMode::Chat => {
            if app.is_streaming {
                "Type your message (Esc to interrupt, Ctrl+C to quit)"
            } else {
                "Type your message (Enter to send, Ctrl+O to load a document, Ctrl+C to quit)"
            }
        }
    };

    let input = Paragraph::new(app.input.as_str())
        .style(app.theme.input_text_style)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(app.theme.input_border_style)
                .title(input_title)
                .title_style(app.theme.input_title_style),
        );

    f.render_widget(input, area);

    if app.focus == Focus::Input {
        let inner_width = area.width.saturating_sub(2);
        let cursor_x = (app.input.chars().count() as u16).min(inner_width.saturating_sub(1));
        f.set_cursor_position((area.x + 1 + cursor_x, area.y + 1));
    }
}
