//! Main chat event loop
//!
//! This module contains the main event loop that handles user input, renders
//! the UI, and manages the chat session. All state mutation happens on this
//! task; the stream task only feeds the channel.

use crate::core::app::{App, Focus, PromptMode};
use crate::core::chat_stream::{ChatStreamService, StreamMessage};
use crate::core::config::{path_display, Config};
use crate::ui::renderer::{ui, SIDEBAR_WIDTH};
use ratatui::crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
        MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{error::Error, io, time::Duration};
use tokio::sync::mpsc;
use tracing::warn;

/// Rows taken by chrome around the chat pane: input box (3) plus the pane
/// title line. Used to derive the pane height for auto-scroll math.
const CHROME_HEIGHT: u16 = 4;

enum LoopAction {
    Continue,
    Quit,
}

pub async fn run_chat(
    model: Option<String>,
    base_url: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load()?;
    let mut app = App::new(&config, model, base_url)?;

    // Sign-off line before the alternate screen takes over
    println!(
        "charla - chatting with {} at {}. Transcripts: {}",
        app.current_model(),
        app.base_url,
        path_display(app.store.dir())
    );

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (stream_service, mut rx) = ChatStreamService::new();

    let result = loop {
        terminal.draw(|f| ui(f, &app))?;

        let term_size = terminal.size().unwrap_or_default();
        let available_height = term_size.height.saturating_sub(CHROME_HEIGHT);
        let pane_width = term_size.width.saturating_sub(SIDEBAR_WIDTH);

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    match handle_key_event(
                        &mut app,
                        &mut config,
                        &stream_service,
                        key,
                        available_height,
                        pane_width,
                    ) {
                        LoopAction::Quit => break Ok(()),
                        LoopAction::Continue => {}
                    }
                }
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => {
                        app.auto_scroll = false;
                        app.scroll_offset = app.scroll_offset.saturating_sub(3);
                    }
                    MouseEventKind::ScrollDown => {
                        let max_scroll =
                            app.calculate_max_scroll_offset(available_height, pane_width);
                        app.scroll_offset = app.scroll_offset.saturating_add(3).min(max_scroll);
                        if app.scroll_offset >= max_scroll {
                            app.auto_scroll = true;
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        // Drain all pending stream updates before the next frame
        apply_stream_messages(&mut app, &mut rx, available_height, pane_width);
    };

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

fn handle_key_event(
    app: &mut App,
    config: &mut Config,
    stream_service: &ChatStreamService,
    key: event::KeyEvent,
    available_height: u16,
    pane_width: u16,
) -> LoopAction {
    // Global bindings first
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => return LoopAction::Quit,
            KeyCode::Char('t') => {
                app.toggle_theme();
                config.theme = Some(app.theme_name().to_string());
                if let Err(e) = config.save() {
                    warn!("failed to persist theme: {e}");
                }
                return LoopAction::Continue;
            }
            KeyCode::Char('l') => {
                app.refresh_transcripts();
                return LoopAction::Continue;
            }
            KeyCode::Char('d') => {
                app.new_conversation();
                return LoopAction::Continue;
            }
            KeyCode::Char('s') => {
                app.focus = match app.focus {
                    Focus::Input => Focus::Sidebar,
                    Focus::Sidebar => Focus::Input,
                };
                return LoopAction::Continue;
            }
            _ => {}
        }
    }

    match app.focus {
        Focus::Sidebar => handle_sidebar_key(app, key),
        Focus::Input => match app.prompt_mode {
            PromptMode::DocumentPath => handle_document_path_key(app, key),
            PromptMode::Chat => {
                handle_chat_key(app, stream_service, key, available_height, pane_width)
            }
        },
    }
}

fn handle_sidebar_key(app: &mut App, key: event::KeyEvent) -> LoopAction {
    match key.code {
        KeyCode::Up => app.sidebar_move_up(),
        KeyCode::Down => app.sidebar_move_down(),
        KeyCode::Enter => {
            app.open_selected_transcript();
            app.focus = Focus::Input;
        }
        KeyCode::Esc => app.focus = Focus::Input,
        _ => {}
    }
    LoopAction::Continue
}

fn handle_document_path_key(app: &mut App, key: event::KeyEvent) -> LoopAction {
    match key.code {
        KeyCode::Enter => {
            let path = std::mem::take(&mut app.input);
            app.load_document_from_path(&path);
            app.prompt_mode = PromptMode::Chat;
        }
        KeyCode::Esc => {
            app.input.clear();
            app.prompt_mode = PromptMode::Chat;
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.input.push(c);
        }
        KeyCode::Backspace => {
            app.input.pop();
        }
        _ => {}
    }
    LoopAction::Continue
}

fn handle_chat_key(
    app: &mut App,
    stream_service: &ChatStreamService,
    key: event::KeyEvent,
    available_height: u16,
    pane_width: u16,
) -> LoopAction {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('o') => {
                app.input.clear();
                app.prompt_mode = PromptMode::DocumentPath;
                return LoopAction::Continue;
            }
            KeyCode::Char('x') => {
                app.clear_document();
                return LoopAction::Continue;
            }
            KeyCode::Char('p') => {
                app.select_previous_model();
                return LoopAction::Continue;
            }
            KeyCode::Char('n') => {
                app.select_next_model();
                return LoopAction::Continue;
            }
            _ => {}
        }
    }

    match key.code {
        KeyCode::Enter => {
            if let Some(params) = app.submit_prompt() {
                stream_service.spawn_stream(params);
            }
        }
        KeyCode::Esc => {
            if app.is_streaming {
                app.cancel_stream();
            }
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.input.push(c);
        }
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Up => {
            app.auto_scroll = false;
            app.scroll_offset = app.scroll_offset.saturating_sub(1);
        }
        KeyCode::Down => {
            let max_scroll = app.calculate_max_scroll_offset(available_height, pane_width);
            app.scroll_offset = app.scroll_offset.saturating_add(1).min(max_scroll);
            if app.scroll_offset >= max_scroll {
                app.auto_scroll = true;
            }
        }
        _ => {}
    }
    LoopAction::Continue
}

/// Drain the stream channel, dropping messages from cancelled streams.
/// Returns true when anything was applied (a redraw is needed).
fn apply_stream_messages(
    app: &mut App,
    rx: &mut mpsc::UnboundedReceiver<(StreamMessage, u64)>,
    available_height: u16,
    pane_width: u16,
) -> bool {
    let mut received_any = false;
    while let Ok((message, stream_id)) = rx.try_recv() {
        if stream_id != app.current_stream_id {
            continue;
        }
        received_any = true;
        match message {
            StreamMessage::Chunk(content) => {
                app.append_to_response(&content, available_height, pane_width);
            }
            StreamMessage::Error(err) => {
                app.handle_stream_error(err);
            }
            StreamMessage::End => {
                app.finalize_response();
            }
        }
    }
    received_any
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::constants::CHATS_DIR_NAME;
    use crate::core::transcript::TranscriptStore;
    use tempfile::TempDir;

    fn test_app() -> (TempDir, App) {
        let dir = TempDir::new().expect("tempdir");
        let store = TranscriptStore::at(dir.path().join(CHATS_DIR_NAME)).expect("store");
        let app = App::with_store(&Config::default(), None, None, store).expect("app");
        (dir, app)
    }

    #[test]
    fn chunk_messages_accumulate_into_the_response() {
        let (_dir, mut app) = test_app();
        app.input = "q".to_string();
        app.submit_prompt().expect("params");
        let stream_id = app.current_stream_id;

        let (service, mut rx) = ChatStreamService::new();
        service.send_for_test(StreamMessage::Chunk("Hel".to_string()), stream_id);
        service.send_for_test(StreamMessage::Chunk("lo".to_string()), stream_id);

        assert!(apply_stream_messages(&mut app, &mut rx, 20, 80));
        assert_eq!(app.current_response, "Hello");
    }

    #[test]
    fn stale_stream_messages_are_dropped() {
        let (_dir, mut app) = test_app();
        app.input = "q".to_string();
        app.submit_prompt().expect("params");
        let stale_id = app.current_stream_id + 10;

        let (service, mut rx) = ChatStreamService::new();
        service.send_for_test(StreamMessage::Chunk("stale".to_string()), stale_id);
        service.send_for_test(StreamMessage::End, stale_id);

        assert!(!apply_stream_messages(&mut app, &mut rx, 20, 80));
        assert!(app.current_response.is_empty());
        assert!(app.is_streaming);
    }

    #[test]
    fn end_message_finalizes_and_saves() {
        let (_dir, mut app) = test_app();
        app.input = "q".to_string();
        app.submit_prompt().expect("params");
        let stream_id = app.current_stream_id;

        let (service, mut rx) = ChatStreamService::new();
        service.send_for_test(StreamMessage::Chunk("done.".to_string()), stream_id);
        service.send_for_test(StreamMessage::End, stream_id);

        apply_stream_messages(&mut app, &mut rx, 20, 80);
        assert!(!app.is_streaming);
        assert_eq!(app.transcripts.len(), 1);
    }

    #[test]
    fn error_message_lands_in_the_pane() {
        let (_dir, mut app) = test_app();
        app.input = "q".to_string();
        app.submit_prompt().expect("params");
        let stream_id = app.current_stream_id;

        let (service, mut rx) = ChatStreamService::new();
        service.send_for_test(
            StreamMessage::Error("Error: connection refused".to_string()),
            stream_id,
        );

        apply_stream_messages(&mut app, &mut rx, 20, 80);
        assert!(!app.is_streaming);
        assert!(app
            .render_transcript()
            .contains("Error: connection refused"));
    }

    #[test]
    fn messages_from_a_cancelled_stream_never_finalize() {
        let (_dir, mut app) = test_app();
        app.input = "q".to_string();
        let params = app.submit_prompt().expect("params");
        let old_id = params.stream_id;

        // The user interrupts; the stream task may still flush queued output
        app.cancel_stream();

        let (service, mut rx) = ChatStreamService::new();
        service.send_for_test(StreamMessage::Chunk("late".to_string()), old_id);
        service.send_for_test(StreamMessage::End, old_id);

        assert!(!apply_stream_messages(&mut app, &mut rx, 20, 80));
        assert!(app.current_response.is_empty());
        // An interrupted exchange must not be saved
        assert!(app.transcripts.is_empty());
    }
}
