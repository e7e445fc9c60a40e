use crate::core::chat_stream::StreamParams;
use crate::core::config::Config;
use crate::core::document::{build_prompt, load_document, LoadedDocument};
use crate::core::message::Message;
use crate::core::transcript::{TranscriptEntry, TranscriptStore};
use crate::ui::theme::Theme;
use reqwest::Client;
use std::path::Path;
use std::{collections::VecDeque, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Which pane receives navigation keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Input,
    Sidebar,
}

/// What the input line currently collects. `DocumentPath` replaces a GUI
/// file dialog: the line reads a path to a .txt/.pdf document instead of a
/// chat prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    Chat,
    DocumentPath,
}

pub struct App {
    pub messages: VecDeque<Message>,
    pub input: String,
    pub current_response: String,
    pub client: Client,
    pub base_url: String,
    pub models: Vec<String>,
    pub model_index: usize,
    pub scroll_offset: u16,
    pub auto_scroll: bool,
    pub is_streaming: bool,
    pub pulse_start: Instant,
    pub stream_cancel_token: Option<CancellationToken>,
    pub current_stream_id: u64,
    pub theme: Theme,
    pub dark_mode: bool,
    pub document: Option<LoadedDocument>,
    pub store: TranscriptStore,
    pub transcripts: Vec<TranscriptEntry>,
    pub sidebar_selected: usize,
    pub focus: Focus,
    pub prompt_mode: PromptMode,
}

impl App {
    pub fn new(
        config: &Config,
        model_override: Option<String>,
        base_url_override: Option<String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let store = match &config.chats_dir {
            Some(dir) => TranscriptStore::at(dir.clone())?,
            None => TranscriptStore::new()?,
        };
        Self::with_store(config, model_override, base_url_override, store)
    }

    pub fn with_store(
        config: &Config,
        model_override: Option<String>,
        base_url_override: Option<String>,
        store: TranscriptStore,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let base_url = base_url_override.unwrap_or_else(|| config.resolved_base_url());

        let mut models = config.resolved_models();
        let requested = model_override.or_else(|| config.default_model.clone());
        let model_index = match requested {
            Some(model) => match models.iter().position(|m| m == &model) {
                Some(index) => index,
                None => {
                    // A model outside the configured list is still usable;
                    // prepend it so the selector shows what is active.
                    models.insert(0, model);
                    0
                }
            },
            None => 0,
        };

        let dark_mode = config.theme.as_deref() != Some("light");
        let theme = Theme::from_name(config.theme.as_deref().unwrap_or("dark"));

        let mut app = App {
            messages: VecDeque::new(),
            input: String::new(),
            current_response: String::new(),
            client: Client::new(),
            base_url,
            models,
            model_index,
            scroll_offset: 0,
            auto_scroll: true,
            is_streaming: false,
            pulse_start: Instant::now(),
            stream_cancel_token: None,
            current_stream_id: 0,
            theme,
            dark_mode,
            document: None,
            store,
            transcripts: Vec::new(),
            sidebar_selected: 0,
            focus: Focus::Input,
            prompt_mode: PromptMode::Chat,
        };
        app.refresh_transcripts();
        Ok(app)
    }

    pub fn current_model(&self) -> &str {
        self.models
            .get(self.model_index)
            .map(|m| m.as_str())
            .unwrap_or("")
    }

    pub fn select_next_model(&mut self) {
        if !self.models.is_empty() {
            self.model_index = (self.model_index + 1) % self.models.len();
        }
    }

    pub fn select_previous_model(&mut self) {
        if !self.models.is_empty() {
            if self.model_index == 0 {
                self.model_index = self.models.len() - 1;
            } else {
                self.model_index -= 1;
            }
        }
    }

    /// Take the current input and turn it into a stream request. Returns
    /// `None` without touching the network or the transcript when the prompt
    /// is empty or a stream is already in flight.
    pub fn submit_prompt(&mut self) -> Option<StreamParams> {
        if self.is_streaming || self.input.trim().is_empty() {
            return None;
        }

        let prompt = std::mem::take(&mut self.input);
        let prompt = prompt.trim().to_string();

        self.messages.push_back(Message::user(prompt.clone()));
        self.messages.push_back(Message::assistant(String::new()));
        self.current_response.clear();
        self.auto_scroll = true;

        let full_prompt = build_prompt(&prompt, self.document.as_ref());

        self.is_streaming = true;
        self.pulse_start = Instant::now();
        self.current_stream_id += 1;
        let cancel_token = CancellationToken::new();
        self.stream_cancel_token = Some(cancel_token.clone());

        Some(StreamParams {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            model: self.current_model().to_string(),
            prompt: full_prompt,
            cancel_token,
            stream_id: self.current_stream_id,
        })
    }

    pub fn append_to_response(&mut self, content: &str, available_height: u16, pane_width: u16) {
        self.current_response.push_str(content);
        if let Some(last_msg) = self.messages.back_mut() {
            if last_msg.is_assistant() {
                last_msg.content = self.current_response.clone();
            }
        }
        // Follow the stream, but only while the user has not scrolled away
        if self.auto_scroll {
            self.scroll_offset = self.calculate_max_scroll_offset(available_height, pane_width);
        }
    }

    /// Render failures inline in the response pane (no dialogs, no retry).
    pub fn handle_stream_error(&mut self, message: String) {
        self.messages.push_back(Message::app_error(message));
        self.is_streaming = false;
        self.stream_cancel_token = None;
    }

    /// Called on `StreamMessage::End`: the exchange is complete, so persist
    /// the rendered conversation and refresh the sidebar.
    pub fn finalize_response(&mut self) -> Option<TranscriptEntry> {
        self.is_streaming = false;
        self.stream_cancel_token = None;

        let rendered = self.render_transcript();
        match self.store.save(&rendered) {
            Ok(saved) => {
                if saved.is_some() {
                    self.refresh_transcripts();
                }
                saved
            }
            Err(e) => {
                warn!("failed to save transcript: {e}");
                self.messages
                    .push_back(Message::app_error(format!("Could not save chat: {e}")));
                None
            }
        }
    }

    pub fn cancel_stream(&mut self) {
        if let Some(token) = self.stream_cancel_token.take() {
            token.cancel();
        }
        if self.is_streaming {
            self.is_streaming = false;
            // Invalidate anything the cancelled task already queued; a stale
            // End must not finalize and save an interrupted exchange.
            self.current_stream_id += 1;
            self.messages
                .push_back(Message::app_info("Response interrupted".to_string()));
        }
    }

    /// The response pane's contents as plain text. Saved transcripts are
    /// exactly this string, so file and screen can never drift apart.
    pub fn render_transcript(&self) -> String {
        let lines = self.display_text_lines();
        let mut out = lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    /// The pane text, one entry per visual line. The renderer styles these
    /// per role; `render_transcript` joins them for persistence.
    pub fn display_text_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for msg in &self.messages {
            if msg.is_user() {
                lines.push(format!("You: {}", msg.content));
                lines.push(String::new());
            } else if msg.is_assistant() {
                if msg.content.is_empty() {
                    continue;
                }
                for content_line in msg.content.lines() {
                    lines.push(content_line.to_string());
                }
                lines.push(String::new());
            } else {
                for content_line in msg.content.lines() {
                    lines.push(content_line.to_string());
                }
                lines.push(String::new());
            }
        }
        lines
    }

    /// Rendered row count for the pane at `pane_width`. The pane draws with
    /// word wrapping, so a logical line wider than the pane occupies several
    /// rows; scroll math has to count those rows, not logical lines.
    pub fn calculate_wrapped_line_count(&self, pane_width: u16) -> u16 {
        self.display_text_lines()
            .iter()
            .map(|line| wrapped_rows(line, pane_width as usize))
            .sum::<usize>()
            .min(u16::MAX as usize) as u16
    }

    pub fn calculate_max_scroll_offset(&self, available_height: u16, pane_width: u16) -> u16 {
        self.calculate_wrapped_line_count(pane_width)
            .saturating_sub(available_height)
    }

    pub fn refresh_transcripts(&mut self) {
        match self.store.list() {
            Ok(entries) => {
                self.transcripts = entries;
                if self.sidebar_selected >= self.transcripts.len() {
                    self.sidebar_selected = self.transcripts.len().saturating_sub(1);
                }
            }
            Err(e) => {
                warn!("failed to list transcripts: {e}");
            }
        }
    }

    pub fn sidebar_move_up(&mut self) {
        if !self.transcripts.is_empty() {
            if self.sidebar_selected == 0 {
                self.sidebar_selected = self.transcripts.len() - 1;
            } else {
                self.sidebar_selected -= 1;
            }
        }
    }

    pub fn sidebar_move_down(&mut self) {
        if !self.transcripts.is_empty() {
            self.sidebar_selected = (self.sidebar_selected + 1) % self.transcripts.len();
        }
    }

    /// Replace the pane with the selected saved chat.
    pub fn open_selected_transcript(&mut self) {
        let Some(entry) = self.transcripts.get(self.sidebar_selected) else {
            return;
        };
        let name = entry.name.clone();
        match self.store.load(&name) {
            Ok(contents) => {
                self.messages.clear();
                self.current_response.clear();
                // Strip the trailing newline render_transcript appended so a
                // reopened chat renders identically to when it was saved.
                let contents = contents.strip_suffix('\n').unwrap_or(&contents).to_string();
                self.messages.push_back(Message::assistant(contents));
                self.scroll_offset = 0;
                self.auto_scroll = true;
            }
            Err(e) => {
                self.messages
                    .push_back(Message::app_error(format!("Could not load chat: {e}")));
            }
        }
    }

    pub fn new_conversation(&mut self) {
        if self.is_streaming {
            self.cancel_stream();
        }
        self.messages.clear();
        self.current_response.clear();
        self.scroll_offset = 0;
        self.auto_scroll = true;
    }

    pub fn load_document_from_path(&mut self, path: &str) {
        let path = path.trim();
        if path.is_empty() {
            return;
        }
        match load_document(Path::new(path)) {
            Ok(doc) => {
                self.messages
                    .push_back(Message::app_info(format!("Loaded document: {}", doc.name)));
                self.document = Some(doc);
            }
            Err(e) => {
                self.messages.push_back(Message::app_error(e.to_string()));
            }
        }
    }

    pub fn clear_document(&mut self) {
        if self.document.take().is_some() {
            self.messages
                .push_back(Message::app_info("Document cleared".to_string()));
        }
    }

    pub fn toggle_theme(&mut self) {
        self.dark_mode = !self.dark_mode;
        self.theme = if self.dark_mode {
            Theme::dark_default()
        } else {
            Theme::light()
        };
    }

    /// Config value for the active theme, for persisting toggles.
    pub fn theme_name(&self) -> &'static str {
        if self.dark_mode {
            "dark"
        } else {
            "light"
        }
    }

    pub fn document_label(&self) -> String {
        match &self.document {
            Some(doc) => doc.name.clone(),
            None => "No document loaded".to_string(),
        }
    }
}

/// Rows one logical line occupies after greedy word wrapping at `width`.
/// Matches the pane's wrapping: words stay whole when they fit, words wider
/// than the pane break at the edge, a blank line is one row.
fn wrapped_rows(line: &str, width: usize) -> usize {
    if width == 0 {
        return 1;
    }
    let mut rows = 1usize;
    let mut used = 0usize;
    for word in line.split_whitespace() {
        let len = word.chars().count();
        if len > width {
            if used > 0 {
                rows += 1;
            }
            let full_rows = (len - 1) / width;
            rows += full_rows;
            used = len - full_rows * width;
            continue;
        }
        let needed = if used == 0 { len } else { len + 1 };
        if used + needed <= width {
            used += needed;
        } else {
            rows += 1;
            used = len;
        }
    }
    rows
}
