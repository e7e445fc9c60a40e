//! Shared constants used across the application

/// Default Ollama server URL when neither config nor flags override it.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Models offered by the selector when the config does not name its own list.
pub const DEFAULT_MODELS: [&str; 5] = ["mistral", "llama3", "zephyr", "phi3", "starling"];

/// Maximum number of document characters prepended to a prompt.
/// Longer documents are truncated at a char boundary before framing.
pub const DOCUMENT_CONTEXT_LIMIT: usize = 3000;

/// Subdirectory of the data dir where transcripts are stored.
pub const CHATS_DIR_NAME: &str = "chats";
