//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the
//! appropriate commands.

pub mod model_list;

use std::error::Error;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cli::model_list::list_models;
use crate::ui::chat_loop::run_chat;

#[derive(Parser)]
#[command(name = "charla")]
#[command(about = "A terminal chat client for local AI models served by Ollama")]
#[command(
    long_about = "Charla is a full-screen terminal chat client for models served by a local \
Ollama instance. Responses stream in as they are generated, every completed \
exchange is saved as a timestamped transcript, and a sidebar lists saved \
chats for later reading.\n\n\
Documents:\n\
  Press Ctrl+O and enter the path of a .txt or .pdf file to prepend its text \
to the next prompt as context.\n\n\
Controls:\n\
  Type              Enter your message in the input field\n\
  Enter             Send the message\n\
  Esc               Interrupt a streaming response\n\
  Up/Down/Mouse     Scroll through the conversation\n\
  Ctrl+P / Ctrl+N   Previous / next model\n\
  Ctrl+S            Focus the saved-chats sidebar\n\
  Ctrl+D            Start a new chat\n\
  Ctrl+T            Toggle dark/light theme\n\
  Ctrl+C            Quit the application"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to use for chat (defaults to the configured model list)
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Inference server URL (defaults to http://localhost:11434)
    #[arg(short = 'u', long, global = true, value_name = "URL")]
    pub base_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// List models installed on the server
    Models,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(args.model, args.base_url).await,
        Commands::Models => list_models(args.base_url).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_parse_cleanly() {
        Args::command().debug_assert();
    }

    #[test]
    fn model_and_url_flags_are_accepted() {
        let args = Args::parse_from(["charla", "-m", "llama3", "-u", "http://host:11434"]);
        assert_eq!(args.model.as_deref(), Some("llama3"));
        assert_eq!(args.base_url.as_deref(), Some("http://host:11434"));
        assert!(args.command.is_none());
    }

    #[test]
    fn models_subcommand_parses() {
        let args = Args::parse_from(["charla", "models"]);
        assert!(matches!(args.command, Some(Commands::Models)));
    }
}
