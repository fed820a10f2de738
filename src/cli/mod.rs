//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod config_keys;
pub mod say;
pub mod setup;

#[cfg(test)]
mod tests;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cli::chat::run_chat;
use crate::cli::config_keys::{apply_set, apply_unset};
use crate::cli::say::run_say;
use crate::cli::setup::SessionOptions;
use crate::core::config::Config;

const DEFAULT_LOG_FILTER: &str = "causette=warn";

#[derive(Parser)]
#[command(name = "causette")]
#[command(about = "A terminal chat client for a streaming chat-completion service")]
#[command(
    long_about = "Causette talks to a chat-completion service that fronts several model \
providers. Replies stream into the terminal as they are generated.\n\n\
Environment Variables:\n\
  CAUSETTE_BASE_URL   Service base URL (defaults to http://localhost:8000/api)\n\
  CAUSETTE_API_KEY    API key forwarded to providers that need one\n\
  RUST_LOG            Diagnostic log filter (defaults to causette=warn)\n\n\
Chat commands:\n\
  /stop             Stop the reply being streamed\n\
  /reset            Start a new conversation\n\
  /export [file]    Write the conversation as markdown\n\
  /log              Pause or resume the conversation log\n\
  /quit             Leave the chat\n\
  Ctrl+C            Stop the reply being streamed"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to use for chat
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Append the conversation to this file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Provider to use
    #[arg(short = 'p', long, global = true, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// Service base URL
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat (default)
    Chat,
    /// Send one prompt and print the reply
    Say {
        /// Prompt text
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Set configuration values
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
        /// Provider, for default-model
        value: Option<String>,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

/// Diagnostics go to stderr so they never interleave with streamed replies.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let options = SessionOptions {
        provider: args.provider,
        model: args.model,
        base_url: args.base_url,
        log: args.log,
    };

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(options).await,
        Commands::Say { prompt } => run_say(prompt, options).await,
        Commands::Set { key, value } => {
            let mut config = Config::load()?;
            match apply_set(&mut config, &key, &value) {
                Ok(message) => {
                    config.save()?;
                    println!("✅ {message}");
                    Ok(())
                }
                Err(message) => {
                    eprintln!("❌ {message}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Unset { key, value } => {
            let mut config = Config::load()?;
            match apply_unset(&mut config, &key, value.as_deref()) {
                Ok(message) => {
                    config.save()?;
                    println!("✅ {message}");
                    Ok(())
                }
                Err(message) => {
                    eprintln!("❌ {message}");
                    std::process::exit(1);
                }
            }
        }
    }
}
