//! One-shot "say" command

use std::error::Error;
use std::io;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::chat::{stream_reply, ReplyEnd};
use crate::cli::setup::{prepare_session, SessionOptions};

pub async fn run_say(prompt: Vec<String>, options: SessionOptions) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: causette say <prompt>");
        std::process::exit(1);
    }

    let mut session = prepare_session(options).await?;
    if let Err(err) = session.orchestrator.send(&prompt) {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
    if let Err(e) = session.logging.log_user(&prompt) {
        eprintln!("Failed to log message: {e}");
    }

    // No interactive input; Ctrl+C still stops the reply.
    let mut lines = BufReader::new(tokio::io::empty()).lines();
    let end = stream_reply(&mut session.orchestrator, &mut lines, &mut io::stdout()).await?;

    let snapshot = session.orchestrator.session().snapshot();
    if let Some(reply) = snapshot.last().filter(|m| m.role.is_assistant()) {
        if let Err(e) = session.logging.log_assistant(&reply.content) {
            eprintln!("Failed to log response: {e}");
        }
    }

    match end {
        ReplyEnd::Completed => Ok(()),
        ReplyEnd::Stopped => {
            eprintln!("⏹ Stopped.");
            std::process::exit(130);
        }
        ReplyEnd::Failed(message) => {
            eprintln!("❌ Error: {message}");
            std::process::exit(1);
        }
    }
}
