//! Line-oriented interactive chat.

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::cli::setup::{prepare_session, PreparedSession, SessionOptions};
use crate::core::chat_stream::StreamEvent;
use crate::core::orchestrator::CompletionOrchestrator;
use crate::core::transcript::build_transcript;

const SESSION_NAME: &str = "Causette chat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Empty,
    Message(String),
    Stop,
    Reset,
    Export(Option<PathBuf>),
    Log,
    Quit,
    Unknown(String),
}

pub fn parse_input(line: &str) -> ReplInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ReplInput::Empty;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return ReplInput::Message(trimmed.to_string());
    };

    let (name, argument) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name {
        "stop" => ReplInput::Stop,
        "reset" | "new" => ReplInput::Reset,
        "export" => ReplInput::Export((!argument.is_empty()).then(|| PathBuf::from(argument))),
        "log" => ReplInput::Log,
        "quit" | "exit" => ReplInput::Quit,
        _ => ReplInput::Unknown(format!("/{name}")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEnd {
    Completed,
    Failed(String),
    Stopped,
}

/// Print the reply as it arrives. `/stop` on the input or Ctrl+C cancels it;
/// other input typed meanwhile is dropped.
pub async fn stream_reply<R, W>(
    orchestrator: &mut CompletionOrchestrator,
    lines: &mut Lines<R>,
    out: &mut W,
) -> io::Result<ReplyEnd>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut input_open = true;
    loop {
        tokio::select! {
            event = orchestrator.next_event() => match event {
                Some(StreamEvent::Chunk(chunk)) => {
                    if let Some(text) = chunk.delta.content.as_deref() {
                        write!(out, "{text}")?;
                        out.flush()?;
                    }
                }
                Some(StreamEvent::Response(response)) => {
                    write!(out, "{}", response.first_content())?;
                    out.flush()?;
                }
                Some(StreamEvent::Done) => {
                    writeln!(out)?;
                    return Ok(ReplyEnd::Completed);
                }
                Some(StreamEvent::Error(err)) => {
                    writeln!(out)?;
                    return Ok(ReplyEnd::Failed(err.to_string()));
                }
                None => {
                    writeln!(out)?;
                    return Ok(ReplyEnd::Stopped);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                orchestrator.stop();
                writeln!(out)?;
                return Ok(ReplyEnd::Stopped);
            }
            line = lines.next_line(), if input_open => match line? {
                Some(line) if parse_input(&line) == ReplInput::Stop => {
                    orchestrator.stop();
                    writeln!(out)?;
                    return Ok(ReplyEnd::Stopped);
                }
                Some(_) => eprintln!("(reply in progress; /stop to interrupt)"),
                None => input_open = false,
            }
        }
    }
}

/// Markdown transcript of the visible conversation; system messages are
/// left out.
pub fn export_transcript(session: &PreparedSession) -> String {
    let snapshot = session.orchestrator.session().snapshot();
    build_transcript(
        SESSION_NAME,
        &session.model_label(),
        &session.workspace_label(),
        snapshot.iter().filter(|message| !message.role.is_system()),
    )
}

fn export(session: &PreparedSession, path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let transcript = export_transcript(session);
    if transcript.is_empty() {
        eprintln!("Nothing to export yet.");
        return Ok(());
    }
    match path {
        Some(path) => {
            std::fs::write(&path, transcript)?;
            eprintln!("📝 Exported conversation to {}", path.display());
        }
        None => println!("{transcript}"),
    }
    Ok(())
}

pub async fn run_chat(options: SessionOptions) -> Result<(), Box<dyn Error>> {
    let mut session = prepare_session(options).await?;
    eprintln!(
        "💬 {} · {}  (/quit to leave, /stop or Ctrl+C to interrupt a reply)",
        session.workspace_label(),
        session.model_label()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_input(&line) {
            ReplInput::Empty => {}
            ReplInput::Quit => break,
            ReplInput::Stop => eprintln!("Nothing to stop."),
            ReplInput::Reset => {
                session.orchestrator.reset();
                if let Err(e) = session.logging.log_note("Conversation reset") {
                    eprintln!("Failed to log reset: {e}");
                }
                eprintln!("Started a new conversation.");
            }
            ReplInput::Export(path) => {
                if let Err(e) = export(&session, path) {
                    eprintln!("❌ Export failed: {e}");
                }
            }
            ReplInput::Log => match session.logging.toggle_logging() {
                Ok(message) => eprintln!("{message}"),
                Err(e) => eprintln!("❌ {e}"),
            },
            ReplInput::Unknown(command) => eprintln!("❌ Unknown command: {command}"),
            ReplInput::Message(text) => {
                if let Err(err) = session.orchestrator.send(&text) {
                    eprintln!("❌ {err}");
                    continue;
                }
                if let Err(e) = session.logging.log_user(&text) {
                    eprintln!("Failed to log message: {e}");
                }

                let end = stream_reply(&mut session.orchestrator, &mut lines, &mut stdout).await?;

                let snapshot = session.orchestrator.session().snapshot();
                if let Some(reply) = snapshot.last().filter(|m| m.role.is_assistant()) {
                    if let Err(e) = session.logging.log_assistant(&reply.content) {
                        eprintln!("Failed to log response: {e}");
                    }
                }
                match end {
                    ReplyEnd::Completed => {}
                    ReplyEnd::Failed(message) => eprintln!("❌ Error: {message}"),
                    ReplyEnd::Stopped => eprintln!("⏹ Stopped."),
                }
            }
        }
    }

    session.orchestrator.stop();
    Ok(())
}
