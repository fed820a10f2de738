use crate::core::message::{Message, Role};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Plain-text conversation log. User turns are prefixed with `You:`,
/// assistant replies are written as-is and notes start with `##`.
pub struct LoggingState {
    file_path: Option<PathBuf>,
    is_active: bool,
}

impl LoggingState {
    /// Start logging to `log_file` if one is given. The file is opened once
    /// up front so an unwritable path fails early.
    pub fn new(log_file: Option<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut logging = LoggingState {
            file_path: None,
            is_active: false,
        };
        if let Some(path) = log_file {
            logging.set_log_file(path)?;
        }
        Ok(logging)
    }

    pub fn set_log_file(&mut self, path: PathBuf) -> Result<String, Box<dyn std::error::Error>> {
        test_file_access(&path)?;

        let message = format!("Logging enabled to: {}", path.display());
        self.file_path = Some(path);
        self.is_active = true;
        Ok(message)
    }

    /// Pause or resume logging. A pause is recorded in the log first.
    pub fn toggle_logging(&mut self) -> Result<String, Box<dyn std::error::Error>> {
        let Some(path) = self.file_path.clone() else {
            return Err("No log file specified. Start with --log <file> to enable logging.".into());
        };
        if self.is_active {
            self.log_note("Logging paused")?;
            self.is_active = false;
            Ok(format!("Logging paused (file: {})", path.display()))
        } else {
            self.is_active = true;
            Ok(format!("Logging resumed to: {}", path.display()))
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn log_user(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.log_message(&format!("You: {content}"))
    }

    pub fn log_assistant(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        if content.is_empty() {
            return Ok(());
        }
        self.log_message(content)
    }

    pub fn log_note(&self, note: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.log_message(&format!("## {note}"))
    }

    fn log_message(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        let Some(file_path) = self.active_path() else {
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let mut writer = BufWriter::new(file);
        write_entry(&mut writer, content)?;
        writer.flush()?;
        Ok(())
    }

    /// Replace the log with the given messages. System messages are not
    /// logged.
    pub fn rewrite<'a>(
        &self,
        messages: impl IntoIterator<Item = &'a Message>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let Some(file_path) = self.active_path() else {
            return Ok(());
        };
        let parent = file_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut temp_file = NamedTempFile::new_in(parent)?;
        for message in messages {
            match message.role {
                Role::User => write_entry(&mut temp_file, &format!("You: {}", message.content))?,
                Role::Assistant if !message.content.is_empty() => {
                    write_entry(&mut temp_file, &message.content)?
                }
                _ => {}
            }
        }

        temp_file.flush()?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(file_path)?;
        Ok(())
    }

    pub fn get_status_string(&self) -> String {
        match (&self.file_path, self.is_active) {
            (None, _) => "disabled".to_string(),
            (Some(path), active) => format!(
                "{} ({})",
                if active { "active" } else { "paused" },
                path.file_name().unwrap_or_default().to_string_lossy()
            ),
        }
    }

    fn active_path(&self) -> Option<&Path> {
        self.file_path
            .as_deref()
            .filter(|_| self.is_active)
    }
}

fn write_entry(writer: &mut impl Write, content: &str) -> std::io::Result<()> {
    for line in content.lines() {
        writeln!(writer, "{line}")?;
    }
    writeln!(writer)
}

fn test_file_access(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.flush()?;
    Ok(())
}
