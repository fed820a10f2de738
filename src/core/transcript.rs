//! Markdown export of a conversation.

use chrono::{Local, TimeZone};

use crate::core::message::Message;

/// Human label for a provider id such as `open_router` or `hugging-face`.
pub fn format_workspace_label(name: &str) -> String {
    let normalized = name.replace(['-', '_'], " ");
    let normalized = normalized.trim();

    let mut chars = normalized.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Workspace".to_string(),
    }
}

/// Render the conversation as markdown, with times in the local zone.
/// Empty when there are no messages.
pub fn build_transcript<'a>(
    session_name: &str,
    model_label: &str,
    workspace_label: &str,
    messages: impl IntoIterator<Item = &'a Message>,
) -> String {
    build_transcript_in(&Local, session_name, model_label, workspace_label, messages)
}

fn build_transcript_in<'a, Tz: TimeZone>(
    zone: &Tz,
    session_name: &str,
    model_label: &str,
    workspace_label: &str,
    messages: impl IntoIterator<Item = &'a Message>,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let body: Vec<String> = messages
        .into_iter()
        .map(|message| {
            let timestamp = message.created_at.with_timezone(zone).format("%H:%M");
            format!(
                "\n---\n**{}** ({})\n\n{}",
                message.role.as_str().to_uppercase(),
                timestamp,
                message.content
            )
        })
        .collect();

    if body.is_empty() {
        return String::new();
    }

    format!(
        "# {session_name}\n\nModel: {model_label}\nProvider: {workspace_label}\n{}",
        body.join("\n")
    )
}
