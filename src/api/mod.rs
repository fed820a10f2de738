//! Wire payloads exchanged with the chat-completion service.
//!
//! Field names follow the service's JSON contract exactly; optional request
//! fields are left out of the body when unset.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::message::Role;

pub mod client;

pub use client::{ApiClient, ByteStream, ChatBackend};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct ChatCompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Partial update carried by one streamed frame.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct StreamDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub index: u32,
    pub delta: StreamDelta,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub meta: Option<Map<String, Value>>,
}

impl ChatCompletionChunk {
    #[cfg(test)]
    pub fn text(content: &str) -> Self {
        Self {
            id: String::new(),
            model: String::new(),
            index: 0,
            delta: StreamDelta {
                content: Some(content.to_string()),
                ..StreamDelta::default()
            },
            provider: String::new(),
            meta: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChoiceMessage {
    #[serde(default = "default_assistant_role")]
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

fn default_assistant_role() -> Role {
    Role::Assistant
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChatCompletionChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub finish_reason: Option<String>,
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub meta: Option<Map<String, Value>>,
}

impl ChatCompletionResponse {
    /// Text of the first choice, or an empty string when the service
    /// returned no choices.
    pub fn first_content(&self) -> &str {
        self.choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .unwrap_or("")
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProviderInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub supports_streaming: bool,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl ProviderInfo {
    /// Providers that report API key state in their metadata need a
    /// credential before a completion can be requested.
    pub fn requires_credential(&self) -> bool {
        self.meta.contains_key("api_key_configured") || self.meta.contains_key("api_key_source")
    }

    /// Credential status as advertised in the provider metadata.
    pub fn advertised_key_status(&self) -> ApiKeyStatus {
        let source = self
            .meta
            .get("api_key_source")
            .and_then(Value::as_str)
            .and_then(|raw| ApiKeySource::try_from(raw).ok());

        let source = source.unwrap_or_else(|| {
            let configured = self
                .meta
                .get("api_key_configured")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if configured {
                ApiKeySource::Env
            } else {
                ApiKeySource::None
            }
        });

        ApiKeyStatus {
            configured: source != ApiKeySource::None,
            source,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeySource {
    Env,
    Runtime,
    #[default]
    None,
}

impl TryFrom<&str> for ApiKeySource {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "env" => Ok(ApiKeySource::Env),
            "runtime" => Ok(ApiKeySource::Runtime),
            "none" => Ok(ApiKeySource::None),
            _ => Err(format!("invalid api key source: {value}")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApiKeyStatus {
    pub configured: bool,
    pub source: ApiKeySource,
}

#[derive(Debug, Deserialize, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorBody {
    /// `detail` as display text. Services sometimes send structured details
    /// (validation error lists), which are rendered as compact JSON.
    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Value::String(_) | Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
