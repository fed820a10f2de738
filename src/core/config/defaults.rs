use std::time::Duration;

use crate::core::config::data::Config;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an AI assistant designed for interpretability research. Provide clear, well-structured answers.";

pub const BASE_URL_ENV: &str = "CAUSETTE_BASE_URL";
pub const API_KEY_ENV: &str = "CAUSETTE_API_KEY";

impl Config {
    pub fn get_default_model(&self, provider: &str) -> Option<&String> {
        let normalized = provider.to_lowercase();
        self.default_models
            .get(&normalized)
            .or_else(|| self.default_models.get(provider))
    }

    pub fn set_default_model(&mut self, provider: String, model: String) {
        let normalized = provider.to_lowercase();
        self.default_models.insert(normalized.clone(), model);
        if normalized != provider {
            self.default_models.remove(&provider);
        }
    }

    pub fn unset_default_model(&mut self, provider: &str) {
        let normalized = provider.to_lowercase();
        self.default_models.remove(&normalized);
        if normalized != provider {
            self.default_models.remove(provider);
        }
    }

    /// Command-line value first, then the environment, then the config file.
    pub fn resolve_base_url(&self, cli_override: Option<&str>) -> String {
        cli_override
            .map(str::to_owned)
            .or_else(|| non_empty_env(BASE_URL_ENV))
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Runtime API key supplied through the environment, if any.
pub fn runtime_api_key() -> Option<String> {
    non_empty_env(API_KEY_ENV)
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
