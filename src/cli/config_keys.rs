//! `set` / `unset` handling for config keys.

use crate::core::config::Config;
use crate::utils::url::is_http_url;

pub fn apply_set(config: &mut Config, key: &str, value: &[String]) -> Result<String, String> {
    let joined = value.join(" ");
    let joined = joined.trim();
    if joined.is_empty() {
        return Err(format!("Missing value for {key}"));
    }

    match key {
        "default-provider" => {
            config.default_provider = Some(joined.to_string());
            Ok(format!("Set default-provider to: {joined}"))
        }
        "default-model" => {
            let Some((provider, model)) = joined.split_once(' ') else {
                return Err(
                    "Specify the provider and model, e.g. causette set default-model openrouter gpt-4o"
                        .to_string(),
                );
            };
            let model = model.trim();
            config.set_default_model(provider.to_string(), model.to_string());
            Ok(format!("Set default-model for provider '{provider}' to: {model}"))
        }
        "base-url" => {
            if !is_http_url(joined) {
                return Err(format!("Not an http(s) URL: {joined}"));
            }
            config.base_url = Some(joined.to_string());
            Ok(format!("Set base-url to: {joined}"))
        }
        "system-prompt" => {
            config.system_prompt = Some(joined.to_string());
            Ok("Set system-prompt".to_string())
        }
        "idle-timeout" => {
            let secs: u64 = joined
                .parse()
                .map_err(|_| format!("Expected a number of seconds, got: {joined}"))?;
            config.idle_timeout_secs = Some(secs);
            Ok(format!("Set idle-timeout to: {secs}s"))
        }
        _ => Err(format!("Unknown config key: {key}")),
    }
}

pub fn apply_unset(config: &mut Config, key: &str, value: Option<&str>) -> Result<String, String> {
    match key {
        "default-provider" => {
            config.default_provider = None;
            Ok("Unset default-provider".to_string())
        }
        "default-model" => {
            let Some(provider) = value else {
                return Err(
                    "Specify the provider, e.g. causette unset default-model openrouter".to_string(),
                );
            };
            config.unset_default_model(provider);
            Ok(format!("Unset default-model for provider: {provider}"))
        }
        "base-url" => {
            config.base_url = None;
            Ok("Unset base-url".to_string())
        }
        "system-prompt" => {
            config.system_prompt = None;
            Ok("Unset system-prompt".to_string())
        }
        "idle-timeout" => {
            config.idle_timeout_secs = None;
            Ok("Unset idle-timeout".to_string())
        }
        _ => Err(format!("Unknown config key: {key}")),
    }
}
