//! Shared startup for the chat and say commands: config, service client,
//! provider and model selection.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::{ApiClient, ProviderInfo};
use crate::core::config::defaults::runtime_api_key;
use crate::core::config::Config;
use crate::core::orchestrator::CompletionOrchestrator;
use crate::core::transcript::format_workspace_label;
use crate::utils::logging::LoggingState;
use crate::utils::url::is_http_url;

#[derive(Debug, Default, Clone)]
pub struct SessionOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub log: Option<PathBuf>,
}

pub struct PreparedSession {
    pub orchestrator: CompletionOrchestrator,
    pub logging: LoggingState,
}

impl PreparedSession {
    pub fn workspace_label(&self) -> String {
        let name = self
            .orchestrator
            .selection()
            .provider
            .as_ref()
            .map(|provider| {
                if provider.name.is_empty() {
                    provider.id.as_str()
                } else {
                    provider.name.as_str()
                }
            })
            .unwrap_or_default();
        format_workspace_label(name)
    }

    pub fn model_label(&self) -> String {
        self.orchestrator
            .effective_model()
            .unwrap_or("unknown model")
            .to_string()
    }
}

pub fn client_for(config: &Config, base_url: Option<&str>) -> Result<ApiClient, Box<dyn Error>> {
    let base_url = config.resolve_base_url(base_url);
    if !is_http_url(&base_url) {
        return Err(format!("Not an http(s) base URL: {base_url}").into());
    }
    Ok(ApiClient::new(base_url))
}

/// Resolve the provider from the command line, then the configured default,
/// then the first one the service lists.
pub fn pick_provider(
    providers: &[ProviderInfo],
    requested: Option<&str>,
    configured_default: Option<&str>,
) -> Result<ProviderInfo, String> {
    let find = |wanted: &str| {
        providers.iter().find(|provider| {
            provider.id.eq_ignore_ascii_case(wanted) || provider.name.eq_ignore_ascii_case(wanted)
        })
    };

    if let Some(wanted) = requested.map(str::trim).filter(|wanted| !wanted.is_empty()) {
        return find(wanted).cloned().ok_or_else(|| {
            let available: Vec<&str> = providers.iter().map(|p| p.id.as_str()).collect();
            format!(
                "Unknown provider '{wanted}'. Available providers: {}",
                available.join(", ")
            )
        });
    }

    if let Some(default) = configured_default {
        match find(default) {
            Some(provider) => return Ok(provider.clone()),
            None => warn!(provider = default, "Configured default provider is not offered"),
        }
    }

    providers
        .first()
        .cloned()
        .ok_or_else(|| "The service reported no providers.".to_string())
}

pub async fn prepare_session(options: SessionOptions) -> Result<PreparedSession, Box<dyn Error>> {
    let config = Config::load()?;
    let client = client_for(&config, options.base_url.as_deref())?;

    let providers = client
        .fetch_providers()
        .await
        .map_err(|err| format!("Could not list providers at {}: {err}", client.base_url()))?;
    let provider = pick_provider(
        &providers,
        options.provider.as_deref(),
        config.default_provider.as_deref(),
    )?;
    let model = options
        .model
        .or_else(|| config.get_default_model(&provider.id).cloned());

    let credential = if provider.requires_credential() {
        match client.fetch_api_key_status(&provider.id).await {
            Ok(status) => Some(status),
            Err(err) => {
                warn!(provider = %provider.id, error = %err, "Falling back to advertised key status");
                None
            }
        }
    } else {
        None
    };

    debug!(provider = %provider.id, model = ?model, "Session prepared");
    let mut orchestrator = CompletionOrchestrator::with_config(Arc::new(client), &config);
    orchestrator.select_provider(provider);
    if let Some(status) = credential {
        orchestrator.set_credential_status(status);
    }
    if let Some(model) = model {
        orchestrator.select_model(model);
    }
    orchestrator.set_api_key(runtime_api_key());

    let logging = LoggingState::new(options.log)?;
    Ok(PreparedSession {
        orchestrator,
        logging,
    })
}
