//! HTTP access to the chat-completion service.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{ApiKeyStatus, ChatCompletionRequest, ChatCompletionResponse, ErrorBody, ProviderInfo};
use crate::core::error::TransportError;
use crate::utils::url::construct_api_url;

const COMPLETIONS_ENDPOINT: &str = "chat/completions";
const PROVIDERS_ENDPOINT: &str = "providers";

/// Response body as a sequence of transport buffers.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// The two completion calls the core needs from the network.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a completion request and return the body once a successful
    /// status line and headers have arrived.
    async fn open_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ByteStream, TransportError>;

    /// Send a completion request and decode the single JSON response.
    async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, TransportError>;
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn fetch_providers(&self) -> Result<Vec<ProviderInfo>, TransportError> {
        self.get_json(PROVIDERS_ENDPOINT).await
    }

    /// Credential status for a provider that needs an API key.
    pub async fn fetch_api_key_status(
        &self,
        provider: &str,
    ) -> Result<ApiKeyStatus, TransportError> {
        let endpoint = format!(
            "{PROVIDERS_ENDPOINT}/{}/key",
            urlencoding::encode(provider)
        );
        self.get_json(&endpoint).await
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, TransportError> {
        let url = construct_api_url(&self.base_url, endpoint);
        debug!(%url, "GET");
        let response = self.client.get(url).send().await?;
        let response = ensure_success(response).await?;
        decode_json(response).await
    }

    async fn post_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<Response, TransportError> {
        let url = construct_api_url(&self.base_url, COMPLETIONS_ENDPOINT);
        debug!(
            %url,
            provider = request.provider.as_deref().unwrap_or_default(),
            model = request.model.as_deref().unwrap_or_default(),
            stream = request.stream,
            messages = request.messages.len(),
            "POST completion"
        );
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;
        ensure_success(response).await
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn open_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ByteStream, TransportError> {
        let response = self.post_completion(request).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Err(TransportError::MissingBody);
        }
        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(TransportError::from)),
        ))
    }

    async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, TransportError> {
        let response = self.post_completion(request).await?;
        decode_json(response).await
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|err| TransportError::InvalidResponse(err.to_string()))
}

async fn ensure_success(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let error = status_error(status, &body);
    debug!(status = status.as_u16(), error = %error, "Request rejected");
    Err(error)
}

/// Prefer the service's `detail`, fall back to the HTTP status text.
fn status_error(status: StatusCode, body: &str) -> TransportError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.detail_text());

    let message = detail.unwrap_or_else(|| {
        status
            .canonical_reason()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
    });

    TransportError::Status {
        status: status.as_u16(),
        message,
    }
}
