//! Single entry point for sending a message and stopping a reply.
//!
//! The orchestrator owns the [`Session`], validates the selection before any
//! network activity, picks streaming or plain mode from the provider's
//! capabilities, and folds stream events back into the transcript.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiKeyStatus, ChatBackend, ChatCompletionRequest, ProviderInfo};
use crate::core::chat_stream::{
    ChatStreamService, StreamEvent, StreamHandle, StreamParams, StreamState,
};
use crate::core::config::defaults::DEFAULT_SYSTEM_PROMPT;
use crate::core::config::{Config, SamplingSettings};
use crate::core::error::{CompletionError, TransportError, ValidationError};
use crate::core::session::Session;


/// How the most recent assistant turn ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed(TransportError),
    Cancelled,
}

#[derive(Clone, Debug, Default)]
pub struct Selection {
    pub provider: Option<ProviderInfo>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Overrides the status advertised in the provider metadata.
    pub credential: Option<ApiKeyStatus>,
}

enum Wake {
    Event(Option<(StreamEvent, u64)>),
    Settled(StreamState),
}

pub struct CompletionOrchestrator {
    backend: Arc<dyn ChatBackend>,
    service: ChatStreamService,
    events: mpsc::UnboundedReceiver<(StreamEvent, u64)>,
    session: Session,
    selection: Selection,
    sampling: SamplingSettings,
    system_prompt: String,
    idle_timeout: Option<Duration>,
    active: Option<StreamHandle>,
    current_stream_id: u64,
    streaming: bool,
    last_error: Option<TransportError>,
    last_outcome: Option<TurnOutcome>,
}

impl CompletionOrchestrator {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        let (service, events) = ChatStreamService::new();
        Self {
            backend,
            service,
            events,
            session: Session::new(),
            selection: Selection::default(),
            sampling: SamplingSettings::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            idle_timeout: None,
            active: None,
            current_stream_id: 0,
            streaming: false,
            last_error: None,
            last_outcome: None,
        }
    }

    /// Apply sampling, system prompt and idle timeout from the config file.
    pub fn with_config(backend: Arc<dyn ChatBackend>, config: &Config) -> Self {
        let mut orchestrator = Self::new(backend);
        orchestrator.sampling = config.sampling.clone();
        orchestrator.system_prompt = config.system_prompt().to_string();
        orchestrator.idle_timeout = config.idle_timeout();
        orchestrator
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Switch provider. A selected model survives only if the new provider
    /// lists it, and any credential override is dropped.
    pub fn select_provider(&mut self, provider: ProviderInfo) {
        let keep_model = self
            .selection
            .model
            .as_ref()
            .is_some_and(|model| provider.models.is_empty() || provider.models.contains(model));
        if !keep_model {
            self.selection.model = None;
        }
        self.selection.credential = None;
        self.selection.provider = Some(provider);
    }

    pub fn select_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        self.selection.model = (!model.trim().is_empty()).then_some(model);
    }

    pub fn set_api_key(&mut self, api_key: Option<String>) {
        self.selection.api_key = api_key.filter(|key| !key.trim().is_empty());
    }

    pub fn set_credential_status(&mut self, status: ApiKeyStatus) {
        self.selection.credential = Some(status);
    }

    pub fn set_sampling(&mut self, sampling: SamplingSettings) {
        self.sampling = sampling;
    }

    pub fn sampling(&self) -> &SamplingSettings {
        &self.sampling
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
    }

    pub fn set_idle_timeout(&mut self, idle_timeout: Option<Duration>) {
        self.idle_timeout = idle_timeout;
    }

    /// Model that the next request will use.
    pub fn effective_model(&self) -> Option<&str> {
        self.selection.model.as_deref().or_else(|| {
            self.selection
                .provider
                .as_ref()
                .and_then(|provider| provider.models.first())
                .map(String::as_str)
        })
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn last_error(&self) -> Option<&TransportError> {
        self.last_error.as_ref()
    }

    pub fn last_outcome(&self) -> Option<&TurnOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn active_stream(&self) -> Option<&StreamHandle> {
        self.active.as_ref()
    }

    /// Validate, record the user turn and dispatch the request. Returns the
    /// id of the dispatched stream.
    pub fn send(&mut self, text: &str) -> Result<u64, CompletionError> {
        let (provider, model) = self.validate(text)?;

        self.stop();

        self.session.push_user(text.trim());
        self.session.ensure_system_prompt(&self.system_prompt);
        let request = self.build_request(&provider, &model);
        self.session.begin_assistant_turn();

        self.current_stream_id += 1;
        let stream_id = self.current_stream_id;
        let params = StreamParams {
            backend: Arc::clone(&self.backend),
            request,
            cancel_token: CancellationToken::new(),
            stream_id,
            idle_timeout: self.idle_timeout,
        };

        info!(
            stream_id,
            provider = %provider.id,
            model = %model,
            streaming = provider.supports_streaming,
            "Dispatching completion"
        );
        let handle = if provider.supports_streaming {
            self.service.spawn_stream(params)
        } else {
            self.service.spawn_completion(params)
        };

        self.active = Some(handle);
        self.streaming = true;
        self.last_error = None;
        Ok(stream_id)
    }

    /// Cancel the in-flight request, if any, and close the turn. Partial
    /// output stays in the transcript. Returns whether a stream was actually
    /// cancelled.
    pub fn stop(&mut self) -> bool {
        let cancelled = self
            .active
            .take()
            .map(|handle| handle.cancel())
            .unwrap_or(false);
        if self.streaming {
            self.last_outcome = Some(TurnOutcome::Cancelled);
        }
        self.session.end_turn();
        self.streaming = false;
        cancelled
    }

    /// Stop any reply and start an empty conversation.
    pub fn reset(&mut self) {
        self.stop();
        self.session.reset();
        self.last_error = None;
        self.last_outcome = None;
    }

    /// Fold one event into the session. Events from superseded streams are
    /// ignored. Returns the outcome when the event ends the turn.
    pub fn handle_event(&mut self, event: StreamEvent, stream_id: u64) -> Option<TurnOutcome> {
        if !self.streaming || stream_id != self.current_stream_id {
            debug!(
                stream_id,
                current = self.current_stream_id,
                "Ignoring event from inactive stream"
            );
            return None;
        }

        match event {
            StreamEvent::Chunk(chunk) => {
                self.session.apply_delta(&chunk.delta);
                None
            }
            StreamEvent::Response(response) => {
                self.session.set_assistant_content(response.first_content());
                None
            }
            StreamEvent::Done => {
                self.settle(TurnOutcome::Completed);
                Some(TurnOutcome::Completed)
            }
            StreamEvent::Error(err) => {
                warn!(stream_id, error = %err, "Completion failed");
                self.last_error = Some(err.clone());
                let outcome = TurnOutcome::Failed(err);
                self.settle(outcome.clone());
                Some(outcome)
            }
        }
    }

    /// Wait for the next event of the current stream and apply it. Returns
    /// `None` once no turn is in flight.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        let event = self.recv_current().await?;
        let stream_id = self.current_stream_id;
        self.handle_event(event.clone(), stream_id);
        Some(event)
    }

    /// Drive the current turn to its end. `None` when no turn was ever sent.
    pub async fn wait_for_turn(&mut self) -> Option<TurnOutcome> {
        while let Some(event) = self.recv_current().await {
            let stream_id = self.current_stream_id;
            if let Some(outcome) = self.handle_event(event, stream_id) {
                return Some(outcome);
            }
        }
        self.last_outcome.clone()
    }

    fn validate(&self, text: &str) -> Result<(ProviderInfo, String), ValidationError> {
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }

        let provider = self
            .selection
            .provider
            .as_ref()
            .ok_or(ValidationError::NoProvider)?;

        if provider.requires_credential() {
            let status = self
                .selection
                .credential
                .unwrap_or_else(|| provider.advertised_key_status());
            if !status.configured && self.selection.api_key.is_none() {
                let label = if provider.name.is_empty() {
                    provider.id.clone()
                } else {
                    provider.name.clone()
                };
                return Err(ValidationError::MissingCredential { provider: label });
            }
        }

        let model = self
            .effective_model()
            .ok_or(ValidationError::NoModel)?
            .to_string();

        Ok((provider.clone(), model))
    }

    fn build_request(&self, provider: &ProviderInfo, model: &str) -> ChatCompletionRequest {
        let sampling = &self.sampling;
        ChatCompletionRequest {
            provider: Some(provider.id.clone()),
            model: Some(model.to_string()),
            messages: self.session.wire_messages(),
            stream: provider.supports_streaming,
            api_key: self.selection.api_key.clone(),
            temperature: Some(sampling.temperature),
            max_tokens: sampling.max_tokens,
            top_p: Some(sampling.top_p),
            presence_penalty: Some(sampling.presence_penalty),
            frequency_penalty: Some(sampling.frequency_penalty),
            stop: (!sampling.stop.is_empty()).then(|| sampling.stop.clone()),
            metadata: None,
        }
    }

    fn settle(&mut self, outcome: TurnOutcome) {
        self.session.end_turn();
        self.streaming = false;
        self.active = None;
        self.last_outcome = Some(outcome);
    }

    /// Next event of the current stream. Notices a cancel made through a
    /// cloned handle, which never produces an event.
    async fn recv_current(&mut self) -> Option<StreamEvent> {
        loop {
            if !self.streaming {
                return None;
            }
            let handle = self.active.clone()?;

            let wake = tokio::select! {
                biased;
                event = self.events.recv() => Wake::Event(event),
                state = handle.wait() => Wake::Settled(state),
            };

            let received = match wake {
                Wake::Event(event) => event,
                Wake::Settled(StreamState::Cancelled) => {
                    self.settle(TurnOutcome::Cancelled);
                    return None;
                }
                // Completed or failed: the terminal event follows.
                Wake::Settled(_) => self.events.recv().await,
            };

            let (event, stream_id) = received?;
            if stream_id == self.current_stream_id {
                return Some(event);
            }
            debug!(
                stream_id,
                current = self.current_stream_id,
                "Dropping event from superseded stream"
            );
        }
    }
}
