//! Lifecycle of a single completion request.
//!
//! Each request runs on its own task and reports through the service's event
//! channel, tagged with the stream id it was started with. A stream ends in
//! exactly one terminal state; `Done` and `Error` are only emitted by the
//! task that wins the transition into that state, so a cancelled stream
//! never reports either.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ChatBackend, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};
use crate::core::error::TransportError;
use crate::core::event_parser::{parse_frame, FrameEvent};
use crate::core::frame_decoder::frames;

#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// One parsed delta, in wire order.
    Chunk(ChatCompletionChunk),
    /// Whole answer of a non-streaming request.
    Response(ChatCompletionResponse),
    Done,
    Error(TransportError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Requesting,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Cancelled | StreamState::Failed
        )
    }
}

/// Shared state cell; terminal states are sticky.
#[derive(Debug)]
struct StateCell(watch::Sender<StreamState>);

impl StateCell {
    fn new() -> Self {
        Self(watch::Sender::new(StreamState::Idle))
    }

    /// Move to `next` unless a terminal state was already reached. Returns
    /// whether the transition happened.
    fn advance(&self, next: StreamState) -> bool {
        self.0.send_if_modified(|state| {
            if state.is_terminal() || *state == next {
                false
            } else {
                *state = next;
                true
            }
        })
    }

    fn get(&self) -> StreamState {
        *self.0.borrow()
    }
}

/// Cancellation capability for one in-flight request.
///
/// Cheap to clone; every clone controls the same stream.
#[derive(Clone, Debug)]
pub struct StreamHandle {
    stream_id: u64,
    cancel_token: CancellationToken,
    state: Arc<StateCell>,
}

impl StreamHandle {
    fn new(stream_id: u64, cancel_token: CancellationToken) -> Self {
        Self {
            stream_id,
            cancel_token,
            state: Arc::new(StateCell::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.stream_id
    }

    /// Abort the request. Safe to call repeatedly and after completion;
    /// returns `true` only for the call that actually cancelled the stream.
    pub fn cancel(&self) -> bool {
        let cancelled = self.state.advance(StreamState::Cancelled);
        self.cancel_token.cancel();
        if cancelled {
            debug!(stream_id = self.stream_id, "Stream cancelled");
        }
        cancelled
    }

    pub fn state(&self) -> StreamState {
        self.state.get()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Wait until the stream reaches a terminal state.
    pub async fn wait(&self) -> StreamState {
        let mut rx = self.state.0.subscribe();
        let settled = match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        settled
    }
}

pub struct StreamParams {
    pub backend: Arc<dyn ChatBackend>,
    pub request: ChatCompletionRequest,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
    /// Fail the stream when no frame arrives for this long.
    pub idle_timeout: Option<Duration>,
}

type EventSender = mpsc::UnboundedSender<(StreamEvent, u64)>;

#[derive(Clone)]
pub struct ChatStreamService {
    tx: EventSender,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamEvent, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Start a streaming request. The stream flag is forced on.
    pub fn spawn_stream(&self, params: StreamParams) -> StreamHandle {
        let StreamParams {
            backend,
            mut request,
            cancel_token,
            stream_id,
            idle_timeout,
        } = params;
        request.stream = true;

        let handle = StreamHandle::new(stream_id, cancel_token.clone());
        let state = Arc::clone(&handle.state);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            state.advance(StreamState::Requesting);
            let emitter = Emitter {
                tx: &tx,
                state: &state,
                stream_id,
            };

            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {}
                result = read_stream(backend.as_ref(), &request, idle_timeout, &emitter) => {
                    emitter.finish(result);
                }
            }
        });

        handle
    }

    /// Start a plain request with the same lifecycle as a stream. The
    /// stream flag is forced off and the answer arrives as one
    /// [`StreamEvent::Response`] followed by [`StreamEvent::Done`].
    pub fn spawn_completion(&self, params: StreamParams) -> StreamHandle {
        let StreamParams {
            backend,
            mut request,
            cancel_token,
            stream_id,
            ..
        } = params;
        request.stream = false;

        let handle = StreamHandle::new(stream_id, cancel_token.clone());
        let state = Arc::clone(&handle.state);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            state.advance(StreamState::Requesting);
            let emitter = Emitter {
                tx: &tx,
                state: &state,
                stream_id,
            };

            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {}
                result = backend.complete(&request) => {
                    let result = result.map(|response| {
                        emitter.emit(StreamEvent::Response(response));
                    });
                    emitter.finish(result);
                }
            }
        });

        handle
    }

    #[cfg(test)]
    pub fn send_for_test(&self, event: StreamEvent, stream_id: u64) {
        let _ = self.tx.send((event, stream_id));
    }
}

struct Emitter<'a> {
    tx: &'a EventSender,
    state: &'a StateCell,
    stream_id: u64,
}

impl Emitter<'_> {
    fn emit(&self, event: StreamEvent) {
        if self.state.get().is_terminal() {
            return;
        }
        let _ = self.tx.send((event, self.stream_id));
    }

    fn finish(&self, result: Result<(), TransportError>) {
        match result {
            Ok(()) => {
                if self.state.advance(StreamState::Completed) {
                    debug!(stream_id = self.stream_id, "Stream completed");
                    let _ = self.tx.send((StreamEvent::Done, self.stream_id));
                }
            }
            Err(err) => {
                if self.state.advance(StreamState::Failed) {
                    warn!(stream_id = self.stream_id, error = %err, "Stream failed");
                    let _ = self.tx.send((StreamEvent::Error(err), self.stream_id));
                }
            }
        }
    }
}

/// Sequential pull loop: one outstanding read at a time, frames handled in
/// arrival order.
async fn read_stream(
    backend: &dyn ChatBackend,
    request: &ChatCompletionRequest,
    idle_timeout: Option<Duration>,
    emitter: &Emitter<'_>,
) -> Result<(), TransportError> {
    let body = backend.open_stream(request).await?;
    emitter.state.advance(StreamState::Streaming);

    let frames = frames(body);
    futures_util::pin_mut!(frames);

    let mut malformed = 0_usize;
    loop {
        let next = match idle_timeout {
            Some(limit) => tokio::time::timeout(limit, frames.next())
                .await
                .map_err(|_| TransportError::IdleTimeout(limit))?,
            None => frames.next().await,
        };

        let Some(frame) = next else {
            debug!(stream_id = emitter.stream_id, "Body ended without sentinel");
            break;
        };

        match parse_frame(&frame?) {
            FrameEvent::Delta(chunk) => {
                if let Some(reason) = chunk.delta.finish_reason.as_deref() {
                    debug!(stream_id = emitter.stream_id, finish_reason = reason, "Finish reason received");
                }
                emitter.emit(StreamEvent::Chunk(chunk));
            }
            FrameEvent::Done => break,
            FrameEvent::Ignored => {}
            FrameEvent::Malformed(bad) => {
                malformed += 1;
                warn!(
                    stream_id = emitter.stream_id,
                    payload = %bad.payload,
                    reason = %bad.reason,
                    "Skipping malformed frame"
                );
            }
        }
    }

    if malformed > 0 {
        debug!(stream_id = emitter.stream_id, malformed, "Stream finished with skipped frames");
    }
    Ok(())
}
