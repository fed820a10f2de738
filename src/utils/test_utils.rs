use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::api::{
    ByteStream, ChatBackend, ChatCompletionRequest, ChatCompletionResponse, ProviderInfo,
};
use crate::core::error::TransportError;

/// One step of a scripted response body.
#[derive(Clone, Debug)]
pub enum BodyStep {
    Bytes(Vec<u8>),
    Fail(TransportError),
    /// Never yields again; the body stays open until the reader gives up.
    Hang,
}

impl BodyStep {
    pub fn text(text: &str) -> Self {
        BodyStep::Bytes(text.as_bytes().to_vec())
    }

    pub fn frame(content: &str) -> Self {
        let payload = serde_json::json!({
            "id": "chunk",
            "model": "test-model",
            "index": 0,
            "delta": {"content": content},
            "provider": "test"
        });
        BodyStep::Bytes(format!("data: {payload}\n\n").into_bytes())
    }

    pub fn done() -> Self {
        BodyStep::text("data: [DONE]\n\n")
    }
}

#[derive(Clone, Debug)]
pub enum Script {
    Stream(Vec<BodyStep>),
    Respond(ChatCompletionResponse),
    Reject(TransportError),
    /// The request never receives headers.
    HangOnOpen,
}

/// In-process [`ChatBackend`] replaying canned scripts in order.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_script(&self, request: &ChatCompletionRequest) -> Script {
        self.requests.lock().unwrap().push(request.clone());
        self.scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("no script left for request")
    }
}

fn body_from_steps(steps: Vec<BodyStep>) -> ByteStream {
    let hang = matches!(steps.last(), Some(BodyStep::Hang));
    let items: Vec<Result<Bytes, TransportError>> = steps
        .into_iter()
        .filter_map(|step| match step {
            BodyStep::Bytes(bytes) => Some(Ok(Bytes::from(bytes))),
            BodyStep::Fail(err) => Some(Err(err)),
            BodyStep::Hang => None,
        })
        .collect();

    let body = stream::iter(items);
    if hang {
        Box::pin(body.chain(stream::pending()))
    } else {
        Box::pin(body)
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn open_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ByteStream, TransportError> {
        match self.next_script(request) {
            Script::Stream(steps) => Ok(body_from_steps(steps)),
            Script::Reject(err) => Err(err),
            Script::HangOnOpen => std::future::pending().await,
            Script::Respond(_) => panic!("streaming request answered with a plain response"),
        }
    }

    async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, TransportError> {
        match self.next_script(request) {
            Script::Respond(response) => Ok(response),
            Script::Reject(err) => Err(err),
            Script::HangOnOpen => std::future::pending().await,
            Script::Stream(_) => panic!("plain request answered with a stream"),
        }
    }
}

pub fn plain_response(content: &str) -> ChatCompletionResponse {
    serde_json::from_value(serde_json::json!({
        "id": "resp",
        "model": "test-model",
        "provider": "test",
        "choices": [{
            "index": 0,
            "finish_reason": "stop",
            "message": {"role": "assistant", "content": content}
        }]
    }))
    .expect("canned response should deserialize")
}

pub fn streaming_provider() -> ProviderInfo {
    serde_json::from_value(serde_json::json!({
        "id": "openrouter",
        "name": "OpenRouter",
        "supports_streaming": true,
        "models": ["test-model", "other-model"],
        "meta": {"api_key_configured": true, "api_key_source": "env"}
    }))
    .expect("provider should deserialize")
}

pub fn plain_provider() -> ProviderInfo {
    serde_json::from_value(serde_json::json!({
        "id": "huggingface",
        "name": "HuggingFace",
        "supports_streaming": false,
        "models": ["local-model"]
    }))
    .expect("provider should deserialize")
}

#[derive(Clone, Debug)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct CannedResponse {
    status: u16,
    content_type: &'static str,
    chunks: Vec<String>,
    streamed: bool,
}

impl CannedResponse {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            chunks: vec![body.to_string()],
            streamed: false,
        }
    }

    /// Body written chunk by chunk with short pauses, closed by EOF.
    pub fn event_stream(chunks: Vec<&str>) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            chunks: chunks.into_iter().map(str::to_string).collect(),
            streamed: true,
        }
    }
}

pub struct TestServer {
    addr: SocketAddr,
    requests: Arc<tokio::sync::Mutex<Vec<CapturedRequest>>>,
}

impl TestServer {
    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub async fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().await.clone()
    }
}

/// Serve the canned responses, one connection each, in order.
pub async fn spawn_http_server(responses: Vec<CannedResponse>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");
    let requests = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let captured = Arc::clone(&requests);

    tokio::spawn(async move {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            match read_http_request(&mut stream).await {
                Ok(request) => captured.lock().await.push(request),
                Err(_) => return,
            }
            let _ = write_response(&mut stream, &response).await;
        }
    });

    TestServer { addr, requests }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "Unknown",
    }
}

async fn write_response(stream: &mut TcpStream, response: &CannedResponse) -> std::io::Result<()> {
    let status_line = format!(
        "HTTP/1.1 {} {}\r\n",
        response.status,
        reason_phrase(response.status)
    );

    if response.streamed {
        let head = format!(
            "{status_line}content-type: {}\r\ncache-control: no-cache\r\nconnection: close\r\n\r\n",
            response.content_type
        );
        stream.write_all(head.as_bytes()).await?;
        stream.flush().await?;
        for chunk in &response.chunks {
            tokio::time::sleep(Duration::from_millis(5)).await;
            stream.write_all(chunk.as_bytes()).await?;
            stream.flush().await?;
        }
    } else {
        let body = response.chunks.concat();
        let head = format!(
            "{status_line}content-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            response.content_type,
            body.len()
        );
        stream.write_all(head.as_bytes()).await?;
        stream.write_all(body.as_bytes()).await?;
        stream.flush().await?;
    }
    stream.shutdown().await
}

async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.expect("header end should exist");
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let mut parts = line.splitn(2, ':');
        let Some(name) = parts.next() else {
            continue;
        };
        let value = parts.next().unwrap_or_default().trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        request_line,
        headers,
        body,
    })
}
