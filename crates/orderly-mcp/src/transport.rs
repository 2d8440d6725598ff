//! MCP Transport layer implementations

use async_trait::async_trait;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::io;
use std::pin::Pin;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::debug;

/// Transport trait for MCP communication
///
/// Only `Send` is required: clients keep the transport behind an async mutex,
/// and the SSE event stream from reqwest is not `Sync`.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, message: Value) -> io::Result<()>;
    async fn receive(&mut self) -> io::Result<Option<Value>>;
    async fn close(&mut self) -> io::Result<()>;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        (**self).send(message).await
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        (**self).receive().await
    }

    async fn close(&mut self) -> io::Result<()> {
        (**self).close().await
    }
}

/// Stdio transport for subprocess communication
pub struct StdioTransport {
    child: Child,
    reader: Option<BufReader<tokio::process::ChildStdout>>,
}

impl StdioTransport {
    pub async fn spawn(command: &str, args: &[&str]) -> io::Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture stdout"))?;

        Ok(Self {
            child,
            reader: Some(BufReader::new(stdout)),
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "Stdin not available"))?;

        let json = serde_json::to_string(&message)?;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        Ok(())
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "Reader not available"))?;

        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line).await?;

            if n == 0 {
                return Ok(None);
            }
            // Servers may emit blank keep-alive lines
            if line.trim().is_empty() {
                continue;
            }

            let value: Value = serde_json::from_str(&line)?;
            return Ok(Some(value));
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        self.reader = None;
        self.child.stdin = None;
        self.child.kill().await?;
        Ok(())
    }
}

/// SSE event name carrying the URL that client messages are POSTed to
const ENDPOINT_EVENT: &str = "endpoint";

/// SSE event name carrying a JSON-RPC message from the server
const MESSAGE_EVENT: &str = "message";

type SseEventStream =
    Pin<Box<dyn Stream<Item = Result<Event, EventStreamError<reqwest::Error>>> + Send>>;

/// SSE transport for HTTP-based communication
///
/// The server keeps a `GET` event stream open; its first `endpoint` event names
/// the URL that requests are POSTed to, and responses come back as `message`
/// events on the stream.
pub struct SseTransport {
    sse_url: String,
    client: reqwest::Client,
    endpoint: Option<reqwest::Url>,
    events: Option<SseEventStream>,
}

impl SseTransport {
    /// Open the event stream and wait for the server to announce its endpoint
    pub async fn connect(sse_url: impl Into<String>) -> io::Result<Self> {
        let sse_url = sse_url.into();
        let base = reqwest::Url::parse(&sse_url)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let client = reqwest::Client::new();

        let response = client
            .get(base.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(io::Error::other)?
            .error_for_status()
            .map_err(io::Error::other)?;

        let mut events: SseEventStream = Box::pin(response.bytes_stream().eventsource());

        let endpoint = loop {
            match events.next().await {
                Some(Ok(event)) if event.event == ENDPOINT_EVENT => {
                    break base
                        .join(event.data.trim())
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                }
                Some(Ok(event)) => {
                    debug!(event = %event.event, "Skipping SSE event received before endpoint");
                }
                Some(Err(e)) => return Err(io::Error::other(e.to_string())),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "SSE stream closed before endpoint event",
                    ));
                }
            }
        };

        debug!(url = %sse_url, endpoint = %endpoint, "SSE transport connected");

        Ok(Self {
            sse_url,
            client,
            endpoint: Some(endpoint),
            events: Some(events),
        })
    }

    pub fn url(&self) -> &str {
        &self.sse_url
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        let endpoint = self
            .endpoint
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "SSE transport closed"))?;

        self.client
            .post(endpoint)
            .json(&message)
            .send()
            .await
            .map_err(io::Error::other)?
            .error_for_status()
            .map_err(io::Error::other)?;

        Ok(())
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        let events = self
            .events
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "SSE transport closed"))?;

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| io::Error::other(e.to_string()))?;
            if event.event != MESSAGE_EVENT && !event.event.is_empty() {
                debug!(event = %event.event, "Ignoring SSE event");
                continue;
            }
            let value: Value = serde_json::from_str(&event.data)?;
            return Ok(Some(value));
        }

        Ok(None)
    }

    async fn close(&mut self) -> io::Result<()> {
        // Dropping the response body ends the server-side session
        self.events = None;
        self.endpoint = None;
        Ok(())
    }
}
