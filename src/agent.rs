//! Remote agent channel and session reset endpoint
//!
//! The agent receives `{"type":"utterance","text":...}` and answers with
//! `{"text":..., "audio":<base64>}`, where `audio` may be missing. Replies and
//! channel failures are posted to the controller's event queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use crate::event::{Event, EventSender};
use crate::{Error, Result};

/// Message sent to the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentRequest {
    /// A completed user turn
    Utterance {
        /// What the user said
        text: String,
    },
}

/// Reply from the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    /// Reply text
    pub text: String,
    /// Base64 speech for the reply, if synthesized
    #[serde(default)]
    pub audio: Option<String>,
}

impl AgentReply {
    /// The audio payload, treating an empty string as absent
    #[must_use]
    pub fn audio_payload(&self) -> Option<&str> {
        self.audio.as_deref().filter(|a| !a.trim().is_empty())
    }
}

/// Parse one reply frame
///
/// # Errors
///
/// Returns error if the frame is not a valid reply
pub fn parse_reply(frame: &str) -> Result<AgentReply> {
    Ok(serde_json::from_str(frame)?)
}

/// Why the agent channel failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFault {
    /// A frame that is not a valid reply
    Malformed(String),
    /// The connection closed
    Disconnected,
}

impl std::fmt::Display for ChannelFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(reason) => write!(f, "malformed reply: {reason}"),
            Self::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Outbound half of the agent channel
pub trait AgentChannel {
    /// Queue an utterance for the agent
    ///
    /// # Errors
    ///
    /// Returns error if the channel is closed
    fn send_utterance(&mut self, text: &str) -> Result<()>;
}

/// JSON-over-WebSocket agent channel
///
/// Once the agent closes the connection every further send fails.
#[derive(Debug)]
pub struct WsAgentChannel {
    outgoing: mpsc::UnboundedSender<AgentRequest>,
    open: Arc<AtomicBool>,
}

impl WsAgentChannel {
    /// Connect and spawn the reader and writer tasks
    ///
    /// # Errors
    ///
    /// Returns error if the WebSocket handshake fails
    pub async fn connect(url: &str, events: EventSender) -> Result<Self> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| Error::Channel(format!("failed to connect to {url}: {e}")))?;
        tracing::info!(url, "connected to agent");

        let (mut sink, mut stream) = socket.split();
        let (outgoing, mut requests) = mpsc::unbounded_channel::<AgentRequest>();
        let (closed_tx, mut closed_rx) = oneshot::channel::<()>();
        let open = Arc::new(AtomicBool::new(true));

        tokio::spawn(async move {
            loop {
                let request = tokio::select! {
                    request = requests.recv() => match request {
                        Some(request) => request,
                        None => break,
                    },
                    _ = &mut closed_rx => {
                        requests.close();
                        break;
                    }
                };
                let frame = match serde_json::to_string(&request) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to encode agent request");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    tracing::warn!(error = %e, "agent write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_open = Arc::clone(&open);
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(frame)) => match parse_reply(frame.as_str()) {
                        Ok(reply) => events.send(Event::Reply(reply)),
                        Err(e) => {
                            tracing::warn!(error = %e, "malformed agent reply");
                            events.send(Event::ChannelFault(ChannelFault::Malformed(e.to_string())));
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "agent read failed");
                        break;
                    }
                }
            }
            tracing::warn!("agent connection closed");
            reader_open.store(false, Ordering::Release);
            let _ = closed_tx.send(());
            events.send(Event::ChannelFault(ChannelFault::Disconnected));
        });

        Ok(Self { outgoing, open })
    }
}

impl AgentChannel for WsAgentChannel {
    fn send_utterance(&mut self, text: &str) -> Result<()> {
        if !self.open.load(Ordering::Acquire) {
            return Err(Error::Channel("agent connection closed".to_string()));
        }
        self.outgoing
            .send(AgentRequest::Utterance {
                text: text.to_string(),
            })
            .map_err(|_| Error::Channel("agent connection closed".to_string()))
    }
}

/// Idempotent conversation reset on the agent side
#[async_trait]
pub trait SessionReset: Send + Sync {
    /// Ask the agent to forget the conversation
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or is rejected
    async fn reset(&self) -> Result<()>;
}

/// `POST {url}` reset endpoint
#[derive(Debug, Clone)]
pub struct HttpSessionReset {
    client: reqwest::Client,
    url: String,
}

impl HttpSessionReset {
    /// Create a reset client for `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl SessionReset for HttpSessionReset {
    async fn reset(&self) -> Result<()> {
        self.client
            .post(&self.url)
            .send()
            .await?
            .error_for_status()?;
        tracing::info!(url = %self.url, "conversation reset");
        Ok(())
    }
}
