//! Push-subscription feed transport.
//!
//! The client joins one logical topic and subscribes bounded interest
//! sets (character ids, solar system ids). The transport reconnects
//! on disconnect; the worker must replay all current subscriptions
//! before resuming message handling, otherwise interest is silently
//! lost upstream.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::warn;

use feed_core::{Error, Killmail, Result};

/// Client → feed messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundMessage {
    Join { topic: String },
    SubscribeCharacters { characters: Vec<u64> },
    SubscribeSystems { systems: Vec<u64> },
}

/// Feed → client messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// A batch of killmails matching our interest sets.
    BatchUpdate { killmails: Vec<Killmail> },
    /// Periodic feed-side counter; informational only.
    CountUpdate { count: u64 },
    #[serde(other)]
    Unknown,
}

/// The current interest sets, with caps so a growing roster cannot
/// balloon the subscription payloads (or feed-side state) unbounded.
#[derive(Debug)]
pub struct SubscriptionSet {
    characters: BTreeSet<u64>,
    systems: BTreeSet<u64>,
    max_characters: usize,
    max_systems: usize,
}

impl SubscriptionSet {
    pub fn new(max_characters: usize, max_systems: usize) -> Self {
        Self {
            characters: BTreeSet::new(),
            systems: BTreeSet::new(),
            max_characters,
            max_systems,
        }
    }

    /// Adds character ids up to the cap; returns how many were kept.
    pub fn add_characters(&mut self, ids: impl IntoIterator<Item = u64>) -> usize {
        let mut added = 0;
        let mut dropped = 0;
        for id in ids {
            if self.characters.len() >= self.max_characters && !self.characters.contains(&id) {
                dropped += 1;
                continue;
            }
            if self.characters.insert(id) {
                added += 1;
            }
        }
        if dropped > 0 {
            warn!(dropped, cap = self.max_characters, "character subscription cap reached");
        }
        added
    }

    /// Adds system ids up to the cap; returns how many were kept.
    pub fn add_systems(&mut self, ids: impl IntoIterator<Item = u64>) -> usize {
        let mut added = 0;
        let mut dropped = 0;
        for id in ids {
            if self.systems.len() >= self.max_systems && !self.systems.contains(&id) {
                dropped += 1;
                continue;
            }
            if self.systems.insert(id) {
                added += 1;
            }
        }
        if dropped > 0 {
            warn!(dropped, cap = self.max_systems, "system subscription cap reached");
        }
        added
    }

    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    /// The messages that re-establish all current interest on a fresh
    /// connection. Must be sent after the join and before any inbound
    /// message is handled.
    pub fn replay_messages(&self) -> Vec<OutboundMessage> {
        let mut messages = Vec::new();
        if !self.characters.is_empty() {
            messages.push(OutboundMessage::SubscribeCharacters {
                characters: self.characters.iter().copied().collect(),
            });
        }
        if !self.systems.is_empty() {
            messages.push(OutboundMessage::SubscribeSystems {
                systems: self.systems.iter().copied().collect(),
            });
        }
        messages
    }
}

/// One live connection to the push feed.
#[async_trait]
pub trait PushSession: Send {
    async fn send(&mut self, msg: &OutboundMessage) -> Result<()>;
    /// Next inbound message; `None` when the connection is closed.
    async fn next(&mut self) -> Option<Result<InboundMessage>>;
}

/// Establishes sessions; the worker reconnects through this on every
/// disconnect.
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PushSession>>;
}

/// Websocket connector for the production feed.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn PushSession>> {
        let (socket, _response) = connect_async(&self.url)
            .await
            .map_err(|e| Error::transport(format!("push feed connect: {e}")))?;
        Ok(Box::new(WsSession { socket }))
    }
}

struct WsSession {
    socket: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

#[async_trait]
impl PushSession for WsSession {
    async fn send(&mut self, msg: &OutboundMessage) -> Result<()> {
        let text = serde_json::to_string(msg)?;
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| Error::transport(format!("push feed send: {e}")))
    }

    async fn next(&mut self) -> Option<Result<InboundMessage>> {
        loop {
            let frame = match self.socket.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(Error::transport(format!("push feed read: {e}")))),
            };
            match frame {
                Message::Text(text) => {
                    return Some(
                        serde_json::from_str(&text)
                            .map_err(|e| Error::invalid_payload(format!("push message: {e}"))),
                    );
                }
                Message::Close(_) => return None,
                // Pings are answered by tungstenite itself.
                _ => continue,
            }
        }
    }
}
