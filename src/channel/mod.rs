//! Approval channel transports
//!
//! The gate publishes proposals through an [`ApprovalChannel`] and receives
//! `(text, origin)` events back through an mpsc stream. Resolution failures
//! on send are reported as `Ok(false)` so callers can deny the gated action
//! instead of crashing the request path.

use crate::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

pub mod rest;
pub use rest::RestChannel;

/// An inbound message observed on the chat server.
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    pub text: String,
    /// Channel identifier the message arrived on.
    pub origin: String,
}

/// Outbound side of the approval transport.
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    /// Send a message to the named destination. Returns `Ok(false)` when the
    /// destination cannot be resolved or the post is rejected; transport
    /// errors below that level map to `Err`.
    async fn send(&self, destination: &str, message: &str) -> Result<bool>;
}

/// In-memory channel for tests and the CLI demo. Records every outbound
/// message and hands out an event sender for injecting replies.
pub struct InMemoryChannel {
    outbound: Mutex<Vec<(String, String)>>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl InMemoryChannel {
    /// Returns the channel plus the receiver half to feed the gate listener.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: Mutex::new(Vec::new()),
                events: tx,
            },
            rx,
        )
    }

    /// Inject an inbound reply, as if a human posted on the chat server.
    pub fn receive(&self, text: impl Into<String>, origin: impl Into<String>) {
        let _ = self.events.send(ChannelEvent {
            text: text.into(),
            origin: origin.into(),
        });
    }

    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.outbound.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApprovalChannel for InMemoryChannel {
    async fn send(&self, destination: &str, message: &str) -> Result<bool> {
        self.outbound
            .lock()
            .unwrap()
            .push((destination.to_string(), message.to_string()));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_channel_records_sends() {
        let (channel, _rx) = InMemoryChannel::new();
        let sent = channel.send("approvals", "hello").await.unwrap();
        assert!(sent);
        assert_eq!(
            channel.sent_messages(),
            vec![("approvals".to_string(), "hello".to_string())]
        );
    }

    #[tokio::test]
    async fn test_in_memory_channel_delivers_events() {
        let (channel, mut rx) = InMemoryChannel::new();
        channel.receive("approve abcd1234", "approvals");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.text, "approve abcd1234");
        assert_eq!(event.origin, "approvals");
    }
}
