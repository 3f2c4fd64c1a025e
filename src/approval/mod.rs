//! Human-in-the-loop proposal gate
//!
//! High-stakes actions never run unattended. They are wrapped in a
//! [`Proposal`], published to the approval channel, and held in a pending
//! set until a human replies `approve <id>` (or `reject <id>`), the wait
//! times out, or the process ends.
//!
//! State machine: PENDING -> {APPROVED, EXPIRED}; APPROVED -> EXECUTED
//! (terminal, via callback, at most once).
//!
//! The channel listener is the only concurrently-running part of the engine.
//! It mutates the pending/approved sets behind a mutex; waiters are woken
//! through a `Notify` handle rather than a sleep-poll loop.

use crate::channel::{ApprovalChannel, ChannelEvent};
use crate::models::Proposal;
use crate::Result;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

lazy_static! {
    static ref APPROVE_RE: Regex =
        Regex::new(r"(?i)approve\s+([0-9a-f]{8})").expect("approve pattern is valid");
    static ref REJECT_RE: Regex =
        Regex::new(r"(?i)reject\s+([0-9a-f]{8})").expect("reject pattern is valid");
}

/// Deferred execution for an approved proposal.
pub type ApprovalAction =
    Box<dyn Fn(Proposal) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

#[derive(Default)]
struct GateState {
    pending: HashMap<String, Proposal>,
    approved: HashMap<String, Proposal>,
    callbacks: HashMap<String, ApprovalAction>,
}

pub struct ProposalGate {
    channel: Arc<dyn ApprovalChannel>,
    /// Name of the channel proposals are published to; replies from any
    /// other origin are ignored.
    destination: String,
    state: Mutex<GateState>,
    notify: Notify,
}

impl ProposalGate {
    pub fn new(channel: Arc<dyn ApprovalChannel>, destination: impl Into<String>) -> Self {
        let destination = destination.into();
        info!(channel = %destination, "Proposal gate initialized");
        Self {
            channel,
            destination,
            state: Mutex::new(GateState::default()),
            notify: Notify::new(),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Create a proposal and park it in the pending set.
    pub fn create(
        &self,
        action: impl Into<String>,
        justification: impl Into<String>,
        risk_assessment: impl Into<String>,
        parameters: HashMap<String, Value>,
    ) -> Proposal {
        let proposal = Proposal::new(action, justification, risk_assessment, parameters);

        let mut state = self.state.lock().unwrap();
        state.pending.insert(proposal.id.clone(), proposal.clone());

        info!(id = %proposal.id, action = %proposal.action, "Proposal created");
        proposal
    }

    /// Register the action to run once (and only once) after approval.
    pub fn register_callback(&self, id: &str, callback: ApprovalAction) {
        let mut state = self.state.lock().unwrap();
        state.callbacks.insert(id.to_string(), callback);
    }

    /// Publish the rendered proposal through the approval channel.
    ///
    /// A channel that cannot resolve its destination yields `Ok(false)`;
    /// the caller decides whether to deny the action. No automatic retry.
    pub async fn publish(&self, proposal: &Proposal) -> Result<bool> {
        let sent = self
            .channel
            .send(&self.destination, &proposal.render())
            .await?;

        if sent {
            let mut state = self.state.lock().unwrap();
            if let Some(pending) = state.pending.get_mut(&proposal.id) {
                pending.channel_id = Some(self.destination.clone());
            }
            info!(id = %proposal.id, "Proposal published for approval");
        } else {
            error!(id = %proposal.id, "Failed to publish proposal");
        }

        Ok(sent)
    }

    /// Convenience: create, register, and publish in one shot.
    pub async fn create_and_publish(
        &self,
        action: impl Into<String>,
        justification: impl Into<String>,
        risk_assessment: impl Into<String>,
        parameters: HashMap<String, Value>,
    ) -> Result<(Proposal, bool)> {
        let proposal = self.create(action, justification, risk_assessment, parameters);
        let sent = self.publish(&proposal).await?;
        Ok((proposal, sent))
    }

    /// Scan an incoming message for an approval reply.
    ///
    /// Only messages arriving on the configured approval channel count.
    /// A matched id moves the proposal from pending to approved exactly
    /// once; replaying the same message finds nothing pending and returns
    /// `None`, which is what prevents double-approval.
    pub fn observe(&self, message: &str, origin: &str) -> Option<Proposal> {
        if origin != self.destination {
            return None;
        }

        if let Some(captures) = APPROVE_RE.captures(message) {
            let id = captures.get(1)?.as_str().to_string();

            let mut state = self.state.lock().unwrap();
            let Some(mut proposal) = state.pending.remove(&id) else {
                warn!(id = %id, "Approval received for unknown or already-handled proposal");
                return None;
            };

            proposal.approved = true;
            state.approved.insert(id.clone(), proposal.clone());
            drop(state);

            self.notify.notify_waiters();
            info!(id = %id, "Proposal approved");
            return Some(proposal);
        }

        if let Some(captures) = REJECT_RE.captures(message) {
            let id = captures.get(1).map(|m| m.as_str().to_string())?;
            let mut state = self.state.lock().unwrap();
            if state.pending.remove(&id).is_some() {
                state.callbacks.remove(&id);
                info!(id = %id, "Proposal rejected, action cancelled");
            }
            return None;
        }

        None
    }

    /// Block the calling flow until the proposal is approved or the timeout
    /// elapses. Cancellable wait on a notification handle, not a sleep loop.
    /// On timeout the proposal is discarded from the pending set.
    pub async fn await_approval(&self, proposal: &Proposal, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            // Arm the waiter before checking state so an approval landing
            // between the check and the wait is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_approved(&proposal.id) {
                return true;
            }

            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                self.discard(&proposal.id);
                return false;
            };
            if remaining.is_zero() {
                self.discard(&proposal.id);
                return false;
            }

            if tokio::time::timeout(remaining, notified).await.is_err() {
                self.discard(&proposal.id);
                warn!(id = %proposal.id, "Approval timed out");
                return false;
            }
        }
    }

    /// Run the registered callback for an approved proposal.
    ///
    /// The callback is taken out of the registry before invocation, so a
    /// second call finds nothing and returns false. Callback failures are
    /// reported, never propagated.
    pub async fn execute_approved(&self, proposal: &Proposal) -> bool {
        let callback = {
            let mut state = self.state.lock().unwrap();
            if !state.approved.contains_key(&proposal.id) {
                error!(id = %proposal.id, "Cannot execute unapproved proposal");
                return false;
            }
            state.callbacks.remove(&proposal.id)
        };

        let Some(callback) = callback else {
            warn!(id = %proposal.id, "No execution callback registered");
            return false;
        };

        info!(id = %proposal.id, action = %proposal.action, "Executing approved action");
        match callback(proposal.clone()).await {
            Ok(()) => true,
            Err(e) => {
                error!(id = %proposal.id, error = %e, "Approved action failed");
                false
            }
        }
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.state.lock().unwrap().pending.contains_key(id)
    }

    pub fn is_approved(&self, id: &str) -> bool {
        self.state.lock().unwrap().approved.contains_key(id)
    }

    fn discard(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.pending.remove(id);
        state.callbacks.remove(id);
    }

    /// Spawn the background listener feeding `observe` from the approval
    /// channel's event stream. The sole concurrent element of the engine.
    /// An observed approval also fires the registered callback, so deferred
    /// actions run as soon as the human replies.
    pub fn spawn_listener(
        gate: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Some(proposal) = gate.observe(&event.text, &event.origin) {
                    gate.execute_approved(&proposal).await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::InMemoryChannel;

    fn gate_with_channel() -> (Arc<ProposalGate>, Arc<InMemoryChannel>) {
        let (channel, _rx) = InMemoryChannel::new();
        let channel = Arc::new(channel);
        let gate = Arc::new(ProposalGate::new(channel.clone(), "approvals"));
        (gate, channel)
    }

    #[tokio::test]
    async fn test_publish_renders_proposal() {
        let (gate, channel) = gate_with_channel();
        let proposal = gate.create("wipe cache", "asked", "low", HashMap::new());
        let sent = gate.publish(&proposal).await.unwrap();
        assert!(sent);

        let messages = channel.sent_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "approvals");
        assert!(messages[0].1.contains(&proposal.id));
    }

    #[tokio::test]
    async fn test_observe_moves_pending_to_approved_once() {
        let (gate, _channel) = gate_with_channel();
        let proposal = gate.create("rm data", "asked", "high", HashMap::new());

        let reply = format!("Approve {}", proposal.id);
        let first = gate.observe(&reply, "approvals");
        assert!(first.is_some());
        assert!(first.unwrap().approved);
        assert!(!gate.is_pending(&proposal.id));
        assert!(gate.is_approved(&proposal.id));

        // Replaying the identical message finds nothing pending.
        let second = gate.observe(&reply, "approvals");
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_observe_ignores_other_channels() {
        let (gate, _channel) = gate_with_channel();
        let proposal = gate.create("rm data", "asked", "high", HashMap::new());

        let reply = format!("approve {}", proposal.id);
        assert!(gate.observe(&reply, "random-channel").is_none());
        assert!(gate.is_pending(&proposal.id));
    }

    #[tokio::test]
    async fn test_await_approval_zero_timeout_discards() {
        let (gate, _channel) = gate_with_channel();
        let proposal = gate.create("rm data", "asked", "high", HashMap::new());

        let approved = gate.await_approval(&proposal, Duration::from_secs(0)).await;
        assert!(!approved);
        assert!(!gate.is_pending(&proposal.id));
    }

    #[tokio::test]
    async fn test_await_approval_wakes_on_observe() {
        let (gate, _channel) = gate_with_channel();
        let proposal = gate.create("rm data", "asked", "high", HashMap::new());

        let observer = gate.clone();
        let reply = format!("approve {}", proposal.id);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            observer.observe(&reply, "approvals");
        });

        let approved = gate.await_approval(&proposal, Duration::from_secs(5)).await;
        assert!(approved);
    }

    #[tokio::test]
    async fn test_execute_approved_fires_callback_at_most_once() {
        let (gate, _channel) = gate_with_channel();
        let proposal = gate.create("rm data", "asked", "high", HashMap::new());

        let counter = Arc::new(Mutex::new(0u32));
        let seen = counter.clone();
        gate.register_callback(
            &proposal.id,
            Box::new(move |_p| {
                let seen = seen.clone();
                Box::pin(async move {
                    *seen.lock().unwrap() += 1;
                    Ok(())
                })
            }),
        );

        gate.observe(&format!("approve {}", proposal.id), "approvals");
        let approved = gate
            .state
            .lock()
            .unwrap()
            .approved
            .get(&proposal.id)
            .cloned()
            .unwrap();

        assert!(gate.execute_approved(&approved).await);
        assert_eq!(*counter.lock().unwrap(), 1);

        // Second execution finds no callback left.
        assert!(!gate.execute_approved(&approved).await);
        assert_eq!(*counter.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_execute_unapproved_is_refused() {
        let (gate, _channel) = gate_with_channel();
        let proposal = gate.create("rm data", "asked", "high", HashMap::new());
        assert!(!gate.execute_approved(&proposal).await);
    }

    #[tokio::test]
    async fn test_reject_discards_pending_and_callback() {
        let (gate, _channel) = gate_with_channel();
        let proposal = gate.create("rm data", "asked", "high", HashMap::new());
        gate.register_callback(&proposal.id, Box::new(|_p| Box::pin(async { Ok(()) })));

        assert!(gate
            .observe(&format!("reject {}", proposal.id), "approvals")
            .is_none());
        assert!(!gate.is_pending(&proposal.id));
        assert!(!gate.is_approved(&proposal.id));
    }

    #[tokio::test]
    async fn test_listener_feeds_observe() {
        let (channel, rx) = InMemoryChannel::new();
        let channel = Arc::new(channel);
        let gate = Arc::new(ProposalGate::new(channel.clone(), "approvals"));
        let handle = ProposalGate::spawn_listener(gate.clone(), rx);

        let proposal = gate.create("rm data", "asked", "high", HashMap::new());
        channel.receive(format!("approve {}", proposal.id), "approvals");

        let approved = gate.await_approval(&proposal, Duration::from_secs(5)).await;
        assert!(approved);
        handle.abort();
    }
}
