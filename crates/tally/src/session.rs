//! Chat protocol handling: acknowledge, answer each text item, reply.
//!
//! Each inbound envelope is handled on its own; nothing carries over from
//! one message to the next.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::FutureExt;
use parley::{
    Address, ChatAcknowledgement, ChatMessage, ContentItem, Envelope, ProtocolMessage,
};
use tokio::sync::mpsc;

use crate::dispatch::Orchestrator;

/// Where outbound envelopes go
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn deliver(&self, envelope: Envelope) -> Result<()>;
}

/// Outbox backed by an unbounded channel
#[derive(Clone)]
pub struct ChannelOutbox {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelOutbox {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Outbox for ChannelOutbox {
    async fn deliver(&self, envelope: Envelope) -> Result<()> {
        self.tx
            .send(envelope)
            .map_err(|_| anyhow::anyhow!("Outbound channel closed"))
    }
}

/// Where a turn ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Received,
    Processing,
    Replied,
    ErrorReplied,
    /// Inbound acknowledgement; terminal, no reply
    AckLogged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub state: TurnState,
    pub acknowledged: bool,
    pub replies: usize,
}

pub struct SessionHandler {
    orchestrator: Arc<Orchestrator>,
    outbox: Arc<dyn Outbox>,
}

impl SessionHandler {
    pub fn new(orchestrator: Arc<Orchestrator>, outbox: Arc<dyn Outbox>) -> Self {
        Self {
            orchestrator,
            outbox,
        }
    }

    /// Handle one inbound envelope to completion
    #[tracing::instrument(skip(self, envelope), fields(sender = %envelope.peer))]
    pub async fn handle(&self, envelope: Envelope) -> TurnReport {
        let Envelope { peer, message } = envelope;
        match message {
            ProtocolMessage::Chat(msg) => self.handle_chat(peer, msg).await,
            ProtocolMessage::Ack(ack) => self.handle_ack(&peer, &ack),
        }
    }

    async fn handle_chat(&self, sender: Address, msg: ChatMessage) -> TurnReport {
        let mut report = TurnReport {
            state: TurnState::Received,
            acknowledged: false,
            replies: 0,
        };

        // Ack goes out before any dispatch work starts
        let ack = ChatAcknowledgement::for_message(&msg.msg_id);
        match self.outbox.deliver(Envelope::ack(sender.clone(), ack)).await {
            Ok(()) => report.acknowledged = true,
            Err(e) => tracing::warn!(msg_id = %msg.msg_id, error = %e, "Failed to send acknowledgement"),
        }

        report.state = TurnState::Processing;
        let processed = AssertUnwindSafe(self.process_content(&sender, &msg, &mut report.replies))
            .catch_unwind()
            .await;

        let failure = match processed {
            Ok(Ok(())) => {
                report.state = TurnState::Replied;
                return report;
            }
            Ok(Err(e)) => format!("{:#}", e),
            Err(panic) => panic_message(panic.as_ref()),
        };

        tracing::error!(msg_id = %msg.msg_id, error = %failure, "Error handling chat message");
        report.state = TurnState::ErrorReplied;

        let error_reply = ChatMessage::text(format!("An error occurred: {}", failure));
        match self.outbox.deliver(Envelope::chat(sender, error_reply)).await {
            Ok(()) => report.replies += 1,
            Err(e) => tracing::error!(error = %e, "Failed to send error reply"),
        }
        report
    }

    async fn process_content(
        &self,
        sender: &Address,
        msg: &ChatMessage,
        replies: &mut usize,
    ) -> Result<()> {
        for item in &msg.content {
            match item {
                ContentItem::SessionStart => {
                    tracing::info!(%sender, "Got a start session message");
                }
                ContentItem::EndSession => {
                    tracing::info!(%sender, "Got an end session message");
                }
                ContentItem::Unknown => {
                    tracing::info!(%sender, "Got unexpected content, skipping");
                }
                ContentItem::Text { text } => {
                    tracing::info!(%sender, text = %text, "Got a message");
                    let response_text = self.orchestrator.answer(text).await;
                    tracing::info!(response = %response_text, "Response text");

                    self.outbox
                        .deliver(Envelope::chat(sender.clone(), ChatMessage::text(response_text)))
                        .await
                        .context("Failed to send reply")?;
                    *replies += 1;
                }
            }
        }
        Ok(())
    }

    fn handle_ack(&self, sender: &Address, ack: &ChatAcknowledgement) -> TurnReport {
        tracing::info!(
            %sender,
            acknowledged_msg_id = %ack.acknowledged_msg_id,
            "Received acknowledgement"
        );
        if let Some(metadata) = &ack.metadata {
            tracing::info!(?metadata, "Acknowledgement metadata");
        }
        TurnReport {
            state: TurnState::AckLogged,
            acknowledged: false,
            replies: 0,
        }
    }

    /// Handle envelopes from `inbox` until it closes, one task per envelope.
    ///
    /// Returns once the inbox is closed and every spawned turn has finished.
    pub async fn run(self: Arc<Self>, mut inbox: mpsc::Receiver<Envelope>) {
        let mut turns = tokio::task::JoinSet::new();

        while let Some(envelope) = inbox.recv().await {
            let handler = Arc::clone(&self);
            turns.spawn(async move {
                handler.handle(envelope).await;
            });

            // Reap finished turns so the set does not grow without bound
            while let Some(done) = turns.try_join_next() {
                if let Err(e) = done {
                    tracing::error!(error = %e, "Turn task failed");
                }
            }
        }

        while let Some(done) = turns.join_next().await {
            if let Err(e) = done {
                tracing::error!(error = %e, "Turn task failed");
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "internal error".to_string()
    }
}
