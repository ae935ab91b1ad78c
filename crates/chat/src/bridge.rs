use agentry_core::{DeliveryOp, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// The connection-side surface the chat layer delivers through. Implemented
/// per transport (a chat SDK client, a console, a test double).
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a message and return its transport-assigned id.
    async fn send_message(&self, chat_id: &str, content: &str) -> Result<String>;

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<()>;
}

/// Fire-and-forget handle for scheduling delivery operations onto the loop
/// that owns the connection. Safe to call from any worker task or thread;
/// failures surface only in the dispatch loop's own logging, never back to
/// the submitter.
#[derive(Clone)]
pub struct DeliveryBridge {
    tx: mpsc::UnboundedSender<DeliveryOp>,
}

impl DeliveryBridge {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DeliveryOp>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn submit(&self, op: DeliveryOp) {
        if self.tx.send(op).is_err() {
            warn!("Delivery loop has stopped; dropping operation");
        }
    }

    pub fn send_message(&self, chat_id: &str, content: &str) {
        self.submit(DeliveryOp::SendMessage {
            chat_id: chat_id.to_string(),
            content: content.to_string(),
        });
    }

    pub fn delete_message(&self, chat_id: &str, message_id: &str) {
        self.submit(DeliveryOp::DeleteMessage {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
        });
    }
}

/// Single dispatch point on the connection-owning loop: drains the bridge and
/// drives the transport. Runs until every bridge clone is dropped.
pub async fn run_delivery_loop(
    mut rx: mpsc::UnboundedReceiver<DeliveryOp>,
    transport: Arc<dyn ChatTransport>,
) {
    info!("Delivery dispatcher started");
    while let Some(op) = rx.recv().await {
        if let Err(e) = dispatch(transport.as_ref(), &op).await {
            error!(error = %e, "Failed to dispatch delivery operation");
        }
    }
    info!("Delivery dispatcher stopped");
}

async fn dispatch(transport: &dyn ChatTransport, op: &DeliveryOp) -> Result<()> {
    match op {
        DeliveryOp::SendMessage { chat_id, content } => {
            transport.send_message(chat_id, content).await?;
        }
        DeliveryOp::DeleteMessage { chat_id, message_id } => {
            transport.delete_message(chat_id, message_id).await?;
        }
    }
    Ok(())
}
