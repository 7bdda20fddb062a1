//! At most one in-flight turn per conversation.

use tracing::debug;

use super::runner::{RequestControl, RequestHandle, RequestLifecycle};
use crate::config::ProviderConfig;
use crate::types::Conversation;

/// Owns the active request of one conversation.
///
/// Sending while a turn is still running cancels that turn and waits for
/// its task to exit before the new one starts, so two replies never stream
/// into the same conversation.
#[derive(Debug)]
pub struct ConversationSession {
    lifecycle: RequestLifecycle,
    active: Option<RequestControl>,
}

impl ConversationSession {
    pub fn new(lifecycle: RequestLifecycle) -> Self {
        Self {
            lifecycle,
            active: None,
        }
    }

    pub async fn send(&mut self, conversation: Conversation, config: ProviderConfig) -> RequestHandle {
        self.stop().await;
        let handle = self.lifecycle.send(conversation, config);
        self.active = Some(handle.control());
        handle
    }

    /// Cancel the active turn, if any, and wait for it to wind down.
    pub async fn stop(&mut self) {
        if let Some(previous) = self.active.take() {
            if !previous.is_finished() {
                debug!(request_id = %previous.id(), "cancelling previous request");
                previous.cancel();
            }
            previous.finished().await;
        }
    }

    /// Whether a turn is still running.
    pub fn is_busy(&self) -> bool {
        self.active.as_ref().is_some_and(|active| !active.is_finished())
    }
}
