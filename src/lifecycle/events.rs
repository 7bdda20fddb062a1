//! Events published while a turn runs.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::{LifecycleState, TurnResult};
use crate::stream::Draft;
use crate::types::Message;

/// One observable step of a turn, in the order it happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    StateChanged {
        state: LifecycleState,
    },
    /// An empty assistant message was added and will receive the reply.
    MessageStarted {
        message: Message,
    },
    /// Throttled snapshot of the reply; replaces any earlier draft.
    DraftUpdated {
        message_id: Uuid,
        draft: Draft,
    },
    /// A tool message was added.
    MessageAppended {
        message: Message,
    },
    /// A streamed message reached its final state.
    MessageFinalized {
        message: Message,
    },
    Finished(TurnResult),
}

/// Single-writer side of the event channel. Sends to a dropped receiver
/// are ignored so an unobserved turn still runs to completion.
#[derive(Debug, Clone)]
pub(crate) struct EventEmitter {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl EventEmitter {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub(crate) fn emit(&self, event: LifecycleEvent) {
        let _ = self.tx.send(event);
    }
}
