//! Request lifecycle: one user turn from send to final reply.
//!
//! A turn may span several provider requests when the model calls tools.
//! Progress is published as [`LifecycleEvent`]s; the caller owns the
//! conversation again once [`TurnResult`] arrives.

pub mod events;
pub mod runner;
pub mod session;
pub mod types;

pub use events::LifecycleEvent;
pub use runner::{RequestControl, RequestHandle, RequestLifecycle};
pub use session::ConversationSession;
pub use types::{LifecycleState, RequestId, TurnResult};
