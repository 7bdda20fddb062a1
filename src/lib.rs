//! Talkwire: one streaming chat core for many LLM providers.
//!
//! Provider adapters translate a [`Conversation`](types::Conversation) into
//! OpenAI-compatible, Anthropic or Google request bodies and turn their
//! streamed events back into a single [`StreamEvent`](types::StreamEvent)
//! vocabulary. The request lifecycle drives decoding, draft aggregation and
//! the tool-call loop for one user turn.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use talkwire::prelude::*;
//!
//! # async fn example() -> talkwire::error::Result<()> {
//! let client = ClientConfig::load_default()?;
//! let config = client.provider_config(ProviderKind::OpenAi, "gpt-4o")?;
//! let lifecycle = RequestLifecycle::new(Arc::new(HttpTransport::new()?), client.lifecycle());
//!
//! let conversation = Conversation::with_messages(vec![Message::user("Hello!")]);
//! let result = lifecycle.send(conversation, config).wait().await?;
//! if let Some(reply) = result.reply() {
//!     println!("{}", reply.content);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod prelude;
pub mod provider;
pub mod stream;
pub mod tools;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;
