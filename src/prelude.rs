//! Convenience re-exports for common use.

pub use crate::config::{ClientConfig, LifecycleSettings, ProviderConfig};
pub use crate::error::{Result, TalkwireError};
pub use crate::lifecycle::{
    ConversationSession, LifecycleEvent, LifecycleState, RequestHandle, RequestLifecycle, TurnResult,
};
pub use crate::models::{ModelCapabilities, ProviderFamily, ProviderKind};
pub use crate::provider::{Adapter, HttpTransport, ProviderAdapter, Transport};
pub use crate::stream::{Draft, StreamAggregator, StreamDecoder};
pub use crate::tools::{FnTool, Tool, ToolArguments, ToolCallExecutor, ToolOutput, ToolParameters, ToolRegistry};
pub use crate::types::{Conversation, Message, Role, StreamEvent, ToolCall, TypedData, Usage};
