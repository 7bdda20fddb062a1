//! Sequential tool-call dispatch.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::arguments::ToolArguments;
use super::registry::ToolRegistry;
use crate::error::{Result, TalkwireError};
use crate::types::{Message, ToolCall, ToolResponse};

/// Result of running one tool call.
#[derive(Debug, Clone)]
pub struct ToolExecution {
    /// The `tool` message to append to the conversation.
    pub message: Message,
    /// Set when the tool ends the turn without a follow-up request.
    pub ends_turn: bool,
}

/// Result of running all calls of one assistant reply.
///
/// Holds exactly one tool message per call, in call order, even when the
/// round was cancelled.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub messages: Vec<Message>,
    pub ends_turn: bool,
    /// Cancellation stopped the round; calls that had not finished were
    /// answered with error messages.
    pub cancelled: bool,
}

/// Runs tool calls one at a time, in the order the model issued them.
///
/// A failing call becomes an error tool message so the model can react to
/// it; it never aborts the turn.
#[derive(Debug, Clone)]
pub struct ToolCallExecutor {
    registry: ToolRegistry,
}

impl ToolCallExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run a single call.
    pub async fn execute_one(&self, call: &ToolCall) -> ToolExecution {
        let response = |is_error| ToolResponse {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            is_error,
        };

        match self.run(call).await {
            Ok((output, ends_turn)) => {
                debug!(tool = %call.name, attachments = output.attachments.len(), "tool finished");
                let ends_turn = ends_turn && !output.attachments.is_empty();
                ToolExecution {
                    message: Message::tool(response(false), output.text, output.attachments),
                    ends_turn,
                }
            }
            Err(err) => {
                warn!(tool = %call.name, error = %err, "tool call failed");
                ToolExecution {
                    message: Message::tool(response(true), format!("Error: {err}"), Vec::new()),
                    ends_turn: false,
                }
            }
        }
    }

    /// Run every call in order, stopping once `cancel` fires.
    ///
    /// Messages of finished calls are kept. Each call that never ran, or
    /// was interrupted, gets a "Cancelled before completion" error message
    /// so the conversation stays acceptable to the provider.
    pub async fn execute_all(&self, calls: &[ToolCall], cancel: &CancellationToken) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        for (position, call) in calls.iter().enumerate() {
            let execution = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                execution = self.execute_one(call) => Some(execution),
            };
            let Some(execution) = execution else {
                debug!(skipped = calls.len() - position, "tool round cancelled");
                report.messages.extend(calls[position..].iter().map(cancelled_message));
                report.ends_turn = false;
                report.cancelled = true;
                return report;
            };
            report.ends_turn |= execution.ends_turn;
            report.messages.push(execution.message);
        }
        report
    }

    async fn run(&self, call: &ToolCall) -> Result<(super::ToolOutput, bool)> {
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| TalkwireError::tool(&call.name, "unknown tool"))?;
        let args = ToolArguments::parse(&call.arguments)?;
        args.validate(tool.parameters())?;
        let output = tool.process(&args).await?;
        Ok((output, tool.ends_turn()))
    }
}

fn cancelled_message(call: &ToolCall) -> Message {
    Message::tool(
        ToolResponse {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            is_error: true,
        },
        "Cancelled before completion",
        Vec::new(),
    )
}
