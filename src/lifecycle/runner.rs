//! The send → stream → tools → re-send loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::{EventEmitter, LifecycleEvent};
use super::types::{LifecycleState, RequestId, TurnResult};
use crate::config::{LifecycleSettings, ProviderConfig};
use crate::error::{Result, TalkwireError};
use crate::provider::http::error_from_body;
use crate::provider::{Adapter, ProviderAdapter, Transport, TransportResponse};
use crate::stream::{decode_stream, AggregateOutcome, Draft, Frame, StreamAggregator};
use crate::tools::{ToolCallExecutor, ToolRegistry};
use crate::types::{Conversation, Message, MessageState, StreamErrorKind, StreamEvent, ToolCall, TurnError, Usage};

/// Drives turns against one transport with a fixed tool set and settings.
///
/// Cheap to clone; each [`send`](Self::send) runs in its own task.
#[derive(Clone)]
pub struct RequestLifecycle {
    transport: Arc<dyn Transport>,
    tools: ToolRegistry,
    settings: LifecycleSettings,
}

impl RequestLifecycle {
    pub fn new(transport: Arc<dyn Transport>, settings: LifecycleSettings) -> Self {
        Self {
            transport,
            tools: ToolRegistry::new(),
            settings,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Start a turn and return at once.
    ///
    /// `config` is a snapshot; later changes only affect later sends. Must
    /// be called inside a Tokio runtime.
    pub fn send(&self, conversation: Conversation, config: ProviderConfig) -> RequestHandle {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (emitter, events) = EventEmitter::channel();
        let (finished_tx, finished_rx) = watch::channel(());

        let turn = Turn {
            id,
            adapter: Adapter::for_kind(config.kind),
            executor: ToolCallExecutor::new(self.tools.enabled_for(&config)),
            transport: Arc::clone(&self.transport),
            settings: self.settings,
            config,
            conversation,
            cancel: cancel.clone(),
            emitter,
            state: LifecycleState::NotStarted,
        };

        let task = tokio::spawn(async move {
            let result = turn.run().await;
            drop(finished_tx);
            result
        });

        RequestHandle {
            control: RequestControl {
                id,
                cancel,
                finished: finished_rx,
            },
            events,
            task,
        }
    }
}

impl std::fmt::Debug for RequestLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLifecycle")
            .field("tools", &self.tools)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Cloneable cancel/await side of a running turn.
#[derive(Debug, Clone)]
pub struct RequestControl {
    id: RequestId,
    cancel: CancellationToken,
    finished: watch::Receiver<()>,
}

impl RequestControl {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Stop the turn. Partial output stays in the conversation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.has_changed().is_err()
    }

    /// Resolve once the turn's task has exited.
    pub async fn finished(&self) {
        let mut finished = self.finished.clone();
        // The task holds the sender; only its exit closes the channel.
        while finished.changed().await.is_ok() {}
    }
}

/// Returned by [`RequestLifecycle::send`].
#[derive(Debug)]
pub struct RequestHandle {
    control: RequestControl,
    events: mpsc::UnboundedReceiver<LifecycleEvent>,
    task: JoinHandle<TurnResult>,
}

impl RequestHandle {
    pub fn id(&self) -> RequestId {
        self.control.id
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn control(&self) -> RequestControl {
        self.control.clone()
    }

    /// Next event, or `None` once the turn has finished and the channel is
    /// drained.
    pub async fn next_event(&mut self) -> Option<LifecycleEvent> {
        self.events.recv().await
    }

    /// Consume the handle as an event stream ending with `Finished`.
    pub fn into_stream(self) -> UnboundedReceiverStream<LifecycleEvent> {
        UnboundedReceiverStream::new(self.events)
    }

    /// Wait for the turn to end.
    pub async fn wait(self) -> Result<TurnResult> {
        self.task
            .await
            .map_err(|e| TalkwireError::InvalidState(format!("request task ended abnormally: {e}")))
    }
}

/// How a single request/response cycle ended.
enum Reply {
    Finished(AggregateOutcome),
    Cancelled(Draft),
}

struct Turn {
    id: RequestId,
    adapter: Adapter,
    executor: ToolCallExecutor,
    transport: Arc<dyn Transport>,
    settings: LifecycleSettings,
    config: ProviderConfig,
    conversation: Conversation,
    cancel: CancellationToken,
    emitter: EventEmitter,
    state: LifecycleState,
}

impl Turn {
    async fn run(mut self) -> TurnResult {
        info!(
            request_id = %self.id,
            provider = %self.config.kind,
            model = %self.config.model,
            stream = self.config.stream,
            "turn start"
        );
        let mut usage = Usage::default();
        let mut rounds = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                return self.finish(LifecycleState::Cancelled, usage, None, rounds);
            }
            self.set_state(LifecycleState::Requesting);

            let placeholder = Message::assistant_placeholder();
            let message_id = placeholder.id;
            self.conversation.push(placeholder.clone());
            self.emitter.emit(LifecycleEvent::MessageStarted { message: placeholder });

            let outcome = match self.request_reply(message_id).await {
                Reply::Cancelled(draft) => {
                    usage.merge(&draft.usage);
                    self.finalize(message_id, draft.text, Vec::new(), draft.usage, None);
                    return self.finish(LifecycleState::Cancelled, usage, None, rounds);
                }
                Reply::Finished(outcome) => outcome,
            };
            usage.merge(&outcome.draft().usage);

            let draft = match outcome {
                AggregateOutcome::Completed(draft) => {
                    self.finalize(message_id, draft.text, Vec::new(), draft.usage, None);
                    return self.finish(LifecycleState::Completed, usage, None, rounds);
                }
                AggregateOutcome::Failed { draft, error } => {
                    warn!(request_id = %self.id, error = %error, "turn failed");
                    self.finalize(message_id, draft.text, Vec::new(), draft.usage, Some(error.clone()));
                    return self.finish(LifecycleState::Failed, usage, Some(error), rounds);
                }
                AggregateOutcome::ToolCallsPending(draft) => draft,
            };

            if rounds >= self.settings.max_tool_rounds {
                let limit = self.settings.max_tool_rounds;
                warn!(request_id = %self.id, limit, "tool loop bound reached");
                let error = TurnError::from(&TalkwireError::ToolLoopExceeded { limit });
                self.finalize(message_id, draft.text, Vec::new(), draft.usage, Some(error.clone()));
                return self.finish(LifecycleState::Failed, usage, Some(error), rounds);
            }

            self.finalize(message_id, draft.text, draft.tool_calls.clone(), draft.usage, None);
            self.set_state(LifecycleState::ToolLoop);
            rounds += 1;
            debug!(request_id = %self.id, round = rounds, calls = draft.tool_calls.len(), "running tools");

            match self.run_tools(&draft.tool_calls).await {
                ToolRound::Continue => {}
                ToolRound::EndsTurn => {
                    return self.finish(LifecycleState::Completed, usage, None, rounds);
                }
                ToolRound::Cancelled => {
                    return self.finish(LifecycleState::Cancelled, usage, None, rounds);
                }
            }
        }
    }

    /// One request and the response it produced.
    async fn request_reply(&mut self, message_id: Uuid) -> Reply {
        let mut aggregator = StreamAggregator::new(self.settings.flush_interval);
        let tools = self.executor.registry().definitions();

        let request = match self
            .adapter
            .build_request(&self.conversation, &self.config, &tools, self.config.stream)
        {
            Ok(request) => request,
            Err(err) => {
                aggregator.fail(TurnError::from(&err));
                return Reply::Finished(aggregator.finish());
            }
        };
        debug!(request_id = %self.id, url = %request.url, tools = tools.len(), "sending request");

        let transport = Arc::clone(&self.transport);
        let sent = self.cancellable(with_timeout(self.settings.stream_idle_timeout, transport.send(&request)));
        let response = match sent.await {
            None => return Reply::Cancelled(aggregator.draft()),
            Some(Ok(response)) => response,
            Some(Err(err)) => {
                aggregator.fail(TurnError::from(&err));
                return Reply::Finished(aggregator.finish());
            }
        };

        if !response.is_success() {
            let status = response.status;
            let idle = self.settings.stream_idle_timeout;
            let body = match self.cancellable(read_body(response, idle)).await {
                None => return Reply::Cancelled(aggregator.draft()),
                Some(Ok(body)) => body,
                Some(Err(err)) => {
                    warn!(request_id = %self.id, status, error = %err, "error body unreadable");
                    Vec::new()
                }
            };
            let err = error_from_body(status, &body);
            warn!(request_id = %self.id, status, error = %err, "provider rejected request");
            aggregator.fail(TurnError::from(&err));
            return Reply::Finished(aggregator.finish());
        }

        if request.stream {
            self.set_state(LifecycleState::Streaming);
            if let Some(reply) = self.consume_stream(response, &mut aggregator, message_id).await {
                return reply;
            }
        } else {
            let idle = self.settings.stream_idle_timeout;
            match self.cancellable(read_body(response, idle)).await {
                None => return Reply::Cancelled(aggregator.draft()),
                Some(body) => {
                    let parsed = body
                        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).map_err(TalkwireError::from))
                        .and_then(|value| self.adapter.parse_final_response(&value));
                    match parsed {
                        Ok(response) => {
                            for event in response.into_events() {
                                self.apply(&mut aggregator, event, message_id);
                            }
                        }
                        Err(err) => aggregator.fail(TurnError::from(&err)),
                    }
                }
            }
        }

        if let Some(draft) = aggregator.flush() {
            self.emitter.emit(LifecycleEvent::DraftUpdated { message_id, draft });
        }
        Reply::Finished(aggregator.finish())
    }

    /// Feed the streamed body through decoder, adapter and aggregator.
    /// Returns a reply only when the stream was cancelled.
    async fn consume_stream(
        &self,
        response: TransportResponse,
        aggregator: &mut StreamAggregator,
        message_id: Uuid,
    ) -> Option<Reply> {
        let mut frames = decode_stream(
            response.body,
            self.adapter.framing(),
            self.cancel.clone(),
            self.settings.stream_idle_timeout,
        );

        while let Some(frame) = frames.next().await {
            let events = match frame {
                Ok(Frame::Json(value)) => self.adapter.parse_event(&value),
                Ok(Frame::Done) => vec![StreamEvent::Done],
                Ok(Frame::Invalid { raw, corrupt: false }) => {
                    vec![StreamEvent::malformed(format!("unparseable frame: {}", preview(&raw)))]
                }
                Ok(Frame::Invalid { raw, corrupt: true }) => vec![StreamEvent::error(
                    StreamErrorKind::Corrupted,
                    format!("stream corrupted near: {}", preview(&raw)),
                )],
                Err(err) => vec![StreamEvent::error(err.stream_kind(), err.to_string())],
            };
            for event in events {
                self.apply(aggregator, event, message_id);
            }
            if aggregator.is_finished() {
                break;
            }
        }

        if self.cancel.is_cancelled() && !aggregator.is_finished() {
            return Some(Reply::Cancelled(aggregator.draft()));
        }
        None
    }

    fn apply(&self, aggregator: &mut StreamAggregator, event: StreamEvent, message_id: Uuid) {
        if let Some(draft) = aggregator.apply(event) {
            self.emitter.emit(LifecycleEvent::DraftUpdated { message_id, draft });
        }
    }

    async fn run_tools(&mut self, calls: &[ToolCall]) -> ToolRound {
        let report = self.executor.execute_all(calls, &self.cancel).await;
        for message in report.messages {
            self.append(message);
        }
        if report.cancelled {
            ToolRound::Cancelled
        } else if report.ends_turn {
            ToolRound::EndsTurn
        } else {
            ToolRound::Continue
        }
    }

    fn append(&mut self, message: Message) {
        self.conversation.push(message.clone());
        self.emitter.emit(LifecycleEvent::MessageAppended { message });
    }

    fn finalize(
        &mut self,
        message_id: Uuid,
        text: String,
        tool_calls: Vec<ToolCall>,
        usage: Usage,
        error: Option<TurnError>,
    ) {
        let Some(message) = self.conversation.get_mut(message_id) else {
            return;
        };
        message.content = text;
        message.tool_calls = tool_calls;
        message.state = MessageState::Final;
        message.usage = (!usage.is_empty()).then_some(usage);
        message.error = error;
        let message = message.clone();
        self.emitter.emit(LifecycleEvent::MessageFinalized { message });
    }

    fn set_state(&mut self, state: LifecycleState) {
        if self.state != state {
            self.state = state;
            self.emitter.emit(LifecycleEvent::StateChanged { state });
        }
    }

    fn finish(mut self, state: LifecycleState, usage: Usage, error: Option<TurnError>, tool_rounds: usize) -> TurnResult {
        self.set_state(state);
        info!(
            request_id = %self.id,
            state = ?state,
            tool_rounds,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "turn finished"
        );
        let result = TurnResult {
            request_id: self.id,
            state,
            conversation: self.conversation,
            usage,
            error,
            tool_rounds,
            finished_at: chrono::Utc::now(),
        };
        self.emitter.emit(LifecycleEvent::Finished(result.clone()));
        result
    }

    /// Race `fut` against cancellation; `None` means cancelled.
    async fn cancellable<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            output = fut => Some(output),
        }
    }
}

enum ToolRound {
    Continue,
    EndsTurn,
    Cancelled,
}

async fn with_timeout<T>(limit: Option<Duration>, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
            Err(TalkwireError::TransportMessage(format!(
                "no response for {}s",
                limit.as_secs()
            )))
        }),
        None => fut.await,
    }
}

/// Drain a body, failing when no chunk arrives within `idle`.
async fn read_body(mut response: TransportResponse, idle: Option<Duration>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    while let Some(chunk) = with_timeout(idle, async { response.body.next().await.transpose() }).await? {
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

fn preview(raw: &str) -> String {
    const LIMIT: usize = 120;
    if raw.chars().count() <= LIMIT {
        raw.to_string()
    } else {
        let head: String = raw.chars().take(LIMIT).collect();
        format!("{head}…")
    }
}
