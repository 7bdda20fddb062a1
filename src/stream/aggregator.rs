//! Assembles normalized events into a running reply.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::{StreamEvent, ToolCall, ToolCallDelta, TurnError, Usage};

/// Snapshot of the reply so far. Published whole on every flush.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Idle,
    Streaming,
    ToolCallsPending,
    Finalizing,
    Done,
}

/// How one response ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOutcome {
    /// Plain reply; nothing left to do.
    Completed(Draft),
    /// The reply requested at least one well-formed tool call.
    ToolCallsPending(Draft),
    /// Aborted; whatever arrived before the error is kept.
    Failed { draft: Draft, error: TurnError },
}

impl AggregateOutcome {
    pub fn draft(&self) -> &Draft {
        match self {
            Self::Completed(draft) | Self::ToolCallsPending(draft) => draft,
            Self::Failed { draft, .. } => draft,
        }
    }
}

/// State machine folding [`StreamEvent`]s into a [`Draft`].
///
/// Content and tool-call fragments are appended in arrival order. Draft
/// snapshots are released at most once per `flush_interval`, so the update
/// rate seen downstream does not depend on how finely the provider chunks.
#[derive(Debug)]
pub struct StreamAggregator {
    state: AggregatorState,
    text: String,
    calls: Vec<ToolCall>,
    by_id: HashMap<String, usize>,
    by_index: HashMap<usize, usize>,
    usage: Usage,
    error: Option<TurnError>,
    flush_interval: Duration,
    last_flush: Option<Instant>,
    dirty: bool,
}

impl StreamAggregator {
    pub fn new(flush_interval: Duration) -> Self {
        Self {
            state: AggregatorState::Idle,
            text: String::new(),
            calls: Vec::new(),
            by_id: HashMap::new(),
            by_index: HashMap::new(),
            usage: Usage::default(),
            error: None,
            flush_interval,
            last_flush: None,
            dirty: false,
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    /// True once `Done` or a fatal error has been applied.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            AggregatorState::ToolCallsPending | AggregatorState::Finalizing | AggregatorState::Done
        )
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Current snapshot, regardless of throttling.
    pub fn draft(&self) -> Draft {
        Draft {
            text: self.text.clone(),
            tool_calls: self.calls.clone(),
            usage: self.usage,
        }
    }

    /// Apply one event. Returns a snapshot when a throttled flush is due.
    pub fn apply(&mut self, event: StreamEvent) -> Option<Draft> {
        if self.is_finished() {
            return None;
        }
        match event {
            StreamEvent::ContentDelta { text } => {
                self.state = AggregatorState::Streaming;
                if text.is_empty() {
                    return None;
                }
                self.text.push_str(&text);
                self.dirty = true;
                self.maybe_flush()
            }
            StreamEvent::ToolCallDelta(delta) => {
                self.state = AggregatorState::Streaming;
                self.apply_tool_delta(delta);
                self.dirty = true;
                self.maybe_flush()
            }
            StreamEvent::Usage(report) => {
                self.state = AggregatorState::Streaming;
                self.usage.absorb(&report);
                None
            }
            StreamEvent::Done => {
                self.complete();
                None
            }
            StreamEvent::Error { kind, message } if kind.is_recoverable() => {
                warn!(%message, "skipping malformed stream frame");
                None
            }
            StreamEvent::Error { kind, message } => {
                debug!(?kind, %message, "stream aborted");
                self.error = Some(TurnError::new(kind, message));
                self.state = AggregatorState::Done;
                None
            }
        }
    }

    /// Release pending changes now, ignoring the throttle.
    pub fn flush(&mut self) -> Option<Draft> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        self.last_flush = Some(Instant::now());
        Some(self.draft())
    }

    /// Abort with an error raised outside the event stream (transport
    /// failure, idle timeout). Accumulated text is kept.
    pub fn fail(&mut self, error: TurnError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self.state = AggregatorState::Done;
    }

    /// Close out the response. A body that ends without `Done` is treated
    /// as complete, which is how Google signals the end of a stream.
    pub fn finish(mut self) -> AggregateOutcome {
        if !self.is_finished() {
            self.complete();
        }
        let state = self.state;
        self.state = AggregatorState::Done;
        let error = self.error.take();
        let draft = Draft {
            text: self.text,
            tool_calls: self.calls,
            usage: self.usage,
        };
        match (error, state) {
            (Some(error), _) => AggregateOutcome::Failed { draft, error },
            (None, AggregatorState::ToolCallsPending) => AggregateOutcome::ToolCallsPending(draft),
            (None, _) => AggregateOutcome::Completed(draft),
        }
    }

    fn complete(&mut self) {
        // Nameless fragments cannot be dispatched; named calls with broken
        // arguments are kept so the model is told about them.
        self.calls.retain(|call| {
            let keep = !call.name.is_empty();
            if !keep {
                warn!(id = %call.id, "dropping tool call without a name");
            }
            keep
        });
        self.state = if self.calls.iter().any(ToolCall::is_complete) {
            AggregatorState::ToolCallsPending
        } else {
            AggregatorState::Finalizing
        };
    }

    fn maybe_flush(&mut self) -> Option<Draft> {
        let due = self
            .last_flush
            .map_or(true, |last| last.elapsed() >= self.flush_interval);
        if due {
            self.flush()
        } else {
            None
        }
    }

    fn apply_tool_delta(&mut self, delta: ToolCallDelta) {
        let slot = match (delta.id, delta.index) {
            (Some(id), index) => match self.by_id.get(&id) {
                Some(&slot) => slot,
                None => {
                    let slot = self.open_call(id);
                    if let Some(index) = index {
                        self.by_index.insert(index, slot);
                    }
                    slot
                }
            },
            (None, Some(index)) => match self.by_index.get(&index) {
                Some(&slot) => slot,
                None => {
                    let slot = self.open_call(self.generated_id());
                    self.by_index.insert(index, slot);
                    slot
                }
            },
            (None, None) => self.open_call(self.generated_id()),
        };

        let call = &mut self.calls[slot];
        if let Some(name) = delta.name {
            call.name.push_str(&name);
        }
        if let Some(arguments) = delta.arguments {
            call.arguments.push_str(&arguments);
        }
    }

    fn open_call(&mut self, id: String) -> usize {
        let slot = self.calls.len();
        self.by_id.insert(id.clone(), slot);
        self.calls.push(ToolCall::new(id, String::new(), String::new()));
        slot
    }

    fn generated_id(&self) -> String {
        format!("call_{}", self.calls.len())
    }
}
