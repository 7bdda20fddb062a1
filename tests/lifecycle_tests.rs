//! Turn lifecycle tests against a scripted transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::*;
use talkwire::config::LifecycleSettings;
use talkwire::error::TalkwireError;
use talkwire::lifecycle::{ConversationSession, LifecycleEvent, LifecycleState, RequestLifecycle};
use talkwire::tools::{FnTool, ToolOutput, ToolParameters, ToolRegistry};
use talkwire::types::{Conversation, Message, Role, StreamErrorKind, TypedData, Usage};

fn settings() -> LifecycleSettings {
    LifecycleSettings::default()
        .with_flush_interval(Duration::ZERO)
        .with_stream_idle_timeout(None)
}

fn conversation(prompt: &str) -> Conversation {
    Conversation::with_messages(vec![Message::user(prompt)])
}

fn research_tools() -> ToolRegistry {
    ToolRegistry::new()
        .with(FnTool::new(
            "scrape",
            "Fetch a web page",
            ToolParameters::object().string("url", "Page URL", true).build(),
            |args| async move { Ok(ToolOutput::text(format!("page body of {}", args.get_str("url")?))) },
        ))
        .with(FnTool::new(
            "search",
            "Search the web",
            ToolParameters::object().string("q", "Query", true).build(),
            |args| async move { Ok(ToolOutput::text(format!("3 results for {}", args.get_str("q")?))) },
        ))
        .with(FnTool::new("broken", "Always fails", ToolParameters::empty(), |_| async {
            Err(TalkwireError::tool("broken", "backend unavailable"))
        }))
        .with(
            FnTool::new("draw", "Generate an image", ToolParameters::empty(), |_| async {
                Ok(ToolOutput::text("generated").with_attachment(TypedData::new("image/png", vec![137u8, 80, 78, 71], "out.png")))
            })
            .ending_turn(),
        )
}

fn config_with_tools(tools: &[&str]) -> talkwire::config::ProviderConfig {
    let mut config = openai_config();
    config.tools = tools.iter().map(|t| t.to_string()).collect();
    config
}

fn two_tool_reply() -> Script {
    Script::ok(vec![
        tool_chunk(0, Some("call_1"), Some("scrape"), "{\"url\":"),
        tool_chunk(0, None, None, "\"https://example.com\"}"),
        tool_chunk(1, Some("call_2"), Some("search"), "{\"q\":\"rust\"}"),
        usage_chunk(10, 5),
        sse_done(),
    ])
}

#[tokio::test]
async fn tool_round_trip_then_final_answer() {
    let transport = Arc::new(ScriptedTransport::new([
        two_tool_reply(),
        Script::ok(vec![text_chunk("Here is "), text_chunk("the summary"), usage_chunk(20, 7), sse_done()]),
    ]));
    let lifecycle = RequestLifecycle::new(transport.clone(), settings()).with_tools(research_tools());

    let result = lifecycle
        .send(conversation("summarize example.com"), config_with_tools(&["scrape", "search"]))
        .wait()
        .await
        .unwrap();

    assert_eq!(result.state, LifecycleState::Completed);
    assert_eq!(result.tool_rounds, 1);
    assert_eq!(result.usage, Usage::new(30, 12));
    assert_eq!(result.reply().unwrap().content, "Here is the summary");

    let roles: Vec<Role> = result.conversation.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Tool, Role::Assistant]);
    let calls = &result.conversation.messages[1].tool_calls;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].arguments, "{\"url\":\"https://example.com\"}");
    assert_eq!(result.conversation.messages[2].content, "page body of https://example.com");
    assert_eq!(result.conversation.messages[3].content, "3 results for rust");

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let tools = requests[0].body["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 2);
    let messages = requests[1].body["messages"].as_array().unwrap();
    let sent_roles: Vec<&str> = messages.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(sent_roles, vec!["user", "assistant", "tool", "tool"]);
    assert_eq!(messages[1]["tool_calls"][1]["id"], json!("call_2"));
    assert_eq!(messages[2]["tool_call_id"], json!("call_1"));
}

#[tokio::test]
async fn cancelling_keeps_partial_text() {
    let transport = Arc::new(ScriptedTransport::new([
        Script::ok(vec![text_chunk("a"), text_chunk("b")]).hanging()
    ]));
    let lifecycle = RequestLifecycle::new(transport, settings());
    let mut handle = lifecycle.send(conversation("hi"), openai_config());

    while let Some(event) = handle.next_event().await {
        if let LifecycleEvent::DraftUpdated { draft, .. } = event {
            if draft.text == "ab" {
                break;
            }
        }
    }
    handle.cancel();
    let result = handle.wait().await.unwrap();

    assert!(result.is_cancelled());
    assert!(result.error.is_none());
    let reply = result.reply().unwrap();
    assert_eq!(reply.content, "ab");
    assert!(reply.is_sendable());
}

#[tokio::test]
async fn tool_loop_is_bounded() {
    let replies = (0..5).map(|n| {
        Script::ok(vec![
            tool_chunk(0, Some(&format!("call_{n}")), Some("search"), "{\"q\":\"again\"}"),
            sse_done(),
        ])
    });
    let transport = Arc::new(ScriptedTransport::new(replies));
    let lifecycle = RequestLifecycle::new(transport.clone(), settings().with_max_tool_rounds(2))
        .with_tools(research_tools());

    let result = lifecycle
        .send(conversation("loop forever"), config_with_tools(&["search"]))
        .wait()
        .await
        .unwrap();

    assert_eq!(result.state, LifecycleState::Failed);
    assert_eq!(result.tool_rounds, 2);
    assert_eq!(result.error.as_ref().unwrap().kind, StreamErrorKind::ToolLoopExceeded);
    assert_eq!(transport.request_count(), 3);
}

#[tokio::test]
async fn http_error_envelope_fails_turn() {
    let transport = Arc::new(ScriptedTransport::new([Script::status(
        429,
        r#"{"error":{"message":"rate limited","type":"rate_limit_error"}}"#,
    )]));
    let lifecycle = RequestLifecycle::new(transport, settings());

    let result = lifecycle.send(conversation("hi"), openai_config()).wait().await.unwrap();

    assert_eq!(result.state, LifecycleState::Failed);
    let error = result.error.as_ref().unwrap();
    assert_eq!(error.kind, StreamErrorKind::HttpStatus(429));
    assert_eq!(error.message, "rate limited");
    let reply = result.reply().unwrap();
    assert_eq!(reply.content, "");
    assert!(reply.error.is_some());
}

#[tokio::test]
async fn failing_tool_is_reported_to_the_model() {
    let transport = Arc::new(ScriptedTransport::new([
        Script::ok(vec![tool_chunk(0, Some("call_1"), Some("broken"), "{}"), sse_done()]),
        text_reply(&["Sorry, that failed."]),
    ]));
    let lifecycle = RequestLifecycle::new(transport.clone(), settings()).with_tools(research_tools());

    let result = lifecycle
        .send(conversation("try it"), config_with_tools(&["broken"]))
        .wait()
        .await
        .unwrap();

    assert!(result.is_completed());
    let tool_message = &result.conversation.messages[2];
    assert_eq!(tool_message.role, Role::Tool);
    assert!(tool_message.tool_response.as_ref().unwrap().is_error);
    assert!(tool_message.content.contains("backend unavailable"));
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn disabled_tool_is_treated_as_unknown() {
    let transport = Arc::new(ScriptedTransport::new([
        Script::ok(vec![tool_chunk(0, Some("call_1"), Some("scrape"), "{\"url\":\"x\"}"), sse_done()]),
        text_reply(&["ok"]),
    ]));
    let lifecycle = RequestLifecycle::new(transport.clone(), settings()).with_tools(research_tools());

    let result = lifecycle
        .send(conversation("hi"), config_with_tools(&["search"]))
        .wait()
        .await
        .unwrap();

    assert!(result.conversation.messages[2].content.contains("unknown tool"));
    let tools = transport.requests()[0].body["tools"].as_array().unwrap().clone();
    assert_eq!(tools.len(), 1);
}

#[tokio::test]
async fn image_tool_ends_turn_without_follow_up() {
    let transport = Arc::new(ScriptedTransport::new([Script::ok(vec![
        tool_chunk(0, Some("call_1"), Some("draw"), ""),
        sse_done(),
    ])]));
    let lifecycle = RequestLifecycle::new(transport.clone(), settings()).with_tools(research_tools());

    let result = lifecycle
        .send(conversation("draw a cat"), config_with_tools(&["draw"]))
        .wait()
        .await
        .unwrap();

    assert!(result.is_completed());
    assert_eq!(transport.request_count(), 1);
    let last = result.conversation.last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.attachments.len(), 1);
}

#[tokio::test]
async fn malformed_frame_is_skipped() {
    let transport = Arc::new(ScriptedTransport::new([Script::ok(vec![
        text_chunk("a"),
        "data: {not json}\n\n".to_string(),
        sse(json!({"unexpected": true, "choices": "nope"})),
        text_chunk("b"),
        sse_done(),
    ])]));
    let lifecycle = RequestLifecycle::new(transport, settings());

    let result = lifecycle.send(conversation("hi"), openai_config()).wait().await.unwrap();

    assert!(result.is_completed());
    assert_eq!(result.reply().unwrap().content, "ab");
}

#[tokio::test]
async fn in_stream_provider_error_keeps_text() {
    let transport = Arc::new(ScriptedTransport::new([Script::ok(vec![
        text_chunk("partial"),
        sse(json!({"error": {"message": "overloaded"}})),
        text_chunk(" never seen"),
    ])]));
    let lifecycle = RequestLifecycle::new(transport, settings());

    let result = lifecycle.send(conversation("hi"), openai_config()).wait().await.unwrap();

    assert_eq!(result.state, LifecycleState::Failed);
    let error = result.error.as_ref().unwrap();
    assert_eq!(error.kind, StreamErrorKind::Provider);
    assert_eq!(error.message, "overloaded");
    assert_eq!(result.reply().unwrap().content, "partial");
}

#[tokio::test(start_paused = true)]
async fn idle_stream_times_out() {
    let transport = Arc::new(ScriptedTransport::new([
        Script::ok(vec![text_chunk("slow")]).hanging()
    ]));
    let lifecycle = RequestLifecycle::new(
        transport,
        settings().with_stream_idle_timeout(Some(Duration::from_secs(5))),
    );

    let result = lifecycle.send(conversation("hi"), openai_config()).wait().await.unwrap();

    assert_eq!(result.state, LifecycleState::Failed);
    assert_eq!(result.error.as_ref().unwrap().kind, StreamErrorKind::Transport);
    assert_eq!(result.reply().unwrap().content, "slow");
}

#[tokio::test]
async fn buffered_reply_uses_the_same_pipeline() {
    let body = json!({
        "choices": [{"message": {"role": "assistant", "content": "all at once"}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 4, "completion_tokens": 3}
    });
    let transport = Arc::new(ScriptedTransport::new([Script::ok(vec![body.to_string()])]));
    let lifecycle = RequestLifecycle::new(transport.clone(), settings());
    let mut config = openai_config();
    config.stream = false;

    let result = lifecycle.send(conversation("hi"), config).wait().await.unwrap();

    assert!(result.is_completed());
    assert_eq!(result.reply().unwrap().content, "all at once");
    assert_eq!(result.usage, Usage::new(4, 3));
    let request = &transport.requests()[0];
    assert!(!request.stream);
    assert_ne!(request.body["stream"], json!(true));
}

#[tokio::test]
async fn events_arrive_in_order_and_end_with_finished() {
    let transport = Arc::new(ScriptedTransport::new([text_reply(&["hel", "lo"])]));
    let lifecycle = RequestLifecycle::new(transport, settings());
    let mut handle = lifecycle.send(conversation("hi"), openai_config());

    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }

    assert!(matches!(
        events.first(),
        Some(LifecycleEvent::StateChanged { state: LifecycleState::Requesting })
    ));
    assert!(matches!(events[1], LifecycleEvent::MessageStarted { .. }));
    assert!(events
        .iter()
        .any(|e| matches!(e, LifecycleEvent::StateChanged { state: LifecycleState::Streaming })));
    let finalized = events
        .iter()
        .find_map(|e| match e {
            LifecycleEvent::MessageFinalized { message } => Some(message.content.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(finalized, "hello");
    match events.last() {
        Some(LifecycleEvent::Finished(result)) => assert!(result.is_completed()),
        other => panic!("expected Finished last, got {other:?}"),
    }
}

#[tokio::test]
async fn new_send_cancels_the_active_request() {
    let transport = Arc::new(ScriptedTransport::new([
        Script::ok(vec![text_chunk("first")]).hanging(),
        text_reply(&["second"]),
    ]));
    let mut session = ConversationSession::new(RequestLifecycle::new(transport, settings()));

    let mut first = session.send(conversation("one"), openai_config()).await;
    while let Some(event) = first.next_event().await {
        if matches!(event, LifecycleEvent::DraftUpdated { .. }) {
            break;
        }
    }
    assert!(session.is_busy());

    let second = session.send(conversation("two"), openai_config()).await;
    let first = first.wait().await.unwrap();
    assert!(first.is_cancelled());
    assert_eq!(first.reply().unwrap().content, "first");

    let second = second.wait().await.unwrap();
    assert!(second.is_completed());
    assert_eq!(second.reply().unwrap().content, "second");
    assert!(!session.is_busy());
}

#[tokio::test]
async fn single_scrape_then_summary() {
    let transport = Arc::new(ScriptedTransport::new([
        Script::ok(vec![
            tool_chunk(0, Some("call_1"), Some("scrape"), "{\"url\":\"https://example.com\"}"),
            sse_done(),
        ]),
        text_reply(&["Example Domain is ", "a placeholder page."]),
    ]));
    let lifecycle = RequestLifecycle::new(transport.clone(), settings()).with_tools(research_tools());

    let result = lifecycle
        .send(conversation("Summarize https://example.com"), config_with_tools(&["scrape", "search"]))
        .wait()
        .await
        .unwrap();

    assert!(result.is_completed());
    assert_eq!(result.tool_rounds, 1);
    let roles: Vec<Role> = result.conversation.messages.iter().map(|m| m.role).collect();
    let mut wanted = [Role::User, Role::Tool, Role::Assistant].into_iter().peekable();
    for role in &roles {
        if wanted.peek() == Some(role) {
            wanted.next();
        }
    }
    assert!(wanted.peek().is_none(), "user, tool, assistant not in order: {roles:?}");

    let tool_message = result.conversation.messages.iter().find(|m| m.role == Role::Tool).unwrap();
    assert_eq!(tool_message.content, "page body of https://example.com");
    assert_eq!(tool_message.tool_response.as_ref().unwrap().tool_call_id, "call_1");
    assert_eq!(result.reply().unwrap().content, "Example Domain is a placeholder page.");
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn stalled_error_body_still_fails_with_status() {
    let transport = Arc::new(ScriptedTransport::new([Script::status(500, "").hanging()]));
    let lifecycle = RequestLifecycle::new(
        transport,
        settings().with_stream_idle_timeout(Some(Duration::from_secs(5))),
    );

    let result = lifecycle.send(conversation("hi"), openai_config()).wait().await.unwrap();

    assert_eq!(result.state, LifecycleState::Failed);
    assert_eq!(result.error.as_ref().unwrap().kind, StreamErrorKind::HttpStatus(500));
}

#[tokio::test(start_paused = true)]
async fn stalled_buffered_body_times_out() {
    let transport = Arc::new(ScriptedTransport::new([
        Script::ok(vec!["{\"choices\":".to_string()]).hanging()
    ]));
    let lifecycle = RequestLifecycle::new(
        transport,
        settings().with_stream_idle_timeout(Some(Duration::from_secs(5))),
    );
    let mut config = openai_config();
    config.stream = false;

    let result = lifecycle.send(conversation("hi"), config).wait().await.unwrap();

    assert_eq!(result.state, LifecycleState::Failed);
    assert_eq!(result.error.as_ref().unwrap().kind, StreamErrorKind::Transport);
}
