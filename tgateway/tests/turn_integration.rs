mod support;

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::json;
use tgateway::prelude::*;
use tgateway::{ErrorCatalog, MemoryBuffer, STATUS_OK, TurnSummary};
use tprovider::{
    CredentialStore, Message, ProviderError, ProviderId, Role, StopReason, StreamEvent,
    TokenUsage,
};
use ttools::{ToolChunkStream, ToolDescriptor, ToolRegistry, required_string};

use support::{Hop, answer, done, fixture, fixture_for, text, tool_request};

fn session() -> Session {
    Session::new("acct-1", ProviderId::OpenAi, "gpt-4o-mini")
        .with_persona("You are a helpful research assistant.")
        .with_credential_key("primary")
        .with_tool_context("tenant", "acme")
}

fn input(user_text: &str) -> TurnInput {
    TurnInput::new("thread-1", "history-1", user_text)
}

fn retrieval_tools() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register_sync_fn(
        ToolDescriptor::new(
            "retrieve",
            "Searches the knowledge base",
            r#"{"type":"object","properties":{"query":{"type":"string"}}}"#,
        )
        .inject("tenant"),
        |arguments, _context| {
            let tenant = required_string(&arguments, "tenant")?;
            let query = required_string(&arguments, "query")?;
            Ok(format!("{tenant} docs for {query}"))
        },
    );
    tools
}

fn streamed_text(events: &[OutboundEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            OutboundEvent::TextDelta(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn errors(events: &[OutboundEvent]) -> Vec<&tgateway::ErrorEnvelope> {
    events
        .iter()
        .filter_map(|event| match event {
            OutboundEvent::Error(envelope) => Some(envelope),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn single_tool_turn_streams_final_answer_without_errors() {
    let fixture = fixture(
        vec![
            tool_request("call_1", "retrieve", r#"{"query":"rust"}"#),
            answer("Rust is fast."),
        ],
        retrieval_tools(),
        GatewayPolicy::default(),
    );

    let (events, report) = fixture
        .service
        .stream_turn(session(), input("Tell me about Rust"))
        .drain()
        .await
        .expect("turn should settle");

    assert!(errors(&events).is_empty());
    assert_eq!(streamed_text(&events), "Rust is fast.");
    assert_eq!(
        events.last(),
        Some(&OutboundEvent::TurnComplete(TurnSummary {
            usage: TokenUsage::new(18, 6),
            hops: 1,
        }))
    );

    assert!(report.is_completed());
    assert_eq!(report.answer, "Rust is fast.");
    assert_eq!(report.hops, 1);
    assert!(report.effects.is_clean());
    assert_eq!(
        fixture.hooks.transitions(),
        vec![
            (TurnState::Chatbot, TurnState::Tools, 0),
            (TurnState::Tools, TurnState::Chatbot, 1),
            (TurnState::Chatbot, TurnState::End, 1),
        ]
    );
    assert_eq!(fixture.hooks.teardowns(), 1);
}

#[tokio::test]
async fn tool_result_precedes_next_model_input_and_system_prompt_appears_once() {
    let fixture = fixture(
        vec![
            tool_request("call_1", "retrieve", r#"{"query":"rust"}"#),
            answer("Done."),
        ],
        retrieval_tools(),
        GatewayPolicy::default(),
    );

    fixture
        .service
        .stream_turn(session(), input("Tell me about Rust"))
        .finish()
        .await
        .expect("turn should settle");

    let requests = fixture.provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(
        requests[0].api_key.as_ref().map(|key| key.expose().to_string()),
        Some("sk-test".to_string())
    );

    let second = &requests[1].messages;
    let tool_result = second.last().expect("second hop should have input");
    assert_eq!(tool_result.role, Role::Tool);
    assert_eq!(tool_result.tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(tool_result.content, "acme docs for rust");
    assert_eq!(second[second.len() - 2].tool_calls.len(), 1);

    for request in &requests {
        let system_count = request
            .messages
            .iter()
            .filter(|message| message.role == Role::System)
            .count();
        assert_eq!(system_count, 1);
        assert_eq!(request.messages[0].role, Role::System);
    }
}

#[tokio::test]
async fn completed_turn_persists_transcript_usage_memory_and_free_usage() {
    let fixture = fixture(
        vec![
            tool_request("call_1", "retrieve", r#"{"query":"rust"}"#),
            answer("Rust is fast."),
        ],
        retrieval_tools(),
        GatewayPolicy::default(),
    );

    fixture
        .service
        .stream_turn(session(), input("Tell me about Rust"))
        .finish()
        .await
        .expect("turn should settle");

    let thread = ThreadId::new("thread-1");
    let entries = fixture
        .transcript
        .entries(&thread)
        .await
        .expect("transcript should load");
    let roles: Vec<_> = entries.iter().map(|entry| entry.message.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(entries.iter().filter(|entry| entry.is_final_answer()).count(), 1);

    let records = fixture.ledger.records(&thread);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].model_calls, 2);
    assert_eq!(records[0].tool_calls, 1);
    assert!(!records[0].failed);

    let memory = fixture
        .memory
        .recall(&CollectionId::new("history-1"))
        .await
        .expect("memory should recall");
    assert_eq!(
        memory,
        vec![
            Message::new(Role::User, "Tell me about Rust"),
            Message::new(Role::Assistant, "Rust is fast."),
        ]
    );
    assert_eq!(fixture.ledger.free_usage("acct-1"), 1);
    assert_eq!(fixture.ledger.credits_debited("acct-1"), 0);
}

#[tokio::test]
async fn no_tool_turn_writes_one_final_entry_and_one_usage_record() {
    let fixture = fixture(
        vec![answer("Hello there")],
        ToolRegistry::new(),
        GatewayPolicy::default(),
    );

    let report = fixture
        .service
        .stream_turn(session(), input("hi"))
        .finish()
        .await
        .expect("turn should settle");

    assert!(report.is_completed());
    assert_eq!(report.hops, 0);
    let thread = ThreadId::new("thread-1");
    let entries = fixture.transcript.entries(&thread).await.expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries.iter().filter(|entry| entry.is_final_answer()).count(), 1);
    assert_eq!(fixture.ledger.records(&thread).len(), 1);
    assert_eq!(
        fixture.hooks.transitions(),
        vec![(TurnState::Chatbot, TurnState::End, 0)]
    );
}

#[tokio::test]
async fn rate_limit_emits_one_429_and_leaves_credential_usable() {
    let fixture = fixture(
        vec![Hop::Refuse(ProviderError::from_http_status(
            429,
            r#"{"error":{"message":"slow down"}}"#,
        ))],
        ToolRegistry::new(),
        GatewayPolicy::default(),
    );

    let (events, report) = fixture
        .service
        .stream_turn(session(), input("hi"))
        .drain()
        .await
        .expect("turn should settle");

    assert_eq!(events.len(), 1);
    let envelope = errors(&events)[0];
    assert_eq!(envelope.status_class, 429);
    assert_eq!(envelope.error_code, "rate_limited");
    assert_eq!(events[0].encode().status_class, 429);

    assert_eq!(report.error_code(), Some("rate_limited"));
    assert!(!fixture.credentials.is_stale("primary"));

    let thread = ThreadId::new("thread-1");
    let records = fixture.ledger.records(&thread);
    assert_eq!(records.len(), 1);
    assert!(records[0].failed);
    assert_eq!(fixture.ledger.free_usage("acct-1"), 0);

    let entries = fixture.transcript.entries(&thread).await.expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].failure.as_deref(), Some("rate_limited"));
}

#[tokio::test]
async fn rejected_credential_is_flagged_and_next_turn_fails_fast() {
    let fixture = fixture(
        vec![Hop::Refuse(ProviderError::from_http_status(
            401,
            r#"{"error":{"message":"invalid api key"}}"#,
        ))],
        ToolRegistry::new(),
        GatewayPolicy::default(),
    );

    let first = fixture
        .service
        .stream_turn(session(), input("hi"))
        .finish()
        .await
        .expect("turn should settle");
    assert_eq!(first.error_code(), Some("authentication_error"));
    assert!(fixture.credentials.is_stale("primary"));

    let (events, second) = fixture
        .service
        .stream_turn(session(), TurnInput::new("thread-2", "history-1", "again"))
        .drain()
        .await
        .expect("turn should settle");

    assert_eq!(second.error_code(), Some("authentication_error"));
    assert_eq!(errors(&events)[0].status_class, 401);
    assert_eq!(fixture.provider.requests().len(), 1);
}

#[tokio::test]
async fn unrecognized_upstream_code_uses_common_response_and_reports_once() {
    let fixture = fixture(
        vec![Hop::Refuse(ProviderError::upstream_status(
            500,
            r#"{"error":{"code":"brand_new_failure","message":"something odd"}}"#,
        ))],
        ToolRegistry::new(),
        GatewayPolicy::default(),
    );

    let (events, report) = fixture
        .service
        .stream_turn(session(), input("hi"))
        .drain()
        .await
        .expect("turn should settle");

    let envelope = errors(&events)[0];
    assert_eq!(envelope.user_message, ErrorCatalog::default().common_response);
    assert_eq!(envelope.status_class, 417);
    assert_eq!(envelope.payload["upstream_code"], json!("brand_new_failure"));
    assert!(!report.is_completed());
    assert_eq!(
        fixture.hooks.unrecognized(),
        vec![(ProviderId::OpenAi, "brand_new_failure".to_string())]
    );
    assert_eq!(fixture.hooks.classified().len(), 1);
}

#[tokio::test]
async fn known_upstream_code_uses_catalog_message() {
    let fixture = fixture_for(
        ProviderId::Anthropic,
        vec![Hop::Refuse(ProviderError::upstream_status(
            529,
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        ))],
        ToolRegistry::new(),
        GatewayPolicy::default(),
    );
    let session = Session::new("acct-1", ProviderId::Anthropic, "claude-sonnet");

    let (events, _report) = fixture
        .service
        .stream_turn(session, input("hi"))
        .drain()
        .await
        .expect("turn should settle");

    assert_eq!(
        errors(&events)[0].user_message,
        "The model provider is overloaded. Please retry in a moment."
    );
    assert!(fixture.hooks.unrecognized().is_empty());
}

#[tokio::test]
async fn hop_limit_ends_turn_with_one_error() {
    let fixture = fixture(
        vec![
            tool_request("call_1", "retrieve", r#"{"query":"a"}"#),
            tool_request("call_2", "retrieve", r#"{"query":"b"}"#),
            answer("never reached"),
        ],
        retrieval_tools(),
        GatewayPolicy::default().with_max_tool_hops(1),
    );

    let (events, report) = fixture
        .service
        .stream_turn(session(), input("loop forever"))
        .drain()
        .await
        .expect("turn should settle");

    assert_eq!(events.len(), 1);
    assert_eq!(errors(&events)[0].error_code, "hop_limit_exceeded");
    assert_eq!(errors(&events)[0].status_class, 500);
    assert_eq!(report.hops, 2);
    assert_eq!(fixture.provider.requests().len(), 2);
}

#[tokio::test]
async fn unknown_tool_fails_turn_without_flagging_credential() {
    let fixture = fixture(
        vec![tool_request("call_9", "teleport", "{}")],
        ToolRegistry::new(),
        GatewayPolicy::default(),
    );

    let (events, report) = fixture
        .service
        .stream_turn(session(), input("beam me up"))
        .drain()
        .await
        .expect("turn should settle");

    assert_eq!(report.error_code(), Some("unknown_tool"));
    assert_eq!(errors(&events)[0].payload["tool"], json!("teleport"));
    assert!(!fixture.credentials.is_stale("primary"));
}

#[tokio::test]
async fn streaming_tool_chunks_pass_through_unchanged() {
    let mut tools = ToolRegistry::new();
    tools.register_stream_fn(
        ToolDescriptor::new("web_search", "Streams search results", "{}"),
        |_arguments, _context| async move {
            let chunks: ToolChunkStream = Box::pin(futures_util::stream::iter(vec![
                Ok("alpha ".to_string()),
                Ok("beta".to_string()),
            ]));
            Ok(chunks)
        },
    );
    let fixture = fixture(
        vec![tool_request("call_1", "web_search", "{}"), answer("Done.")],
        tools,
        GatewayPolicy::default(),
    );

    let (events, report) = fixture
        .service
        .stream_turn(session(), input("search"))
        .drain()
        .await
        .expect("turn should settle");

    assert_eq!(events[0], OutboundEvent::TextDelta("alpha ".to_string()));
    assert_eq!(events[1], OutboundEvent::TextDelta("beta".to_string()));
    assert_eq!(report.answer, "Done.");

    let requests = fixture.provider.requests();
    let tool_result = requests[1].messages.last().expect("tool result");
    assert_eq!(tool_result.content, "alpha beta");
}

#[tokio::test]
async fn direct_return_tool_ends_turn_with_its_output() {
    let mut tools = ToolRegistry::new();
    tools.register_sync_fn(
        ToolDescriptor::new("order_status", "Looks up an order", "{}").returns_direct(),
        |_arguments, _context| Ok("Order 42 shipped".to_string()),
    );
    let fixture = fixture(
        vec![tool_request("call_1", "order_status", "{}")],
        tools,
        GatewayPolicy::default(),
    );

    let (events, report) = fixture
        .service
        .stream_turn(session(), input("where is my order?"))
        .drain()
        .await
        .expect("turn should settle");

    assert_eq!(streamed_text(&events), "Order 42 shipped");
    assert_eq!(report.answer, "Order 42 shipped");
    assert_eq!(fixture.provider.requests().len(), 1);
    assert_eq!(
        fixture.hooks.transitions().last(),
        Some(&(TurnState::Tools, TurnState::End, 1))
    );
}

#[tokio::test]
async fn annotations_become_one_citations_event_before_completion() {
    let fixture = fixture(
        vec![Hop::Events(vec![
            text("See docs."),
            Ok(StreamEvent::Annotation("https://a.example".to_string())),
            Ok(StreamEvent::Annotation("https://a.example".to_string())),
            Ok(StreamEvent::Annotation("https://b.example".to_string())),
            done(StopReason::EndTurn, 3, 3),
        ])],
        ToolRegistry::new(),
        GatewayPolicy::default(),
    );

    let (events, _report) = fixture
        .service
        .stream_turn(session(), input("sources?"))
        .drain()
        .await
        .expect("turn should settle");

    let citations = &events[events.len() - 2];
    assert_eq!(
        citations,
        &OutboundEvent::Citations(json!([
            {"index": 1, "url": "https://a.example"},
            {"index": 2, "url": "https://b.example"},
        ]))
    );
    assert!(matches!(events.last(), Some(OutboundEvent::TurnComplete(_))));
}

#[tokio::test]
async fn content_filter_stop_is_reported_as_content_filtered() {
    let fixture = fixture(
        vec![Hop::Events(vec![done(StopReason::ContentFilter, 2, 0)])],
        ToolRegistry::new(),
        GatewayPolicy::default(),
    );

    let report = fixture
        .service
        .stream_turn(session(), input("something"))
        .finish()
        .await
        .expect("turn should settle");

    assert_eq!(report.error_code(), Some("content_filtered"));
}

#[tokio::test]
async fn blank_input_is_rejected_before_any_model_call() {
    let fixture = fixture(vec![answer("unused")], ToolRegistry::new(), GatewayPolicy::default());

    let (events, report) = fixture
        .service
        .stream_turn(session(), input("   "))
        .drain()
        .await
        .expect("turn should settle");

    assert_eq!(report.error_code(), Some("invalid_request"));
    assert_eq!(errors(&events)[0].status_class, 400);
    assert!(fixture.provider.requests().is_empty());
}

#[tokio::test]
async fn session_for_unserved_family_fails_setup_without_model_call() {
    let fixture = fixture(vec![answer("unused")], ToolRegistry::new(), GatewayPolicy::default());
    let session = Session::new("acct-1", ProviderId::Gemini, "gemini-2.0-flash");

    let (events, report) = fixture
        .service
        .stream_turn(session, input("hi"))
        .drain()
        .await
        .expect("turn should settle");

    assert_eq!(report.error_code(), Some("invalid_request"));
    assert_eq!(errors(&events)[0].payload["phase"], json!("setup"));
    assert!(fixture.provider.requests().is_empty());
}

#[tokio::test]
async fn regenerate_reanswers_last_user_message() {
    let fixture = fixture(vec![answer("better")], ToolRegistry::new(), GatewayPolicy::default());
    let collection = CollectionId::new("history-1");
    fixture
        .memory
        .retain(
            &collection,
            vec![
                Message::new(Role::User, "question"),
                Message::new(Role::Assistant, "bad answer"),
            ],
        )
        .await
        .expect("memory should retain");

    let report = fixture
        .service
        .stream_turn(session(), input("").regenerate())
        .finish()
        .await
        .expect("turn should settle");

    assert!(report.is_completed());
    let request = &fixture.provider.requests()[0];
    assert_eq!(
        request.messages.last(),
        Some(&Message::new(Role::User, "question"))
    );
    assert!(
        request
            .messages
            .iter()
            .all(|message| message.content != "bad answer")
    );

    let entries = fixture
        .transcript
        .entries(&ThreadId::new("thread-1"))
        .await
        .expect("entries");
    assert_eq!(entries.len(), 1);
    assert!(entries[0].regenerated);
}

#[tokio::test]
async fn paid_session_debits_credits_instead_of_free_usage() {
    let fixture = fixture(vec![answer("ok")], ToolRegistry::new(), GatewayPolicy::default());

    fixture
        .service
        .stream_turn(
            session().with_billing(BillingMode::Paid { credit_cost: 3 }),
            input("hi"),
        )
        .finish()
        .await
        .expect("turn should settle");

    assert_eq!(fixture.ledger.credits_debited("acct-1"), 3);
    assert_eq!(fixture.ledger.free_usage("acct-1"), 0);
}

#[tokio::test]
async fn frames_use_data_prefix_and_status_class() {
    let fixture = fixture(vec![answer("Hello")], ToolRegistry::new(), GatewayPolicy::default());
    let mut handle = fixture.service.stream_turn(session(), input("hi"));

    let frames: Vec<_> = handle.frames().collect().await;
    handle.finish().await.expect("turn should settle");

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].as_str(), Some("data: Hello\n\n"));
    assert_eq!(frames[0].status_class, STATUS_OK);

    let body = frames[1].as_str().expect("utf-8 frame");
    let json: serde_json::Value = serde_json::from_str(
        body.trim_start_matches("data: ").trim_end(),
    )
    .expect("structured body");
    assert_eq!(json["message"], json!("turn_complete"));
    assert_eq!(json["status"], json!(200));
}

#[tokio::test]
async fn shared_service_runs_turns_concurrently() {
    let fixture = fixture(
        vec![answer("one"), answer("two")],
        ToolRegistry::new(),
        GatewayPolicy::default(),
    );
    let service = Arc::new(fixture.service.clone());

    let first = service.stream_turn(session(), TurnInput::new("t-a", "h-a", "a"));
    let second = service.stream_turn(session(), TurnInput::new("t-b", "h-b", "b"));
    let (first, second) = tokio::join!(first.finish(), second.finish());

    let mut answers = vec![
        first.expect("first settles").answer,
        second.expect("second settles").answer,
    ];
    answers.sort();
    assert_eq!(answers, vec!["one".to_string(), "two".to_string()]);
    assert_eq!(fixture.hooks.teardowns(), 2);
}
