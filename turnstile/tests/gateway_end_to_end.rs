use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use turnstile::prelude::*;
use turnstile::{
    BoxedEventStream, ModelRequest, ProviderFuture, STATUS_OK, StopReason, TokenUsage, ToolCall,
    TranscriptStore, VecEventStream, required_string,
};

type Script = Vec<Result<StreamEvent, ProviderError>>;

struct ScriptedProvider {
    hops: Mutex<VecDeque<Result<Script, ProviderError>>>,
}

impl ScriptedProvider {
    fn new(hops: Vec<Result<Script, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            hops: Mutex::new(hops.into()),
        })
    }
}

impl ModelProvider for ScriptedProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn stream<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
        Box::pin(async move {
            request.validate()?;
            let hop = self
                .hops
                .lock()
                .expect("hops lock")
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::unclassified("script exhausted")));
            Ok(Box::pin(VecEventStream::new(hop?)) as BoxedEventStream<'a>)
        })
    }
}

fn finished(stop_reason: StopReason, input: u32, output: u32) -> Result<StreamEvent, ProviderError> {
    Ok(StreamEvent::TurnComplete {
        stop_reason,
        usage: TokenUsage::new(input, output),
    })
}

fn order_tools() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register_sync_fn(
        ToolDescriptor::new(
            "lookup_order",
            "Finds an order's shipping status",
            r#"{"type":"object","properties":{"order_id":{"type":"string"}}}"#,
        ),
        |args, _context| {
            let order_id = required_string(&args, "order_id")?;
            Ok(format!("order {order_id} shipped"))
        },
    );
    tools
}

#[tokio::test]
async fn tool_turn_is_framed_for_the_wire_and_billed_once() {
    let provider = ScriptedProvider::new(vec![
        Ok(vec![
            Ok(StreamEvent::ToolCallDetected(ToolCall::new(
                "call-1",
                "lookup_order",
                r#"{"order_id":"A7"}"#,
            ))),
            finished(StopReason::ToolUse, 12, 3),
        ]),
        Ok(vec![
            Ok(StreamEvent::TextDelta("Order A7 has shipped.".to_string())),
            finished(StopReason::EndTurn, 20, 6),
        ]),
    ]);

    let bundle = build_gateway(single_provider(provider), order_tools()).expect("gateway");
    let mut handle = bundle.service.stream_turn(
        ts_session!(
            "acct-1",
            openai,
            "gpt-4o-mini",
            billing = BillingMode::Paid { credit_cost: 3 },
        ),
        turn("thread-1", "Where is order A7?"),
    );

    let frames: Vec<WireFrame> = handle.frames().collect().await;
    let report = handle.finish().await.expect("turn should settle");

    assert!(report.is_completed());
    assert_eq!(report.hops, 1);
    assert!(frames.iter().all(|frame| frame.status_class == STATUS_OK));

    let text: String = frames[..frames.len() - 1]
        .iter()
        .filter_map(|frame| frame.as_str())
        .map(|frame| {
            frame
                .strip_prefix("data: ")
                .and_then(|rest| rest.strip_suffix("\n\n"))
                .expect("framed payload")
                .to_string()
        })
        .collect();
    assert_eq!(text, "Order A7 has shipped.");

    let last = frames.last().and_then(|frame| frame.as_str()).expect("final frame");
    assert!(last.contains("turn_complete"));

    assert_eq!(bundle.ledger.credits_debited("acct-1"), 3);
    assert_eq!(bundle.ledger.free_usage("acct-1"), 0);
}

#[tokio::test]
async fn rejected_credential_produces_one_error_frame_and_is_flagged() {
    let provider = ScriptedProvider::new(vec![Err(ProviderError::from_http_status(
        401,
        r#"{"error":{"message":"invalid api key"}}"#,
    ))]);

    let bundle = build_gateway(single_provider(provider), ToolRegistry::new()).expect("gateway");
    bundle
        .credentials
        .insert("primary", "sk-live")
        .expect("credential insert");

    let mut handle = bundle.service.stream_turn(
        session("acct-1", ProviderId::OpenAi, "gpt-4o-mini").with_credential_key("primary"),
        turn("thread-1", "hi"),
    );

    let frames: Vec<WireFrame> = handle.frames().collect().await;
    let report = handle.finish().await.expect("turn should settle");

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].status_class, 401);
    assert_eq!(report.error_code(), Some("authentication_error"));
    assert!(bundle.credentials.is_stale("primary"));
}

#[tokio::test]
async fn memory_carries_the_answer_into_the_next_turn() {
    let provider = ScriptedProvider::new(vec![
        Ok(vec![
            Ok(StreamEvent::TextDelta("Hi Sam.".to_string())),
            finished(StopReason::EndTurn, 5, 2),
        ]),
        Ok(vec![
            Ok(StreamEvent::TextDelta("You are Sam.".to_string())),
            finished(StopReason::EndTurn, 9, 3),
        ]),
    ]);

    let bundle = build_gateway(single_provider(provider), ToolRegistry::new()).expect("gateway");
    let session = session("acct-1", ProviderId::OpenAi, "gpt-4o-mini");

    for text in ["I am Sam.", "Who am I?"] {
        let report = bundle
            .service
            .stream_turn(session.clone(), turn("thread-1", text))
            .finish()
            .await
            .expect("turn should settle");
        assert!(report.is_completed());
    }

    let transcript = bundle
        .transcript
        .entries(&ThreadId::new("thread-1"))
        .await
        .expect("transcript");
    let answers: Vec<&str> = transcript
        .iter()
        .filter(|entry| entry.is_final_answer())
        .map(|entry| entry.message.content.as_str())
        .collect();
    assert_eq!(answers, vec!["Hi Sam.", "You are Sam."]);
    assert_eq!(bundle.ledger.free_usage("acct-1"), 2);
}
