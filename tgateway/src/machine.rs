//! Turn state machine: `CHATBOT -> (TOOLS -> CHATBOT)* -> END`.
//!
//! A turn runs as one task. Every failure is caught here, classified, and
//! turned into a single error event; cancellation and disconnects persist
//! the text the consumer actually received.

use std::sync::Arc;

use futures_util::StreamExt;
use tcommon::ThreadId;
use tprovider::{
    ModelProvider, ModelRequest, ProviderError, SecretString, StopReason, StreamEvent, ToolCall,
    ToolDefinition,
};
use ttools::{ToolExecutionContext, ToolOutput};

use crate::context::ConversationContext;
use crate::relay::EventRelay;
use crate::service::GatewayInner;
use crate::sink::{CancelReason, OutboundSink};
use crate::stream::{Delivered, delivered_text};
use crate::{
    CodeObservation, EffectsReport, GatewayError, GatewayHooks, OutboundEvent, Session,
    TurnInput, TurnOutcome, TurnPhase, TurnReport, TurnState, TurnSummary,
};

enum Halt {
    Interrupted(CancelReason),
    Failed(GatewayError),
}

impl From<CancelReason> for Halt {
    fn from(value: CancelReason) -> Self {
        Self::Interrupted(value)
    }
}

impl From<GatewayError> for Halt {
    fn from(value: GatewayError) -> Self {
        Self::Failed(value)
    }
}

struct Teardown {
    hooks: Arc<dyn GatewayHooks>,
    thread_id: ThreadId,
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.hooks.on_teardown(&self.thread_id);
    }
}

pub(crate) async fn run_turn(
    inner: Arc<GatewayInner>,
    session: Session,
    input: TurnInput,
    sink: OutboundSink,
    delivered: Delivered,
) -> TurnReport {
    let _teardown = Teardown {
        hooks: Arc::clone(&inner.hooks),
        thread_id: input.thread_id.clone(),
    };
    let hooks = inner.hooks.as_ref();
    let thread_id = input.thread_id.clone();
    hooks.on_turn_start(&thread_id, &session);

    let delay = input
        .delay_chunk
        .unwrap_or_else(|| inner.policy.delay_chunk());
    let mut relay = EventRelay::new(inner.policy.chunk_size, delay);

    let (history, recalled) = match inner.memory.recall(&input.history_collection_id).await {
        Ok(history) => (history, Ok(())),
        Err(error) => (Vec::new(), Err(error.in_phase(TurnPhase::Setup))),
    };
    let mut context = ConversationContext::open(&session, &input, history);

    let driven = match recalled.and_then(|()| validate(&input)) {
        Ok(()) => {
            Turn {
                inner: &inner,
                session: &session,
                sink: &sink,
                relay: &mut relay,
                context: &mut context,
            }
            .drive()
            .await
        }
        Err(error) => Err(Halt::Failed(error)),
    };

    let usage = context.usage;
    let hops = context.hops;
    let (outcome, answer, truncated, plan) = match driven {
        Ok(answer) => {
            let plan = context.into_completed(&answer);
            (TurnOutcome::Completed, answer, false, plan)
        }
        Err(Halt::Interrupted(reason)) => {
            let partial = delivered_text(&delivered);
            hooks.on_turn_cancelled(&thread_id, reason, partial.chars().count());
            let plan = context.into_cancelled(&partial);
            (TurnOutcome::Cancelled(reason), partial, true, plan)
        }
        Err(Halt::Failed(error)) => {
            let classification = inner.classifier.classify(session.provider, &error);
            if classification.observation == CodeObservation::NewlyObserved
                && let Some(code) = &classification.upstream_code
            {
                hooks.on_unrecognized_code(session.provider, code);
            }
            if classification.flag_credential
                && let Some(key_id) = &session.credential_key
            {
                inner.credentials.mark_stale(key_id);
            }
            hooks.on_error_classified(&thread_id, &error, &classification);

            let plan = context.into_failed(&classification.error_code, &classification.user_message);
            sink.send_final(OutboundEvent::Error(classification.envelope(&error)))
                .await;
            (TurnOutcome::Failed(classification), String::new(), false, plan)
        }
    };

    // Persistence runs concurrently with the stream tail.
    let effects = inner.effects.spawn(plan);

    if outcome == TurnOutcome::Completed {
        if let Some(citations) = relay.citations(inner.annotations.as_ref()).await {
            sink.send_final(citations).await;
        }
        sink.send_final(OutboundEvent::TurnComplete(TurnSummary { usage, hops }))
            .await;
    }
    drop(relay);
    drop(sink);

    let effects = match effects.await {
        Ok(report) => report,
        Err(error) => {
            tracing::error!(
                phase = "effects",
                event = "task_failed",
                thread_id = %thread_id,
                error = %error
            );
            EffectsReport::aborted(error.to_string())
        }
    };

    let report = TurnReport {
        thread_id,
        outcome,
        answer,
        truncated,
        usage,
        hops,
        effects,
    };
    hooks.on_turn_complete(&report.thread_id, &report);
    report
}

fn validate(input: &TurnInput) -> Result<(), GatewayError> {
    if input.thread_id.is_blank() {
        return Err(GatewayError::invalid_request("thread id must not be blank"));
    }

    if !input.regenerate && input.user_text.trim().is_empty() && input.image_refs.is_empty() {
        return Err(GatewayError::invalid_request(
            "user text must not be empty without image references",
        ));
    }

    Ok(())
}

fn model_error(error: ProviderError) -> GatewayError {
    GatewayError::from(error).in_phase(TurnPhase::Model)
}

struct Turn<'a> {
    inner: &'a GatewayInner,
    session: &'a Session,
    sink: &'a OutboundSink,
    relay: &'a mut EventRelay,
    context: &'a mut ConversationContext,
}

impl Turn<'_> {
    async fn drive(mut self) -> Result<String, Halt> {
        let api_key = self.credential()?;
        let provider = self
            .inner
            .providers
            .route(self.session.provider)
            .ok_or_else(|| {
                let served: Vec<String> = self
                    .inner
                    .providers
                    .families()
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                GatewayError::invalid_request(format!(
                    "provider '{}' is not registered; serving [{}]",
                    self.session.provider,
                    served.join(", ")
                ))
                .in_phase(TurnPhase::Setup)
            })?;
        let definitions: Vec<ToolDefinition> = self
            .inner
            .dispatcher
            .descriptors()
            .into_iter()
            .map(|descriptor| descriptor.definition)
            .collect();

        let mut state = TurnState::Chatbot;
        let mut pending = (String::new(), Vec::<ToolCall>::new());
        let mut answer = String::new();

        loop {
            let next = match state {
                TurnState::Chatbot => {
                    let (text, calls) = self
                        .chatbot(provider.as_ref(), &definitions, api_key.as_ref())
                        .await?;
                    if calls.is_empty() {
                        answer = text;
                        TurnState::End
                    } else {
                        tracing::trace!(
                            phase = "model",
                            event = "tool_calls_detected",
                            thread_id = %self.context.thread_id,
                            calls = calls.len(),
                            suppressed_bytes = self.relay.suppressed().len()
                        );
                        pending = (text, calls);
                        TurnState::Tools
                    }
                }
                TurnState::Tools => {
                    self.context.hops = self.context.hops.saturating_add(1);
                    let max_hops = self.inner.policy.max_tool_hops;
                    if self.context.hops > max_hops {
                        return Err(GatewayError::hop_limit_exceeded(max_hops)
                            .in_phase(TurnPhase::Tool)
                            .into());
                    }

                    let (text, calls) = std::mem::take(&mut pending);
                    match self.tools(text, calls).await? {
                        Some(direct) => {
                            answer = direct;
                            TurnState::End
                        }
                        None => TurnState::Chatbot,
                    }
                }
                TurnState::End => return Ok(answer),
            };

            tracing::debug!(
                phase = "turn",
                event = "transition",
                thread_id = %self.context.thread_id,
                from = ?state,
                to = ?next,
                hop = self.context.hops
            );
            self.inner
                .hooks
                .on_state_transition(&self.context.thread_id, state, next, self.context.hops);
            state = next;
        }
    }

    fn credential(&self) -> Result<Option<Arc<SecretString>>, GatewayError> {
        let Some(key_id) = &self.session.credential_key else {
            return Ok(None);
        };

        if self.inner.credentials.is_stale(key_id) {
            return Err(GatewayError::authentication(format!(
                "credential '{key_id}' was rejected upstream earlier"
            ))
            .in_phase(TurnPhase::Setup));
        }

        let secret = self
            .inner
            .credentials
            .resolve(key_id)
            .map_err(|error| GatewayError::from(error).in_phase(TurnPhase::Setup))?;
        Ok(Some(Arc::new(secret)))
    }

    /// One model invocation. Text is relayed as it arrives; tool calls are
    /// collected for the TOOLS state.
    async fn chatbot(
        &mut self,
        provider: &dyn ModelProvider,
        definitions: &[ToolDefinition],
        api_key: Option<&Arc<SecretString>>,
    ) -> Result<(String, Vec<ToolCall>), Halt> {
        let sink = self.sink;
        let mut request = ModelRequest::new(self.session.model.clone(), self.context.messages.clone())
            .with_tools(definitions.to_vec())
            .with_metadata("thread_id", self.context.thread_id.as_str());
        if let Some(api_key) = api_key {
            request = request.with_api_key(Arc::clone(api_key));
        }
        request
            .validate()
            .map_err(|error| GatewayError::invalid_request(error.message))?;

        self.context.model_calls = self.context.model_calls.saturating_add(1);
        let stream = sink.race(provider.stream(request)).await?.map_err(model_error)?;
        let events = sink.guard(stream);
        futures_util::pin_mut!(events);

        let mut text = String::new();
        let mut calls = Vec::new();
        let mut stop_reason = None;

        while let Some(event) = events.next().await {
            match event?.map_err(model_error)? {
                StreamEvent::TextDelta(delta) => {
                    text.push_str(&delta);
                    self.relay.text(sink, &delta).await?;
                }
                StreamEvent::ToolUseDelta(partial) => self.relay.suppress(&partial),
                StreamEvent::ToolCallDetected(call) => calls.push(call),
                StreamEvent::Annotation(url) => self.relay.annotate(url),
                StreamEvent::TurnComplete { stop_reason: reason, usage } => {
                    self.context.usage.accumulate(usage);
                    stop_reason = Some(reason);
                }
            }
        }

        match stop_reason {
            Some(StopReason::ContentFilter) => Err(GatewayError::content_filtered(
                "model output was blocked by the provider's content filter",
            )
            .in_phase(TurnPhase::Model)
            .into()),
            Some(StopReason::MaxTokens) if text.is_empty() && calls.is_empty() => {
                Err(GatewayError::length_limited("model hit its output limit before answering")
                    .in_phase(TurnPhase::Model)
                    .into())
            }
            _ => Ok((text, calls)),
        }
    }

    /// Runs each requested tool and appends its result to the transcript.
    /// Returns the answer when a direct-return tool ran.
    async fn tools(&mut self, content: String, calls: Vec<ToolCall>) -> Result<Option<String>, Halt> {
        let sink = self.sink;
        self.context.record_tool_calls(content, calls.clone());
        let mut direct: Option<String> = None;

        for call in calls {
            let dispatch = self.inner.dispatcher.dispatch(call, self.tool_context());
            let result = sink.race(dispatch).await?.map_err(GatewayError::from)?;

            let output = match result.output {
                ToolOutput::Value(value) => {
                    if result.returns_direct {
                        self.relay.text(sink, &value).await?;
                    }
                    value
                }
                ToolOutput::Stream(stream) => {
                    let chunks = sink.guard(stream);
                    futures_util::pin_mut!(chunks);

                    let mut collected = String::new();
                    while let Some(chunk) = chunks.next().await {
                        let chunk = chunk?.map_err(GatewayError::from)?;
                        collected.push_str(&chunk);
                        self.relay.forward(sink, chunk).await?;
                    }
                    collected
                }
            };

            if result.returns_direct {
                direct.get_or_insert_with(String::new).push_str(&output);
            }
            self.context.record_tool_result(&result.tool_call_id, output);
        }

        Ok(direct)
    }

    fn tool_context(&self) -> ToolExecutionContext {
        let mut context = ToolExecutionContext::new(self.context.thread_id.clone())
            .with_injected("thread_id", self.context.thread_id.as_str())
            .with_injected("history_collection_id", self.context.collection_id.as_str());
        for (key, value) in &self.session.tool_context {
            context = context.with_injected(key.clone(), value.clone());
        }
        context
    }
}
