//! Tracing-based observability hooks for turns and tool execution.
//!
//! ```rust
//! use tgateway::GatewayHooks;
//! use tobserve::TracingObservabilityHooks;
//!
//! fn accepts_gateway_hooks(_hooks: &dyn GatewayHooks) {}
//!
//! let hooks = TracingObservabilityHooks;
//! accepts_gateway_hooks(&hooks);
//! ```

use tcommon::ThreadId;
use tgateway::{
    CancelReason, Classification, EffectStep, GatewayError, GatewayHooks, Session, TurnOutcome,
    TurnReport, TurnState,
};
use tprovider::{ProviderId, ToolCall};
use ttools::{DispatchRecord, ToolError, ToolExecutionContext, ToolRuntimeHooks};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObservabilityHooks;

impl GatewayHooks for TracingObservabilityHooks {
    fn on_turn_start(&self, thread_id: &ThreadId, session: &Session) {
        tracing::info!(
            phase = "turn",
            event = "start",
            thread_id = %thread_id,
            provider = %session.provider,
            model = session.model.as_str(),
            account_id = session.account_id.as_str()
        );
    }

    fn on_state_transition(&self, thread_id: &ThreadId, from: TurnState, to: TurnState, hop: u32) {
        tracing::debug!(
            phase = "turn",
            event = "state_transition",
            thread_id = %thread_id,
            from = ?from,
            to = ?to,
            hop
        );
    }

    fn on_error_classified(
        &self,
        thread_id: &ThreadId,
        error: &GatewayError,
        classification: &Classification,
    ) {
        tracing::error!(
            phase = "turn",
            event = "error_classified",
            thread_id = %thread_id,
            error_code = classification.error_code.as_str(),
            status_class = classification.status_class,
            flag_credential = classification.flag_credential,
            error = %error
        );
    }

    fn on_unrecognized_code(&self, provider: ProviderId, code: &str) {
        tracing::warn!(
            phase = "classify",
            event = "unrecognized_code",
            provider = %provider,
            upstream_code = code
        );
    }

    fn on_turn_cancelled(&self, thread_id: &ThreadId, reason: CancelReason, delivered: usize) {
        tracing::info!(
            phase = "turn",
            event = "cancelled",
            thread_id = %thread_id,
            reason = ?reason,
            delivered_chars = delivered
        );
    }

    fn on_effects_failure(&self, thread_id: &ThreadId, step: EffectStep, error: &GatewayError) {
        tracing::error!(
            phase = "effects",
            event = "failure",
            thread_id = %thread_id,
            step = ?step,
            error = %error
        );
    }

    fn on_turn_complete(&self, thread_id: &ThreadId, report: &TurnReport) {
        let outcome = match &report.outcome {
            TurnOutcome::Completed => "completed",
            TurnOutcome::Failed(_) => "failed",
            TurnOutcome::Cancelled(_) => "cancelled",
        };
        tracing::info!(
            phase = "turn",
            event = "complete",
            thread_id = %thread_id,
            outcome,
            error_code = report.error_code(),
            hops = report.hops,
            truncated = report.truncated,
            total_tokens = report.usage.total_tokens,
            effects_clean = report.effects.is_clean()
        );
    }

    fn on_teardown(&self, thread_id: &ThreadId) {
        tracing::trace!(phase = "turn", event = "teardown", thread_id = %thread_id);
    }
}

impl ToolRuntimeHooks for TracingObservabilityHooks {
    fn on_dispatch(&self, tool_call: &ToolCall, context: &ToolExecutionContext) {
        tracing::info!(
            phase = "tool",
            event = "dispatch",
            tool_name = tool_call.name,
            tool_call_id = tool_call.id,
            thread_id = %context.thread_id,
            trace_id = context.trace_id.as_ref().map(|id| id.as_str()),
            context_keys = context.injected.len()
        );
    }

    fn on_output(&self, record: &DispatchRecord<'_>, returns_direct: bool) {
        tracing::info!(
            phase = "tool",
            event = "output",
            tool_name = record.tool_name,
            tool_call_id = record.tool_call_id,
            thread_id = %record.thread_id,
            tool_kind = ?record.kind,
            injected = record.injected,
            returns_direct,
            elapsed_ms = record.elapsed.as_millis() as u64
        );
    }

    fn on_dispatch_failure(&self, record: &DispatchRecord<'_>, error: &ToolError) {
        tracing::error!(
            phase = "tool",
            event = "dispatch_failure",
            tool_name = record.tool_name,
            tool_call_id = record.tool_call_id,
            thread_id = %record.thread_id,
            resolved = record.kind.is_some(),
            elapsed_ms = record.elapsed.as_millis() as u64,
            error_kind = ?error.kind,
            error = %error
        );
    }

    fn on_stream_end(&self, record: &DispatchRecord<'_>, chunks: usize, error: Option<&ToolError>) {
        match error {
            Some(error) => tracing::error!(
                phase = "tool",
                event = "stream_failure",
                tool_name = record.tool_name,
                tool_call_id = record.tool_call_id,
                thread_id = %record.thread_id,
                chunks,
                elapsed_ms = record.elapsed.as_millis() as u64,
                error_kind = ?error.kind,
                error = %error
            ),
            None => tracing::info!(
                phase = "tool",
                event = "stream_end",
                tool_name = record.tool_name,
                tool_call_id = record.tool_call_id,
                thread_id = %record.thread_id,
                chunks,
                elapsed_ms = record.elapsed.as_millis() as u64
            ),
        }
    }
}
