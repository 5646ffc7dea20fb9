//! Metrics-based observability hooks for turns and tool execution.
//!
//! ```rust
//! use tobserve::MetricsObservabilityHooks;
//! use ttools::ToolRuntimeHooks;
//!
//! fn accepts_tool_hooks(_hooks: &dyn ToolRuntimeHooks) {}
//!
//! let hooks = MetricsObservabilityHooks;
//! accepts_tool_hooks(&hooks);
//! ```

use tcommon::ThreadId;
use tgateway::{
    CancelReason, Classification, EffectStep, GatewayError, GatewayHooks, Session, TurnOutcome,
    TurnReport, TurnState,
};
use tprovider::{ProviderId, ToolCall};
use ttools::{DispatchRecord, ToolError, ToolExecutionContext, ToolRuntimeHooks};

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsObservabilityHooks;

impl GatewayHooks for MetricsObservabilityHooks {
    fn on_turn_start(&self, _thread_id: &ThreadId, session: &Session) {
        metrics::counter!(
            "turnstile_turn_start_total",
            "provider" => session.provider.to_string()
        )
        .increment(1);
    }

    fn on_state_transition(&self, _thread_id: &ThreadId, _from: TurnState, to: TurnState, _hop: u32) {
        if to == TurnState::Tools {
            metrics::counter!("turnstile_tool_hop_total").increment(1);
        }
    }

    fn on_error_classified(
        &self,
        _thread_id: &ThreadId,
        _error: &GatewayError,
        classification: &Classification,
    ) {
        metrics::counter!(
            "turnstile_turn_error_total",
            "error_code" => classification.error_code.clone(),
            "status_class" => classification.status_class.to_string()
        )
        .increment(1);
    }

    fn on_unrecognized_code(&self, provider: ProviderId, code: &str) {
        metrics::counter!(
            "turnstile_unrecognized_code_total",
            "provider" => provider.to_string(),
            "code" => code.to_string()
        )
        .increment(1);
    }

    fn on_turn_cancelled(&self, _thread_id: &ThreadId, reason: CancelReason, delivered: usize) {
        metrics::counter!(
            "turnstile_turn_cancelled_total",
            "reason" => format!("{reason:?}")
        )
        .increment(1);
        metrics::histogram!("turnstile_cancelled_delivered_chars").record(delivered as f64);
    }

    fn on_effects_failure(&self, _thread_id: &ThreadId, step: EffectStep, _error: &GatewayError) {
        metrics::counter!(
            "turnstile_effects_failure_total",
            "step" => format!("{step:?}")
        )
        .increment(1);
    }

    fn on_turn_complete(&self, _thread_id: &ThreadId, report: &TurnReport) {
        let outcome = match &report.outcome {
            TurnOutcome::Completed => "completed",
            TurnOutcome::Failed(_) => "failed",
            TurnOutcome::Cancelled(_) => "cancelled",
        };
        metrics::counter!("turnstile_turn_complete_total", "outcome" => outcome).increment(1);
        metrics::histogram!("turnstile_turn_hops").record(f64::from(report.hops));
        metrics::histogram!("turnstile_turn_tokens", "direction" => "input")
            .record(f64::from(report.usage.input_tokens));
        metrics::histogram!("turnstile_turn_tokens", "direction" => "output")
            .record(f64::from(report.usage.output_tokens));
    }
}

impl ToolRuntimeHooks for MetricsObservabilityHooks {
    fn on_dispatch(&self, tool_call: &ToolCall, _context: &ToolExecutionContext) {
        metrics::counter!(
            "turnstile_tool_dispatch_total",
            "tool_name" => tool_call.name.clone()
        )
        .increment(1);
    }

    fn on_output(&self, record: &DispatchRecord<'_>, _returns_direct: bool) {
        metrics::histogram!(
            "turnstile_tool_dispatch_duration_seconds",
            "tool_name" => record.tool_name.to_string(),
            "status" => "success"
        )
        .record(record.elapsed.as_secs_f64());
    }

    fn on_dispatch_failure(&self, record: &DispatchRecord<'_>, error: &ToolError) {
        // Unresolved names stay out of the per-tool label space.
        let tool_name = match record.kind {
            Some(_) => record.tool_name.to_string(),
            None => "unresolved".to_string(),
        };
        metrics::counter!(
            "turnstile_tool_dispatch_failure_total",
            "tool_name" => tool_name.clone(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
        metrics::histogram!(
            "turnstile_tool_dispatch_duration_seconds",
            "tool_name" => tool_name,
            "status" => "failure"
        )
        .record(record.elapsed.as_secs_f64());
    }

    fn on_stream_end(&self, record: &DispatchRecord<'_>, chunks: usize, error: Option<&ToolError>) {
        let status = if error.is_some() { "failure" } else { "success" };
        metrics::histogram!(
            "turnstile_tool_stream_chunks",
            "tool_name" => record.tool_name.to_string(),
            "status" => status
        )
        .record(chunks as f64);
    }
}
