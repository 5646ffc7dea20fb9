use std::panic::{AssertUnwindSafe, catch_unwind};

use tcommon::ThreadId;
use tgateway::{
    CancelReason, Classification, EffectStep, GatewayError, GatewayHooks, Session, TurnReport,
    TurnState,
};
use tprovider::{ProviderId, ToolCall};
use ttools::{DispatchRecord, ToolError, ToolExecutionContext, ToolRuntimeHooks};

/// Keeps a panicking observer from tearing down the turn task.
pub struct SafeGatewayHooks<H> {
    inner: H,
}

impl<H> SafeGatewayHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> GatewayHooks for SafeGatewayHooks<H>
where
    H: GatewayHooks,
{
    fn on_turn_start(&self, thread_id: &ThreadId, session: &Session) {
        let _ = catch_unwind(AssertUnwindSafe(|| self.inner.on_turn_start(thread_id, session)));
    }

    fn on_state_transition(&self, thread_id: &ThreadId, from: TurnState, to: TurnState, hop: u32) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_state_transition(thread_id, from, to, hop)
        }));
    }

    fn on_error_classified(
        &self,
        thread_id: &ThreadId,
        error: &GatewayError,
        classification: &Classification,
    ) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner
                .on_error_classified(thread_id, error, classification)
        }));
    }

    fn on_unrecognized_code(&self, provider: ProviderId, code: &str) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_unrecognized_code(provider, code)
        }));
    }

    fn on_turn_cancelled(&self, thread_id: &ThreadId, reason: CancelReason, delivered: usize) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_turn_cancelled(thread_id, reason, delivered)
        }));
    }

    fn on_effects_failure(&self, thread_id: &ThreadId, step: EffectStep, error: &GatewayError) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_effects_failure(thread_id, step, error)
        }));
    }

    fn on_turn_complete(&self, thread_id: &ThreadId, report: &TurnReport) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_turn_complete(thread_id, report)
        }));
    }

    fn on_teardown(&self, thread_id: &ThreadId) {
        let _ = catch_unwind(AssertUnwindSafe(|| self.inner.on_teardown(thread_id)));
    }
}

pub struct SafeToolHooks<H> {
    inner: H,
}

impl<H> SafeToolHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> ToolRuntimeHooks for SafeToolHooks<H>
where
    H: ToolRuntimeHooks,
{
    fn on_dispatch(&self, tool_call: &ToolCall, context: &ToolExecutionContext) {
        let _ = catch_unwind(AssertUnwindSafe(|| self.inner.on_dispatch(tool_call, context)));
    }

    fn on_output(&self, record: &DispatchRecord<'_>, returns_direct: bool) {
        let _ = catch_unwind(AssertUnwindSafe(|| self.inner.on_output(record, returns_direct)));
    }

    fn on_dispatch_failure(&self, record: &DispatchRecord<'_>, error: &ToolError) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_dispatch_failure(record, error)
        }));
    }

    fn on_stream_end(&self, record: &DispatchRecord<'_>, chunks: usize, error: Option<&ToolError>) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_stream_end(record, chunks, error)
        }));
    }
}
