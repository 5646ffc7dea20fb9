//! Lifecycle hooks for observing turns.
//!
//! ```rust
//! use tgateway::{GatewayHooks, NoopGatewayHooks};
//!
//! fn accepts_hooks(_hooks: &dyn GatewayHooks) {}
//!
//! accepts_hooks(&NoopGatewayHooks);
//! ```

use tcommon::ThreadId;
use tprovider::ProviderId;

use crate::{
    CancelReason, Classification, EffectStep, GatewayError, Session, TurnReport, TurnState,
};

pub trait GatewayHooks: Send + Sync {
    fn on_turn_start(&self, _thread_id: &ThreadId, _session: &Session) {}

    fn on_state_transition(
        &self,
        _thread_id: &ThreadId,
        _from: TurnState,
        _to: TurnState,
        _hop: u32,
    ) {
    }

    fn on_error_classified(
        &self,
        _thread_id: &ThreadId,
        _error: &GatewayError,
        _classification: &Classification,
    ) {
    }

    /// Called once per occurrence of an upstream code missing from the catalog.
    fn on_unrecognized_code(&self, _provider: ProviderId, _code: &str) {}

    fn on_turn_cancelled(&self, _thread_id: &ThreadId, _reason: CancelReason, _delivered: usize) {}

    fn on_effects_failure(&self, _thread_id: &ThreadId, _step: EffectStep, _error: &GatewayError) {}

    fn on_turn_complete(&self, _thread_id: &ThreadId, _report: &TurnReport) {}

    /// Runs on every exit path once per-turn state has been released.
    fn on_teardown(&self, _thread_id: &ThreadId) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGatewayHooks;

impl GatewayHooks for NoopGatewayHooks {}
