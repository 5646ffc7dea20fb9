//! Streaming tool-orchestration gateway.
//!
//! A turn runs a `CHATBOT -> TOOLS -> CHATBOT ... -> END` loop against a
//! model provider, relays text to the consumer as it arrives, classifies
//! every failure into one user-facing error event, and persists the
//! transcript, usage, memory, and billing exactly once per turn.

mod catalog;
mod classify;
mod context;
mod effects;
mod error;
mod hooks;
mod machine;
mod policy;
mod relay;
mod service;
mod sink;
mod store;
mod stream;
mod types;
mod wire;

pub mod prelude {
    pub use crate::{
        BillingMode, CancelReason, Classification, ErrorCatalog, ErrorClassifier, FailureKind,
        GatewayError, GatewayHooks, GatewayPolicy, GatewayService, GatewayServiceBuilder,
        MemoryBuffer, OutboundEvent, Session, TranscriptStore, TurnHandle, TurnInput,
        TurnOutcome, TurnReport, TurnState, UsageLedger, WireFrame,
    };
    pub use tcommon::{CollectionId, ThreadId};
}

pub use catalog::{ErrorCatalog, UPSTREAM_STATUS_CLASS};
pub use classify::{Classification, CodeObservation, ErrorClassifier};
pub use context::ConversationContext;
pub use effects::{EffectStatus, EffectStep, EffectsPlan, EffectsReport, SideEffectCoordinator};
pub use error::{FailureKind, GatewayError, TurnPhase};
pub use hooks::{GatewayHooks, NoopGatewayHooks};
pub use policy::GatewayPolicy;
pub use relay::{AnnotationResolver, PassthroughAnnotationResolver, chunk_text};
pub use service::{GatewayService, GatewayServiceBuilder};
pub use sink::CancelReason;
pub use store::{
    BillingMode, GatewayFuture, InMemoryTranscriptStore, InMemoryUsageLedger, MemoryBuffer,
    TranscriptEntry, TranscriptStore, UsageLedger, UsageRecord, WindowMemoryBuffer,
};
pub use stream::{TurnHandle, TurnStream};
pub use types::{Session, TurnInput, TurnOutcome, TurnReport, TurnState};
pub use wire::{ErrorEnvelope, OutboundEvent, STATUS_OK, TurnSummary, WireFrame};
pub use tcommon::{CollectionId, ThreadId};
