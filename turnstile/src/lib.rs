//! Unified facade over the Turnstile workspace crates.
//!
//! Most applications only need this crate. It re-exports the gateway, provider,
//! and tooling layers and adds wiring helpers and macros for common setups.

mod macros;

pub mod prelude;
pub mod runtime;
pub mod util;

pub use tcommon;
pub use tgateway;
pub use tobserve;
pub use tprovider;
pub use ttools;

pub use tcommon::{BoxFuture, CollectionId, MetadataMap, ThreadId, TraceId};
pub use tgateway::{
    AnnotationResolver, BillingMode, CancelReason, Classification, CodeObservation,
    EffectStatus, EffectStep, EffectsReport, ErrorCatalog, ErrorClassifier, ErrorEnvelope,
    FailureKind, GatewayError, GatewayFuture, GatewayHooks, GatewayPolicy, GatewayService,
    GatewayServiceBuilder, InMemoryTranscriptStore, InMemoryUsageLedger, MemoryBuffer,
    NoopGatewayHooks, OutboundEvent, PassthroughAnnotationResolver, STATUS_OK, Session,
    TranscriptEntry, TranscriptStore, TurnHandle, TurnInput, TurnOutcome, TurnPhase,
    TurnReport, TurnState, TurnStream, TurnSummary, UsageLedger, UsageRecord,
    WindowMemoryBuffer, WireFrame, chunk_text,
};
pub use tobserve::{
    MetricsObservabilityHooks, SafeGatewayHooks, SafeToolHooks, TracingObservabilityHooks,
    init_tracing,
};
pub use tprovider::{
    BoxedEventStream, CredentialStore, InMemoryCredentialStore, Message, ModelEventStream,
    ModelProvider, ModelRequest, ProviderError, ProviderErrorKind, ProviderFuture, ProviderId,
    ProviderRegistry, Role, SecretString, StopReason, StreamEvent, TokenUsage, ToolCall,
    ToolDefinition, VecEventStream,
};
pub use ttools::{
    DefaultToolDispatcher, DispatchRecord, FunctionTool, NoopToolRuntimeHooks, Tool, ToolArguments,
    ToolChunkStream, ToolDescriptor, ToolDispatcher, ToolError, ToolErrorKind,
    ToolExecutionContext, ToolExecutionResult, ToolFuture, ToolKind, ToolOutput, ToolRegistry,
    ToolRuntimeHooks, optional_string, parse_json_object, parse_json_value, required_string,
};

pub use runtime::{
    GatewayBundle, build_gateway, build_gateway_with, observed_gateway, single_provider,
};
pub use util::{
    assistant_message, parse_provider_id, regenerate_turn, session, system_message, turn,
    user_message,
};
