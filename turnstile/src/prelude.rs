//! Common imports for most Turnstile applications.

pub use crate::{
    GatewayBundle, assistant_message, build_gateway, build_gateway_with, observed_gateway,
    parse_provider_id, regenerate_turn, session, single_provider, system_message, turn,
    user_message,
};
pub use crate::{ts_messages, ts_msg, ts_session};
pub use crate::{
    BillingMode, CancelReason, CollectionId, CredentialStore, GatewayError, GatewayHooks,
    GatewayPolicy, GatewayService, Message, ModelProvider, OutboundEvent, ProviderError,
    ProviderId, ProviderRegistry, Role, Session, StreamEvent, ThreadId, ToolDescriptor,
    ToolError, ToolExecutionContext, ToolRegistry, TurnHandle, TurnInput, TurnOutcome,
    TurnReport, WireFrame,
};
