//! Runtime wiring helpers for in-process gateways.

use std::sync::Arc;

use crate::{
    GatewayError, GatewayHooks, GatewayPolicy, GatewayService, InMemoryCredentialStore,
    InMemoryTranscriptStore, InMemoryUsageLedger, ModelProvider, ProviderRegistry,
    SafeGatewayHooks, SafeToolHooks, ToolRegistry, ToolRuntimeHooks, TracingObservabilityHooks,
    WindowMemoryBuffer,
};

/// A gateway plus concrete handles to the in-memory stores it writes to.
#[derive(Clone)]
pub struct GatewayBundle {
    pub service: GatewayService,
    pub transcript: Arc<InMemoryTranscriptStore>,
    pub ledger: Arc<InMemoryUsageLedger>,
    pub memory: Arc<WindowMemoryBuffer>,
    pub credentials: Arc<InMemoryCredentialStore>,
}

pub fn single_provider(provider: Arc<dyn ModelProvider>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register_shared(provider);
    registry
}

pub fn build_gateway(
    providers: ProviderRegistry,
    tools: ToolRegistry,
) -> Result<GatewayBundle, GatewayError> {
    build_gateway_with(providers, tools, GatewayPolicy::default(), None)
}

/// Gateway with tracing hooks on both turn and tool events.
pub fn observed_gateway(
    providers: ProviderRegistry,
    tools: ToolRegistry,
    policy: GatewayPolicy,
) -> Result<GatewayBundle, GatewayError> {
    let tool_hooks: Arc<dyn ToolRuntimeHooks> =
        Arc::new(SafeToolHooks::new(TracingObservabilityHooks));
    let hooks: Arc<dyn GatewayHooks> = Arc::new(SafeGatewayHooks::new(TracingObservabilityHooks));

    build(providers, tools, policy, Some(hooks), Some(tool_hooks))
}

pub fn build_gateway_with(
    providers: ProviderRegistry,
    tools: ToolRegistry,
    policy: GatewayPolicy,
    hooks: Option<Arc<dyn GatewayHooks>>,
) -> Result<GatewayBundle, GatewayError> {
    build(providers, tools, policy, hooks, None)
}

fn build(
    providers: ProviderRegistry,
    tools: ToolRegistry,
    policy: GatewayPolicy,
    hooks: Option<Arc<dyn GatewayHooks>>,
    tool_hooks: Option<Arc<dyn ToolRuntimeHooks>>,
) -> Result<GatewayBundle, GatewayError> {
    let transcript = Arc::new(InMemoryTranscriptStore::new());
    let ledger = Arc::new(InMemoryUsageLedger::new());
    let memory = Arc::new(WindowMemoryBuffer::new(policy.memory_window));
    let credentials = Arc::new(InMemoryCredentialStore::new());

    let mut builder = GatewayService::builder(providers)
        .tools(Arc::new(tools))
        .transcript_store(transcript.clone())
        .usage_ledger(ledger.clone())
        .memory(memory.clone())
        .credentials(credentials.clone())
        .policy(policy);

    if let Some(tool_hooks) = tool_hooks {
        builder = builder.tool_hooks(tool_hooks);
    }
    if let Some(hooks) = hooks {
        builder = builder.hooks(hooks);
    }

    Ok(GatewayBundle {
        service: builder.build()?,
        transcript,
        ledger,
        memory,
        credentials,
    })
}
