//! Gateway service: wires collaborators together and launches turns.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tprovider::{CredentialStore, InMemoryCredentialStore, ProviderRegistry};
use ttools::{DefaultToolDispatcher, ToolDispatcher, ToolRegistry, ToolRuntimeHooks};

use crate::machine::run_turn;
use crate::relay::AnnotationResolver;
use crate::sink::OutboundSink;
use crate::stream::{Delivered, TurnHandle, TurnStream};
use crate::{
    ErrorCatalog, ErrorClassifier, GatewayError, GatewayHooks, GatewayPolicy,
    InMemoryTranscriptStore, InMemoryUsageLedger, MemoryBuffer, NoopGatewayHooks,
    PassthroughAnnotationResolver, Session, SideEffectCoordinator, TranscriptStore, TurnInput,
    UsageLedger, WindowMemoryBuffer,
};

pub(crate) struct GatewayInner {
    pub(crate) providers: ProviderRegistry,
    pub(crate) dispatcher: Arc<dyn ToolDispatcher>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) memory: Arc<dyn MemoryBuffer>,
    pub(crate) annotations: Arc<dyn AnnotationResolver>,
    pub(crate) hooks: Arc<dyn GatewayHooks>,
    pub(crate) classifier: ErrorClassifier,
    pub(crate) effects: SideEffectCoordinator,
    pub(crate) policy: GatewayPolicy,
}

#[derive(Clone)]
pub struct GatewayService {
    inner: Arc<GatewayInner>,
}

impl GatewayService {
    pub fn builder(providers: ProviderRegistry) -> GatewayServiceBuilder {
        GatewayServiceBuilder::new(providers)
    }

    pub fn policy(&self) -> &GatewayPolicy {
        &self.inner.policy
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.inner.classifier
    }

    /// Starts a turn on its own task and returns the consumer handle.
    ///
    /// Requires a tokio runtime. The turn never surfaces an error here:
    /// failures arrive as a single error event on the stream.
    pub fn stream_turn(&self, session: Session, input: TurnInput) -> TurnHandle {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.inner.policy.outbound_buffer);
        let delivered = Delivered::default();

        let sink = OutboundSink::new(tx, cancel.clone());
        let events = TurnStream::new(rx, cancel.clone(), Arc::clone(&delivered));

        tracing::debug!(
            phase = "turn",
            event = "spawned",
            thread_id = %input.thread_id,
            provider = %session.provider,
            model = %session.model
        );
        let task = tokio::spawn(run_turn(
            Arc::clone(&self.inner),
            session,
            input,
            sink,
            delivered,
        ));

        TurnHandle::new(events, cancel, task)
    }
}

pub struct GatewayServiceBuilder {
    providers: ProviderRegistry,
    tools: Option<Arc<ToolRegistry>>,
    dispatcher: Option<Arc<dyn ToolDispatcher>>,
    tool_hooks: Option<Arc<dyn ToolRuntimeHooks>>,
    transcript: Option<Arc<dyn TranscriptStore>>,
    ledger: Option<Arc<dyn UsageLedger>>,
    memory: Option<Arc<dyn MemoryBuffer>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    annotations: Option<Arc<dyn AnnotationResolver>>,
    hooks: Arc<dyn GatewayHooks>,
    catalog: ErrorCatalog,
    policy: GatewayPolicy,
}

impl GatewayServiceBuilder {
    pub fn new(providers: ProviderRegistry) -> Self {
        Self {
            providers,
            tools: None,
            dispatcher: None,
            tool_hooks: None,
            transcript: None,
            ledger: None,
            memory: None,
            credentials: None,
            annotations: None,
            hooks: Arc::new(NoopGatewayHooks),
            catalog: ErrorCatalog::default(),
            policy: GatewayPolicy::default(),
        }
    }

    pub fn tools(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.tools = Some(registry);
        self
    }

    /// Replaces the default dispatcher; `tools` and `tool_hooks` are then unused.
    pub fn tool_dispatcher(mut self, dispatcher: Arc<dyn ToolDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn tool_hooks(mut self, hooks: Arc<dyn ToolRuntimeHooks>) -> Self {
        self.tool_hooks = Some(hooks);
        self
    }

    pub fn transcript_store(mut self, store: Arc<dyn TranscriptStore>) -> Self {
        self.transcript = Some(store);
        self
    }

    pub fn usage_ledger(mut self, ledger: Arc<dyn UsageLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn memory(mut self, memory: Arc<dyn MemoryBuffer>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn annotation_resolver(mut self, resolver: Arc<dyn AnnotationResolver>) -> Self {
        self.annotations = Some(resolver);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn GatewayHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn catalog(mut self, catalog: ErrorCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn policy(mut self, policy: GatewayPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Result<GatewayService, GatewayError> {
        self.policy.validate()?;
        if self.providers.is_empty() {
            return Err(GatewayError::invalid_request(
                "at least one model provider must be registered",
            ));
        }

        let dispatcher = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None => {
                let registry = self.tools.unwrap_or_default();
                let mut dispatcher = DefaultToolDispatcher::new(registry);
                if let Some(hooks) = self.tool_hooks {
                    dispatcher = dispatcher.with_hooks(hooks);
                }
                if let Some(timeout) = self.policy.tool_timeout() {
                    dispatcher = dispatcher.with_timeout(timeout);
                }
                Arc::new(dispatcher)
            }
        };

        let memory = self
            .memory
            .unwrap_or_else(|| Arc::new(WindowMemoryBuffer::new(self.policy.memory_window)));
        let transcript = self
            .transcript
            .unwrap_or_else(|| Arc::new(InMemoryTranscriptStore::new()));
        let ledger = self
            .ledger
            .unwrap_or_else(|| Arc::new(InMemoryUsageLedger::new()));
        let effects = SideEffectCoordinator::new(
            transcript,
            ledger,
            Arc::clone(&memory),
            Arc::clone(&self.hooks),
        );

        tracing::debug!(
            phase = "setup",
            event = "built",
            families = ?self.providers.families(),
            tools = dispatcher.descriptors().len()
        );
        Ok(GatewayService {
            inner: Arc::new(GatewayInner {
                providers: self.providers,
                dispatcher,
                credentials: self
                    .credentials
                    .unwrap_or_else(|| Arc::new(InMemoryCredentialStore::new())),
                memory,
                annotations: self
                    .annotations
                    .unwrap_or_else(|| Arc::new(PassthroughAnnotationResolver)),
                hooks: self.hooks,
                classifier: ErrorClassifier::new(self.catalog),
                effects,
                policy: self.policy,
            }),
        })
    }
}
