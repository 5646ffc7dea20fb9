#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use futures_util::stream;
use tcommon::ThreadId;
use tgateway::{
    CancelReason, Classification, GatewayError, GatewayHooks, GatewayPolicy, GatewayService,
    InMemoryTranscriptStore, InMemoryUsageLedger, TurnReport, TurnState, WindowMemoryBuffer,
};
use tprovider::{
    BoxedEventStream, InMemoryCredentialStore, ModelProvider, ModelRequest, ProviderError,
    ProviderFuture, ProviderId, ProviderRegistry, StopReason, StreamEvent, TokenUsage, ToolCall,
    VecEventStream,
};
use ttools::ToolRegistry;

pub enum Hop {
    Events(Vec<Result<StreamEvent, ProviderError>>),
    Refuse(ProviderError),
    /// Emits the events, then never finishes.
    Stall(Vec<StreamEvent>),
}

pub struct ScriptedProvider {
    id: ProviderId,
    script: Mutex<VecDeque<Hop>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    pub fn new(id: ProviderId, hops: Vec<Hop>) -> Arc<Self> {
        Arc::new(Self {
            id,
            script: Mutex::new(hops.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl ModelProvider for ScriptedProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn stream<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
        Box::pin(async move {
            self.requests.lock().expect("requests lock").push(request);
            let hop = self.script.lock().expect("script lock").pop_front();

            match hop {
                Some(Hop::Events(events)) => {
                    Ok(Box::pin(VecEventStream::new(events)) as BoxedEventStream<'a>)
                }
                Some(Hop::Refuse(error)) => Err(error),
                Some(Hop::Stall(events)) => {
                    let stalled = stream::iter(events.into_iter().map(Ok)).chain(stream::pending());
                    Ok(Box::pin(stalled) as BoxedEventStream<'a>)
                }
                None => Err(ProviderError::unclassified("script exhausted")),
            }
        })
    }
}

pub fn text(delta: &str) -> Result<StreamEvent, ProviderError> {
    Ok(StreamEvent::TextDelta(delta.to_string()))
}

pub fn call(id: &str, name: &str, arguments: &str) -> Result<StreamEvent, ProviderError> {
    Ok(StreamEvent::ToolCallDetected(ToolCall::new(id, name, arguments)))
}

pub fn done(stop_reason: StopReason, input: u32, output: u32) -> Result<StreamEvent, ProviderError> {
    Ok(StreamEvent::TurnComplete {
        stop_reason,
        usage: TokenUsage::new(input, output),
    })
}

pub fn answer(reply: &str) -> Hop {
    Hop::Events(vec![text(reply), done(StopReason::EndTurn, 10, 4)])
}

pub fn tool_request(id: &str, name: &str, arguments: &str) -> Hop {
    Hop::Events(vec![
        Ok(StreamEvent::ToolUseDelta("{\"q".to_string())),
        call(id, name, arguments),
        done(StopReason::ToolUse, 8, 2),
    ])
}

#[derive(Default)]
pub struct RecordingHooks {
    pub transitions: Mutex<Vec<(TurnState, TurnState, u32)>>,
    pub classified: Mutex<Vec<Classification>>,
    pub unrecognized: Mutex<Vec<(ProviderId, String)>>,
    pub cancelled: Mutex<Vec<(CancelReason, usize)>>,
    pub completed: Mutex<Vec<TurnReport>>,
    pub teardowns: Mutex<u32>,
}

impl RecordingHooks {
    pub fn transitions(&self) -> Vec<(TurnState, TurnState, u32)> {
        self.transitions.lock().expect("transitions lock").clone()
    }

    pub fn classified(&self) -> Vec<Classification> {
        self.classified.lock().expect("classified lock").clone()
    }

    pub fn unrecognized(&self) -> Vec<(ProviderId, String)> {
        self.unrecognized.lock().expect("unrecognized lock").clone()
    }

    pub fn teardowns(&self) -> u32 {
        *self.teardowns.lock().expect("teardowns lock")
    }
}

impl GatewayHooks for RecordingHooks {
    fn on_state_transition(&self, _thread_id: &ThreadId, from: TurnState, to: TurnState, hop: u32) {
        self.transitions
            .lock()
            .expect("transitions lock")
            .push((from, to, hop));
    }

    fn on_error_classified(
        &self,
        _thread_id: &ThreadId,
        _error: &GatewayError,
        classification: &Classification,
    ) {
        self.classified
            .lock()
            .expect("classified lock")
            .push(classification.clone());
    }

    fn on_unrecognized_code(&self, provider: ProviderId, code: &str) {
        self.unrecognized
            .lock()
            .expect("unrecognized lock")
            .push((provider, code.to_string()));
    }

    fn on_turn_cancelled(&self, _thread_id: &ThreadId, reason: CancelReason, delivered: usize) {
        self.cancelled
            .lock()
            .expect("cancelled lock")
            .push((reason, delivered));
    }

    fn on_turn_complete(&self, _thread_id: &ThreadId, report: &TurnReport) {
        self.completed
            .lock()
            .expect("completed lock")
            .push(report.clone());
    }

    fn on_teardown(&self, _thread_id: &ThreadId) {
        *self.teardowns.lock().expect("teardowns lock") += 1;
    }
}

pub struct Fixture {
    pub service: GatewayService,
    pub provider: Arc<ScriptedProvider>,
    pub transcript: Arc<InMemoryTranscriptStore>,
    pub ledger: Arc<InMemoryUsageLedger>,
    pub memory: Arc<WindowMemoryBuffer>,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub hooks: Arc<RecordingHooks>,
}

pub fn fixture(hops: Vec<Hop>, tools: ToolRegistry, policy: GatewayPolicy) -> Fixture {
    fixture_for(ProviderId::OpenAi, hops, tools, policy)
}

pub fn fixture_for(
    provider_id: ProviderId,
    hops: Vec<Hop>,
    tools: ToolRegistry,
    policy: GatewayPolicy,
) -> Fixture {
    let provider = ScriptedProvider::new(provider_id, hops);
    let mut providers = ProviderRegistry::new();
    providers.register_shared(provider.clone());

    let transcript = Arc::new(InMemoryTranscriptStore::new());
    let ledger = Arc::new(InMemoryUsageLedger::new());
    let memory = Arc::new(WindowMemoryBuffer::new(policy.memory_window));
    let credentials = Arc::new(InMemoryCredentialStore::new());
    credentials
        .insert("primary", "sk-test")
        .expect("credential should store");
    let hooks = Arc::new(RecordingHooks::default());

    let service = GatewayService::builder(providers)
        .tools(Arc::new(tools))
        .transcript_store(transcript.clone())
        .usage_ledger(ledger.clone())
        .memory(memory.clone())
        .credentials(credentials.clone())
        .hooks(hooks.clone())
        .policy(policy)
        .build()
        .expect("service should build");

    Fixture {
        service,
        provider,
        transcript,
        ledger,
        memory,
        credentials,
        hooks,
    }
}
