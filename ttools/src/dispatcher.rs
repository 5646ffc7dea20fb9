//! Tool dispatcher: resolves a model-requested call and runs its handler.
//!
//! The dispatcher is the single place that merges side-channel context into
//! tool arguments and the single place that bounds handlers with a timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_timer::Delay;
use futures_util::StreamExt;
use futures_util::future::{Either, select};
use tcommon::ThreadId;
use tprovider::ToolCall;

use crate::{
    DispatchRecord, NoopToolRuntimeHooks, ToolArguments, ToolChunkStream, ToolDescriptor,
    ToolError, ToolExecutionContext, ToolExecutionResult, ToolFuture, ToolKind, ToolOutput,
    ToolRegistry, ToolRuntimeHooks, parse_json_object,
};

pub trait ToolDispatcher: Send + Sync {
    fn descriptors(&self) -> Vec<ToolDescriptor>;

    fn resolve(&self, name: &str) -> Option<ToolDescriptor>;

    fn dispatch<'a>(
        &'a self,
        tool_call: ToolCall,
        context: ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolExecutionResult, ToolError>>;
}

#[derive(Clone)]
pub struct DefaultToolDispatcher {
    registry: Arc<ToolRegistry>,
    hooks: Arc<dyn ToolRuntimeHooks>,
    timeout: Option<Duration>,
}

impl DefaultToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            hooks: Arc::new(NoopToolRuntimeHooks),
            timeout: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ToolRuntimeHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Bounds handler invocation and, for streaming tools, the wait for
    /// each next chunk.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.registry)
    }

    async fn run(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
    ) -> Result<ToolExecutionResult, ToolError> {
        let tool = self
            .registry
            .get(&tool_call.name)
            .ok_or_else(|| ToolError::unknown_tool(tool_call.name.clone()))?;
        let descriptor = tool.descriptor();
        let arguments = merge_injected(
            parse_json_object(&tool_call.arguments)?,
            &descriptor,
            context,
        )?;

        let invocation = tool.invoke(arguments, context);
        let output = match self.timeout {
            Some(limit) => match select(invocation, Delay::new(limit)).await {
                Either::Left((output, _)) => output?,
                Either::Right(_) => {
                    return Err(ToolError::timeout(format!(
                        "tool did not respond within {}ms",
                        limit.as_millis()
                    )));
                }
            },
            None => invocation.await?,
        };

        if output.kind() != descriptor.kind {
            return Err(ToolError::execution(format!(
                "tool declared {:?} output but produced {:?}",
                descriptor.kind,
                output.kind()
            )));
        }

        Ok(ToolExecutionResult {
            tool_call_id: tool_call.id.clone(),
            tool_name: descriptor.name().to_string(),
            returns_direct: descriptor.returns_direct,
            output,
        })
    }
}

impl ToolDispatcher for DefaultToolDispatcher {
    fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.registry.descriptors()
    }

    fn resolve(&self, name: &str) -> Option<ToolDescriptor> {
        self.registry.get(name).map(|tool| tool.descriptor())
    }

    fn dispatch<'a>(
        &'a self,
        tool_call: ToolCall,
        context: ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolExecutionResult, ToolError>> {
        Box::pin(async move {
            self.hooks.on_dispatch(&tool_call, &context);
            let started = Instant::now();
            let resolved = self.resolve(&tool_call.name);
            let kind = resolved.as_ref().map(|descriptor| descriptor.kind);
            let injected = resolved
                .as_ref()
                .map_or(0, |descriptor| descriptor.injected_keys.len());

            match self.run(&tool_call, &context).await {
                Ok(mut result) => {
                    let record = DispatchRecord {
                        thread_id: &context.thread_id,
                        tool_name: &result.tool_name,
                        tool_call_id: &tool_call.id,
                        kind,
                        injected,
                        elapsed: started.elapsed(),
                    };
                    self.hooks.on_output(&record, result.returns_direct);

                    if let ToolOutput::Stream(stream) = result.output {
                        let watch = StreamWatch {
                            hooks: Arc::clone(&self.hooks),
                            thread_id: context.thread_id.clone(),
                            tool_name: result.tool_name.clone(),
                            tool_call_id: tool_call.id.clone(),
                            injected,
                            started,
                            timeout: self.timeout,
                        };
                        result.output = ToolOutput::Stream(watch.wrap(stream));
                    }
                    Ok(result)
                }
                Err(error) => {
                    let error = error
                        .with_tool_name(tool_call.name.clone())
                        .with_tool_call_id(tool_call.id.clone());
                    let record = DispatchRecord {
                        thread_id: &context.thread_id,
                        tool_name: &tool_call.name,
                        tool_call_id: &tool_call.id,
                        kind,
                        injected,
                        elapsed: started.elapsed(),
                    };
                    self.hooks.on_dispatch_failure(&record, &error);
                    Err(error)
                }
            }
        })
    }
}

/// Owned dispatch state a chunk stream carries until it ends.
struct StreamWatch {
    hooks: Arc<dyn ToolRuntimeHooks>,
    thread_id: ThreadId,
    tool_name: String,
    tool_call_id: String,
    injected: usize,
    started: Instant,
    timeout: Option<Duration>,
}

impl StreamWatch {
    /// Tags chunk errors with the call, bounds each chunk wait, and stops
    /// after the first error.
    fn wrap(self, mut inner: ToolChunkStream) -> ToolChunkStream {
        Box::pin(async_stream::stream! {
            let mut chunks = 0usize;
            loop {
                let next = match self.timeout {
                    Some(limit) => match select(inner.next(), Delay::new(limit)).await {
                        Either::Left((next, _)) => next,
                        Either::Right(_) => Some(Err(ToolError::timeout(format!(
                            "tool produced no chunk within {}ms",
                            limit.as_millis()
                        )))),
                    },
                    None => inner.next().await,
                };

                match next {
                    Some(Ok(chunk)) => {
                        chunks += 1;
                        yield Ok(chunk);
                    }
                    Some(Err(error)) => {
                        let error = error
                            .with_tool_name(self.tool_name.clone())
                            .with_tool_call_id(self.tool_call_id.clone());
                        self.end(chunks, Some(&error));
                        yield Err(error);
                        break;
                    }
                    None => {
                        self.end(chunks, None);
                        break;
                    }
                }
            }
        })
    }

    fn end(&self, chunks: usize, error: Option<&ToolError>) {
        let record = DispatchRecord {
            thread_id: &self.thread_id,
            tool_name: &self.tool_name,
            tool_call_id: &self.tool_call_id,
            kind: Some(ToolKind::Streaming),
            injected: self.injected,
            elapsed: self.started.elapsed(),
        };
        self.hooks.on_stream_end(&record, chunks, error);
    }
}

fn merge_injected(
    mut arguments: ToolArguments,
    descriptor: &ToolDescriptor,
    context: &ToolExecutionContext,
) -> Result<ToolArguments, ToolError> {
    for key in &descriptor.injected_keys {
        let value = context.injected.get(key).ok_or_else(|| {
            ToolError::invalid_arguments(format!("missing injected context '{key}'"))
        })?;
        // Model-supplied values never win over routing context.
        arguments.insert(key.clone(), value.clone());
    }

    Ok(arguments)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::{ToolErrorKind, ToolKind, required_string};

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall::new("call_1", name, arguments)
    }

    fn value_of(result: ToolExecutionResult) -> String {
        match result.output {
            ToolOutput::Value(value) => value,
            ToolOutput::Stream(_) => panic!("expected single value"),
        }
    }

    #[derive(Default)]
    struct RecordingHooks {
        events: Mutex<Vec<String>>,
    }

    impl RecordingHooks {
        fn push(&self, event: String) {
            self.events.lock().expect("hooks lock").push(event);
        }
    }

    impl ToolRuntimeHooks for RecordingHooks {
        fn on_dispatch(&self, tool_call: &ToolCall, context: &ToolExecutionContext) {
            self.push(format!("dispatch:{}@{}", tool_call.name, context.thread_id));
        }

        fn on_output(&self, record: &DispatchRecord<'_>, returns_direct: bool) {
            self.push(format!(
                "output:{}:{:?}:injected={}:direct={returns_direct}",
                record.tool_name, record.kind, record.injected
            ));
        }

        fn on_dispatch_failure(&self, record: &DispatchRecord<'_>, error: &ToolError) {
            self.push(format!(
                "failure:{}:{:?}:{:?}",
                record.tool_name, record.kind, error.kind
            ));
        }

        fn on_stream_end(
            &self,
            record: &DispatchRecord<'_>,
            chunks: usize,
            error: Option<&ToolError>,
        ) {
            self.push(format!(
                "stream_end:{}:{chunks}:{:?}",
                record.tool_call_id,
                error.map(|error| error.kind)
            ));
        }
    }

    #[tokio::test]
    async fn injected_context_overrides_model_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register_sync_fn(
            ToolDescriptor::new("retrieve", "Lookup", "{}").inject("collection"),
            |args, _ctx| {
                Ok(format!(
                    "{}@{}",
                    required_string(&args, "query")?,
                    required_string(&args, "collection")?
                ))
            },
        );
        let dispatcher = DefaultToolDispatcher::new(Arc::new(registry));
        let context =
            ToolExecutionContext::new("thread-1").with_injected("collection", json!("docs-7"));

        let result = dispatcher
            .dispatch(
                call("Retrieve", r#"{"query":"X","collection":"spoofed"}"#),
                context,
            )
            .await
            .expect("dispatch should succeed");

        assert_eq!(result.tool_name, "retrieve");
        assert_eq!(value_of(result), "X@docs-7");
    }

    #[tokio::test]
    async fn missing_injected_context_is_invalid_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register_sync_fn(
            ToolDescriptor::new("retrieve", "Lookup", "{}").inject("collection"),
            |_args, _ctx| Ok(String::new()),
        );
        let dispatcher = DefaultToolDispatcher::new(Arc::new(registry));

        let error = dispatcher
            .dispatch(call("retrieve", "{}"), ToolExecutionContext::new("t"))
            .await
            .expect_err("dispatch should fail");

        assert_eq!(error.kind, ToolErrorKind::InvalidArguments);
    }

    #[tokio::test]
    async fn unregistered_name_is_unknown_tool_with_name_attached() {
        let hooks = Arc::new(RecordingHooks::default());
        let dispatcher =
            DefaultToolDispatcher::new(Arc::new(ToolRegistry::new())).with_hooks(hooks.clone());

        let error = dispatcher
            .dispatch(call("missing", "{}"), ToolExecutionContext::new("t"))
            .await
            .expect_err("dispatch should fail");

        assert_eq!(error.kind, ToolErrorKind::UnknownTool);
        assert_eq!(error.tool_name.as_deref(), Some("missing"));
        assert_eq!(
            *hooks.events.lock().expect("hooks lock"),
            vec![
                "dispatch:missing@t".to_string(),
                "failure:missing:None:UnknownTool".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn handler_not_found_stays_distinct_from_unknown_tool() {
        let hooks = Arc::new(RecordingHooks::default());
        let mut registry = ToolRegistry::new();
        registry.register_sync_fn(
            ToolDescriptor::new("retrieve", "Lookup", "{}").inject("collection"),
            |_args, _ctx| Err(ToolError::not_found("document 42 does not exist")),
        );
        let dispatcher = DefaultToolDispatcher::new(Arc::new(registry)).with_hooks(hooks.clone());
        let context = ToolExecutionContext::new("t").with_injected("collection", json!("docs"));

        let error = dispatcher
            .dispatch(call("retrieve", "{}"), context)
            .await
            .expect_err("dispatch should fail");

        assert_eq!(error.kind, ToolErrorKind::NotFound);
        assert_eq!(error.tool_name.as_deref(), Some("retrieve"));
        assert_eq!(
            hooks.events.lock().expect("hooks lock")[1],
            "failure:retrieve:Some(Simple):NotFound"
        );
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let mut registry = ToolRegistry::new();
        registry.register_fn(ToolDescriptor::new("slow", "Sleeps", "{}"), |_args, _ctx| {
            async move {
                Delay::new(Duration::from_secs(5)).await;
                Ok("late".to_string())
            }
        });
        let dispatcher = DefaultToolDispatcher::new(Arc::new(registry))
            .with_timeout(Duration::from_millis(10));

        let error = dispatcher
            .dispatch(call("slow", "{}"), ToolExecutionContext::new("t"))
            .await
            .expect_err("dispatch should time out");

        assert_eq!(error.kind, ToolErrorKind::Timeout);
    }

    #[tokio::test]
    async fn streaming_handler_chunks_pass_through_in_order() {
        let mut registry = ToolRegistry::new();
        registry.register_stream_fn(
            ToolDescriptor::new("draw", "Streams", "{}").returns_direct(),
            |_args, _ctx| async move {
                let chunks = vec![Ok("a".to_string()), Ok("b".to_string())];
                Ok(Box::pin(futures_util::stream::iter(chunks)) as crate::ToolChunkStream)
            },
        );
        let hooks = Arc::new(RecordingHooks::default());
        let dispatcher = DefaultToolDispatcher::new(Arc::new(registry)).with_hooks(hooks.clone());

        assert_eq!(
            dispatcher.resolve("DRAW").map(|descriptor| descriptor.kind),
            Some(ToolKind::Streaming)
        );

        let result = dispatcher
            .dispatch(call("draw", ""), ToolExecutionContext::new("t"))
            .await
            .expect("dispatch should succeed");
        assert!(result.returns_direct);

        let ToolOutput::Stream(stream) = result.output else {
            panic!("expected stream output");
        };
        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks, vec![Ok("a".to_string()), Ok("b".to_string())]);
        assert_eq!(
            *hooks.events.lock().expect("hooks lock"),
            vec![
                "dispatch:draw@t".to_string(),
                "output:draw:Some(Streaming):injected=0:direct=true".to_string(),
                "stream_end:call_1:2:None".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn stalled_stream_times_out_between_chunks() {
        let mut registry = ToolRegistry::new();
        registry.register_stream_fn(
            ToolDescriptor::new("draw", "Streams", "{}"),
            |_args, _ctx| async move {
                let chunks: ToolChunkStream = Box::pin(async_stream::stream! {
                    yield Ok("first".to_string());
                    Delay::new(Duration::from_secs(5)).await;
                    yield Ok("late".to_string());
                });
                Ok(chunks)
            },
        );
        let hooks = Arc::new(RecordingHooks::default());
        let dispatcher = DefaultToolDispatcher::new(Arc::new(registry))
            .with_hooks(hooks.clone())
            .with_timeout(Duration::from_millis(20));

        let result = dispatcher
            .dispatch(call("draw", "{}"), ToolExecutionContext::new("t"))
            .await
            .expect("opening the stream is within the limit");
        let ToolOutput::Stream(stream) = result.output else {
            panic!("expected stream output");
        };
        let chunks: Vec<_> = stream.collect().await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], Ok("first".to_string()));
        let error = chunks[1].clone().expect_err("second chunk should time out");
        assert_eq!(error.kind, ToolErrorKind::Timeout);
        assert_eq!(error.tool_name.as_deref(), Some("draw"));
        assert_eq!(error.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(
            hooks.events.lock().expect("hooks lock").last().map(String::as_str),
            Some("stream_end:call_1:1:Some(Timeout)")
        );
    }
}
