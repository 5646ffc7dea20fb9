//! Tool registry with case-insensitive lookup by tool name.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tprovider::ToolDefinition;

use crate::{
    FunctionTool, Tool, ToolArguments, ToolChunkStream, ToolDescriptor, ToolError,
    ToolExecutionContext,
};

/// Tools callable within a session, built once at setup and shared read-only.
///
/// Names are unique ignoring ASCII case; registering a name again replaces
/// the earlier tool.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        let name = normalize(tool.descriptor().name());
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn register_fn<F, Fut>(&mut self, descriptor: ToolDescriptor, handler: F)
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        self.register(FunctionTool::new(descriptor, handler));
    }

    pub fn register_sync_fn<F>(&mut self, descriptor: ToolDescriptor, handler: F)
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Result<String, ToolError>
            + Send
            + Sync
            + 'static,
    {
        self.register_fn(descriptor, move |arguments, context| {
            let output = handler(arguments, context);
            async move { output }
        });
    }

    pub fn register_stream_fn<F, Fut>(&mut self, descriptor: ToolDescriptor, handler: F)
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolChunkStream, ToolError>> + Send + 'static,
    {
        self.register(FunctionTool::streaming(descriptor, handler));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(normalize(name).as_str()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(normalize(name).as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(normalize(name).as_str())
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<_> = self.tools.values().map(|tool| tool.descriptor()).collect();
        descriptors.sort_by(|left, right| left.name().cmp(right.name()));
        descriptors
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.descriptors()
            .into_iter()
            .map(|descriptor| descriptor.definition)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}
