//! Tool descriptors, execution context, and execution outputs.

use std::fmt::{Debug, Formatter};
use std::pin::Pin;

use futures_core::Stream;
use serde_json::{Map, Value};
use tcommon::{ThreadId, TraceId};
use tprovider::ToolDefinition;

use crate::ToolError;

pub type ToolArguments = Map<String, Value>;

/// Lazy, finite, non-restartable sequence of output chunks from a streaming tool.
pub type ToolChunkStream = Pin<Box<dyn Stream<Item = Result<String, ToolError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Returns one value.
    Simple,
    /// Produces a sequence of output chunks relayed to the client as they arrive.
    Streaming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub definition: ToolDefinition,
    pub kind: ToolKind,
    /// The tool's output is the final answer; no further model hop follows.
    pub returns_direct: bool,
    /// Keys merged from [`ToolExecutionContext::injected`] into the arguments.
    pub injected_keys: Vec<String>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: impl Into<String>,
    ) -> Self {
        Self {
            definition: ToolDefinition {
                name: name.into(),
                description: description.into(),
                input_schema: input_schema.into(),
            },
            kind: ToolKind::Simple,
            returns_direct: false,
            injected_keys: Vec::new(),
        }
    }

    pub fn streaming(mut self) -> Self {
        self.kind = ToolKind::Streaming;
        self
    }

    pub fn returns_direct(mut self) -> Self {
        self.returns_direct = true;
        self
    }

    pub fn inject(mut self, key: impl Into<String>) -> Self {
        self.injected_keys.push(key.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolExecutionContext {
    pub thread_id: ThreadId,
    pub trace_id: Option<TraceId>,
    /// Side-channel values (routing ids and the like) the model never supplies.
    pub injected: ToolArguments,
}

impl ToolExecutionContext {
    pub fn new(thread_id: impl Into<ThreadId>) -> Self {
        Self {
            thread_id: thread_id.into(),
            trace_id: None,
            injected: ToolArguments::new(),
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<TraceId>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_injected(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.injected.insert(key.into(), value.into());
        self
    }
}

pub enum ToolOutput {
    Value(String),
    Stream(ToolChunkStream),
}

impl ToolOutput {
    pub fn kind(&self) -> ToolKind {
        match self {
            Self::Value(_) => ToolKind::Simple,
            Self::Stream(_) => ToolKind::Streaming,
        }
    }
}

impl Debug for ToolOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[derive(Debug)]
pub struct ToolExecutionResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub returns_direct: bool,
    pub output: ToolOutput,
}
