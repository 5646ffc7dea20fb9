//! Tool trait contract for registry-managed capabilities.
//!
//! ```rust
//! use ttools::{FunctionTool, Tool, ToolDescriptor, ToolKind};
//!
//! let tool = FunctionTool::new(
//!     ToolDescriptor::new("echo", "Echoes input", r#"{"type":"object"}"#),
//!     |args, _ctx| async move { Ok(serde_json::Value::Object(args).to_string()) },
//! );
//!
//! assert_eq!(tool.descriptor().name(), "echo");
//! assert_eq!(tool.descriptor().kind, ToolKind::Simple);
//! ```

use std::future::Future;
use std::sync::Arc;

use tcommon::BoxFuture;

use crate::{
    ToolArguments, ToolChunkStream, ToolDescriptor, ToolError, ToolExecutionContext, ToolOutput,
};

pub type ToolFuture<'a, T> = BoxFuture<'a, T>;

pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    fn invoke<'a>(
        &'a self,
        arguments: ToolArguments,
        context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolOutput, ToolError>>;
}

type ToolHandler = dyn Fn(ToolArguments, ToolExecutionContext) -> ToolFuture<'static, Result<ToolOutput, ToolError>>
    + Send
    + Sync;

/// Closure-backed tool, either single-value or streaming.
pub struct FunctionTool {
    descriptor: ToolDescriptor,
    handler: Arc<ToolHandler>,
}

impl FunctionTool {
    pub fn new<F, Fut>(descriptor: ToolDescriptor, handler: F) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        let handler: Arc<ToolHandler> = Arc::new(move |arguments, context| {
            let future = handler(arguments, context);
            Box::pin(async move { future.await.map(ToolOutput::Value) })
        });

        Self {
            descriptor,
            handler,
        }
    }

    /// Streaming variant; the descriptor is marked [`crate::ToolKind::Streaming`].
    pub fn streaming<F, Fut>(descriptor: ToolDescriptor, handler: F) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolChunkStream, ToolError>> + Send + 'static,
    {
        let handler: Arc<ToolHandler> = Arc::new(move |arguments, context| {
            let future = handler(arguments, context);
            Box::pin(async move { future.await.map(ToolOutput::Stream) })
        });

        Self {
            descriptor: descriptor.streaming(),
            handler,
        }
    }
}

impl Tool for FunctionTool {
    fn descriptor(&self) -> ToolDescriptor {
        self.descriptor.clone()
    }

    fn invoke<'a>(
        &'a self,
        arguments: ToolArguments,
        context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolOutput, ToolError>> {
        (self.handler)(arguments, context.clone())
    }
}
