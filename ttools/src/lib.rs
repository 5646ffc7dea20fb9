//! Capability layer for registering, resolving, and dispatching tools.

mod args;
mod dispatcher;
mod error;
mod hooks;
mod registry;
mod tool;
mod types;

pub mod prelude {
    pub use crate::{
        DefaultToolDispatcher, FunctionTool, Tool, ToolArguments, ToolDescriptor, ToolDispatcher,
        ToolError, ToolErrorKind, ToolExecutionContext, ToolExecutionResult, ToolKind,
        ToolOutput, ToolRegistry,
    };
}

pub use args::{optional_string, parse_json_object, parse_json_value, required_string};
pub use dispatcher::{DefaultToolDispatcher, ToolDispatcher};
pub use error::{ToolError, ToolErrorKind};
pub use hooks::{DispatchRecord, NoopToolRuntimeHooks, ToolRuntimeHooks};
pub use registry::ToolRegistry;
pub use tool::{FunctionTool, Tool, ToolFuture};
pub use types::{
    ToolArguments, ToolChunkStream, ToolDescriptor, ToolExecutionContext, ToolExecutionResult,
    ToolKind, ToolOutput,
};
