//! Observer callbacks for tool dispatch.
//!
//! A dispatch either fails before the tool produced anything, or settles with
//! output. Streaming output is observed a second time when its chunks run out
//! or fail, through [`ToolRuntimeHooks::on_stream_end`].
//!
//! ```rust
//! use ttools::{NoopToolRuntimeHooks, ToolRuntimeHooks};
//!
//! fn assert_hooks_trait(_hooks: &dyn ToolRuntimeHooks) {}
//!
//! let hooks = NoopToolRuntimeHooks;
//! assert_hooks_trait(&hooks);
//! ```

use std::time::Duration;

use tcommon::ThreadId;
use tprovider::ToolCall;

use crate::{ToolError, ToolExecutionContext, ToolKind};

/// What the dispatcher knew about one call when a hook fired.
#[derive(Debug, Clone, Copy)]
pub struct DispatchRecord<'a> {
    pub thread_id: &'a ThreadId,
    pub tool_name: &'a str,
    pub tool_call_id: &'a str,
    /// `None` when the requested name did not resolve.
    pub kind: Option<ToolKind>,
    /// Context values merged over the model's arguments.
    pub injected: usize,
    /// Time since the dispatch began.
    pub elapsed: Duration,
}

pub trait ToolRuntimeHooks: Send + Sync {
    fn on_dispatch(&self, _tool_call: &ToolCall, _context: &ToolExecutionContext) {}

    fn on_output(&self, _record: &DispatchRecord<'_>, _returns_direct: bool) {}

    fn on_dispatch_failure(&self, _record: &DispatchRecord<'_>, _error: &ToolError) {}

    /// Not called when the consumer drops the stream before its end.
    fn on_stream_end(
        &self,
        _record: &DispatchRecord<'_>,
        _chunks: usize,
        _error: Option<&ToolError>,
    ) {
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopToolRuntimeHooks;

impl ToolRuntimeHooks for NoopToolRuntimeHooks {}
