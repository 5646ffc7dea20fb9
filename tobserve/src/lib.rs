//! Production-friendly observability hooks for gateway turns and tool execution.
//!
//! ```rust
//! use tobserve::{MetricsObservabilityHooks, SafeGatewayHooks, TracingObservabilityHooks};
//!
//! let _gateway_hooks = SafeGatewayHooks::new(TracingObservabilityHooks);
//! let _metrics = MetricsObservabilityHooks;
//! ```

mod metrics_hooks;
mod safe_hooks;
mod subscriber;
mod tracing_hooks;

pub use metrics_hooks::MetricsObservabilityHooks;
pub use safe_hooks::{SafeGatewayHooks, SafeToolHooks};
pub use subscriber::init_tracing;
pub use tracing_hooks::TracingObservabilityHooks;

pub mod prelude {
    pub use crate::{
        MetricsObservabilityHooks, SafeGatewayHooks, SafeToolHooks, TracingObservabilityHooks,
        init_tracing,
    };
}
