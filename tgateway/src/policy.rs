//! Gateway limits and pacing configuration.
//!
//! ```rust
//! use tgateway::GatewayPolicy;
//!
//! let policy = GatewayPolicy::from_json_str(r#"{"max_tool_hops": 2, "delay_chunk_ms": 15}"#)
//!     .expect("policy should parse");
//! assert_eq!(policy.max_tool_hops, 2);
//! assert_eq!(policy.chunk_size, 5);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::GatewayError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayPolicy {
    /// TOOLS visits allowed per turn before the turn fails.
    pub max_tool_hops: u32,
    /// Characters per outbound text event.
    pub chunk_size: usize,
    /// Pause after each outbound text event, unless the turn overrides it.
    pub delay_chunk_ms: u64,
    /// Outbound events buffered ahead of a slow consumer.
    pub outbound_buffer: usize,
    pub tool_timeout_ms: Option<u64>,
    /// Messages kept per history collection by the default memory buffer.
    pub memory_window: usize,
}

impl Default for GatewayPolicy {
    fn default() -> Self {
        Self {
            max_tool_hops: 4,
            chunk_size: 5,
            delay_chunk_ms: 0,
            outbound_buffer: 16,
            tool_timeout_ms: None,
            memory_window: 20,
        }
    }
}

impl GatewayPolicy {
    pub fn from_json_str(json: &str) -> Result<Self, GatewayError> {
        let policy: Self = serde_json::from_str(json)
            .map_err(|err| GatewayError::invalid_request(format!("invalid gateway policy: {err}")))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn with_max_tool_hops(mut self, max_tool_hops: u32) -> Self {
        self.max_tool_hops = max_tool_hops;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_delay_chunk(mut self, delay: Duration) -> Self {
        self.delay_chunk_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_outbound_buffer(mut self, outbound_buffer: usize) -> Self {
        self.outbound_buffer = outbound_buffer;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_memory_window(mut self, memory_window: usize) -> Self {
        self.memory_window = memory_window;
        self
    }

    pub fn delay_chunk(&self) -> Duration {
        Duration::from_millis(self.delay_chunk_ms)
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.chunk_size == 0 {
            return Err(GatewayError::invalid_request("chunk_size must be at least 1"));
        }
        if self.outbound_buffer == 0 {
            return Err(GatewayError::invalid_request(
                "outbound_buffer must be at least 1",
            ));
        }
        if self.memory_window == 0 {
            return Err(GatewayError::invalid_request(
                "memory_window must be at least 1",
            ));
        }
        if self.tool_timeout_ms == Some(0) {
            return Err(GatewayError::invalid_request(
                "tool_timeout_ms must be positive when set",
            ));
        }

        Ok(())
    }
}
