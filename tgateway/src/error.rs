//! Normalized gateway failure type.
//!
//! Every failure a turn can hit (provider, tool, collaborator, or the turn
//! machine itself) is converted into a [`GatewayError`] before it reaches the
//! classifier, so the orchestrator only ever matches on [`FailureKind`].

use std::error::Error;
use std::fmt::{Display, Formatter};

use tprovider::{ProviderError, ProviderErrorKind};
use ttools::{ToolError, ToolErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    NotFound,
    RateLimited,
    UpstreamStatus,
    UpstreamGeneric,
    ContentFiltered,
    LengthLimited,
    Timeout,
    Connection,
    Authentication,
    PermissionDenied,
    UnknownTool,
    HopLimitExceeded,
    InvalidRequest,
    Storage,
    Unclassified,
}

impl FailureKind {
    /// Stable code carried by the error envelope.
    pub fn code(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::UpstreamStatus => "upstream_status_error",
            Self::UpstreamGeneric => "upstream_generic_error",
            Self::ContentFiltered => "content_filtered",
            Self::LengthLimited => "length_limited",
            Self::Timeout => "timeout",
            Self::Connection => "connection_error",
            Self::Authentication => "authentication_error",
            Self::PermissionDenied => "permission_denied",
            Self::UnknownTool => "unknown_tool",
            Self::HopLimitExceeded => "hop_limit_exceeded",
            Self::InvalidRequest => "invalid_request",
            Self::Storage => "storage_error",
            Self::Unclassified => "unclassified",
        }
    }
}

/// Where in the turn a failure was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnPhase {
    Setup,
    Model,
    Tool,
    Effects,
}

impl Display for TurnPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let phase = match self {
            Self::Setup => "setup",
            Self::Model => "model",
            Self::Tool => "tool",
            Self::Effects => "effects",
        };

        f.write_str(phase)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    pub kind: FailureKind,
    pub message: String,
    pub status: Option<u16>,
    /// Raw upstream body, when one was captured.
    pub body: Option<String>,
    pub tool_name: Option<String>,
    pub phase: Option<TurnPhase>,
}

impl GatewayError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            body: None,
            tool_name: None,
            phase: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, message)
    }

    pub fn content_filtered(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ContentFiltered, message)
    }

    pub fn length_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::LengthLimited, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Authentication, message)
    }

    pub fn hop_limit_exceeded(max_hops: u32) -> Self {
        Self::new(
            FailureKind::HopLimitExceeded,
            format!("model requested tools more than {max_hops} times in one turn"),
        )
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidRequest, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Storage, message)
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unclassified, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    /// Tags the phase unless an inner layer already did.
    pub fn in_phase(mut self, phase: TurnPhase) -> Self {
        self.phase.get_or_insert(phase);
        self
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind.code())?;
        if let Some(phase) = self.phase {
            write!(f, " [phase={phase}]")?;
        }
        if let Some(tool_name) = &self.tool_name {
            write!(f, " [tool={tool_name}]")?;
        }
        if let Some(status) = self.status {
            write!(f, " [status={status}]")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl Error for GatewayError {}

impl From<ProviderError> for GatewayError {
    fn from(value: ProviderError) -> Self {
        let kind = match value.kind {
            ProviderErrorKind::NotFound => FailureKind::NotFound,
            ProviderErrorKind::RateLimited => FailureKind::RateLimited,
            ProviderErrorKind::UpstreamStatus => FailureKind::UpstreamStatus,
            ProviderErrorKind::UpstreamGeneric => FailureKind::UpstreamGeneric,
            ProviderErrorKind::ContentFiltered => FailureKind::ContentFiltered,
            ProviderErrorKind::LengthLimited => FailureKind::LengthLimited,
            ProviderErrorKind::Timeout => FailureKind::Timeout,
            ProviderErrorKind::Connection => FailureKind::Connection,
            ProviderErrorKind::Authentication => FailureKind::Authentication,
            ProviderErrorKind::PermissionDenied => FailureKind::PermissionDenied,
            ProviderErrorKind::Unclassified => FailureKind::Unclassified,
        };

        Self {
            kind,
            message: value.message,
            status: value.status,
            body: value.body,
            tool_name: None,
            phase: None,
        }
    }
}

impl From<ToolError> for GatewayError {
    fn from(value: ToolError) -> Self {
        let kind = match value.kind {
            ToolErrorKind::UnknownTool => FailureKind::UnknownTool,
            ToolErrorKind::NotFound => FailureKind::NotFound,
            ToolErrorKind::InvalidArguments => FailureKind::InvalidRequest,
            ToolErrorKind::Timeout => FailureKind::Timeout,
            ToolErrorKind::Unauthorized => FailureKind::Authentication,
            ToolErrorKind::PermissionDenied => FailureKind::PermissionDenied,
            ToolErrorKind::RateLimited => FailureKind::RateLimited,
            ToolErrorKind::Connection => FailureKind::Connection,
            ToolErrorKind::UpstreamStatus => FailureKind::UpstreamStatus,
            ToolErrorKind::ContentFiltered => FailureKind::ContentFiltered,
            ToolErrorKind::LengthLimited => FailureKind::LengthLimited,
            ToolErrorKind::Execution | ToolErrorKind::Other => FailureKind::Unclassified,
        };

        Self {
            kind,
            message: value.message,
            status: None,
            body: None,
            tool_name: value.tool_name,
            phase: Some(TurnPhase::Tool),
        }
    }
}
