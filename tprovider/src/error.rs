//! Normalized provider error kinds and error value helpers.
//!
//! Provider integrations translate their vendor-specific failures into a
//! [`ProviderError`] at the boundary so the gateway only ever sees this taxonomy.
//!
//! ```rust
//! use tprovider::{ProviderError, ProviderErrorKind};
//!
//! let limited = ProviderError::from_http_status(429, r#"{"error":{"code":"rate_limit"}}"#);
//! assert_eq!(limited.kind, ProviderErrorKind::RateLimited);
//! assert_eq!(limited.status, Some(429));
//!
//! let gone = ProviderError::not_found("model retired");
//! assert!(gone.to_string().contains("model retired"));
//! ```

use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
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
    Unclassified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    /// Upstream HTTP status, when the failure came from an HTTP response.
    pub status: Option<u16>,
    /// Raw upstream body kept for `(content, code)` extraction.
    pub body: Option<String>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            body: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::NotFound, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimited, message)
    }

    pub fn upstream_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::new(
            ProviderErrorKind::UpstreamStatus,
            format!("upstream returned status {status}"),
        )
        .with_status(status)
        .with_body(body)
    }

    pub fn upstream_generic(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::UpstreamGeneric, message)
    }

    pub fn content_filtered(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ContentFiltered, message)
    }

    pub fn length_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::LengthLimited, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Connection, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Authentication, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::PermissionDenied, message)
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unclassified, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Maps an upstream HTTP failure onto the taxonomy, keeping the raw body.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let kind = match status {
            401 => ProviderErrorKind::Authentication,
            403 => ProviderErrorKind::PermissionDenied,
            404 => ProviderErrorKind::NotFound,
            408 | 504 => ProviderErrorKind::Timeout,
            429 => ProviderErrorKind::RateLimited,
            400..=599 => ProviderErrorKind::UpstreamStatus,
            _ => ProviderErrorKind::UpstreamGeneric,
        };

        Self::new(kind, format!("upstream returned status {status}"))
            .with_status(status)
            .with_body(body)
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{:?} (status {}): {}", self.kind, status, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl Error for ProviderError {}
