//! Known upstream error codes and the user-facing messages they map to.
//!
//! ```rust
//! use tgateway::ErrorCatalog;
//! use tprovider::ProviderId;
//!
//! let catalog = ErrorCatalog::from_json_str(
//!     r#"{
//!         "common_response": "Something went wrong, please retry.",
//!         "providers": { "open-ai": { "insufficient_quota": "Your quota is used up." } }
//!     }"#,
//! )
//! .expect("catalog should parse");
//!
//! assert_eq!(
//!     catalog.lookup(ProviderId::OpenAi, "insufficient_quota"),
//!     Some("Your quota is used up.")
//! );
//! assert_eq!(catalog.lookup(ProviderId::Gemini, "insufficient_quota"), None);
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tprovider::ProviderId;

use crate::{FailureKind, GatewayError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCatalog {
    /// Fallback answer for any code without a registered message.
    pub common_response: String,
    /// Per provider family, upstream `code -> message`.
    #[serde(default)]
    pub providers: HashMap<ProviderId, BTreeMap<String, String>>,
    /// Overrides for the fixed per-kind messages, keyed by [`FailureKind::code`].
    #[serde(default)]
    pub kind_messages: BTreeMap<String, String>,
    /// Per provider family, upstream `code -> status class`. Known codes
    /// without an entry answer with [`UPSTREAM_STATUS_CLASS`].
    #[serde(default)]
    pub statuses: HashMap<ProviderId, BTreeMap<String, u16>>,
}

/// Status class for upstream failures the catalog has no status for.
pub const UPSTREAM_STATUS_CLASS: u16 = 417;

impl ErrorCatalog {
    pub fn new(common_response: impl Into<String>) -> Self {
        Self {
            common_response: common_response.into(),
            providers: HashMap::new(),
            kind_messages: BTreeMap::new(),
            statuses: HashMap::new(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, GatewayError> {
        let catalog: Self = serde_json::from_str(json)
            .map_err(|err| GatewayError::invalid_request(format!("invalid error catalog: {err}")))?;
        if catalog.common_response.trim().is_empty() {
            return Err(GatewayError::invalid_request(
                "error catalog common_response must not be empty",
            ));
        }
        let bad_status = catalog
            .statuses
            .values()
            .flat_map(|codes| codes.values())
            .find(|status| !(400..=599).contains(*status));
        if let Some(status) = bad_status {
            return Err(GatewayError::invalid_request(format!(
                "error catalog status {status} is not a 4xx or 5xx class"
            )));
        }

        Ok(catalog)
    }

    pub fn with_code(
        mut self,
        provider: ProviderId,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.providers
            .entry(provider)
            .or_default()
            .insert(code.into(), message.into());
        self
    }

    pub fn with_status(
        mut self,
        provider: ProviderId,
        code: impl Into<String>,
        status: u16,
    ) -> Self {
        self.statuses
            .entry(provider)
            .or_default()
            .insert(code.into(), status);
        self
    }

    /// Status class for an upstream code, [`UPSTREAM_STATUS_CLASS`] when unset.
    pub fn status_for(&self, provider: ProviderId, code: &str) -> u16 {
        self.statuses
            .get(&provider)
            .and_then(|codes| codes.get(code))
            .copied()
            .unwrap_or(UPSTREAM_STATUS_CLASS)
    }

    pub fn lookup(&self, provider: ProviderId, code: &str) -> Option<&str> {
        self.providers
            .get(&provider)
            .and_then(|codes| codes.get(code))
            .map(String::as_str)
    }

    pub fn is_known(&self, provider: ProviderId, code: &str) -> bool {
        self.lookup(provider, code).is_some()
    }

    pub fn kind_message(&self, kind: FailureKind) -> &str {
        self.kind_messages
            .get(kind.code())
            .map(String::as_str)
            .unwrap_or_else(|| default_kind_message(kind))
    }
}

impl Default for ErrorCatalog {
    fn default() -> Self {
        Self::new("The assistant could not answer right now. Please try again shortly.")
            .with_code(
                ProviderId::OpenAi,
                "insufficient_quota",
                "The configured API key has run out of quota.",
            )
            .with_status(ProviderId::OpenAi, "insufficient_quota", 429)
            .with_code(
                ProviderId::OpenAi,
                "context_length_exceeded",
                "The conversation is too long for this model. Start a new thread.",
            )
            .with_code(
                ProviderId::OpenAi,
                "model_not_found",
                "The selected model is not available for this API key.",
            )
            .with_code(
                ProviderId::OpenAi,
                "server_error",
                "The model provider had an internal error. Please retry.",
            )
            .with_code(
                ProviderId::Anthropic,
                "overloaded_error",
                "The model provider is overloaded. Please retry in a moment.",
            )
            .with_code(
                ProviderId::Anthropic,
                "invalid_request_error",
                "The request was rejected by the model provider.",
            )
            .with_code(
                ProviderId::Anthropic,
                "api_error",
                "The model provider had an internal error. Please retry.",
            )
            .with_code(
                ProviderId::Gemini,
                "RESOURCE_EXHAUSTED",
                "The configured API key has run out of quota.",
            )
            .with_status(ProviderId::Gemini, "RESOURCE_EXHAUSTED", 429)
            .with_code(
                ProviderId::Gemini,
                "INVALID_ARGUMENT",
                "The request was rejected by the model provider.",
            )
            .with_code(
                ProviderId::Gemini,
                "UNAVAILABLE",
                "The model provider is temporarily unavailable. Please retry.",
            )
    }
}

fn default_kind_message(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::NotFound => {
            "The selected model is unavailable. Check the model name or API key."
        }
        FailureKind::RateLimited => "Too many requests. Please wait a moment and try again.",
        FailureKind::ContentFiltered | FailureKind::LengthLimited => {
            "The response was stopped by the provider's content filter."
        }
        FailureKind::Timeout => "The model took too long to respond. Please try again.",
        FailureKind::Connection => "Could not reach the model provider. Please try again.",
        FailureKind::Authentication => "The API key was rejected. Update it and try again.",
        FailureKind::PermissionDenied => "The API key is not allowed to use this model.",
        FailureKind::UnknownTool => "The assistant tried to use a tool that is not available.",
        FailureKind::HopLimitExceeded => {
            "The assistant used too many tools for one answer. Please rephrase."
        }
        FailureKind::InvalidRequest => "The request could not be processed.",
        FailureKind::Storage => "The conversation could not be saved.",
        FailureKind::UpstreamStatus | FailureKind::UpstreamGeneric | FailureKind::Unclassified => {
            "An unexpected error occurred."
        }
    }
}
