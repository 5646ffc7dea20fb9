//! Error classification: maps any [`GatewayError`] onto the
//! `(error_code, user_message, status_class)` triple sent to the client.
//!
//! ```rust
//! use tgateway::{CodeObservation, ErrorClassifier, GatewayError};
//! use tprovider::{ProviderError, ProviderId};
//!
//! let classifier = ErrorClassifier::default();
//! let error = GatewayError::from(ProviderError::from_http_status(
//!     529,
//!     r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
//! ));
//!
//! let classification = classifier.classify(ProviderId::Anthropic, &error);
//! assert_eq!(classification.status_class, 417);
//! assert_eq!(classification.upstream_code.as_deref(), Some("overloaded_error"));
//! assert_eq!(classification.observation, CodeObservation::Known);
//! ```

use std::sync::Arc;

use serde_json::{Value, json};
use tprovider::ProviderId;

use crate::{ErrorCatalog, ErrorEnvelope, FailureKind, GatewayError, UPSTREAM_STATUS_CLASS};

/// Whether an extracted upstream code already has a registered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeObservation {
    Known,
    NewlyObserved,
    /// No upstream code was involved.
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: FailureKind,
    pub error_code: String,
    pub user_message: String,
    pub status_class: u16,
    /// The session credential should be marked stale.
    pub flag_credential: bool,
    pub observation: CodeObservation,
    pub upstream_code: Option<String>,
    pub upstream_content: Option<String>,
}

impl Classification {
    fn fixed(kind: FailureKind, user_message: impl Into<String>, status_class: u16) -> Self {
        Self {
            kind,
            error_code: kind.code().to_string(),
            user_message: user_message.into(),
            status_class,
            flag_credential: false,
            observation: CodeObservation::NotApplicable,
            upstream_code: None,
            upstream_content: None,
        }
    }

    pub fn envelope(&self, error: &GatewayError) -> ErrorEnvelope {
        let mut payload = json!({
            "error_code": self.error_code,
            "kind": error.kind.code(),
        });

        if let Some(map) = payload.as_object_mut() {
            if let Some(code) = &self.upstream_code {
                map.insert("upstream_code".to_string(), json!(code));
            }
            if let Some(tool_name) = &error.tool_name {
                map.insert("tool".to_string(), json!(tool_name));
            }
            if let Some(phase) = error.phase {
                map.insert("phase".to_string(), json!(phase.to_string()));
            }
        }

        ErrorEnvelope {
            status_class: self.status_class,
            user_message: self.user_message.clone(),
            error_code: self.error_code.clone(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    catalog: Arc<ErrorCatalog>,
}

impl ErrorClassifier {
    pub fn new(catalog: ErrorCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
        }
    }

    pub fn catalog(&self) -> &ErrorCatalog {
        &self.catalog
    }

    pub fn classify(&self, provider: ProviderId, error: &GatewayError) -> Classification {
        let kind = error.kind;
        let mut classification = match kind {
            FailureKind::NotFound => self.fixed(kind, 417),
            FailureKind::RateLimited => self.fixed(kind, 429),
            FailureKind::UpstreamStatus | FailureKind::UpstreamGeneric => {
                let extracted = extract_code(error).unwrap_or_default();
                self.from_extracted(provider, error, extracted)
            }
            FailureKind::ContentFiltered | FailureKind::LengthLimited => self.fixed(kind, 417),
            FailureKind::Timeout => self.fixed(kind, 504),
            FailureKind::Connection => self.fixed(kind, 502),
            FailureKind::Authentication => self.fixed(kind, 401),
            FailureKind::PermissionDenied => self.fixed(kind, 403),
            FailureKind::UnknownTool | FailureKind::HopLimitExceeded | FailureKind::Storage => {
                self.fixed(kind, 500)
            }
            FailureKind::InvalidRequest => self.fixed(kind, 400),
            FailureKind::Unclassified => match extract_code(error) {
                Ok(extracted) => self.from_extracted(provider, error, extracted),
                Err(reason) => {
                    tracing::error!(
                        phase = "classify",
                        event = "last_resort",
                        provider = %provider,
                        reason = %reason,
                        error = %error
                    );
                    Classification::fixed(
                        kind,
                        format!("Unexpected error: {}", error.message),
                        400,
                    )
                }
            },
        };

        // A failing tool's credentials are not the model credential.
        classification.flag_credential = error.tool_name.is_none()
            && matches!(
                kind,
                FailureKind::NotFound
                    | FailureKind::Authentication
                    | FailureKind::PermissionDenied
            );

        if classification.observation != CodeObservation::NewlyObserved
            && kind != FailureKind::Unclassified
        {
            tracing::error!(
                phase = "classify",
                event = "operational_error",
                provider = %provider,
                error_code = %classification.error_code,
                upstream_code = classification.upstream_code.as_deref(),
                error = %error
            );
        }

        classification
    }

    fn fixed(&self, kind: FailureKind, status_class: u16) -> Classification {
        Classification::fixed(kind, self.catalog.kind_message(kind), status_class)
    }

    fn from_extracted(
        &self,
        provider: ProviderId,
        error: &GatewayError,
        extracted: Extracted,
    ) -> Classification {
        let mut classification = Classification::fixed(
            error.kind,
            self.catalog.common_response.clone(),
            UPSTREAM_STATUS_CLASS,
        );
        classification.upstream_content = extracted.content;

        let Some(code) = extracted.code else {
            return classification;
        };

        match self.catalog.lookup(provider, &code) {
            Some(message) => {
                classification.user_message = message.to_string();
                classification.status_class = self.catalog.status_for(provider, &code);
                classification.observation = CodeObservation::Known;
            }
            None => {
                tracing::warn!(
                    phase = "classify",
                    event = "newly_observed_code",
                    provider = %provider,
                    upstream_code = %code,
                    content = classification.upstream_content.as_deref(),
                    error = %error
                );
                classification.observation = CodeObservation::NewlyObserved;
            }
        }

        classification.upstream_code = Some(code);
        classification
    }
}

#[derive(Debug, Default)]
struct Extracted {
    content: Option<String>,
    code: Option<String>,
}

/// Pulls `(content, code)` out of an OpenAI-, Anthropic-, or Gemini-shaped
/// error body, falling back to the message when no body was captured.
fn extract_code(error: &GatewayError) -> Result<Extracted, String> {
    let source = error.body.as_deref().unwrap_or(error.message.as_str());
    let value: Value = serde_json::from_str(source.trim())
        .map_err(|err| format!("error payload is not JSON: {err}"))?;

    let body = value
        .get("error")
        .filter(|inner| inner.is_object())
        .unwrap_or(&value);
    let Some(fields) = body.as_object() else {
        return Err("error payload is not an object".to_string());
    };

    let content = fields
        .get("message")
        .and_then(Value::as_str)
        .map(ToString::to_string);
    let code = ["code", "status", "type"]
        .iter()
        .find_map(|key| match fields.get(*key) {
            Some(Value::String(code)) if !code.trim().is_empty() => Some(code.clone()),
            _ => None,
        })
        .or_else(|| {
            fields
                .get("code")
                .and_then(Value::as_i64)
                .map(|code| code.to_string())
        });

    Ok(Extracted { content, code })
}
