//! Session, turn input, and turn report types.

use std::time::Duration;

use serde_json::Value;
use tcommon::{CollectionId, ThreadId};
use tprovider::{ProviderId, TokenUsage};
use ttools::ToolArguments;

use crate::{BillingMode, CancelReason, Classification, EffectsReport};

/// Long-lived per-user settings a turn runs under.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Billing account debited or counted for free usage.
    pub account_id: String,
    pub provider: ProviderId,
    pub model: String,
    pub persona: Option<String>,
    pub safety_policy: Option<String>,
    pub billing: BillingMode,
    /// Key id resolved through the credential store before each model call.
    pub credential_key: Option<String>,
    /// Side-channel values offered to tools that declare them.
    pub tool_context: ToolArguments,
}

impl Session {
    pub fn new(account_id: impl Into<String>, provider: ProviderId, model: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            provider,
            model: model.into(),
            persona: None,
            safety_policy: None,
            billing: BillingMode::Free,
            credential_key: None,
            tool_context: ToolArguments::new(),
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn with_safety_policy(mut self, safety_policy: impl Into<String>) -> Self {
        self.safety_policy = Some(safety_policy.into());
        self
    }

    pub fn with_billing(mut self, billing: BillingMode) -> Self {
        self.billing = billing;
        self
    }

    pub fn with_credential_key(mut self, key_id: impl Into<String>) -> Self {
        self.credential_key = Some(key_id.into());
        self
    }

    pub fn with_tool_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tool_context.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnInput {
    pub thread_id: ThreadId,
    pub history_collection_id: CollectionId,
    pub user_text: String,
    pub image_refs: Vec<String>,
    /// Overrides the policy's per-chunk delay for this turn.
    pub delay_chunk: Option<Duration>,
    /// Re-answer the last user message instead of asking a new one.
    pub regenerate: bool,
}

impl TurnInput {
    pub fn new(
        thread_id: impl Into<ThreadId>,
        history_collection_id: impl Into<CollectionId>,
        user_text: impl Into<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            history_collection_id: history_collection_id.into(),
            user_text: user_text.into(),
            image_refs: Vec::new(),
            delay_chunk: None,
            regenerate: false,
        }
    }

    pub fn with_image_refs(mut self, image_refs: Vec<String>) -> Self {
        self.image_refs = image_refs;
        self
    }

    pub fn with_delay_chunk(mut self, delay: Duration) -> Self {
        self.delay_chunk = Some(delay);
        self
    }

    pub fn regenerate(mut self) -> Self {
        self.regenerate = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnState {
    Chatbot,
    Tools,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed(Classification),
    Cancelled(CancelReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub thread_id: ThreadId,
    pub outcome: TurnOutcome,
    /// The persisted answer; for cancelled turns, exactly the text the
    /// consumer received.
    pub answer: String,
    pub truncated: bool,
    pub usage: TokenUsage,
    pub hops: u32,
    pub effects: EffectsReport,
}

impl TurnReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == TurnOutcome::Completed
    }

    pub fn error_code(&self) -> Option<&str> {
        match &self.outcome {
            TurnOutcome::Failed(classification) => Some(classification.error_code.as_str()),
            _ => None,
        }
    }
}
