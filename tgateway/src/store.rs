//! Collaborator contracts consumed by the side-effect coordinator, with
//! in-memory implementations.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tcommon::{BoxFuture, CollectionId, ThreadId};
use tprovider::{Message, Role, TokenUsage};

use crate::GatewayError;

pub type GatewayFuture<'a, T> = BoxFuture<'a, T>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub message: Message,
    /// The answer was cut short by cancellation or disconnect.
    #[serde(default)]
    pub truncated: bool,
    /// Error code of the failure this entry records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(default)]
    pub regenerated: bool,
}

impl TranscriptEntry {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            truncated: false,
            failure: None,
            regenerated: false,
        }
    }

    pub fn failure(error_code: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            failure: Some(error_code.into()),
            ..Self::new(Message::new(Role::Assistant, user_message))
        }
    }

    pub fn truncated(mut self) -> Self {
        self.truncated = true;
        self
    }

    pub fn regenerated(mut self) -> Self {
        self.regenerated = true;
        self
    }

    /// An assistant answer, as opposed to a user turn, tool traffic, or a failure.
    pub fn is_final_answer(&self) -> bool {
        self.message.role == Role::Assistant
            && self.message.tool_calls.is_empty()
            && self.failure.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum BillingMode {
    Free,
    Paid { credit_cost: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageRecord {
    pub usage: TokenUsage,
    pub model_calls: u32,
    pub tool_calls: u32,
    pub failed: bool,
    pub truncated: bool,
}

pub trait TranscriptStore: Send + Sync {
    fn append<'a>(
        &'a self,
        thread_id: &'a ThreadId,
        entries: Vec<TranscriptEntry>,
    ) -> GatewayFuture<'a, Result<(), GatewayError>>;

    fn entries<'a>(
        &'a self,
        thread_id: &'a ThreadId,
    ) -> GatewayFuture<'a, Result<Vec<TranscriptEntry>, GatewayError>>;
}

pub trait UsageLedger: Send + Sync {
    fn record_usage<'a>(
        &'a self,
        thread_id: &'a ThreadId,
        record: UsageRecord,
    ) -> GatewayFuture<'a, Result<(), GatewayError>>;

    fn debit_credits<'a>(
        &'a self,
        account_id: &'a str,
        credits: u32,
    ) -> GatewayFuture<'a, Result<(), GatewayError>>;

    fn increment_free_usage<'a>(
        &'a self,
        account_id: &'a str,
    ) -> GatewayFuture<'a, Result<(), GatewayError>>;
}

/// Running history a thread's prompt is rebuilt from.
pub trait MemoryBuffer: Send + Sync {
    fn recall<'a>(
        &'a self,
        collection_id: &'a CollectionId,
    ) -> GatewayFuture<'a, Result<Vec<Message>, GatewayError>>;

    fn retain<'a>(
        &'a self,
        collection_id: &'a CollectionId,
        messages: Vec<Message>,
    ) -> GatewayFuture<'a, Result<(), GatewayError>>;
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>, GatewayError> {
    mutex
        .lock()
        .map_err(|_| GatewayError::storage(format!("{name} lock poisoned")))
}

#[derive(Debug, Default)]
pub struct InMemoryTranscriptStore {
    threads: Mutex<HashMap<ThreadId, Vec<TranscriptEntry>>>,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TranscriptStore for InMemoryTranscriptStore {
    fn append<'a>(
        &'a self,
        thread_id: &'a ThreadId,
        entries: Vec<TranscriptEntry>,
    ) -> GatewayFuture<'a, Result<(), GatewayError>> {
        Box::pin(async move {
            lock(&self.threads, "transcript store")?
                .entry(thread_id.clone())
                .or_default()
                .extend(entries);
            Ok(())
        })
    }

    fn entries<'a>(
        &'a self,
        thread_id: &'a ThreadId,
    ) -> GatewayFuture<'a, Result<Vec<TranscriptEntry>, GatewayError>> {
        Box::pin(async move {
            Ok(lock(&self.threads, "transcript store")?
                .get(thread_id)
                .cloned()
                .unwrap_or_default())
        })
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    records: HashMap<ThreadId, Vec<UsageRecord>>,
    credits_debited: HashMap<String, u64>,
    free_usage: HashMap<String, u32>,
}

#[derive(Debug, Default)]
pub struct InMemoryUsageLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryUsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self, thread_id: &ThreadId) -> Vec<UsageRecord> {
        lock(&self.state, "usage ledger")
            .map(|state| state.records.get(thread_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn credits_debited(&self, account_id: &str) -> u64 {
        lock(&self.state, "usage ledger")
            .map(|state| state.credits_debited.get(account_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn free_usage(&self, account_id: &str) -> u32 {
        lock(&self.state, "usage ledger")
            .map(|state| state.free_usage.get(account_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl UsageLedger for InMemoryUsageLedger {
    fn record_usage<'a>(
        &'a self,
        thread_id: &'a ThreadId,
        record: UsageRecord,
    ) -> GatewayFuture<'a, Result<(), GatewayError>> {
        Box::pin(async move {
            lock(&self.state, "usage ledger")?
                .records
                .entry(thread_id.clone())
                .or_default()
                .push(record);
            Ok(())
        })
    }

    fn debit_credits<'a>(
        &'a self,
        account_id: &'a str,
        credits: u32,
    ) -> GatewayFuture<'a, Result<(), GatewayError>> {
        Box::pin(async move {
            let mut state = lock(&self.state, "usage ledger")?;
            let debited = state
                .credits_debited
                .entry(account_id.to_string())
                .or_default();
            *debited = debited.saturating_add(u64::from(credits));
            Ok(())
        })
    }

    fn increment_free_usage<'a>(
        &'a self,
        account_id: &'a str,
    ) -> GatewayFuture<'a, Result<(), GatewayError>> {
        Box::pin(async move {
            let mut state = lock(&self.state, "usage ledger")?;
            let used = state.free_usage.entry(account_id.to_string()).or_default();
            *used = used.saturating_add(1);
            Ok(())
        })
    }
}

/// Keeps the most recent `window` messages per history collection.
#[derive(Debug)]
pub struct WindowMemoryBuffer {
    window: usize,
    collections: Mutex<HashMap<CollectionId, Vec<Message>>>,
}

impl WindowMemoryBuffer {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            collections: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl MemoryBuffer for WindowMemoryBuffer {
    fn recall<'a>(
        &'a self,
        collection_id: &'a CollectionId,
    ) -> GatewayFuture<'a, Result<Vec<Message>, GatewayError>> {
        Box::pin(async move {
            Ok(lock(&self.collections, "memory buffer")?
                .get(collection_id)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn retain<'a>(
        &'a self,
        collection_id: &'a CollectionId,
        messages: Vec<Message>,
    ) -> GatewayFuture<'a, Result<(), GatewayError>> {
        Box::pin(async move {
            let mut collections = lock(&self.collections, "memory buffer")?;
            let history = collections.entry(collection_id.clone()).or_default();
            history.extend(messages);

            let overflow = history.len().saturating_sub(self.window);
            history.drain(..overflow);
            Ok(())
        })
    }
}
