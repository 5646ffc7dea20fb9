//! Per-turn conversation context, owned by exactly one in-flight turn.

use tcommon::{CollectionId, ThreadId};
use tprovider::{Message, Role, TokenUsage, ToolCall};

use crate::{BillingMode, EffectsPlan, Session, TranscriptEntry, TurnInput, UsageRecord};

#[derive(Debug)]
pub struct ConversationContext {
    pub thread_id: ThreadId,
    pub collection_id: CollectionId,
    pub account_id: String,
    /// Model input, in order: system instructions, history, this turn.
    pub messages: Vec<Message>,
    /// Entries this turn adds to the transcript store.
    pub entries: Vec<TranscriptEntry>,
    pub billing: BillingMode,
    pub regenerate: bool,
    pub usage: TokenUsage,
    pub model_calls: u32,
    pub tool_calls: u32,
    pub hops: u32,
    user_message: Option<Message>,
}

impl ConversationContext {
    /// Assembles the model input for a new turn.
    ///
    /// System instructions go first, once per turn. When regenerating, trailing
    /// assistant messages are dropped and the last user message is reused.
    pub fn open(session: &Session, input: &TurnInput, history: Vec<Message>) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 3);
        for instruction in [&session.persona, &session.safety_policy]
            .into_iter()
            .flatten()
        {
            if !instruction.trim().is_empty() {
                messages.push(Message::new(Role::System, instruction.clone()));
            }
        }

        let mut history = history;
        history.retain(|message| message.role != Role::System);
        if input.regenerate {
            while history
                .last()
                .is_some_and(|message| message.role == Role::Assistant)
            {
                history.pop();
            }
        }
        messages.extend(history);

        let mut entries = Vec::new();
        let reuses_last_user = input.regenerate
            && messages
                .last()
                .is_some_and(|message| message.role == Role::User);

        let user_message = if reuses_last_user {
            None
        } else {
            let message = Message::new(Role::User, input.user_text.clone())
                .with_attachments(input.image_refs.clone());
            messages.push(message.clone());
            if !input.regenerate {
                entries.push(TranscriptEntry::new(message.clone()));
            }
            Some(message)
        };

        Self {
            thread_id: input.thread_id.clone(),
            collection_id: input.history_collection_id.clone(),
            account_id: session.account_id.clone(),
            messages,
            entries,
            billing: session.billing,
            regenerate: input.regenerate,
            usage: TokenUsage::default(),
            model_calls: 0,
            tool_calls: 0,
            hops: 0,
            user_message,
        }
    }

    pub fn record_tool_calls(&mut self, content: String, calls: Vec<ToolCall>) {
        let message = Message::assistant_tool_calls(content, calls);
        self.entries.push(TranscriptEntry::new(message.clone()));
        self.messages.push(message);
    }

    pub fn record_tool_result(&mut self, tool_call_id: &str, content: String) {
        let message = Message::tool_result(tool_call_id, content);
        self.entries.push(TranscriptEntry::new(message.clone()));
        self.messages.push(message);
        self.tool_calls = self.tool_calls.saturating_add(1);
    }

    fn answer_entry(&self, answer: &str) -> TranscriptEntry {
        let entry = TranscriptEntry::new(Message::new(Role::Assistant, answer));
        if self.regenerate {
            entry.regenerated()
        } else {
            entry
        }
    }

    fn usage_record(&self, failed: bool, truncated: bool) -> UsageRecord {
        UsageRecord {
            usage: self.usage,
            model_calls: self.model_calls,
            tool_calls: self.tool_calls,
            failed,
            truncated,
        }
    }

    fn memory(&self, answer: Option<&str>) -> Vec<Message> {
        let mut memory: Vec<Message> = self.user_message.iter().cloned().collect();
        if let Some(answer) = answer {
            memory.push(Message::new(Role::Assistant, answer));
        }
        memory
    }

    fn plan(self, entries: Vec<TranscriptEntry>, memory: Vec<Message>, usage: UsageRecord, billed: bool) -> EffectsPlan {
        EffectsPlan {
            thread_id: self.thread_id,
            collection_id: self.collection_id,
            account_id: self.account_id,
            entries,
            memory,
            usage,
            billing: billed.then_some(self.billing),
        }
    }

    /// Consumes the context into the writes for a completed turn.
    pub fn into_completed(mut self, answer: &str) -> EffectsPlan {
        let entry = self.answer_entry(answer);
        let mut entries = std::mem::take(&mut self.entries);
        entries.push(entry);
        let memory = self.memory(Some(answer));
        let usage = self.usage_record(false, false);
        self.plan(entries, memory, usage, true)
    }

    /// Consumes the context into the writes for a cancelled turn; `delivered`
    /// is persisted as a truncated answer.
    pub fn into_cancelled(mut self, delivered: &str) -> EffectsPlan {
        let entry = self.answer_entry(delivered).truncated();
        let mut entries = std::mem::take(&mut self.entries);
        entries.push(entry);
        let memory = self.memory(Some(delivered));
        let usage = self.usage_record(false, true);
        self.plan(entries, memory, usage, true)
    }

    /// Consumes the context into the writes for a failed turn. Failed turns
    /// are not billed and do not enter the memory buffer.
    pub fn into_failed(mut self, error_code: &str, user_message: &str) -> EffectsPlan {
        let mut entries = std::mem::take(&mut self.entries);
        entries.push(TranscriptEntry::failure(error_code, user_message));
        let usage = self.usage_record(true, false);
        self.plan(entries, Vec::new(), usage, false)
    }
}
