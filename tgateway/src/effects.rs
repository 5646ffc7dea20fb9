//! Side-effect coordinator: persists a finished turn's transcript, usage,
//! memory, and billing exactly once, in that order.
//!
//! Work is spawned onto its own task so a consumer disconnect or a stop
//! signal cannot abort it. Collaborator failures are logged and reported,
//! never raised.

use std::sync::Arc;

use tcommon::{CollectionId, ThreadId};
use tokio::task::JoinHandle;
use tprovider::Message;

use crate::{
    BillingMode, GatewayError, GatewayHooks, MemoryBuffer, TranscriptEntry, TranscriptStore,
    TurnPhase, UsageLedger, UsageRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectStep {
    Transcript,
    Usage,
    Memory,
    Billing,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EffectStatus {
    #[default]
    Skipped,
    Done,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EffectsReport {
    pub transcript: EffectStatus,
    pub usage: EffectStatus,
    pub memory: EffectStatus,
    pub billing: EffectStatus,
}

impl EffectsReport {
    pub fn status(&self, step: EffectStep) -> &EffectStatus {
        match step {
            EffectStep::Transcript => &self.transcript,
            EffectStep::Usage => &self.usage,
            EffectStep::Memory => &self.memory,
            EffectStep::Billing => &self.billing,
        }
    }

    pub fn is_clean(&self) -> bool {
        [
            EffectStep::Transcript,
            EffectStep::Usage,
            EffectStep::Memory,
            EffectStep::Billing,
        ]
        .iter()
        .all(|step| !matches!(self.status(*step), EffectStatus::Failed(_)))
    }

    /// Report for a coordinator task that never finished.
    pub(crate) fn aborted(message: impl Into<String>) -> Self {
        let status = EffectStatus::Failed(message.into());
        Self {
            transcript: status.clone(),
            usage: status.clone(),
            memory: status.clone(),
            billing: status,
        }
    }

    fn set(&mut self, step: EffectStep, status: EffectStatus) {
        match step {
            EffectStep::Transcript => self.transcript = status,
            EffectStep::Usage => self.usage = status,
            EffectStep::Memory => self.memory = status,
            EffectStep::Billing => self.billing = status,
        }
    }
}

/// Everything a finished turn needs written.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectsPlan {
    pub thread_id: ThreadId,
    pub collection_id: CollectionId,
    pub account_id: String,
    pub entries: Vec<TranscriptEntry>,
    /// Messages appended to the running memory buffer.
    pub memory: Vec<Message>,
    pub usage: UsageRecord,
    /// `None` when the turn is not billed.
    pub billing: Option<BillingMode>,
}

#[derive(Clone)]
pub struct SideEffectCoordinator {
    transcript: Arc<dyn TranscriptStore>,
    ledger: Arc<dyn UsageLedger>,
    memory: Arc<dyn MemoryBuffer>,
    hooks: Arc<dyn GatewayHooks>,
}

impl SideEffectCoordinator {
    pub fn new(
        transcript: Arc<dyn TranscriptStore>,
        ledger: Arc<dyn UsageLedger>,
        memory: Arc<dyn MemoryBuffer>,
        hooks: Arc<dyn GatewayHooks>,
    ) -> Self {
        Self {
            transcript,
            ledger,
            memory,
            hooks,
        }
    }

    /// Runs the plan on a separate task. Requires a tokio runtime.
    pub fn spawn(&self, plan: EffectsPlan) -> JoinHandle<EffectsReport> {
        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.run(plan).await })
    }

    pub async fn run(&self, plan: EffectsPlan) -> EffectsReport {
        let EffectsPlan {
            thread_id,
            collection_id,
            account_id,
            entries,
            memory,
            usage,
            billing,
        } = plan;
        let mut report = EffectsReport::default();

        if !entries.is_empty() {
            let outcome = self.transcript.append(&thread_id, entries).await;
            self.settle(&mut report, &thread_id, EffectStep::Transcript, outcome);
        }

        let outcome = self.ledger.record_usage(&thread_id, usage).await;
        self.settle(&mut report, &thread_id, EffectStep::Usage, outcome);

        if !memory.is_empty() {
            let outcome = self.memory.retain(&collection_id, memory).await;
            self.settle(&mut report, &thread_id, EffectStep::Memory, outcome);
        }

        if let Some(billing) = billing {
            let outcome = match billing {
                BillingMode::Paid { credit_cost } => {
                    self.ledger.debit_credits(&account_id, credit_cost).await
                }
                BillingMode::Free => self.ledger.increment_free_usage(&account_id).await,
            };
            self.settle(&mut report, &thread_id, EffectStep::Billing, outcome);
        }

        report
    }

    fn settle(
        &self,
        report: &mut EffectsReport,
        thread_id: &ThreadId,
        step: EffectStep,
        outcome: Result<(), GatewayError>,
    ) {
        let status = match outcome {
            Ok(()) => EffectStatus::Done,
            Err(error) => {
                let error = error.in_phase(TurnPhase::Effects);
                tracing::error!(
                    phase = "effects",
                    event = "step_failed",
                    thread_id = %thread_id,
                    step = ?step,
                    error = %error
                );
                self.hooks.on_effects_failure(thread_id, step, &error);
                EffectStatus::Failed(error.message)
            }
        };

        report.set(step, status);
    }
}
