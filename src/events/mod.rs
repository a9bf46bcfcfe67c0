use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the costing engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    JobCodeCreated {
        code: String,
    },
    JobCodeUpdated {
        code: String,
    },
    JobCodeRekeyed {
        old_code: String,
        new_code: String,
    },
    CostingEntryCreated {
        entry_id: Uuid,
        job_code: String,
    },
    CostingEntrySubmitted {
        entry_id: Uuid,
        job_code: String,
    },
    CostingEntryApproved {
        entry_id: Uuid,
        job_code: String,
        approver_id: String,
    },
    CostingEntryRejected {
        entry_id: Uuid,
        job_code: String,
        reason: String,
    },
    CostingEntryDeleted {
        entry_id: Uuid,
        job_code: String,
    },
    FinancialsRecomputed {
        job_code: String,
    },
    CrossReferencesRebuilt {
        job_code: String,
        po_links: usize,
        pi_links: usize,
    },
    ExternalEntrySynced {
        external_id: String,
        entry_id: Uuid,
        created: bool,
    },
}

/// Publishes domain events to the background processor. Sending is
/// best-effort: a money-affecting write never fails because the event channel
/// is down, it only logs the loss.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) {
        if let Err(err) = self.sender.send(event).await {
            warn!("dropping domain event, processor unavailable: {err}");
        }
    }
}

/// Drains the event channel, logging each event. Notification fan-out and
/// webhook delivery hang off this task in deployments that need them.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::CostingEntryApproved {
                entry_id,
                job_code,
                approver_id,
            } => {
                info!(%entry_id, %job_code, %approver_id, "costing entry approved");
            }
            Event::CostingEntryRejected {
                entry_id,
                job_code,
                reason,
            } => {
                info!(%entry_id, %job_code, %reason, "costing entry rejected");
            }
            Event::JobCodeRekeyed { old_code, new_code } => {
                info!(%old_code, %new_code, "job code re-keyed");
            }
            other => info!(event = ?other, "domain event"),
        }
    }
    info!("event channel closed, processor exiting");
}
