//! Process lifecycle event dispatch.
//!
//! The tracker publishes start/exit transitions through an in-process event
//! bus with any number of subscribers. Events serialize to JSONL for CLI
//! consumers that stream them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{mpsc, Mutex};

use pf_common::ProcessIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessEventKind {
    ProcessStarted,
    ProcessExited,
}

/// One observed transition. Steady-state polls emit nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessEvent {
    pub kind: ProcessEventKind,
    pub timestamp: DateTime<Utc>,
    pub identity: ProcessIdentity,
}

impl ProcessEvent {
    pub fn started(identity: ProcessIdentity) -> Self {
        ProcessEvent {
            kind: ProcessEventKind::ProcessStarted,
            timestamp: Utc::now(),
            identity,
        }
    }

    pub fn exited(identity: ProcessIdentity) -> Self {
        ProcessEvent {
            kind: ProcessEventKind::ProcessExited,
            timestamp: Utc::now(),
            identity,
        }
    }

    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"error":"serialization_failed","kind":"{:?}"}}"#, self.kind)
        })
    }
}

/// Broadcast event bus supporting multiple subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    senders: Mutex<Vec<mpsc::Sender<ProcessEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to receive lifecycle events.
    pub fn subscribe(&self) -> mpsc::Receiver<ProcessEvent> {
        let (tx, rx) = mpsc::channel();
        let mut senders = self.senders.lock().unwrap();
        senders.push(tx);
        rx
    }

    /// Emit an event to all subscribers, dropping any that disconnected.
    pub fn emit(&self, event: ProcessEvent) {
        let mut senders = self.senders.lock().unwrap();
        senders.retain(|sender| sender.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.lock().unwrap().len()
    }
}
