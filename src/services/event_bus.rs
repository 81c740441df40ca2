//! In-process publish/subscribe channel for settings events
//!
//! Fire-and-forget: publishing never blocks and never fails. Listeners that
//! have gone away are pruned on the next publish of their event kind.

use flume::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::types::events::{EventKind, SettingsEvent};

#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<HashMap<EventKind, Vec<Sender<SettingsEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one event kind
    pub fn subscribe(&self, kind: EventKind) -> Receiver<SettingsEvent> {
        self.subscribe_many(&[kind])
    }

    /// Subscribe one receiver to several event kinds
    pub fn subscribe_many(&self, kinds: &[EventKind]) -> Receiver<SettingsEvent> {
        let (tx, rx) = flume::unbounded();
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        for kind in kinds {
            listeners.entry(*kind).or_default().push(tx.clone());
        }
        rx
    }

    /// Deliver an event to every live listener of its kind
    pub fn publish(&self, event: SettingsEvent) {
        let kind = event.kind();
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());

        let Some(senders) = listeners.get_mut(&kind) else {
            debug!("No listeners for {:?}", kind);
            return;
        };

        senders.retain(|tx| tx.send(event.clone()).is_ok());
        debug!("Published {:?} to {} listener(s)", kind, senders.len());
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.get(&kind).map(|v| v.len()).unwrap_or(0)
    }
}
