//! Per-run buffer of output and error events.

use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::types::{IoEvent, IoEventType};

#[derive(Debug, Default)]
pub struct IoEventLog {
    events: Mutex<Vec<IoEvent>>,
}

impl IoEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn events(&self) -> MutexGuard<'_, Vec<IoEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_line(&self, text: impl Into<String>, event_type: IoEventType) {
        self.events().push(IoEvent {
            text: text.into(),
            event_type,
            time: Utc::now(),
        });
    }

    /// Copy of the buffered events in insertion order.
    pub fn io_events(&self) -> Vec<IoEvent> {
        self.events().clone()
    }

    pub fn clear_events(&self) {
        self.events().clear();
    }

    /// Snapshot and clear in one step, so nothing can be appended in between.
    pub fn take_events(&self) -> Vec<IoEvent> {
        std::mem::take(&mut *self.events())
    }

    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }
}
