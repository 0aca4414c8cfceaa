//! Load transition events for UI consumption
//!
//! The loader pushes one event per state transition into a lock-free queue.
//! A UI drains it on its own schedule instead of registering callbacks.

use std::path::PathBuf;

use crate::error::LoadError;

use super::LoadState;

/// Default number of undelivered events kept before new ones are dropped
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// A loader state transition
#[derive(Debug, Clone, PartialEq)]
pub enum LoadEvent {
    /// An attempt started; the audio path is silent until it ends
    Started { source: PathBuf },
    /// The attempt succeeded and the new BRIR is current
    Loaded { source: PathBuf },
    /// The attempt failed; the previous BRIR stays current
    Failed { source: PathBuf, error: LoadError },
    /// The queue is empty and the worker stopped
    Idle,
}

impl LoadEvent {
    /// State the loader entered with this event
    pub fn state(&self) -> LoadState {
        match self {
            LoadEvent::Started { .. } => LoadState::Loading,
            LoadEvent::Loaded { .. } => LoadState::Loaded,
            LoadEvent::Failed { .. } => LoadState::Failed,
            LoadEvent::Idle => LoadState::Idle,
        }
    }
}

/// Create the event queue (producer for the loader, consumer for the UI)
pub(crate) fn event_channel(capacity: usize) -> (rtrb::Producer<LoadEvent>, LoadEvents) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity.max(1));
    (producer, LoadEvents { consumer })
}

/// Receiving end of the loader's event queue
pub struct LoadEvents {
    consumer: rtrb::Consumer<LoadEvent>,
}

impl LoadEvents {
    /// Pop the oldest undelivered event (non-blocking)
    pub fn try_recv(&mut self) -> Option<LoadEvent> {
        self.consumer.pop().ok()
    }

    /// Pop every undelivered event
    pub fn drain(&mut self) -> Vec<LoadEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
