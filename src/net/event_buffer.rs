//! Lock-free event buffer between the transport and the frame loop
//!
//! Uses crossbeam-channel so a transport thread can push events while the
//! frame loop drains everything pending once per frame. Producers that must
//! not lose events block on a full buffer instead of dropping.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::net::protocol::ViewEvent;

/// Bounded MPSC buffer of view events
pub struct EventBuffer {
    sender: Sender<ViewEvent>,
    receiver: Receiver<ViewEvent>,
    capacity: usize,
}

impl EventBuffer {
    /// Create a new buffer holding at most `capacity` undrained events
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Create a sender handle for a producer
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    /// Drain all pending events in arrival order
    pub fn drain(&self) -> Vec<ViewEvent> {
        self.receiver.try_iter().collect()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(4096)
    }
}

/// Clonable sender handle for producers
#[derive(Clone)]
pub struct EventSender {
    sender: Sender<ViewEvent>,
}

impl EventSender {
    /// Push an event (non-blocking)
    #[inline]
    pub fn try_send(&self, event: ViewEvent) -> Result<(), EventBufferError> {
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => EventBufferError::Full,
            TrySendError::Disconnected(_) => EventBufferError::Disconnected,
        })
    }

    /// Push an event, waiting for room when the buffer is full.
    ///
    /// Returns true if the call had to wait.
    pub fn send(&self, event: ViewEvent) -> Result<bool, EventBufferError> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(false),
            Err(TrySendError::Full(event)) => self
                .sender
                .send(event)
                .map(|()| true)
                .map_err(|_| EventBufferError::Disconnected),
            Err(TrySendError::Disconnected(_)) => Err(EventBufferError::Disconnected),
        }
    }
}

/// Event buffer errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EventBufferError {
    /// Buffer is full (backpressure)
    #[error("event buffer is full")]
    Full,
    /// Frame loop stopped and dropped the receiver
    #[error("event buffer disconnected")]
    Disconnected,
}
