//! Bounded outbound packet queue.
//!
//! Single consumer (the send task), any number of producers. `push` never
//! blocks: a full queue means the client cannot keep up and the caller
//! tears the connection down instead of stalling the world tick.

use std::sync::Mutex;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::packet::Packet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The consumer is not draining fast enough.
    Full,
    /// The queue was closed by teardown.
    Closed,
}

pub struct PacketQueue {
    tx: Mutex<Option<Sender<Packet>>>,
    rx: Receiver<Packet>,
}

impl PacketQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    pub fn push(&self, pkt: Packet) -> Result<(), PushError> {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            return Err(PushError::Closed);
        };
        match tx.try_send(pkt) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PushError::Full),
            Err(TrySendError::Disconnected(_)) => Err(PushError::Closed),
        }
    }

    /// Blocks until a packet arrives; `None` once the queue is closed and
    /// drained.
    pub fn pull(&self) -> Option<Packet> {
        self.rx.recv().ok()
    }

    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}
