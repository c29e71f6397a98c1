use super::Utterance;
use crate::lock_or_recover;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Outcome of waiting on the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotWait {
    Delivered(Utterance),
    /// Nothing yet; the slot is still open.
    Pending,
    /// Closed without an utterance.
    Closed,
}

/// Single-use handoff carrying at most one utterance from the recognizer's
/// context to the coordinator.
///
/// The first `offer` consumes the only sender, so the channel closes behind
/// it; every later offer is counted and dropped.
#[derive(Debug)]
pub struct UtteranceSlot {
    sender: Mutex<Option<Sender<Utterance>>>,
    receiver: Receiver<Utterance>,
    discarded: AtomicUsize,
}

impl Default for UtteranceSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceSlot {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(1);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
            discarded: AtomicUsize::new(0),
        }
    }

    /// Returns false when the slot already took an utterance or was closed.
    pub fn offer(&self, utterance: Utterance) -> bool {
        let sender = lock_or_recover(&self.sender, "UtteranceSlot::offer").take();
        match sender {
            Some(sender) => sender.try_send(utterance).is_ok(),
            None => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Refuse further offers. An utterance already delivered stays readable.
    pub fn close(&self) {
        lock_or_recover(&self.sender, "UtteranceSlot::close").take();
    }

    pub fn wait(&self, timeout: Duration) -> SlotWait {
        match self.receiver.recv_timeout(timeout) {
            Ok(utterance) => SlotWait::Delivered(utterance),
            Err(RecvTimeoutError::Timeout) => SlotWait::Pending,
            Err(RecvTimeoutError::Disconnected) => SlotWait::Closed,
        }
    }

    /// Offers rejected after the first.
    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::Relaxed)
    }
}
