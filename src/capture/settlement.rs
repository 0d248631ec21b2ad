//! Single-shot settlement shared by every branch of a capture race

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// First caller of [`Settlement::settle`] decides the race; every later
/// outcome is dropped on the floor.
pub(crate) struct Settlement<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Settlement<T> {
    pub(crate) fn channel() -> (Arc<Self>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let settlement = Self {
            sender: Mutex::new(Some(tx)),
        };
        (Arc::new(settlement), rx)
    }

    /// Deliver `outcome`; returns false when the race was already decided
    pub(crate) fn settle(&self, outcome: T) -> bool {
        let sender = self.sender.lock().take();
        match sender {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Refuse every future outcome
    pub(crate) fn close(&self) {
        self.sender.lock().take();
    }
}
