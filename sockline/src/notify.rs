use std::task::Waker;

use crate::error::{Error, Result};

/// Identifies one reader of a plaintext stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderId(pub(crate) u64);

/// Single-slot wake-up for a parked plaintext reader.
///
/// At most one reader may be parked at a time. The slot is cleared before
/// the waker fires, so a wake never runs twice for one registration.
#[derive(Default)]
pub struct Notifier {
    slot: Option<(ReaderId, Waker)>,
}

impl Notifier {
    pub fn new() -> Self {
        Self { slot: None }
    }

    /// Park `reader` until the next [`notify`](Self::notify).
    ///
    /// Re-registering the same reader replaces its waker. Another reader
    /// registering while the slot is taken gets [`Error::ConcurrentRead`].
    pub fn register(&mut self, reader: ReaderId, waker: &Waker) -> Result<()> {
        match &mut self.slot {
            Some((owner, _)) if *owner != reader => Err(Error::ConcurrentRead),
            Some((_, parked)) => {
                if !parked.will_wake(waker) {
                    *parked = waker.clone();
                }
                Ok(())
            }
            None => {
                self.slot = Some((reader, waker.clone()));
                Ok(())
            }
        }
    }

    /// Drop `reader`'s registration if it holds the slot.
    pub fn cancel(&mut self, reader: ReaderId) {
        if matches!(&self.slot, Some((owner, _)) if *owner == reader) {
            self.slot = None;
        }
    }

    /// Wake the parked reader, if any.
    pub fn notify(&mut self) {
        if let Some((_, waker)) = self.slot.take() {
            waker.wake();
        }
    }

    /// Whether a reader is parked.
    pub fn is_pending(&self) -> bool {
        self.slot.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker;

    #[test]
    fn notify_clears_slot() {
        let mut n = Notifier::new();
        let waker = noop_waker();
        n.register(ReaderId(1), &waker).unwrap();
        assert!(n.is_pending());
        n.notify();
        assert!(!n.is_pending());
        // Nothing parked: no-op.
        n.notify();
    }

    #[test]
    fn second_reader_is_rejected() {
        let mut n = Notifier::new();
        let waker = noop_waker();
        n.register(ReaderId(1), &waker).unwrap();
        n.register(ReaderId(1), &waker).unwrap();
        assert!(matches!(
            n.register(ReaderId(2), &waker),
            Err(Error::ConcurrentRead)
        ));
        n.cancel(ReaderId(2));
        assert!(n.is_pending());
        n.cancel(ReaderId(1));
        n.register(ReaderId(2), &waker).unwrap();
    }
}
