//! Single-slot delegate registration.
//!
//! A manager holds only the sending half of its delegate's channel, so the
//! delegate's lifetime is entirely the receiver's business. Dropping the
//! receiver is the same as unregistering.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex, MutexGuard,
};

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DelegateId(u64);

struct Slot<E> {
    id: DelegateId,
    sender: mpsc::UnboundedSender<E>,
}

pub struct DelegateRegistry<E> {
    slot: Mutex<Option<Slot<E>>>,
    next_id: AtomicU64,
}

impl<E> Default for DelegateRegistry<E> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<E> DelegateRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Slot<E>>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Registers a new delegate, replacing any previous one.
    pub fn register(&self) -> (DelegateId, mpsc::UnboundedReceiver<E>) {
        let id = DelegateId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.lock() = Some(Slot { id, sender });
        (id, receiver)
    }

    /// Removes the delegate if `id` is still the registered one.
    pub fn unregister(&self, id: DelegateId) -> bool {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|current| current.id == id) {
            *slot = None;
            true
        } else {
            false
        }
    }

    pub fn is_registered(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|current| !current.sender.is_closed())
    }

    /// Delivers `event` to the current delegate. Returns false when nobody
    /// is listening; a delegate whose receiver was dropped is cleared.
    pub fn notify(&self, event: E) -> bool {
        let mut slot = self.lock();
        let Some(current) = slot.as_ref() else {
            return false;
        };
        if current.sender.send(event).is_ok() {
            return true;
        }
        *slot = None;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_replaces_previous_delegate() {
        let registry = DelegateRegistry::new();
        let (first_id, mut first) = registry.register();
        let (_, mut second) = registry.register();

        assert!(registry.notify(7));
        assert_eq!(second.try_recv().unwrap(), 7);
        assert!(first.try_recv().is_err());

        // The stale id no longer unregisters anything.
        assert!(!registry.unregister(first_id));
        assert!(registry.is_registered());
    }

    #[test]
    fn dropped_receiver_counts_as_unregistered() {
        let registry = DelegateRegistry::new();
        let (_, receiver) = registry.register();
        drop(receiver);

        assert!(!registry.is_registered());
        assert!(!registry.notify("lost"));
    }

    #[test]
    fn unregister_by_id() {
        let registry = DelegateRegistry::<u8>::new();
        let (id, _receiver) = registry.register();
        assert!(registry.unregister(id));
        assert!(!registry.notify(1));
    }
}
