//! Last-value-replay publish/subscribe cells.
//!
//! Every live stream in the feed is a [`LiveValue`]. A new [`Subscription`]
//! receives the most recent value immediately, followed by every value
//! published after it subscribed. Dropping a subscription detaches only that
//! subscriber; once every `LiveValue` handle is gone, subscribers observe a
//! disconnect.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

pub struct LiveValue<T> {
    shared: Arc<Mutex<Inner<T>>>,
}

struct Inner<T> {
    latest: Option<T>,
    subscribers: Vec<(u64, Sender<T>)>,
    next_id: u64,
}

impl<T> Clone for LiveValue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> LiveValue<T> {
    pub fn new(initial: T) -> Self {
        Self::with_latest(Some(initial))
    }

    /// A cell with no value yet; subscribers wait for the first publication.
    pub fn empty() -> Self {
        Self::with_latest(None)
    }

    fn with_latest(latest: Option<T>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Inner {
                latest,
                subscribers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    pub fn publish(&self, value: T) {
        let mut inner = self.shared.lock();
        inner.deliver(value);
    }

    /// Publishes only when `value` differs from the latest one.
    pub fn publish_if_changed(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        let mut inner = self.shared.lock();
        if inner.latest.as_ref() == Some(&value) {
            return false;
        }
        inner.deliver(value);
        true
    }

    /// Applies `f` to a copy of the latest value and publishes the result if it
    /// changed. No-op on an empty cell.
    pub fn modify<F>(&self, f: F) -> bool
    where
        T: PartialEq,
        F: FnOnce(&mut T),
    {
        let mut inner = self.shared.lock();
        let Some(current) = inner.latest.as_ref() else {
            return false;
        };
        let mut next = current.clone();
        f(&mut next);
        if &next == current {
            return false;
        }
        inner.deliver(next);
        true
    }

    pub fn latest(&self) -> Option<T> {
        self.shared.lock().latest.clone()
    }

    /// Forgets the latest value so new subscribers get no replay. Existing
    /// subscribers are unaffected.
    pub fn clear(&self) {
        self.shared.lock().latest = None;
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut inner = self.shared.lock();
        if let Some(latest) = &inner.latest {
            // The receiver is held locally, so this cannot fail.
            let _ = tx.send(latest.clone());
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, tx));
        Subscription {
            id,
            rx,
            source: Arc::downgrade(&self.shared),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().subscribers.len()
    }
}

impl<T: Clone> Inner<T> {
    fn deliver(&mut self, value: T) {
        self.subscribers
            .retain(|(_, tx)| tx.send(value.clone()).is_ok());
        self.latest = Some(value);
    }
}

pub struct Subscription<T> {
    id: u64,
    rx: Receiver<T>,
    source: Weak<Mutex<Inner<T>>>,
}

impl<T> Subscription<T> {
    /// Blocks for the next value. `None` once the source is gone.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Some(value),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Drains everything queued and returns only the newest value.
    pub fn try_latest(&self) -> Option<T> {
        self.rx.try_iter().last()
    }

    /// Waits until a value satisfying `predicate` arrives or `timeout` elapses.
    pub fn wait_until<P>(&self, timeout: Duration, mut predicate: P) -> Option<T>
    where
        P: FnMut(&T) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let value = self.recv_timeout(remaining)?;
            if predicate(&value) {
                return Some(value);
            }
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<T> {
        &self.rx
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.source.upgrade() {
            let id = self.id;
            shared.lock().subscribers.retain(|(sub_id, _)| *sub_id != id);
        }
    }
}
