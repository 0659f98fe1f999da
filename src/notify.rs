//! Change notification between contexts that share a store.
//!
//! Events only name the key that changed. A receiver is expected to throw away
//! whatever it holds for that key and read it again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::storage::{FileStamp, FileStorage, StorageError};

pub type ContextId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
}

/// Fan-out of [`StorageEvent`]s to every subscribed context except the one that
/// caused the change.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    subscribers: Mutex<Vec<(ContextId, Sender<StorageEvent>)>>,
    next_id: AtomicU64,
}

#[derive(Debug)]
pub struct Subscription {
    id: ContextId,
    receiver: Receiver<StorageEvent>,
}

impl Subscription {
    /// The context id to pass as `origin` when this context publishes.
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn try_recv(&self) -> Option<StorageEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<StorageEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// All events received so far.
    pub fn drain(&self) -> Vec<StorageEvent> {
        self.receiver.try_iter().collect()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an id for a context that publishes but does not listen.
    pub fn register(&self) -> ContextId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.register();
        let (sender, receiver) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, sender));
        Subscription { id, receiver }
    }

    /// Notifies all contexts but `origin` that `key` changed and returns how
    /// many were reached. Subscriptions that were dropped are forgotten.
    pub fn publish(&self, origin: ContextId, key: &str) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        subscribers.retain(|(id, sender)| {
            if *id == origin {
                return true;
            }
            let alive = sender.send(StorageEvent { key: key.to_string() }).is_ok();
            delivered += alive as usize;
            alive
        });
        log::debug!("change of {key:?} by context {origin} delivered to {delivered} contexts");
        delivered
    }
}

/// Turns modifications of a [`FileStorage`] key made by other processes into
/// [`StorageEvent`]s by polling the file's modification stamp.
#[derive(Debug)]
pub struct FileWatcher {
    storage: FileStorage,
    key: String,
    interval: Duration,
    last: Option<FileStamp>,
}

impl FileWatcher {
    /// Starts watching from the current state of the file; only later changes
    /// produce events.
    pub fn new(storage: FileStorage, key: impl Into<String>, interval: Duration) -> Result<Self, StorageError> {
        let key = key.into();
        let last = storage.stamp(&key)?;
        Ok(Self {
            storage,
            key,
            interval,
            last,
        })
    }

    /// Checks once and returns an event if the file changed since the last check.
    pub fn poll(&mut self) -> Result<Option<StorageEvent>, StorageError> {
        let current = self.storage.stamp(&self.key)?;
        if current == self.last {
            return Ok(None);
        }
        self.last = current;
        Ok(Some(StorageEvent { key: self.key.clone() }))
    }

    /// Blocks until the file changes.
    pub fn wait(&mut self) -> Result<StorageEvent, StorageError> {
        loop {
            if let Some(event) = self.poll()? {
                return Ok(event);
            }
            thread::sleep(self.interval);
        }
    }
}
