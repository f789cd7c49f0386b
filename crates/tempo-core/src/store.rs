//! The authoritative state store
//!
//! Owns the single writable [`Document`]. Patches are merged one at a time;
//! each one bumps the revision, is persisted when settings or rules changed,
//! and is pushed to every subscription whose mask intersects what changed.
//! The store itself is synchronous; the message-passing layer around it
//! decides how requests reach it.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::engine::Resolver;
use crate::patch::{Changes, Patch};
use crate::storage::{Storage, StorageError};
use crate::types::{Origin, SubscriptionId, ViewKey, ViewMask};
use crate::view::{Delta, View};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Key of the document blob in storage.
    pub storage_key: String,
    /// Write attempts per persist before the store reports failure.
    pub persist_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: "tempo.document".to_string(),
            persist_attempts: 3,
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Error type for the state store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The patch is applied in memory but could not be written to storage.
    #[error("revision {revision} applied but not persisted: {source}")]
    Persist {
        revision: u64,
        #[source]
        source: StorageError,
    },
    #[error("stored document is unreadable: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("document could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

// =============================================================================
// Notification Sinks
// =============================================================================

/// The receiving end of a subscription has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Where the store pushes deltas for one subscription.
pub trait NotificationSink {
    fn deliver(&mut self, subscription: SubscriptionId, delta: Delta) -> Result<(), SinkClosed>;
}

impl NotificationSink for std::sync::mpsc::Sender<(SubscriptionId, Delta)> {
    fn deliver(&mut self, subscription: SubscriptionId, delta: Delta) -> Result<(), SinkClosed> {
        self.send((subscription, delta)).map_err(|_| SinkClosed)
    }
}

struct Subscriber<K> {
    key: ViewKey,
    sink: K,
}

// =============================================================================
// State Store
// =============================================================================

/// Acknowledgement of an applied patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub revision: u64,
    pub changed: ViewMask,
}

pub struct StateStore<S, K> {
    doc: Document,
    resolver: Resolver,
    storage: S,
    config: StoreConfig,
    revision: u64,
    subscribers: BTreeMap<SubscriptionId, Subscriber<K>>,
    next_subscription: u64,
    dirty: bool,
}

impl<S: Storage, K: NotificationSink> StateStore<S, K> {
    /// Loads the persisted document, or starts from defaults if none exists.
    pub fn open(storage: S, config: StoreConfig) -> Result<Self, StoreError> {
        let doc = match storage.load(&config.storage_key)? {
            Some(blob) => serde_json::from_slice::<Document>(&blob).map_err(StoreError::Decode)?,
            None => Document::default(),
        };
        info!(
            "document loaded: {} rules, enabled={}",
            doc.rules.len(),
            doc.settings.enabled
        );
        Ok(Self::with_document(storage, config, doc))
    }

    /// Starts from `doc` without reading storage.
    pub fn with_document(storage: S, config: StoreConfig, doc: Document) -> Self {
        let resolver = Resolver::new(doc.rules.iter());
        Self {
            doc,
            resolver,
            storage,
            config,
            revision: 0,
            subscribers: BTreeMap::new(),
            next_subscription: 1,
            dirty: false,
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// True while the in-memory document is ahead of storage.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Current values of the fields `key` asks for.
    pub fn read(&self, key: &ViewKey) -> Delta {
        let fields = key.effective_mask();
        Delta {
            revision: self.revision,
            fields,
            view: View::project(&self.doc, fields, key.tab),
            confirms: None,
        }
    }

    /// Registers `sink` for `key` and returns the snapshot it starts from.
    /// Deltas sent to the sink all carry a revision above the snapshot's.
    pub fn subscribe(&mut self, key: ViewKey, sink: K) -> (SubscriptionId, Delta) {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        let snapshot = self.read(&key);
        self.subscribers.insert(id, Subscriber { key, sink });
        debug!("subscription {:?} opened for {:?}", id, key.mask);
        (id, snapshot)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            debug!("subscription {:?} closed", id);
        }
        removed
    }

    /// Merges `patch`, persists, and notifies subscribers. `origin` identifies
    /// the issuing subscription, which always gets a confirming delta.
    ///
    /// A persistence failure does not roll anything back: the change stays in
    /// memory, subscribers are notified, the store is marked dirty and
    /// [`StoreError::Persist`] reports the failure.
    pub fn patch(&mut self, patch: Patch, origin: Option<Origin>) -> Result<Ack, StoreError> {
        self.revision += 1;
        let changes = self.doc.apply_patch(patch, &mut self.resolver);
        if changes.touches_persisted() {
            self.dirty = true;
        }

        let persisted = if self.dirty { self.persist() } else { Ok(()) };
        self.notify(&changes, origin);

        let ack = Ack {
            revision: self.revision,
            changed: changes.fields,
        };
        match persisted {
            Ok(()) => Ok(ack),
            Err(StoreError::Storage(source)) => Err(StoreError::Persist {
                revision: self.revision,
                source,
            }),
            Err(e) => Err(e),
        }
    }

    /// Retries persisting a dirty document.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        self.persist()
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let blob = serde_json::to_vec(&self.doc).map_err(StoreError::Encode)?;
        let attempts = self.config.persist_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.storage.store(&self.config.storage_key, &blob) {
                Ok(()) => {
                    self.dirty = false;
                    return Ok(());
                }
                Err(e) => {
                    warn!("persist attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(StoreError::Storage(e)),
            None => Ok(()),
        }
    }

    fn notify(&mut self, changes: &Changes, origin: Option<Origin>) {
        let mut closed = Vec::new();
        for (id, subscriber) in self.subscribers.iter_mut() {
            let key = subscriber.key;
            let mut fields = changes.fields & key.effective_mask();
            let own_tab_changed = key.tab.is_some_and(|tab| changes.tabs.contains(&tab));
            if !own_tab_changed {
                fields.remove(ViewMask::TAB);
            }
            let confirms = origin
                .filter(|origin| origin.subscription == *id)
                .map(|origin| origin.seq);
            if fields.is_empty() && confirms.is_none() {
                continue;
            }

            let delta = Delta {
                revision: self.revision,
                fields,
                view: View::project(&self.doc, fields, key.tab),
                confirms,
            };
            if subscriber.sink.deliver(*id, delta).is_err() {
                closed.push(*id);
            }
        }
        for id in closed {
            debug!("subscription {:?} dropped, receiver gone", id);
            self.subscribers.remove(&id);
        }
    }
}
