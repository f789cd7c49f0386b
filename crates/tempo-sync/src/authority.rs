//! The authority actor
//!
//! One tokio task owns the [`StateStore`] and handles requests strictly in
//! arrival order. Replies travel back on oneshot channels; each subscription
//! gets its own unbounded channel of deltas, so notifications for one
//! subscriber are delivered in revision order.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use tempo_core::patch::Patch;
use tempo_core::storage::Storage;
use tempo_core::store::{Ack, NotificationSink, SinkClosed, StateStore, StoreError};
use tempo_core::types::{Origin, SubscriptionId, ViewKey};
use tempo_core::view::Delta;

use crate::client::AuthorityClient;
use crate::config::SyncConfig;

// =============================================================================
// Channel Sink
// =============================================================================

/// Delivers a subscription's deltas over an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink(pub mpsc::UnboundedSender<Delta>);

impl NotificationSink for ChannelSink {
    fn deliver(&mut self, _subscription: SubscriptionId, delta: Delta) -> Result<(), SinkClosed> {
        self.0.send(delta).map_err(|_| SinkClosed)
    }
}

pub type AuthorityStore<S> = StateStore<S, ChannelSink>;

// =============================================================================
// Requests
// =============================================================================

/// Snapshot of the authority's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorityStatus {
    pub revision: u64,
    pub dirty: bool,
    pub subscribers: usize,
}

pub(crate) enum Request {
    Read {
        key: ViewKey,
        reply: oneshot::Sender<Delta>,
    },
    Patch {
        patch: Patch,
        origin: Option<Origin>,
        reply: oneshot::Sender<Result<Ack, StoreError>>,
    },
    Subscribe {
        key: ViewKey,
        sink: ChannelSink,
        reply: oneshot::Sender<(SubscriptionId, Delta)>,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Flush {
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    Status {
        reply: oneshot::Sender<AuthorityStatus>,
    },
}

// =============================================================================
// Authority
// =============================================================================

pub struct Authority<S> {
    store: AuthorityStore<S>,
    requests: mpsc::UnboundedReceiver<Request>,
    retry_interval: Duration,
}

impl<S: Storage + Send + 'static> Authority<S> {
    /// Wraps `store`. The actor runs until every client handle is dropped.
    pub fn new(store: AuthorityStore<S>, config: &SyncConfig) -> (Self, AuthorityClient) {
        let (tx, rx) = mpsc::unbounded_channel();
        let authority = Self {
            store,
            requests: rx,
            retry_interval: config.retry_interval(),
        };
        (authority, AuthorityClient::from_sender(tx))
    }

    /// Spawns the actor on the current runtime. The join handle yields the
    /// store back once the actor stops.
    pub fn spawn(
        store: AuthorityStore<S>,
        config: &SyncConfig,
    ) -> (AuthorityClient, JoinHandle<AuthorityStore<S>>) {
        let (authority, client) = Self::new(store, config);
        (client, tokio::spawn(authority.run()))
    }

    pub async fn run(mut self) -> AuthorityStore<S> {
        info!("authority started at revision {}", self.store.revision());
        let mut retry = tokio::time::interval(self.retry_interval);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => self.handle(request),
                    None => break,
                },
                _ = retry.tick(), if self.store.is_dirty() => {
                    match self.store.flush() {
                        Ok(()) => {
                            info!("pending changes persisted at revision {}", self.store.revision())
                        }
                        Err(e) => warn!("flush retry failed: {}", e),
                    }
                }
            }
        }

        if self.store.is_dirty() {
            if let Err(e) = self.store.flush() {
                warn!("authority stopping with unpersisted changes: {}", e);
            }
        }
        info!("authority stopped at revision {}", self.store.revision());
        self.store
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::Read { key, reply } => {
                let _ = reply.send(self.store.read(&key));
            }
            Request::Patch {
                patch,
                origin,
                reply,
            } => {
                let result = self.store.patch(patch, origin);
                if let Err(e) = &result {
                    warn!("patch failed: {}", e);
                }
                let _ = reply.send(result);
            }
            Request::Subscribe { key, sink, reply } => {
                let (id, snapshot) = self.store.subscribe(key, sink);
                if reply.send((id, snapshot)).is_err() {
                    debug!("subscriber {:?} left before its snapshot", id);
                    self.store.unsubscribe(id);
                }
            }
            Request::Unsubscribe { id } => {
                self.store.unsubscribe(id);
            }
            Request::Flush { reply } => {
                let _ = reply.send(self.store.flush());
            }
            Request::Status { reply } => {
                let _ = reply.send(AuthorityStatus {
                    revision: self.store.revision(),
                    dirty: self.store.is_dirty(),
                    subscribers: self.store.subscriber_count(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use tempo_core::patch::SettingsPatch;
    use tempo_core::storage::MemoryStorage;
    use tempo_core::store::StoreConfig;
    use tempo_core::types::ViewMask;

    fn store() -> AuthorityStore<MemoryStorage> {
        StateStore::open(MemoryStorage::new(), StoreConfig::default()).unwrap()
    }

    fn speed(value: f64) -> Patch {
        Patch::settings(SettingsPatch {
            speed: Some(value),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_requests_are_applied_in_order() {
        let (client, handle) = Authority::spawn(store(), &SyncConfig::default());
        for i in 2..=11 {
            client.patch(speed(i as f64)).await.unwrap();
        }
        // unchanged value: the revision moves, nothing is written
        client.patch(speed(11.0)).await.unwrap();
        let delta = client.read(ViewKey::global(ViewMask::SPEED)).await.unwrap();
        assert_eq!(delta.revision, 11);
        assert_eq!(delta.view.speed, Some(11.0));

        drop(client);
        let store = handle.await.unwrap();
        assert_eq!(store.storage().writes(), 10);
    }

    #[tokio::test]
    async fn test_subscription_receives_deltas() {
        let (client, _handle) = Authority::spawn(store(), &SyncConfig::default());
        let mut sub = client.subscribe(ViewKey::global(ViewMask::SPEED)).await.unwrap();
        assert_eq!(sub.snapshot.revision, 0);

        client.patch(speed(2.0)).await.unwrap();
        let delta = sub.deltas.recv().await.unwrap();
        assert_eq!(delta.revision, 1);
        assert_eq!(delta.view.speed, Some(2.0));
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_unsubscribed() {
        let (client, _handle) = Authority::spawn(store(), &SyncConfig::default());
        let sub = client.subscribe(ViewKey::global(ViewMask::SPEED)).await.unwrap();
        drop(sub);
        client.patch(speed(2.0)).await.unwrap();
        assert_eq!(client.status().await.unwrap().subscribers, 0);
    }

    #[tokio::test]
    async fn test_persist_failure_is_retried_on_tick() {
        let mut store = store();
        store.storage_mut().fail_next_writes(3);
        let config = SyncConfig {
            retry_interval_ms: 10,
            ..Default::default()
        };
        let (client, handle) = Authority::spawn(store, &config);

        let result = client.patch(speed(2.0)).await;
        assert!(matches!(
            result,
            Err(SyncError::Store(StoreError::Persist { revision: 1, .. }))
        ));
        // the change is live even though it is not persisted yet
        let delta = client.read(ViewKey::global(ViewMask::SPEED)).await.unwrap();
        assert_eq!(delta.view.speed, Some(2.0));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!client.status().await.unwrap().dirty);

        drop(client);
        let store = handle.await.unwrap();
        assert_eq!(store.storage().writes(), 1);
    }
}
