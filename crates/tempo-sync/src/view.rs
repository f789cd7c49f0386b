//! View subscriptions for consumer contexts
//!
//! A [`ViewSubscription`] is what a popup, options page or content script
//! holds. It asks the authority for a snapshot of its fields, applies local
//! writes optimistically, and folds incoming deltas into its [`Projection`].
//! Writes issued before the snapshot arrives are queued and replayed in
//! order once it does. If the authority does not answer in time the
//! subscription stays readable on its last known view.

use std::time::Duration;

use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};

use tempo_core::patch::Patch;
use tempo_core::store::{Ack, StoreError};
use tempo_core::types::{Origin, SubscriptionId, ViewKey, ViewMask};
use tempo_core::view::{Delta, Projection, Reconciled, View};

use crate::client::AuthorityClient;
use crate::config::SyncConfig;
use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the snapshot.
    Connecting,
    Live,
    /// No snapshot; reads serve the last known view, writes stay local.
    Unavailable,
    Closed,
}

pub struct ViewSubscription {
    client: AuthorityClient,
    projection: Projection,
    phase: Phase,
    id: Option<SubscriptionId>,
    snapshot: Option<oneshot::Receiver<(SubscriptionId, Delta)>>,
    deltas: Option<mpsc::UnboundedReceiver<Delta>>,
    queued: Vec<(u64, Patch)>,
    acks: Vec<(u64, oneshot::Receiver<Result<Ack, StoreError>>)>,
    failed_writes: Vec<(u64, StoreError)>,
    next_seq: u64,
    snapshot_timeout: Duration,
}

impl ViewSubscription {
    /// Sends the subscribe request and returns without waiting for it.
    pub fn open(client: AuthorityClient, key: ViewKey, config: &SyncConfig) -> Self {
        Self::open_with_fallback(client, key, config, View::default())
    }

    /// Like [`open`](Self::open), reading `last_known` until the snapshot
    /// arrives or if it never does.
    pub fn open_with_fallback(
        client: AuthorityClient,
        key: ViewKey,
        config: &SyncConfig,
        last_known: View,
    ) -> Self {
        let mut subscription = Self {
            projection: Projection::with_fallback(key, last_known),
            phase: Phase::Connecting,
            id: None,
            snapshot: None,
            deltas: None,
            queued: Vec::new(),
            acks: Vec::new(),
            failed_writes: Vec::new(),
            next_seq: 1,
            snapshot_timeout: config.snapshot_timeout(),
            client,
        };
        match subscription.client.send_subscribe(key) {
            Ok(pending) => {
                subscription.snapshot = Some(pending.snapshot);
                subscription.deltas = Some(pending.deltas);
            }
            Err(_) => {
                warn!("authority unreachable, view {:?} uses last known state", key.mask);
                subscription.phase = Phase::Unavailable;
            }
        }
        subscription
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn id(&self) -> Option<SubscriptionId> {
        self.id
    }

    pub fn key(&self) -> ViewKey {
        self.projection.key()
    }

    pub fn revision(&self) -> Option<u64> {
        self.projection.revision()
    }

    /// The view as this context should show it.
    pub fn view(&self) -> View {
        self.projection.current()
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Writes that were applied but could not be persisted, with their
    /// sequence numbers.
    pub fn take_failed_writes(&mut self) -> Vec<(u64, StoreError)> {
        std::mem::take(&mut self.failed_writes)
    }

    /// Waits for the snapshot, bounded by the snapshot timeout. On success
    /// queued writes are forwarded in order.
    pub async fn ready(&mut self) -> Result<(), SyncError> {
        match self.phase {
            Phase::Live => return Ok(()),
            Phase::Closed => return Err(SyncError::Closed),
            Phase::Unavailable => return Err(SyncError::AuthorityUnavailable),
            Phase::Connecting => {}
        }
        let Some(snapshot) = self.snapshot.take() else {
            return Err(self.fall_back());
        };

        match tokio::time::timeout(self.snapshot_timeout, snapshot).await {
            Ok(Ok((id, snapshot))) => {
                self.id = Some(id);
                self.projection.apply_snapshot(&snapshot);
                self.phase = Phase::Live;
                debug!(
                    "view {:?} live at revision {}, replaying {} queued writes",
                    self.key().mask,
                    snapshot.revision,
                    self.queued.len()
                );
                for (seq, patch) in std::mem::take(&mut self.queued) {
                    self.forward(seq, patch)?;
                }
                Ok(())
            }
            Ok(Err(_)) => Err(self.fall_back()),
            Err(_) => {
                warn!(
                    "no snapshot for view {:?} after {:?}, using last known state",
                    self.key().mask,
                    self.snapshot_timeout
                );
                Err(self.fall_back())
            }
        }
    }

    fn fall_back(&mut self) -> SyncError {
        self.phase = Phase::Unavailable;
        self.snapshot = None;
        // dropping the receiver makes the authority forget this subscriber
        self.deltas = None;
        SyncError::AuthorityUnavailable
    }

    /// Applies `patch` locally and forwards it, or queues it until the
    /// snapshot arrives. Returns the fields it changed locally.
    pub fn write(&mut self, patch: Patch) -> Result<ViewMask, SyncError> {
        if self.phase == Phase::Closed {
            return Err(SyncError::Closed);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let touched = self.projection.apply_local(&patch, seq);
        match self.phase {
            Phase::Live => self.forward(seq, patch)?,
            _ => self.queued.push((seq, patch)),
        }
        Ok(touched)
    }

    fn forward(&mut self, seq: u64, patch: Patch) -> Result<(), SyncError> {
        let Some(subscription) = self.id else {
            self.queued.push((seq, patch));
            return Ok(());
        };
        let origin = Origin { subscription, seq };
        match self.client.send_patch(patch, Some(origin)) {
            Ok(ack) => {
                self.acks.push((seq, ack));
                Ok(())
            }
            Err(e) => {
                self.fall_back();
                Err(e)
            }
        }
    }

    /// Folds in every delta that has already arrived, without waiting.
    pub fn pump(&mut self) -> Reconciled {
        let mut total = Reconciled::default();
        if self.phase == Phase::Live {
            let mut disconnected = false;
            let mut incoming = Vec::new();
            if let Some(deltas) = self.deltas.as_mut() {
                loop {
                    match deltas.try_recv() {
                        Ok(delta) => incoming.push(delta),
                        Err(mpsc::error::TryRecvError::Empty) => break,
                        Err(mpsc::error::TryRecvError::Disconnected) => {
                            disconnected = true;
                            break;
                        }
                    }
                }
            }
            for delta in &incoming {
                merge(&mut total, self.projection.reconcile(delta));
            }
            if disconnected {
                warn!("authority went away, view {:?} keeps last state", self.key().mask);
                self.fall_back();
            }
        }
        self.collect_acks();
        total
    }

    /// Waits for the next delta, then folds it and anything queued behind it.
    pub async fn changed(&mut self) -> Result<Reconciled, SyncError> {
        match self.phase {
            Phase::Live => {}
            Phase::Connecting => self.ready().await?,
            Phase::Unavailable => return Err(SyncError::AuthorityUnavailable),
            Phase::Closed => return Err(SyncError::Closed),
        }
        let Some(deltas) = self.deltas.as_mut() else {
            return Err(self.fall_back());
        };
        match deltas.recv().await {
            Some(delta) => {
                let mut total = self.projection.reconcile(&delta);
                merge(&mut total, self.pump());
                Ok(total)
            }
            None => Err(self.fall_back()),
        }
    }

    fn collect_acks(&mut self) {
        let mut still_waiting = Vec::with_capacity(self.acks.len());
        for (seq, mut ack) in std::mem::take(&mut self.acks) {
            match ack.try_recv() {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!("write {} applied but not persisted: {}", seq, e);
                    self.failed_writes.push((seq, e));
                }
                Err(oneshot::error::TryRecvError::Empty) => still_waiting.push((seq, ack)),
                Err(oneshot::error::TryRecvError::Closed) => {}
            }
        }
        self.acks = still_waiting;
    }

    /// Unsubscribes. Later writes fail with [`SyncError::Closed`].
    pub fn close(&mut self) -> Result<(), SyncError> {
        if self.phase == Phase::Closed {
            return Ok(());
        }
        self.phase = Phase::Closed;
        self.snapshot = None;
        self.deltas = None;
        self.queued.clear();
        match self.id.take() {
            Some(id) => self.client.unsubscribe(id),
            None => Ok(()),
        }
    }
}

fn merge(total: &mut Reconciled, next: Reconciled) {
    total.changed |= next.changed;
    total.snapped_back |= next.snapped_back;
    total.stale |= next.stale;
}
