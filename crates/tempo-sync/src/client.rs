//! Transport handle to the authority.

use tokio::sync::{mpsc, oneshot};

use tempo_core::patch::Patch;
use tempo_core::store::{Ack, StoreError};
use tempo_core::types::{Origin, SubscriptionId, ViewKey};
use tempo_core::view::Delta;

use crate::authority::{AuthorityStatus, ChannelSink, Request};
use crate::error::SyncError;

/// A live subscription as handed out by the authority.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub snapshot: Delta,
    pub deltas: mpsc::UnboundedReceiver<Delta>,
}

/// A subscribe request that has been sent but not yet answered.
#[derive(Debug)]
pub struct PendingSubscription {
    pub snapshot: oneshot::Receiver<(SubscriptionId, Delta)>,
    pub deltas: mpsc::UnboundedReceiver<Delta>,
}

/// Cloneable handle for sending requests to the authority.
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    requests: mpsc::UnboundedSender<Request>,
}

impl AuthorityClient {
    pub(crate) fn from_sender(requests: mpsc::UnboundedSender<Request>) -> Self {
        Self { requests }
    }

    fn send(&self, request: Request) -> Result<(), SyncError> {
        self.requests
            .send(request)
            .map_err(|_| SyncError::AuthorityUnavailable)
    }

    pub async fn read(&self, key: ViewKey) -> Result<Delta, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Read { key, reply })?;
        rx.await.map_err(|_| SyncError::AuthorityUnavailable)
    }

    /// Applies an untagged patch.
    pub async fn patch(&self, patch: Patch) -> Result<Ack, SyncError> {
        let rx = self.send_patch(patch, None)?;
        let result = rx.await.map_err(|_| SyncError::AuthorityUnavailable)?;
        Ok(result?)
    }

    /// Sends a patch without waiting for the outcome.
    pub fn send_patch(
        &self,
        patch: Patch,
        origin: Option<Origin>,
    ) -> Result<oneshot::Receiver<Result<Ack, StoreError>>, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Patch {
            patch,
            origin,
            reply,
        })?;
        Ok(rx)
    }

    pub async fn subscribe(&self, key: ViewKey) -> Result<Subscription, SyncError> {
        let pending = self.send_subscribe(key)?;
        let (id, snapshot) = pending
            .snapshot
            .await
            .map_err(|_| SyncError::AuthorityUnavailable)?;
        Ok(Subscription {
            id,
            snapshot,
            deltas: pending.deltas,
        })
    }

    /// Sends a subscribe request without waiting for the snapshot.
    pub fn send_subscribe(&self, key: ViewKey) -> Result<PendingSubscription, SyncError> {
        let (sink, deltas) = mpsc::unbounded_channel();
        let (reply, snapshot) = oneshot::channel();
        self.send(Request::Subscribe {
            key,
            sink: ChannelSink(sink),
            reply,
        })?;
        Ok(PendingSubscription { snapshot, deltas })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), SyncError> {
        self.send(Request::Unsubscribe { id })
    }

    pub async fn flush(&self) -> Result<(), SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Flush { reply })?;
        let result = rx.await.map_err(|_| SyncError::AuthorityUnavailable)?;
        Ok(result?)
    }

    pub async fn status(&self) -> Result<AuthorityStatus, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Status { reply })?;
        rx.await.map_err(|_| SyncError::AuthorityUnavailable)
    }
}
