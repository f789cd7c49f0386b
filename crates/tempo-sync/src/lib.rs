//! Tempo Sync
//!
//! Message passing between extension contexts. The background context runs
//! an [`Authority`] actor around the state store; every other context talks
//! to it through an [`AuthorityClient`] and observes it through
//! [`ViewSubscription`]s.
//!
//! # Modules
//!
//! - `authority`: the actor that serializes all requests
//! - `client`: cloneable transport handle
//! - `view`: optimistic view subscriptions with snapshot timeout
//! - `file_storage`: JSON file storage backend
//! - `config`: timeouts and intervals

pub mod authority;
pub mod client;
pub mod config;
pub mod error;
pub mod file_storage;
pub mod view;

pub use authority::{Authority, AuthorityStatus, AuthorityStore, ChannelSink};
pub use client::{AuthorityClient, PendingSubscription, Subscription};
pub use config::SyncConfig;
pub use error::SyncError;
pub use file_storage::FileStorage;
pub use view::{Phase, ViewSubscription};
