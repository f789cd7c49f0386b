//! Tempo Core Library
//!
//! Rule engine and authoritative state for the Tempo playback extension.
//! Users author ordered URL rules that override a tab's enabled state,
//! playback speed or visual fx; every extension context (background, popup,
//! options page, content scripts) observes one shared document through
//! field-masked views.
//!
//! # Architecture
//!
//! The background context owns a single [`StateStore`]. Every other context
//! holds a [`Projection`] of the fields it cares about, writes optimistically
//! into it, and reconciles against the revision-stamped [`Delta`]s the store
//! pushes back. Tab state is never written directly: it is re-derived from
//! rules, settings and the tab's URL history on every patch.
//!
//! # Modules
//!
//! - `types`: identifiers, view masks, speed limits
//! - `fx`: filter and transform values for element and backdrop
//! - `rule`: the rule model and the ordered rule list
//! - `engine`: URL rule resolution
//! - `document`: settings, rules and per-tab state
//! - `patch`: partial updates and how they merge
//! - `view`: masked projections and optimistic reconciliation
//! - `storage`: key-blob storage interface
//! - `store`: the authoritative state store

pub mod document;
pub mod engine;
pub mod fx;
pub mod patch;
pub mod rule;
pub mod storage;
pub mod store;
pub mod types;
pub mod view;

// Re-export commonly used types
pub use document::{Document, GlobalSettings, ManualOverride, Provenance, Source, TabState};
pub use engine::{check_rule, check_rules, resolve, Resolved, ResolvedOverrides, Resolver};
pub use fx::{FilterName, FilterValue, Fx, FxPair, FxSide};
pub use patch::{Changes, Patch, RuleEdit, SettingsPatch, TabEdit};
pub use rule::{MatchType, RuleError, RuleId, RuleList, RuleModel, RuleOverride, TargetType};
pub use storage::{MemoryStorage, Storage, StorageError};
pub use store::{Ack, NotificationSink, SinkClosed, StateStore, StoreConfig, StoreError};
pub use types::{clamp_speed, Origin, SubscriptionId, TabId, ViewKey, ViewMask};
pub use view::{Delta, Projection, Reconciled, View};
