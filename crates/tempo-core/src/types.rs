//! Shared type definitions
//!
//! Identifiers, view masks and speed limits used by the store, the engine
//! and every consumer context.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Identifiers
// =============================================================================

/// Browser tab identifier, as handed out by the host.
pub type TabId = i32;

/// Handle of a registered view subscription at the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SubscriptionId(pub u64);

/// Tags a patch with the subscription and local write sequence that issued it.
/// The authority echoes `seq` back to that subscription as a confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Origin {
    pub subscription: SubscriptionId,
    pub seq: u64,
}

// =============================================================================
// Speed Limits
// =============================================================================

pub const SPEED_MIN: f64 = 1.0 / 16.0;
pub const SPEED_MAX: f64 = 16.0;
pub const SPEED_DEFAULT: f64 = 1.0;

/// Clamps a playback rate into `[SPEED_MIN, SPEED_MAX]`.
/// Non-finite input falls back to `SPEED_DEFAULT`.
pub fn clamp_speed(speed: f64) -> f64 {
    if !speed.is_finite() {
        return SPEED_DEFAULT;
    }
    speed.clamp(SPEED_MIN, SPEED_MAX)
}

// =============================================================================
// View Masks
// =============================================================================

bitflags::bitflags! {
    /// Interest mask over the document's fields.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct ViewMask: u32 {
        /// Extension enabled flag
        const ENABLED = 1 << 0;
        /// Pin flag (manual overrides survive navigation)
        const PINNED = 1 << 1;
        /// Global default speed
        const SPEED = 1 << 2;
        /// Speed presets shown in the popup
        const PRESETS = 1 << 3;
        /// Global fx pair
        const FX = 1 << 4;
        /// Ordered rule list
        const RULES = 1 << 5;
        /// Resolved state of the view's tab
        const TAB = 1 << 6;

        /// All global settings
        const SETTINGS = Self::ENABLED.bits()
            | Self::PINNED.bits()
            | Self::SPEED.bits()
            | Self::PRESETS.bits()
            | Self::FX.bits();
        /// Everything a view can ask for
        const ALL = Self::SETTINGS.bits() | Self::RULES.bits() | Self::TAB.bits();
    }
}

/// What a consumer context wants to see: a field mask and, for tab-scoped
/// views, the tab whose resolved state is wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ViewKey {
    #[ts(type = "string")]
    pub mask: ViewMask,
    #[serde(default)]
    pub tab: Option<TabId>,
}

impl ViewKey {
    pub fn global(mask: ViewMask) -> Self {
        Self {
            mask: mask - ViewMask::TAB,
            tab: None,
        }
    }

    pub fn for_tab(mask: ViewMask, tab: TabId) -> Self {
        Self {
            mask,
            tab: Some(tab),
        }
    }

    /// Fields this key can actually observe. `TAB` needs a tab id.
    pub fn effective_mask(&self) -> ViewMask {
        if self.tab.is_some() {
            self.mask
        } else {
            self.mask - ViewMask::TAB
        }
    }
}
