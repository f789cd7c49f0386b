//! Visual effect bundles
//!
//! An [`FxPair`] carries two independently enabled [`Fx`] bundles: one applied
//! to the media element itself and one applied to the page backdrop. All
//! operations here are pure and return new values.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Filter Names
// =============================================================================

/// A single named filter or transform parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum FilterName {
    Grayscale,
    Sepia,
    Invert,
    Brightness,
    Contrast,
    Saturate,
    HueRotate,
    Blur,
    ScaleX,
    ScaleY,
    TranslateX,
    TranslateY,
    Rotate,
    RotateX,
    RotateY,
    SkewX,
    SkewY,
    Perspective,
}

/// Filters in the order they are applied.
pub const FILTERS: [FilterName; 8] = [
    FilterName::Grayscale,
    FilterName::Sepia,
    FilterName::Invert,
    FilterName::Brightness,
    FilterName::Contrast,
    FilterName::Saturate,
    FilterName::HueRotate,
    FilterName::Blur,
];

/// Transforms in the order they are applied.
pub const TRANSFORMS: [FilterName; 10] = [
    FilterName::ScaleX,
    FilterName::ScaleY,
    FilterName::TranslateX,
    FilterName::TranslateY,
    FilterName::Rotate,
    FilterName::RotateX,
    FilterName::RotateY,
    FilterName::SkewX,
    FilterName::SkewY,
    FilterName::Perspective,
];

impl FilterName {
    /// Neutral value: applying the parameter at this value has no effect.
    pub fn default_value(self) -> f64 {
        match self {
            Self::Brightness | Self::Contrast | Self::Saturate => 1.0,
            Self::ScaleX | Self::ScaleY => 1.0,
            _ => 0.0,
        }
    }

    pub fn is_transform(self) -> bool {
        TRANSFORMS.contains(&self)
    }
}

/// A filter parameter and its current value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FilterValue {
    pub filter: FilterName,
    pub value: f64,
}

impl FilterValue {
    pub fn neutral(filter: FilterName) -> Self {
        Self {
            filter,
            value: filter.default_value(),
        }
    }

    /// True if the value differs from the filter's neutral value.
    pub fn deviates(&self) -> bool {
        self.value != self.filter.default_value()
    }
}

// =============================================================================
// Fx Bundle
// =============================================================================

/// An independently enabled bundle of filters and transforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Fx {
    pub enabled: bool,
    pub filters: Vec<FilterValue>,
    pub transforms: Vec<FilterValue>,
}

impl Default for Fx {
    fn default() -> Self {
        Self {
            enabled: false,
            filters: FILTERS.iter().copied().map(FilterValue::neutral).collect(),
            transforms: TRANSFORMS.iter().copied().map(FilterValue::neutral).collect(),
        }
    }
}

impl Fx {
    /// True if any filter or transform is away from its neutral value.
    pub fn deviates(&self) -> bool {
        self.filters.iter().any(FilterValue::deviates)
            || self.transforms.iter().any(FilterValue::deviates)
    }

    /// Returns a copy with `filter` set to `value`, appending the entry if absent.
    pub fn with_value(&self, filter: FilterName, value: f64) -> Fx {
        let mut next = self.clone();
        let list = if filter.is_transform() {
            &mut next.transforms
        } else {
            &mut next.filters
        };
        match list.iter_mut().find(|entry| entry.filter == filter) {
            Some(entry) => entry.value = value,
            None => list.push(FilterValue { filter, value }),
        }
        next
    }

    pub fn with_enabled(&self, enabled: bool) -> Fx {
        Fx {
            enabled,
            ..self.clone()
        }
    }

    pub fn value(&self, filter: FilterName) -> f64 {
        self.filters
            .iter()
            .chain(self.transforms.iter())
            .find(|entry| entry.filter == filter)
            .map_or(filter.default_value(), |entry| entry.value)
    }
}

// =============================================================================
// Fx Pair
// =============================================================================

/// Which side of an [`FxPair`] an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum FxSide {
    Element,
    Backdrop,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FxPair {
    #[serde(rename = "elementFx")]
    pub element: Fx,
    #[serde(rename = "backdropFx")]
    pub backdrop: Fx,
}

impl FxPair {
    /// Exchanges the element and backdrop bundles in a single value.
    pub fn swap(&self) -> FxPair {
        FxPair {
            element: self.backdrop.clone(),
            backdrop: self.element.clone(),
        }
    }

    /// Returns a copy with exactly one side replaced.
    pub fn with_side(&self, side: FxSide, fx: Fx) -> FxPair {
        match side {
            FxSide::Element => FxPair {
                element: fx,
                backdrop: self.backdrop.clone(),
            },
            FxSide::Backdrop => FxPair {
                element: self.element.clone(),
                backdrop: fx,
            },
        }
    }

    pub fn side(&self, side: FxSide) -> &Fx {
        match side {
            FxSide::Element => &self.element,
            FxSide::Backdrop => &self.backdrop,
        }
    }

    /// True if at least one enabled side changes the picture.
    pub fn is_active(&self) -> bool {
        (self.element.enabled && self.element.deviates())
            || (self.backdrop.enabled && self.backdrop.deviates())
    }
}
