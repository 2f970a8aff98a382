//! Typed handles, entity kinds and name validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Generates an opaque arena handle with common trait implementations.
macro_rules! define_handle {
    (
        $(#[$meta:meta])*
        $name:ident, $prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Returns the raw arena index.
            #[must_use]
            pub const fn index(self) -> u32 {
                self.0
            }
        }

        impl crate::registry::Handle for $name {
            fn from_raw(raw: u32) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $prefix, self.0)
            }
        }
    };
}

define_handle!(
    /// Handle to a [`TimeMarker`](crate::TimeMarker) registered with a timeline.
    ///
    /// Handles are never reused within one timeline, so a stale handle fails
    /// lookups instead of aliasing a newer marker.
    MarkerId, "marker"
);

define_handle!(
    /// Handle to a [`Quantity`](crate::Quantity) registered with a timeline.
    QuantityId, "quantity"
);

/// The namespaces entities live in. Used to label errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Marker,
    Quantity,
    Interval,
    Channel,
    Variable,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Marker => "marker",
            Self::Quantity => "quantity",
            Self::Interval => "interval",
            Self::Channel => "channel",
            Self::Variable => "variable",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Evaluation mode of a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// A single scalar, independent of time. Draggable.
    Constant,
    /// An expression of `t` (seconds).
    Function,
}

impl Mode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Function => "function",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "constant" => Ok(Self::Constant),
            "function" => Ok(Self::Function),
            _ => Err(format!("invalid quantity mode: {s}")),
        }
    }
}

/// Rejects names that are empty or carry surrounding whitespace.
pub fn validate_name(kind: EntityKind, name: &str) -> Result<(), ModelError> {
    if name.is_empty() || name.trim() != name {
        return Err(ModelError::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Returns `base` followed by the smallest positive integer that `taken` rejects.
pub fn unique_suffixed(base: &str, taken: impl Fn(&str) -> bool) -> String {
    (1_u64..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}
