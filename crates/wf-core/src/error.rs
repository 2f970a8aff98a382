//! Error kinds raised by the model.

use thiserror::Error;

use crate::expr::ExprError;
use crate::types::EntityKind;

/// Errors returned by timeline, channel and quantity operations.
///
/// Validation failures (`Locked`, `NameConflict`, `OutOfRange`, `NotFound`,
/// `Expression`, ...) leave the model untouched and are safe to show to a user.
/// `NoCoveringInterval` and `BoundaryNotFound` mean a partition invariant is
/// already broken; see [`ModelError::is_invariant_violation`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// A mutation was attempted on a locked entity.
    #[error("{kind} {name} is locked")]
    Locked { kind: EntityKind, name: String },

    /// The name is already taken within its namespace.
    #[error("{kind} name {name:?} is already in use")]
    NameConflict { kind: EntityKind, name: String },

    /// The name is empty or padded with whitespace.
    #[error("invalid {kind} name {name:?}")]
    InvalidName { kind: EntityKind, name: String },

    /// A time or value falls outside the range its position allows.
    #[error("{subject}: {value} is outside {}", describe_range(.lower, .upper))]
    OutOfRange {
        subject: String,
        value: f64,
        lower: Option<i64>,
        upper: Option<i64>,
    },

    /// No interval of the channel strictly contains the instant.
    #[error("channel {channel}: no interval strictly contains instant {instant}")]
    NoCoveringInterval { channel: String, instant: i64 },

    /// The marker is not an internal boundary of the channel.
    #[error("channel {channel}: marker {marker} is not an internal boundary")]
    BoundaryNotFound { channel: String, marker: String },

    /// A name lookup failed.
    #[error("there is no {kind} named {name:?}")]
    NotFound { kind: EntityKind, name: String },

    /// The `start`/`end` anchors cannot be deleted, moved or unlocked.
    #[error("marker {name} is a timeline anchor")]
    Anchor { name: String },

    /// Only constant-mode quantities can be dragged.
    #[error("quantity {name} is not in constant mode")]
    NotConstant { name: String },

    /// Compiling or evaluating a function-mode quantity failed.
    #[error("expression {text:?} failed: {source}")]
    Expression {
        text: String,
        #[source]
        source: ExprError,
    },

    /// A loaded program is structurally invalid.
    #[error("invalid program: {message}")]
    InvalidSnapshot { message: String },
}

impl ModelError {
    pub(crate) fn not_found(kind: EntityKind, name: &str) -> Self {
        Self::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    pub(crate) fn locked(kind: EntityKind, name: &str) -> Self {
        Self::Locked {
            kind,
            name: name.to_string(),
        }
    }

    pub(crate) fn name_conflict(kind: EntityKind, name: &str) -> Self {
        Self::NameConflict {
            kind,
            name: name.to_string(),
        }
    }

    pub(crate) fn invalid_snapshot(message: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            message: message.into(),
        }
    }

    /// Fails with `self` when `strict`, otherwise reports a rejected no-op.
    pub(crate) fn reject(self, strict: bool) -> Result<bool, Self> {
        if strict { Err(self) } else { Ok(false) }
    }

    /// Whether this error reports a broken partition invariant rather than a
    /// rejected request. These indicate a defect and should not be swallowed.
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::NoCoveringInterval { .. } | Self::BoundaryNotFound { .. }
        )
    }
}

#[expect(clippy::ref_option, reason = "called with field references by the error derive")]
fn describe_range(lower: &Option<i64>, upper: &Option<i64>) -> String {
    match (*lower, *upper) {
        (Some(lo), Some(hi)) => format!("({lo}, {hi})"),
        (Some(lo), None) => format!("({lo}, +inf)"),
        (None, Some(hi)) => format!("(-inf, {hi})"),
        (None, None) => "the representable range".to_string(),
    }
}
