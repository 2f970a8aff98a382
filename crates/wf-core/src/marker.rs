//! Named points on the shared time axis.

use serde::{Deserialize, Serialize};

use crate::registry::Named;
use crate::types::EntityKind;

/// Name of the anchor marker at the beginning of the timeline.
pub const START: &str = "start";
/// Name of the anchor marker at the end of the timeline.
pub const END: &str = "end";

/// Nanoseconds per second.
pub const NS_PER_SECOND: f64 = 1e9;

/// A named instant, in integer nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeMarker {
    name: String,
    instant: i64,
    locked: bool,
}

impl TimeMarker {
    pub fn new(name: impl Into<String>, instant: i64) -> Self {
        Self {
            name: name.into(),
            instant,
            locked: false,
        }
    }

    pub(crate) fn anchor(name: &str, instant: i64) -> Self {
        Self {
            name: name.to_string(),
            instant,
            locked: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn instant(&self) -> i64 {
        self.instant
    }

    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// The instant converted to seconds, as bound in expressions.
    pub fn seconds(&self) -> f64 {
        to_seconds(self.instant)
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) const fn set_instant(&mut self, instant: i64) {
        self.instant = instant;
    }

    pub(crate) const fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }
}

impl Named for TimeMarker {
    const KIND: EntityKind = EntityKind::Marker;

    fn name(&self) -> &str {
        &self.name
    }
}

/// Converts integer nanoseconds to seconds.
pub fn to_seconds(instant: i64) -> f64 {
    ns_as_f64(instant) / NS_PER_SECOND
}

#[expect(
    clippy::cast_precision_loss,
    reason = "instants beyond 2^53 ns (about 104 days) are not meaningful here"
)]
pub(crate) const fn ns_as_f64(instant: i64) -> f64 {
    instant as f64
}

/// Open bounds `(lower, upper)` a marker at `instant` may move within, given
/// the instants of every marker. `None` stands for an unbounded side.
pub fn neighborhood(instants: &[i64], instant: i64) -> (Option<i64>, Option<i64>) {
    let lower = instants.iter().copied().filter(|&other| other < instant).max();
    let upper = instants.iter().copied().filter(|&other| other > instant).min();
    (lower, upper)
}

/// Rounds a requested time to the nearest nanosecond, rejecting values that
/// are not finite or do not fit an `i64`.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    reason = "range is checked against i64 bounds before the cast"
)]
pub fn round_instant(value: f64) -> Option<i64> {
    let rounded = value.round();
    if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded < i64::MAX as f64 {
        Some(rounded as i64)
    } else {
        None
    }
}
