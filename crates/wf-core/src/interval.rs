//! Half-open spans of one channel bound to a quantity.

use std::ops::Range;

use crate::error::ModelError;
use crate::marker::TimeMarker;
use crate::registry::Registry;
use crate::types::{EntityKind, MarkerId, QuantityId};

/// `[start, end)` on one channel, valued by one quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    name: String,
    start: MarkerId,
    end: MarkerId,
    value: QuantityId,
    locked: bool,
}

impl Interval {
    pub fn new(name: impl Into<String>, start: MarkerId, end: MarkerId, value: QuantityId) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            value,
            locked: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn start(&self) -> MarkerId {
        self.start
    }

    pub const fn end(&self) -> MarkerId {
        self.end
    }

    pub const fn value(&self) -> QuantityId {
        self.value
    }

    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// The covered instants, or `None` if a boundary marker is gone.
    pub fn span(&self, markers: &Registry<MarkerId, TimeMarker>) -> Option<Range<i64>> {
        let start = markers.get(self.start)?.instant();
        let end = markers.get(self.end)?.instant();
        Some(start..end)
    }

    /// Splits at `marker` into `[start, marker)` and `[marker, end)`. Both
    /// children keep the quantity and the lock. The caller has checked that
    /// `marker` lies strictly inside the span.
    pub(crate) fn split_at(&self, marker: MarkerId, left: String, right: String) -> [Self; 2] {
        [
            Self {
                name: left,
                start: self.start,
                end: marker,
                value: self.value,
                locked: self.locked,
            },
            Self {
                name: right,
                start: marker,
                end: self.end,
                value: self.value,
                locked: self.locked,
            },
        ]
    }

    /// Rebinds to another quantity. Does not fork.
    pub fn set_value(&mut self, value: QuantityId) -> Result<(), ModelError> {
        if self.locked {
            return Err(ModelError::locked(EntityKind::Interval, &self.name));
        }
        self.value = value;
        Ok(())
    }

    pub(crate) const fn rebind(&mut self, value: QuantityId) {
        self.value = value;
    }

    pub(crate) const fn extend_to(&mut self, end: MarkerId) {
        self.end = end;
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) const fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }
}
