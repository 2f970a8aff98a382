//! Gapless partitions of the timeline into intervals.

use std::collections::HashSet;

use crate::error::ModelError;
use crate::interval::Interval;
use crate::marker::TimeMarker;
use crate::registry::Registry;
use crate::types::{EntityKind, MarkerId, QuantityId, unique_suffixed};

/// Name of the single interval a new channel starts with.
pub const INITIAL_INTERVAL: &str = "initial";

/// An ordered partition of `[start, end)`.
///
/// Each interval's `end` marker is the next interval's `start` marker, and the
/// outer boundaries are the timeline anchors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    name: String,
    intervals: Vec<Interval>,
}

impl Channel {
    pub(crate) fn new(name: String, start: MarkerId, end: MarkerId, value: QuantityId) -> Self {
        Self {
            name,
            intervals: vec![Interval::new(INITIAL_INTERVAL, start, end, value)],
        }
    }

    /// A channel from already-ordered intervals. Checked by the caller.
    pub(crate) const fn from_intervals(name: String, intervals: Vec<Interval>) -> Self {
        Self { name, intervals }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn interval_named(&self, name: &str) -> Result<&Interval, ModelError> {
        let index = self.interval_index(name)?;
        Ok(&self.intervals[index])
    }

    pub(crate) fn interval_index(&self, name: &str) -> Result<usize, ModelError> {
        self.intervals
            .iter()
            .position(|interval| interval.name() == name)
            .ok_or_else(|| ModelError::not_found(EntityKind::Interval, name))
    }

    pub(crate) fn interval_mut(&mut self, index: usize) -> Option<&mut Interval> {
        self.intervals.get_mut(index)
    }

    /// Index of the interval whose `[start, end)` contains `instant`.
    pub fn covering_index(
        &self,
        instant: i64,
        markers: &Registry<MarkerId, TimeMarker>,
    ) -> Option<usize> {
        self.intervals.iter().position(|interval| {
            interval
                .span(markers)
                .is_some_and(|span| span.contains(&instant))
        })
    }

    /// Splits the interval that strictly contains `marker`'s instant.
    pub(crate) fn insert_marker(
        &mut self,
        marker: MarkerId,
        markers: &Registry<MarkerId, TimeMarker>,
    ) -> Result<(), ModelError> {
        let instant = markers
            .get(marker)
            .map(TimeMarker::instant)
            .ok_or_else(|| ModelError::not_found(EntityKind::Marker, &marker.to_string()))?;

        let index = self
            .intervals
            .iter()
            .position(|interval| {
                interval
                    .span(markers)
                    .is_some_and(|span| span.start < instant && instant < span.end)
            })
            .ok_or_else(|| ModelError::NoCoveringInterval {
                channel: self.name.clone(),
                instant,
            })?;

        let parent = &self.intervals[index];
        let left = self.child_name(&format!("{}_a", parent.name()), index);
        let right = self.child_name(&format!("{}_b", parent.name()), index);
        let children = parent.split_at(marker, left, right);
        self.intervals.splice(index..=index, children);
        Ok(())
    }

    /// Merges the two intervals meeting at `marker`. The earlier interval
    /// survives with its value and is stretched over the later one.
    pub(crate) fn delete_marker(
        &mut self,
        marker: MarkerId,
        markers: &Registry<MarkerId, TimeMarker>,
    ) -> Result<(), ModelError> {
        let is_outer = self.intervals.first().is_some_and(|first| first.start() == marker)
            || self.intervals.last().is_some_and(|last| last.end() == marker);
        if is_outer {
            return Err(ModelError::Anchor {
                name: markers.name_of(marker),
            });
        }

        let index = self
            .intervals
            .windows(2)
            .position(|pair| pair[0].end() == marker && pair[1].start() == marker)
            .ok_or_else(|| ModelError::BoundaryNotFound {
                channel: self.name.clone(),
                marker: markers.name_of(marker),
            })?;

        let later = self.intervals.remove(index + 1);
        let stem = split_stem(self.intervals[index].name(), later.name());
        let restore = stem.filter(|stem| !self.intervals.iter().any(|iv| iv.name() == stem));
        let earlier = &mut self.intervals[index];
        earlier.extend_to(later.end());
        if let Some(stem) = restore {
            earlier.set_name(stem);
        }
        Ok(())
    }

    /// Whether any interval is bound to `quantity`.
    pub fn references(&self, quantity: QuantityId) -> bool {
        self.intervals
            .iter()
            .any(|interval| interval.value() == quantity)
    }

    pub fn reference_count(&self, quantity: QuantityId) -> usize {
        self.intervals
            .iter()
            .filter(|interval| interval.value() == quantity)
            .count()
    }

    /// Rebinds every interval valued by `from` to `to`, ignoring locks.
    pub(crate) fn repoint(&mut self, from: QuantityId, to: QuantityId) -> usize {
        let mut count = 0;
        for interval in &mut self.intervals {
            if interval.value() == from {
                interval.rebind(to);
                count += 1;
            }
        }
        count
    }

    /// Checks the partition against the anchors and the full marker set.
    pub fn check_partition(
        &self,
        start: MarkerId,
        end: MarkerId,
        markers: &Registry<MarkerId, TimeMarker>,
    ) -> Result<(), ModelError> {
        let boundary = |marker: MarkerId| ModelError::BoundaryNotFound {
            channel: self.name.clone(),
            marker: markers.name_of(marker),
        };

        let (Some(first), Some(last)) = (self.intervals.first(), self.intervals.last()) else {
            return Err(boundary(start));
        };
        if first.start() != start {
            return Err(boundary(start));
        }
        if last.end() != end {
            return Err(boundary(end));
        }

        let mut names = HashSet::new();
        for (i, interval) in self.intervals.iter().enumerate() {
            if !names.insert(interval.name()) {
                return Err(ModelError::name_conflict(EntityKind::Interval, interval.name()));
            }
            let span = interval
                .span(markers)
                .ok_or_else(|| boundary(interval.start()))?;
            if span.start >= span.end {
                return Err(ModelError::NoCoveringInterval {
                    channel: self.name.clone(),
                    instant: span.start,
                });
            }
            if let Some(next) = self.intervals.get(i + 1) {
                if interval.end() != next.start() {
                    return Err(ModelError::NoCoveringInterval {
                        channel: self.name.clone(),
                        instant: span.end,
                    });
                }
            }
        }

        // every registered marker must be a boundary of every channel
        for marker in markers.ids() {
            let used = marker == start || self.intervals.iter().any(|iv| iv.end() == marker);
            if !used {
                return Err(boundary(marker));
            }
        }
        Ok(())
    }

    fn child_name(&self, base: &str, parent: usize) -> String {
        let taken = |name: &str| {
            self.intervals
                .iter()
                .enumerate()
                .any(|(i, iv)| i != parent && iv.name() == name)
        };
        if taken(base) {
            unique_suffixed(base, taken)
        } else {
            base.to_string()
        }
    }
}

/// `"x"` when the pair is exactly `"x_a"`, `"x_b"`.
fn split_stem(earlier: &str, later: &str) -> Option<String> {
    let stem = earlier.strip_suffix("_a")?;
    (later.strip_suffix("_b")? == stem).then(|| stem.to_string())
}
