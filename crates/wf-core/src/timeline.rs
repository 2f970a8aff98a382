//! The coordinator owning markers, quantities and channels.
//!
//! Every mutation goes through [`Timeline`] so that the partition and
//! garbage-collection invariants hold after each call. Operations touching
//! several channels back up the partitions first and restore them if any
//! channel fails, so a rejected call leaves the model exactly as it was.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, error, trace};

use crate::change::Change;
use crate::channel::Channel;
use crate::error::ModelError;
use crate::expr::{Bindings, TIME_ARG};
use crate::interval::Interval;
use crate::marker::{END, START, TimeMarker, neighborhood, ns_as_f64, round_instant, to_seconds};
use crate::quantity::{Quantity, Source};
use crate::registry::Registry;
use crate::types::{EntityKind, MarkerId, QuantityId, unique_suffixed, validate_name};

/// Name of the quantity new channels are valued with.
pub const INITIAL_QUANTITY: &str = "initial";

/// Vertical extent for drawing a channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    /// Pads the observed extremes. The range always has positive height and
    /// includes zero when every value is non-negative.
    pub fn scaled(min: f64, max: f64) -> Self {
        let top = if max == 0.0 { 1.0 } else { 1.25 * max };
        let bottom = if min >= 0.0 { 0.0 } else { 1.25 * min };
        let top = if top <= bottom { 0.0 } else { top };
        Self { min: bottom, max: top }
    }
}

/// A waveform program: anchors, markers, quantities, channels and variables.
#[derive(Debug, Clone)]
pub struct Timeline {
    pub(crate) markers: Registry<MarkerId, TimeMarker>,
    pub(crate) quantities: Registry<QuantityId, Quantity>,
    pub(crate) channels: Vec<Channel>,
    pub(crate) variables: IndexMap<String, f64>,
    pub(crate) start: MarkerId,
    pub(crate) end: MarkerId,
    revision: u64,
    changes: Vec<Change>,
}

impl Timeline {
    /// An empty program spanning `[0, end_instant)`.
    pub fn new(end_instant: i64) -> Result<Self, ModelError> {
        if end_instant <= 0 {
            return Err(ModelError::OutOfRange {
                subject: format!("marker {END}"),
                value: ns_as_f64(end_instant),
                lower: Some(0),
                upper: None,
            });
        }
        let mut markers = Registry::new();
        let start = markers.insert(TimeMarker::anchor(START, 0))?;
        let end = markers.insert(TimeMarker::anchor(END, end_instant))?;
        Ok(Self::from_parts(
            markers,
            Registry::new(),
            Vec::new(),
            IndexMap::new(),
            (start, end),
        ))
    }

    /// A program whose channels all start on one shared `initial` quantity.
    pub fn with_channels<S: AsRef<str>>(
        end_instant: i64,
        channels: &[S],
        initial_value: f64,
    ) -> Result<Self, ModelError> {
        let mut timeline = Self::new(end_instant)?;
        timeline.add_constant(INITIAL_QUANTITY, initial_value)?;
        for name in channels {
            timeline.add_channel(name.as_ref(), INITIAL_QUANTITY)?;
        }
        timeline.changes.clear();
        Ok(timeline)
    }

    pub(crate) const fn from_parts(
        markers: Registry<MarkerId, TimeMarker>,
        quantities: Registry<QuantityId, Quantity>,
        channels: Vec<Channel>,
        variables: IndexMap<String, f64>,
        (start, end): (MarkerId, MarkerId),
    ) -> Self {
        Self {
            markers,
            quantities,
            channels,
            variables,
            start,
            end,
            revision: 0,
            changes: Vec::new(),
        }
    }

    // === Accessors ===

    pub const fn start(&self) -> MarkerId {
        self.start
    }

    pub const fn end(&self) -> MarkerId {
        self.end
    }

    pub fn start_instant(&self) -> i64 {
        self.instant_of(self.start)
    }

    pub fn end_instant(&self) -> i64 {
        self.instant_of(self.end)
    }

    pub fn is_anchor(&self, marker: MarkerId) -> bool {
        marker == self.start || marker == self.end
    }

    pub const fn markers(&self) -> &Registry<MarkerId, TimeMarker> {
        &self.markers
    }

    /// Markers in time order.
    pub fn markers_by_time(&self) -> Vec<(MarkerId, &TimeMarker)> {
        let mut markers: Vec<_> = self.markers.iter().collect();
        markers.sort_by_key(|(_, marker)| marker.instant());
        markers
    }

    pub const fn quantities(&self) -> &Registry<QuantityId, Quantity> {
        &self.quantities
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub const fn variables(&self) -> &IndexMap<String, f64> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<f64> {
        self.variables.get(name).copied()
    }

    /// Incremented by every successful mutation.
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Takes the notifications queued since the last drain.
    pub fn drain_changes(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.changes)
    }

    // === Name lookups ===

    pub fn marker_named(&self, name: &str) -> Result<&TimeMarker, ModelError> {
        self.markers.named(name).map(|(_, marker)| marker)
    }

    pub fn marker_id(&self, name: &str) -> Result<MarkerId, ModelError> {
        self.markers.named(name).map(|(id, _)| id)
    }

    pub fn quantity_named(&self, name: &str) -> Result<&Quantity, ModelError> {
        self.quantities.named(name).map(|(_, quantity)| quantity)
    }

    pub fn quantity_id(&self, name: &str) -> Result<QuantityId, ModelError> {
        self.quantities.named(name).map(|(id, _)| id)
    }

    pub fn channel_named(&self, name: &str) -> Result<&Channel, ModelError> {
        let index = self.channel_index(name)?;
        Ok(&self.channels[index])
    }

    /// The quantity an interval is currently bound to.
    pub fn quantity_of(&self, channel: &str, interval: &str) -> Result<&Quantity, ModelError> {
        let interval = self.channel_named(channel)?.interval_named(interval)?;
        self.quantity_for(interval)
    }

    /// Number of intervals, across all channels, bound to `quantity`.
    pub fn reference_count(&self, quantity: QuantityId) -> usize {
        self.channels
            .iter()
            .map(|channel| channel.reference_count(quantity))
            .sum()
    }

    // === Channels and quantities ===

    /// Adds a channel valued everywhere by `quantity`, split at every
    /// existing marker.
    pub fn add_channel(&mut self, name: &str, quantity: &str) -> Result<(), ModelError> {
        validate_name(EntityKind::Channel, name)?;
        if self.channel_index(name).is_ok() {
            return Err(ModelError::name_conflict(EntityKind::Channel, name));
        }
        let value = self.quantity_id(quantity)?;

        let mut channel = Channel::new(name.to_string(), self.start, self.end, value);
        for (id, _) in self.markers_by_time() {
            if !self.is_anchor(id) {
                channel.insert_marker(id, &self.markers).map_err(logged)?;
            }
        }

        self.channels.push(channel);
        debug!(channel = name, quantity, "added channel");
        self.record(Change::StructureChanged {
            channels: vec![name.to_string()],
        });
        Ok(())
    }

    /// Registers a quantity. It is garbage until an interval is bound to it.
    pub fn add_quantity(&mut self, quantity: Quantity) -> Result<QuantityId, ModelError> {
        check_bindable(EntityKind::Quantity, quantity.name())?;
        let name = quantity.name().to_string();
        let id = self.quantities.insert(quantity)?;
        debug!(quantity = %name, "added quantity");
        self.revision += 1;
        Ok(id)
    }

    pub fn add_constant(&mut self, name: &str, value: f64) -> Result<QuantityId, ModelError> {
        if !value.is_finite() {
            return Err(ModelError::OutOfRange {
                subject: format!("quantity {name}"),
                value,
                lower: None,
                upper: None,
            });
        }
        self.add_quantity(Quantity::constant(name, value))
    }

    pub fn add_function(&mut self, name: &str, text: &str) -> Result<QuantityId, ModelError> {
        self.add_quantity(Quantity::function(name, text)?)
    }

    // === Markers ===

    /// Creates a marker and splits every channel at it.
    pub fn insert_time(&mut self, name: &str, instant: i64) -> Result<MarkerId, ModelError> {
        check_bindable(EntityKind::Marker, name)?;
        if self.markers.contains_name(name) {
            return Err(ModelError::name_conflict(EntityKind::Marker, name));
        }
        let (lower, upper) = (self.start_instant(), self.end_instant());
        let occupied = self.markers.iter().any(|(_, m)| m.instant() == instant);
        if occupied || instant <= lower || instant >= upper {
            let subject = if occupied {
                format!("marker {name} (instant already marked)")
            } else {
                format!("marker {name}")
            };
            return Err(ModelError::OutOfRange {
                subject,
                value: ns_as_f64(instant),
                lower: Some(lower),
                upper: Some(upper),
            });
        }

        let id = self.markers.insert(TimeMarker::new(name, instant))?;
        let backup = self.channels.clone();
        let result = self
            .channels
            .iter_mut()
            .try_for_each(|channel| channel.insert_marker(id, &self.markers));
        if let Err(err) = result {
            self.channels = backup;
            self.markers.remove(id);
            return Err(logged(err));
        }

        debug!(marker = name, instant, "inserted time marker");
        self.record(Change::TimelineChanged);
        self.structure_changed_everywhere();
        Ok(id)
    }

    /// Deletes a marker, merging the intervals on either side of it in every
    /// channel, then collects quantities left unused.
    pub fn delete_time(&mut self, name: &str) -> Result<(), ModelError> {
        let (id, marker) = self.markers.named(name)?;
        if self.is_anchor(id) {
            return Err(ModelError::Anchor {
                name: name.to_string(),
            });
        }
        if marker.is_locked() {
            return Err(ModelError::locked(EntityKind::Marker, name));
        }

        let backup = self.channels.clone();
        let result = self
            .channels
            .iter_mut()
            .try_for_each(|channel| channel.delete_marker(id, &self.markers));
        if let Err(err) = result {
            self.channels = backup;
            return Err(logged(err));
        }

        let collected = self.garbage_collect_quantities();
        self.markers.remove(id);
        debug!(marker = name, ?collected, "deleted time marker");
        self.record(Change::TimelineChanged);
        self.structure_changed_everywhere();
        Ok(())
    }

    /// Moves a marker strictly between its neighbours, rounding to whole
    /// nanoseconds. Returns whether the move was applied; non-strict calls
    /// ignore rejected moves.
    pub fn set_time(&mut self, name: &str, instant: f64, strict: bool) -> Result<bool, ModelError> {
        let (id, marker) = self.markers.named(name)?;
        if marker.is_locked() {
            return ModelError::locked(EntityKind::Marker, name).reject(strict);
        }

        let instants: Vec<i64> = self.markers.iter().map(|(_, m)| m.instant()).collect();
        let (lower, upper) = neighborhood(&instants, marker.instant());
        let accepted = round_instant(instant).filter(|&candidate| {
            lower.is_none_or(|lo| lo < candidate) && upper.is_none_or(|hi| candidate < hi)
        });
        let Some(accepted) = accepted else {
            return ModelError::OutOfRange {
                subject: format!("marker {name}"),
                value: instant,
                lower,
                upper,
            }
            .reject(strict);
        };

        if let Some(marker) = self.markers.get_mut(id) {
            marker.set_instant(accepted);
        }
        debug!(marker = name, instant = accepted, "moved time marker");
        self.record(Change::TimelineChanged);
        Ok(true)
    }

    /// Changes the program length. The `end` anchor stays locked against
    /// ordinary moves; this is the only way to reposition it, and it must
    /// stay after every other marker.
    pub fn set_end_instant(&mut self, instant: i64) -> Result<(), ModelError> {
        let end = self.end;
        let latest = self
            .markers
            .iter()
            .filter(|(id, _)| *id != end)
            .map(|(_, marker)| marker.instant())
            .max();
        if latest.is_some_and(|latest| instant <= latest) {
            return Err(ModelError::OutOfRange {
                subject: format!("marker {END}"),
                value: ns_as_f64(instant),
                lower: latest,
                upper: None,
            });
        }

        if let Some(marker) = self.markers.get_mut(end) {
            marker.set_instant(instant);
        }
        debug!(instant, "changed program length");
        self.record(Change::TimelineChanged);
        Ok(())
    }

    pub fn rename_marker(&mut self, name: &str, new_name: &str) -> Result<(), ModelError> {
        let (id, marker) = self.markers.named(name)?;
        if marker.is_locked() {
            return Err(ModelError::locked(EntityKind::Marker, name));
        }
        if name == new_name {
            return Ok(());
        }
        check_bindable(EntityKind::Marker, new_name)?;
        if self.markers.contains_name(new_name) {
            return Err(ModelError::name_conflict(EntityKind::Marker, new_name));
        }

        if let Some(marker) = self.markers.get_mut(id) {
            marker.set_name(new_name.to_string());
        }
        debug!(marker = name, new_name, "renamed time marker");
        self.record(Change::TimelineChanged);
        Ok(())
    }

    /// Locks or unlocks a marker. The anchors cannot be unlocked.
    pub fn set_marker_locked(&mut self, name: &str, locked: bool) -> Result<(), ModelError> {
        let id = self.marker_id(name)?;
        if self.is_anchor(id) && !locked {
            return Err(ModelError::Anchor {
                name: name.to_string(),
            });
        }
        if let Some(marker) = self.markers.get_mut(id) {
            marker.set_locked(locked);
        }
        self.revision += 1;
        Ok(())
    }

    // === Quantity edits ===

    /// Sets a quantity's constant value. Returns whether it was applied;
    /// non-strict calls ignore locked or non-finite requests.
    pub fn set_quantity_value(
        &mut self,
        name: &str,
        value: f64,
        strict: bool,
    ) -> Result<bool, ModelError> {
        let id = self.quantity_id(name)?;
        let applied = match self.quantities.get_mut(id) {
            Some(quantity) => quantity.set_constant_value(value, strict)?,
            None => false,
        };
        if applied {
            debug!(quantity = name, value, "set quantity value");
            self.value_changed(id);
        }
        Ok(applied)
    }

    /// Switches a quantity to function mode with a new expression.
    pub fn set_quantity_expression(&mut self, name: &str, text: &str) -> Result<(), ModelError> {
        let id = self.quantity_id(name)?;
        if let Some(quantity) = self.quantities.get_mut(id) {
            quantity.set_expression(text)?;
        }
        debug!(quantity = name, expression = text, "set quantity expression");
        self.value_changed(id);
        Ok(())
    }

    /// Switches a quantity back to its retained constant.
    pub fn set_constant_mode(&mut self, name: &str) -> Result<(), ModelError> {
        let id = self.quantity_id(name)?;
        if let Some(quantity) = self.quantities.get_mut(id) {
            quantity.set_constant_mode()?;
        }
        self.value_changed(id);
        Ok(())
    }

    pub fn rename_quantity(&mut self, name: &str, new_name: &str) -> Result<(), ModelError> {
        let (id, quantity) = self.quantities.named(name)?;
        if quantity.is_locked() {
            return Err(ModelError::locked(EntityKind::Quantity, name));
        }
        if name == new_name {
            return Ok(());
        }
        check_bindable(EntityKind::Quantity, new_name)?;
        if self.quantities.contains_name(new_name) {
            return Err(ModelError::name_conflict(EntityKind::Quantity, new_name));
        }

        if let Some(quantity) = self.quantities.get_mut(id) {
            quantity.set_name(new_name.to_string());
        }
        debug!(quantity = name, new_name, "renamed quantity");
        self.record(Change::TimelineChanged);
        Ok(())
    }

    pub fn set_quantity_locked(&mut self, name: &str, locked: bool) -> Result<(), ModelError> {
        let id = self.quantity_id(name)?;
        if let Some(quantity) = self.quantities.get_mut(id) {
            quantity.set_locked(locked);
        }
        self.revision += 1;
        Ok(())
    }

    // === Interval edits ===

    pub fn rename_interval(
        &mut self,
        channel: &str,
        name: &str,
        new_name: &str,
    ) -> Result<(), ModelError> {
        let (ci, ii) = self.locate(channel, name)?;
        if self.channels[ci].intervals()[ii].is_locked() {
            return Err(ModelError::locked(EntityKind::Interval, name));
        }
        if name == new_name {
            return Ok(());
        }
        validate_name(EntityKind::Interval, new_name)?;
        if self.channels[ci].interval_index(new_name).is_ok() {
            return Err(ModelError::name_conflict(EntityKind::Interval, new_name));
        }

        if let Some(interval) = self.channels[ci].interval_mut(ii) {
            interval.set_name(new_name.to_string());
        }
        self.record(Change::StructureChanged {
            channels: vec![channel.to_string()],
        });
        Ok(())
    }

    pub fn set_interval_locked(
        &mut self,
        channel: &str,
        interval: &str,
        locked: bool,
    ) -> Result<(), ModelError> {
        let (ci, ii) = self.locate(channel, interval)?;
        if let Some(interval) = self.channels[ci].interval_mut(ii) {
            interval.set_locked(locked);
        }
        self.revision += 1;
        Ok(())
    }

    /// Gives the interval a private copy of its quantity if any other
    /// interval shares it. Returns the new quantity, or `None` when the
    /// quantity was not shared.
    pub fn fork_if_shared(
        &mut self,
        channel: &str,
        interval: &str,
    ) -> Result<Option<QuantityId>, ModelError> {
        let (ci, ii) = self.locate(channel, interval)?;
        let target = &self.channels[ci].intervals()[ii];
        if target.is_locked() {
            return Err(ModelError::locked(EntityKind::Interval, interval));
        }
        let shared = target.value();
        if self.reference_count(shared) <= 1 {
            return Ok(None);
        }

        let source = self.quantity_for(target)?;
        let name = unique_suffixed(source.name(), |taken| self.quantities.contains_name(taken));
        let copy = source.duplicate(name);
        let id = self.quantities.insert(copy)?;
        if let Some(target) = self.channels[ci].interval_mut(ii) {
            target.set_value(id)?;
        }

        debug!(
            channel,
            interval,
            from = %self.quantities.name_of(shared),
            to = %self.quantities.name_of(id),
            "forked shared quantity"
        );
        self.record(Change::StructureChanged {
            channels: vec![channel.to_string()],
        });
        Ok(Some(id))
    }

    /// Drags the interval's value: forks a shared quantity, then sets the
    /// constant, so only this interval's trace changes.
    pub fn drag_value(&mut self, channel: &str, interval: &str, value: f64) -> Result<(), ModelError> {
        let (ci, ii) = self.locate(channel, interval)?;
        let target = &self.channels[ci].intervals()[ii];
        if target.is_locked() {
            return Err(ModelError::locked(EntityKind::Interval, interval));
        }
        let current = target.value();
        let quantity = self.quantity_for(target)?;
        if quantity.is_locked() {
            return Err(ModelError::locked(EntityKind::Quantity, quantity.name()));
        }
        if !quantity.is_draggable() {
            return Err(ModelError::NotConstant {
                name: quantity.name().to_string(),
            });
        }
        if !value.is_finite() {
            return Err(ModelError::OutOfRange {
                subject: format!("quantity {}", quantity.name()),
                value,
                lower: None,
                upper: None,
            });
        }

        let id = match self.fork_if_shared(channel, interval)? {
            Some(forked) => forked,
            None => current,
        };
        if let Some(quantity) = self.quantities.get_mut(id) {
            quantity.set_constant_value(value, true)?;
        }
        self.value_changed(id);
        Ok(())
    }

    /// Binds the interval to another existing quantity, then collects the
    /// one it leaves behind if nothing else uses it.
    pub fn assign_value(
        &mut self,
        channel: &str,
        interval: &str,
        quantity: &str,
    ) -> Result<(), ModelError> {
        let id = self.quantity_id(quantity)?;
        let (ci, ii) = self.locate(channel, interval)?;
        if let Some(target) = self.channels[ci].interval_mut(ii) {
            target.set_value(id)?;
        }
        let collected = self.garbage_collect_quantities();
        debug!(channel, interval, quantity, ?collected, "assigned quantity");
        self.record(Change::StructureChanged {
            channels: vec![channel.to_string()],
        });
        Ok(())
    }

    /// Binds the interval to a fresh copy of its quantity called `new_name`.
    pub fn detach_value(
        &mut self,
        channel: &str,
        interval: &str,
        new_name: &str,
    ) -> Result<QuantityId, ModelError> {
        let (ci, ii) = self.locate(channel, interval)?;
        let target = &self.channels[ci].intervals()[ii];
        if target.is_locked() {
            return Err(ModelError::locked(EntityKind::Interval, interval));
        }
        check_bindable(EntityKind::Quantity, new_name)?;
        if self.quantities.contains_name(new_name) {
            return Err(ModelError::name_conflict(EntityKind::Quantity, new_name));
        }

        let copy = self.quantity_for(target)?.duplicate(new_name.to_string());
        let id = self.quantities.insert(copy)?;
        if let Some(target) = self.channels[ci].interval_mut(ii) {
            target.set_value(id)?;
        }
        let collected = self.garbage_collect_quantities();
        debug!(channel, interval, quantity = new_name, ?collected, "detached quantity");
        self.record(Change::StructureChanged {
            channels: vec![channel.to_string()],
        });
        Ok(id)
    }

    /// Repoints every interval bound to `absorb` at `keep`, then collects
    /// `absorb`. Merging a quantity with itself does nothing. Returns the
    /// number of intervals repointed.
    pub fn merge_quantities(&mut self, keep: &str, absorb: &str) -> Result<usize, ModelError> {
        let keep_id = self.quantity_id(keep)?;
        let (absorb_id, absorbed) = self.quantities.named(absorb)?;
        if keep_id == absorb_id {
            debug!(quantity = keep, "ignored self-merge");
            return Ok(0);
        }
        if absorbed.is_locked() {
            return Err(ModelError::locked(EntityKind::Quantity, absorb));
        }
        let locked = self
            .channels
            .iter()
            .flat_map(Channel::intervals)
            .find(|interval| interval.value() == absorb_id && interval.is_locked());
        if let Some(interval) = locked {
            return Err(ModelError::locked(EntityKind::Interval, interval.name()));
        }

        let affected: Vec<String> = self
            .channels
            .iter()
            .filter(|channel| channel.references(absorb_id))
            .map(|channel| channel.name().to_string())
            .collect();
        let repointed: usize = self
            .channels
            .iter_mut()
            .map(|channel| channel.repoint(absorb_id, keep_id))
            .sum();
        let collected = self.garbage_collect_quantities();

        debug!(keep, absorb, repointed, ?collected, "merged quantities");
        self.record(Change::StructureChanged {
            channels: affected.clone(),
        });
        self.record(Change::ValueChanged {
            quantity: keep.to_string(),
            channels: affected,
        });
        Ok(repointed)
    }

    /// Removes every quantity no interval is bound to. Returns their names.
    pub fn garbage_collect_quantities(&mut self) -> Vec<String> {
        let referenced: HashSet<QuantityId> = self
            .channels
            .iter()
            .flat_map(Channel::intervals)
            .map(Interval::value)
            .collect();
        let removed = self.quantities.retain_ids(|id| referenced.contains(&id));
        let names: Vec<String> = removed
            .into_iter()
            .map(|(_, quantity)| quantity.name().to_string())
            .collect();
        if !names.is_empty() {
            debug!(removed = ?names, "collected unused quantities");
            self.revision += 1;
        }
        names
    }

    // === Variables ===

    /// Sets an external variable visible to expressions.
    pub fn set_variable(&mut self, name: &str, value: f64) -> Result<(), ModelError> {
        check_bindable(EntityKind::Variable, name)?;
        if !value.is_finite() {
            return Err(ModelError::OutOfRange {
                subject: format!("variable {name}"),
                value,
                lower: None,
                upper: None,
            });
        }
        self.variables.insert(name.to_string(), value);
        debug!(variable = name, value, "set variable");
        self.record(Change::TimelineChanged);
        Ok(())
    }

    pub fn remove_variable(&mut self, name: &str) -> Result<f64, ModelError> {
        let value = self
            .variables
            .shift_remove(name)
            .ok_or_else(|| ModelError::not_found(EntityKind::Variable, name))?;
        self.record(Change::TimelineChanged);
        Ok(value)
    }

    // === Sampling ===

    /// Value of `channel` at integer nanosecond `instant` in `[start, end)`.
    pub fn value_at(&self, channel: &str, instant: i64) -> Result<f64, ModelError> {
        let found = self.channel_named(channel)?;
        let (lower, upper) = (self.start_instant(), self.end_instant());
        if instant < lower || instant >= upper {
            return Err(ModelError::OutOfRange {
                subject: format!("channel {channel}"),
                value: ns_as_f64(instant),
                lower: Some(lower),
                upper: Some(upper),
            });
        }
        let index = found
            .covering_index(instant, &self.markers)
            .ok_or_else(|| {
                logged(ModelError::NoCoveringInterval {
                    channel: channel.to_string(),
                    instant,
                })
            })?;
        self.quantity_for(&found.intervals()[index])?
            .sample(to_seconds(instant), self)
    }

    /// Value of a quantity at `t` seconds.
    pub fn sample_quantity(&self, name: &str, t: f64) -> Result<f64, ModelError> {
        self.quantity_named(name)?.sample(t, self)
    }

    /// One value per nanosecond tick of the interval's span.
    pub fn interval_samples(&self, channel: &str, interval: &str) -> Result<Vec<f64>, ModelError> {
        let interval = self.channel_named(channel)?.interval_named(interval)?;
        self.samples_over(interval)
    }

    /// One value per nanosecond tick of `[start, end)`.
    pub fn channel_samples(&self, channel: &str) -> Result<Vec<f64>, ModelError> {
        let found = self.channel_named(channel)?;
        let mut samples = Vec::new();
        for interval in found.intervals() {
            samples.extend(self.samples_over(interval)?);
        }
        Ok(samples)
    }

    /// Padded extent of the channel's values, for scaling a trace.
    pub fn display_range(&self, channel: &str) -> Result<ValueRange, ModelError> {
        let found = self.channel_named(channel)?;
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        for interval in found.intervals() {
            let quantity = self.quantity_for(interval)?;
            // constants ignore the ticks
            let ticks = match quantity.source() {
                Source::Constant => Vec::new(),
                Source::Function(_) => self.ticks(interval)?,
            };
            if let Some(value) = quantity.max_over(&ticks, self)? {
                max = max.max(value);
            }
            if let Some(value) = quantity.min_over(&ticks, self)? {
                min = min.min(value);
            }
        }
        if min > max {
            (min, max) = (0.0, 0.0);
        }
        Ok(ValueRange::scaled(min, max))
    }

    // === Invariants ===

    /// Checks every structural invariant: anchors, partitions, references
    /// and names.
    pub fn validate(&self) -> Result<(), ModelError> {
        let start = self
            .markers
            .get(self.start)
            .ok_or_else(|| ModelError::not_found(EntityKind::Marker, START))?;
        let end = self
            .markers
            .get(self.end)
            .ok_or_else(|| ModelError::not_found(EntityKind::Marker, END))?;
        if start.instant() >= end.instant() {
            return Err(ModelError::OutOfRange {
                subject: format!("marker {END}"),
                value: ns_as_f64(end.instant()),
                lower: Some(start.instant()),
                upper: None,
            });
        }

        let mut names = HashSet::new();
        for channel in &self.channels {
            if !names.insert(channel.name()) {
                return Err(ModelError::name_conflict(EntityKind::Channel, channel.name()));
            }
            channel.check_partition(self.start, self.end, &self.markers)?;
            for interval in channel.intervals() {
                self.quantity_for(interval)?;
            }
        }
        Ok(())
    }

    // === Internals ===

    fn instant_of(&self, marker: MarkerId) -> i64 {
        self.markers.get(marker).map_or(0, TimeMarker::instant)
    }

    fn channel_index(&self, name: &str) -> Result<usize, ModelError> {
        self.channels
            .iter()
            .position(|channel| channel.name() == name)
            .ok_or_else(|| ModelError::not_found(EntityKind::Channel, name))
    }

    fn locate(&self, channel: &str, interval: &str) -> Result<(usize, usize), ModelError> {
        let ci = self.channel_index(channel)?;
        let ii = self.channels[ci].interval_index(interval)?;
        Ok((ci, ii))
    }

    fn quantity_for(&self, interval: &Interval) -> Result<&Quantity, ModelError> {
        self.quantities.get(interval.value()).ok_or_else(|| {
            ModelError::not_found(EntityKind::Quantity, &interval.value().to_string())
        })
    }

    fn ticks(&self, interval: &Interval) -> Result<Vec<f64>, ModelError> {
        let span = interval.span(&self.markers).ok_or_else(|| {
            ModelError::not_found(EntityKind::Marker, &interval.start().to_string())
        })?;
        Ok(span.map(to_seconds).collect())
    }

    fn samples_over(&self, interval: &Interval) -> Result<Vec<f64>, ModelError> {
        let ticks = self.ticks(interval)?;
        self.quantity_for(interval)?.sample_many(&ticks, self)
    }

    fn record(&mut self, change: Change) {
        trace!(?change, "queued change");
        self.revision += 1;
        self.changes.push(change);
    }

    fn structure_changed_everywhere(&mut self) {
        let channels = self
            .channels
            .iter()
            .map(|channel| channel.name().to_string())
            .collect();
        self.record(Change::StructureChanged { channels });
    }

    /// Queues a value change for `quantity` and for every function-mode
    /// quantity whose expression names it.
    fn value_changed(&mut self, quantity: QuantityId) {
        let name = self.quantities.name_of(quantity);
        let mut changed = vec![quantity];
        changed.extend(self.quantities.iter().filter_map(|(id, other)| {
            let depends = match other.source() {
                Source::Function(expr) => expr.depends_on(&name),
                Source::Constant => false,
            };
            (id != quantity && depends).then_some(id)
        }));

        for id in changed {
            let channels = self
                .channels
                .iter()
                .filter(|channel| channel.references(id))
                .map(|channel| channel.name().to_string())
                .collect();
            self.record(Change::ValueChanged {
                quantity: self.quantities.name_of(id),
                channels,
            });
        }
    }
}

impl Bindings for Timeline {
    /// Quantities bind to their constant value, markers to their instant in
    /// seconds, then console variables.
    fn lookup(&self, name: &str) -> Option<f64> {
        if let Some(quantity) = self.quantities.id_of(name).and_then(|id| self.quantities.get(id)) {
            return Some(quantity.constant_value());
        }
        if let Some(marker) = self.markers.id_of(name).and_then(|id| self.markers.get(id)) {
            return Some(marker.seconds());
        }
        self.variables.get(name).copied()
    }
}

/// Names bound in expressions must be valid and must not shadow `t`.
pub(crate) fn check_bindable(kind: EntityKind, name: &str) -> Result<(), ModelError> {
    validate_name(kind, name)?;
    if name == TIME_ARG {
        return Err(ModelError::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

fn logged(err: ModelError) -> ModelError {
    if err.is_invariant_violation() {
        error!(error = %err, "partition invariant violated");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_channels() -> Timeline {
        Timeline::with_channels(1000, &["x", "y"], 5.0).unwrap()
    }

    #[test]
    fn new_timeline_has_locked_anchors() {
        let timeline = Timeline::new(1000).unwrap();
        assert!(timeline.marker_named(START).unwrap().is_locked());
        assert_eq!(timeline.end_instant(), 1000);
        assert!(Timeline::new(0).is_err());
    }

    #[test]
    fn insert_time_rejects_occupied_and_outside_instants() {
        let mut timeline = two_channels();
        timeline.insert_time("mid", 400).unwrap();
        for instant in [0, 400, 1000, 1200, -5] {
            let err = timeline.insert_time("other", instant).unwrap_err();
            assert!(matches!(err, ModelError::OutOfRange { .. }), "{instant}");
        }
        assert!(matches!(
            timeline.insert_time("mid", 500),
            Err(ModelError::NameConflict { .. })
        ));
        timeline.validate().unwrap();
    }

    #[test]
    fn set_time_stays_between_neighbours() {
        let mut timeline = two_channels();
        timeline.insert_time("a", 200).unwrap();
        timeline.insert_time("b", 600).unwrap();

        assert!(timeline.set_time("a", 599.4, true).unwrap());
        assert_eq!(timeline.marker_named("a").unwrap().instant(), 599);

        let err = timeline.set_time("a", 599.6, true).unwrap_err();
        assert!(matches!(err, ModelError::OutOfRange { .. }));
        assert!(!timeline.set_time("a", 700.0, false).unwrap());
        assert_eq!(timeline.marker_named("a").unwrap().instant(), 599);
    }

    #[test]
    fn anchors_cannot_move_or_unlock() {
        let mut timeline = two_channels();
        assert!(matches!(
            timeline.set_time(END, 900.0, true),
            Err(ModelError::Locked { .. })
        ));
        assert!(matches!(
            timeline.set_marker_locked(START, false),
            Err(ModelError::Anchor { .. })
        ));
        assert!(matches!(
            timeline.delete_time(END),
            Err(ModelError::Anchor { .. })
        ));
    }

    #[test]
    fn bindings_prefer_quantities_then_markers_then_variables() {
        let mut timeline = two_channels();
        timeline.insert_time("mid", 500).unwrap();
        timeline.set_variable("gain", 3.0).unwrap();
        timeline.set_variable("initial", 99.0).unwrap();
        assert_eq!(timeline.lookup("initial"), Some(5.0));
        assert_eq!(timeline.lookup("mid"), Some(5e-7));
        assert_eq!(timeline.lookup("gain"), Some(3.0));
        assert_eq!(timeline.lookup("nothing"), None);
    }

    #[test]
    fn t_is_not_a_bindable_name() {
        let mut timeline = two_channels();
        assert!(matches!(
            timeline.set_variable("t", 1.0),
            Err(ModelError::InvalidName { .. })
        ));
        assert!(timeline.insert_time("t", 10).is_err());
    }

    #[test]
    fn added_channel_is_split_at_existing_markers() {
        let mut timeline = two_channels();
        timeline.insert_time("mid", 400).unwrap();
        timeline.add_channel("z", INITIAL_QUANTITY).unwrap();
        assert_eq!(timeline.channel_named("z").unwrap().intervals().len(), 2);
        timeline.validate().unwrap();
    }

    #[test]
    fn value_at_is_half_open() {
        let timeline = two_channels();
        assert!((timeline.value_at("x", 0).unwrap() - 5.0).abs() < f64::EPSILON);
        assert!((timeline.value_at("x", 999).unwrap() - 5.0).abs() < f64::EPSILON);
        assert!(matches!(
            timeline.value_at("x", 1000),
            Err(ModelError::OutOfRange { .. })
        ));
    }

    #[test]
    fn interval_samples_cover_its_span() {
        let mut timeline = Timeline::with_channels(10, &["x"], 5.0).unwrap();
        timeline.insert_time("mid", 4).unwrap();
        timeline.add_function("ramp", "t * 1e9").unwrap();
        timeline.assign_value("x", "initial_b", "ramp").unwrap();

        assert_eq!(timeline.quantity_of("x", "initial_b").unwrap().name(), "ramp");
        assert_eq!(
            timeline.interval_samples("x", "initial_a").unwrap(),
            vec![5.0; 4]
        );
        let ramp = timeline.interval_samples("x", "initial_b").unwrap();
        assert_eq!(ramp.len(), 6);
        assert!((ramp[0] - 4.0).abs() < 1e-9);
        assert!((ramp[5] - 9.0).abs() < 1e-9);
    }

    #[test]
    fn display_range_pads_extremes() {
        let mut timeline = two_channels();
        assert_eq!(
            timeline.display_range("x").unwrap(),
            ValueRange { min: 0.0, max: 6.25 }
        );
        timeline.set_quantity_value(INITIAL_QUANTITY, 0.0, true).unwrap();
        assert_eq!(
            timeline.display_range("x").unwrap(),
            ValueRange { min: 0.0, max: 1.0 }
        );
        timeline.set_quantity_value(INITIAL_QUANTITY, -2.0, true).unwrap();
        assert_eq!(
            timeline.display_range("x").unwrap(),
            ValueRange { min: -2.5, max: 0.0 }
        );
    }

    #[test]
    fn display_range_of_constants_does_not_walk_ticks() {
        // a tick vector over this span would not fit in memory
        let mut timeline = Timeline::with_channels(1 << 40, &["x"], 1.0).unwrap();
        timeline.insert_time("mid", 1 << 39).unwrap();
        timeline.drag_value("x", "initial_b", -4.0).unwrap();
        assert_eq!(
            timeline.display_range("x").unwrap(),
            ValueRange { min: -5.0, max: 1.25 }
        );
    }

    #[test]
    fn changes_are_queued_and_drained() {
        let mut timeline = two_channels();
        let revision = timeline.revision();
        timeline.set_quantity_value(INITIAL_QUANTITY, 2.0, true).unwrap();
        assert!(timeline.revision() > revision);
        assert_eq!(
            timeline.drain_changes(),
            vec![Change::ValueChanged {
                quantity: INITIAL_QUANTITY.to_string(),
                channels: vec!["x".to_string(), "y".to_string()],
            }]
        );
        assert!(timeline.drain_changes().is_empty());
    }

    #[test]
    fn dependent_quantities_are_notified() {
        let mut timeline = two_channels();
        timeline.add_function("wave", "initial * t").unwrap();
        timeline.assign_value("y", "initial", "wave").unwrap();
        timeline.drain_changes();
        timeline.set_quantity_value(INITIAL_QUANTITY, 2.0, true).unwrap();
        let changes = timeline.drain_changes();
        assert!(changes.contains(&Change::ValueChanged {
            quantity: "wave".to_string(),
            channels: vec!["y".to_string()],
        }));
    }
}
