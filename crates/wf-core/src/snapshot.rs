//! Flat, name-based view of a timeline for persistence.
//!
//! Records refer to markers and quantities by name, never by handle. Loading
//! rebuilds markers first, then quantities, then channels, and re-validates
//! every invariant before handing the timeline out.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::channel::Channel;
use crate::error::ModelError;
use crate::interval::Interval;
use crate::marker::{END, START, TimeMarker};
use crate::quantity::Quantity;
use crate::registry::Registry;
use crate::timeline::{Timeline, check_bindable};
use crate::types::{EntityKind, Mode, validate_name};

/// A complete program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramSnapshot {
    pub markers: Vec<MarkerRecord>,
    pub quantities: Vec<QuantityRecord>,
    pub channels: Vec<ChannelRecord>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub name: String,
    pub instant: i64,
    #[serde(default)]
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityRecord {
    pub name: String,
    pub mode: Mode,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default)]
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub name: String,
    pub intervals: Vec<IntervalRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub name: String,
    pub start: String,
    pub end: String,
    pub value: String,
    #[serde(default)]
    pub locked: bool,
}

impl Timeline {
    /// The persistence view of the current state.
    pub fn snapshot(&self) -> ProgramSnapshot {
        let markers = self
            .markers_by_time()
            .into_iter()
            .map(|(_, marker)| MarkerRecord {
                name: marker.name().to_string(),
                instant: marker.instant(),
                locked: marker.is_locked(),
            })
            .collect();

        let quantities = self
            .quantities
            .iter()
            .map(|(_, quantity)| QuantityRecord {
                name: quantity.name().to_string(),
                mode: quantity.mode(),
                value: quantity.constant_value(),
                expression: quantity.expression_text().map(str::to_string),
                locked: quantity.is_locked(),
            })
            .collect();

        let channels = self
            .channels
            .iter()
            .map(|channel| ChannelRecord {
                name: channel.name().to_string(),
                intervals: channel
                    .intervals()
                    .iter()
                    .map(|interval| IntervalRecord {
                        name: interval.name().to_string(),
                        start: self.markers.name_of(interval.start()),
                        end: self.markers.name_of(interval.end()),
                        value: self.quantities.name_of(interval.value()),
                        locked: interval.is_locked(),
                    })
                    .collect(),
            })
            .collect();

        ProgramSnapshot {
            markers,
            quantities,
            channels,
            variables: self.variables.clone(),
        }
    }

    /// Rebuilds a timeline from a snapshot. Any structural problem fails the
    /// whole load with [`ModelError::InvalidSnapshot`].
    pub fn from_snapshot(snapshot: &ProgramSnapshot) -> Result<Self, ModelError> {
        let invalid = |err: ModelError| ModelError::invalid_snapshot(err.to_string());

        let mut markers: Registry<_, TimeMarker> = Registry::new();
        for record in &snapshot.markers {
            check_bindable(EntityKind::Marker, &record.name).map_err(invalid)?;
            let mut marker = TimeMarker::new(&record.name, record.instant);
            marker.set_locked(record.locked);
            markers.insert(marker).map_err(invalid)?;
        }
        let anchor = |name: &str| {
            markers
                .id_of(name)
                .ok_or_else(|| ModelError::invalid_snapshot(format!("missing anchor marker {name:?}")))
        };
        let (start, end) = (anchor(START)?, anchor(END)?);
        for id in [start, end] {
            if let Some(anchor) = markers.get_mut(id) {
                if !anchor.is_locked() {
                    warn!(marker = anchor.name(), "anchor marker was unlocked, locking");
                    anchor.set_locked(true);
                }
            }
        }

        let mut quantities = Registry::new();
        for record in &snapshot.quantities {
            let quantity = quantity_from_record(record).map_err(invalid)?;
            quantities.insert(quantity).map_err(invalid)?;
        }

        let mut channels = Vec::with_capacity(snapshot.channels.len());
        for record in &snapshot.channels {
            validate_name(EntityKind::Channel, &record.name).map_err(invalid)?;
            let mut intervals = Vec::with_capacity(record.intervals.len());
            for item in &record.intervals {
                validate_name(EntityKind::Interval, &item.name).map_err(invalid)?;
                let start = markers.named(&item.start).map_err(invalid)?.0;
                let end = markers.named(&item.end).map_err(invalid)?.0;
                let value = quantities.named(&item.value).map_err(invalid)?.0;
                let mut interval = Interval::new(&item.name, start, end, value);
                interval.set_locked(item.locked);
                intervals.push(interval);
            }
            channels.push(Channel::from_intervals(record.name.clone(), intervals));
        }

        for (name, value) in &snapshot.variables {
            check_bindable(EntityKind::Variable, name).map_err(invalid)?;
            if !value.is_finite() {
                return Err(ModelError::invalid_snapshot(format!(
                    "variable {name:?} has invalid value {value}"
                )));
            }
        }

        let mut timeline = Self::from_parts(
            markers,
            quantities,
            channels,
            snapshot.variables.clone(),
            (start, end),
        );
        timeline.validate().map_err(invalid)?;

        let unused = timeline.garbage_collect_quantities();
        if !unused.is_empty() {
            warn!(quantities = ?unused, "dropped unreferenced quantities while loading");
        }
        Ok(timeline)
    }
}

fn quantity_from_record(record: &QuantityRecord) -> Result<Quantity, ModelError> {
    check_bindable(EntityKind::Quantity, &record.name)?;
    if !record.value.is_finite() {
        return Err(ModelError::OutOfRange {
            subject: format!("quantity {}", record.name),
            value: record.value,
            lower: None,
            upper: None,
        });
    }

    let mut quantity = Quantity::constant(&record.name, record.value);
    if record.mode == Mode::Function {
        let text = record.expression.as_deref().ok_or_else(|| {
            ModelError::invalid_snapshot(format!(
                "function quantity {:?} has no expression",
                record.name
            ))
        })?;
        quantity.set_expression(text)?;
    }
    quantity.set_locked(record.locked);
    Ok(quantity)
}
