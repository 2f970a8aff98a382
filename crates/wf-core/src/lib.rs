//! Timeline and value model for multi-channel waveform programs.
//!
//! This crate contains:
//! - Markers: named instants in integer nanoseconds, with locked `start`/`end` anchors
//! - Quantities: shared constant or expression-valued scalars
//! - Channels: gapless partitions of the timeline into intervals bound to quantities
//! - Timeline: the coordinator that keeps every partition consistent across edits
//! - A sandboxed expression language for function-mode quantities

mod change;
mod channel;
mod error;
pub mod expr;
mod interval;
mod marker;
mod quantity;
pub mod registry;
mod snapshot;
mod timeline;
mod types;

pub use change::Change;
pub use channel::{Channel, INITIAL_INTERVAL};
pub use error::ModelError;
pub use interval::Interval;
pub use marker::{END, NS_PER_SECOND, START, TimeMarker, to_seconds};
pub use quantity::{Quantity, Source};
pub use registry::Registry;
pub use snapshot::{ChannelRecord, IntervalRecord, MarkerRecord, ProgramSnapshot, QuantityRecord};
pub use timeline::{INITIAL_QUANTITY, Timeline, ValueRange};
pub use types::{EntityKind, MarkerId, Mode, QuantityId};
