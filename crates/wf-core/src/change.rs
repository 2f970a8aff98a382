//! Notifications queued for presentation layers.

/// Something a view of the timeline may need to refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// A marker moved, was renamed, or a variable changed: anything derived
    /// from marker positions or bound names is stale.
    TimelineChanged,
    /// A quantity's value, expression or mode changed.
    ValueChanged {
        quantity: String,
        channels: Vec<String>,
    },
    /// Intervals were split, merged, renamed or rebound.
    StructureChanged { channels: Vec<String> },
}
