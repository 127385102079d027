//! Error types for layout geometry and the split engine

use thiserror::Error;

use crate::ids::{JointNumber, LocationTrackId, SwitchId};

/// Structural problems in a track geometry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// A geometry must have at least one edge
    #[error("geometry has no edges")]
    NoEdges,

    /// Every edge must carry at least one segment
    #[error("edge {0} has no segments")]
    EmptyEdge(usize),

    #[error("segment needs at least two points, got {0}")]
    TooFewPoints(usize),

    /// Consecutive edges must meet within the coordinate tolerance
    #[error("edges {index} and {next} are not contiguous (gap {gap:.3} m)")]
    NotContiguous { index: usize, next: usize, gap: f64 },
}

/// Usage errors raised by the split engine.
///
/// These are fail-fast: the request is malformed and retrying it will not help.
/// Each variant has a stable key so callers can localize the message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SplitError {
    #[error("split request has no targets")]
    NoTargets,

    #[error("the first split target must start at the beginning of the track")]
    FirstTargetHasStartSwitch,

    #[error("split target {target_index} has no start switch")]
    MissingStartSwitch { target_index: usize },

    /// The requested switch joint is not an inner link on an edge boundary,
    /// or it appears before the previous split point.
    #[error("failed to map split switch {switch_name} ({switch_id}) joint {joint} to an edge boundary")]
    SwitchSegmentMappingFailed {
        switch_id: SwitchId,
        joint: JointNumber,
        switch_name: String,
    },

    #[error("edges were not fully allocated to split targets: {0}")]
    SegmentAllocationFailed(String),

    #[error("cannot connect edge ending at ({x:.3}, {y:.3}) within {max_adjustment} m")]
    EdgeConnectionFailed { x: f64, y: f64, max_adjustment: f64 },

    #[error("no split target overlaps duplicate track {0}")]
    DuplicateReassignmentFailed(LocationTrackId),

    #[error("invalid geometry: {0}")]
    Geometry(#[from] GeometryError),
}

impl SplitError {
    /// Stable key identifying the failure kind.
    pub fn key(&self) -> &'static str {
        match self {
            SplitError::NoTargets => "no-targets",
            SplitError::FirstTargetHasStartSwitch => "first-target-has-start-switch",
            SplitError::MissingStartSwitch { .. } => "missing-start-switch",
            SplitError::SwitchSegmentMappingFailed { .. } => "switch-segment-mapping-failed",
            SplitError::SegmentAllocationFailed(_) => "segment-allocation-failed",
            SplitError::EdgeConnectionFailed { .. } => "edge-connection-failed",
            SplitError::DuplicateReassignmentFailed(_) => {
                "new-duplicate-reference-assignment-failed"
            }
            SplitError::Geometry(_) => "invalid-geometry",
        }
    }
}

/// Result type alias for split operations
pub type Result<T> = std::result::Result<T, SplitError>;
