//! Location track records.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::geometry::{BoundingBox, TrackGeometry};
use crate::ids::{LocationTrackId, TrackNumberId};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationTrackState {
    Built,
    InUse,
    NotInUse,
    Deleted,
}

impl LocationTrackState {
    /// A removed track no longer exists in the layout.
    pub fn is_removed(self) -> bool {
        matches!(self, LocationTrackState::Deleted)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationTrackType {
    Main,
    Side,
    Trap,
    Chord,
}

/// Whether the track ends are topologically attached to other tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TopologicalConnectivity {
    None,
    Start,
    End,
    StartAndEnd,
}

impl TopologicalConnectivity {
    pub fn of(start_connected: bool, end_connected: bool) -> Self {
        match (start_connected, end_connected) {
            (true, true) => TopologicalConnectivity::StartAndEnd,
            (true, false) => TopologicalConnectivity::Start,
            (false, true) => TopologicalConnectivity::End,
            (false, false) => TopologicalConnectivity::None,
        }
    }

    pub fn is_start_connected(self) -> bool {
        matches!(
            self,
            TopologicalConnectivity::Start | TopologicalConnectivity::StartAndEnd
        )
    }

    pub fn is_end_connected(self) -> bool {
        matches!(
            self,
            TopologicalConnectivity::End | TopologicalConnectivity::StartAndEnd
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DescriptionSuffix {
    #[default]
    None,
    SwitchToSwitch,
    SwitchToBufferStop,
}

/// Description base text plus a generated suffix.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DescriptionStructure {
    pub base: String,
    pub suffix: DescriptionSuffix,
}

impl DescriptionStructure {
    pub fn new(base: impl Into<String>, suffix: DescriptionSuffix) -> Self {
        Self {
            base: base.into(),
            suffix,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationTrack {
    /// `None` until the track has been saved.
    pub id: Option<LocationTrackId>,
    pub name: String,
    pub description: DescriptionStructure,
    pub track_number_id: TrackNumberId,
    pub state: LocationTrackState,
    pub track_type: LocationTrackType,
    pub source_id: Option<String>,
    pub duplicate_of: Option<LocationTrackId>,
    pub topological_connectivity: TopologicalConnectivity,
    pub bounding_box: Option<BoundingBox>,
    pub length: f64,
    pub segment_count: usize,
}

impl LocationTrack {
    /// Recomputes the geometry-derived fields from `geometry`.
    #[must_use]
    pub fn with_geometry(mut self, geometry: &TrackGeometry) -> Self {
        self.bounding_box = geometry.bounding_box();
        self.length = geometry.length();
        self.segment_count = geometry.segment_count();
        self
    }

    pub fn is_duplicate_of(&self, id: LocationTrackId) -> bool {
        self.duplicate_of == Some(id)
    }
}
