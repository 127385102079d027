//! Types for the location track split engine.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::geometry::TrackGeometry;
use crate::ids::{JointNumber, SwitchId};
use crate::model::SplitTargetOperation;
use crate::track::{DescriptionStructure, LocationTrack};

/// Switch joint at which a split target starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPointSwitch {
    pub switch_id: SwitchId,
    /// Presentation joint of the switch structure.
    pub joint: JointNumber,
    /// Switch name, used in error messages.
    pub name: String,
}

impl SplitPointSwitch {
    #[must_use]
    pub fn new(switch_id: SwitchId, joint: JointNumber, name: impl Into<String>) -> Self {
        Self {
            switch_id,
            joint,
            name: name.into(),
        }
    }
}

/// What to do with an existing duplicate track that a target replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuplicateOperation {
    /// Replace the duplicate's geometry entirely with the split slice.
    Overwrite,
    /// Splice the split slice into the duplicate's own geometry.
    Transfer,
}

impl From<DuplicateOperation> for SplitTargetOperation {
    fn from(op: DuplicateOperation) -> Self {
        match op {
            DuplicateOperation::Overwrite => SplitTargetOperation::Overwrite,
            DuplicateOperation::Transfer => SplitTargetOperation::Transfer,
        }
    }
}

/// An existing duplicate of the source track that a target takes over.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitTargetDuplicate {
    pub operation: DuplicateOperation,
    pub track: LocationTrack,
    pub geometry: TrackGeometry,
}

/// One requested target of a split.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitTargetParams {
    pub name: String,
    pub description: DescriptionStructure,
    /// `None` only for the first target.
    pub start_switch: Option<SplitPointSwitch>,
    pub duplicate: Option<SplitTargetDuplicate>,
}

impl SplitTargetParams {
    #[must_use]
    pub fn new(name: impl Into<String>, description: DescriptionStructure) -> Self {
        Self {
            name: name.into(),
            description,
            start_switch: None,
            duplicate: None,
        }
    }

    #[must_use]
    pub fn with_start_switch(mut self, start_switch: SplitPointSwitch) -> Self {
        self.start_switch = Some(start_switch);
        self
    }

    #[must_use]
    pub fn with_duplicate(mut self, duplicate: SplitTargetDuplicate) -> Self {
        self.duplicate = Some(duplicate);
        self
    }

    pub fn operation(&self) -> SplitTargetOperation {
        self.duplicate
            .as_ref()
            .map_or(SplitTargetOperation::Create, |d| d.operation.into())
    }
}

/// A computed split target: the new track record and its geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitTargetResult {
    pub location_track: LocationTrack,
    pub geometry: TrackGeometry,
    /// Source edges this target covers.
    pub edge_indices: RangeInclusive<usize>,
    /// Source segments this target covers.
    pub segment_indices: RangeInclusive<usize>,
    pub operation: SplitTargetOperation,
}
