//! The persisted split aggregate, as seen by the domain.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::ids::{LocationTrackId, PublicationId, SplitId, SwitchId, TrackNumberId};

/// Coarse bulk transfer state kept on the split itself.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkTransferState {
    #[default]
    Pending,
    InProgress,
    Done,
    Failed,
}

/// How a split target track came to be.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SplitTargetOperation {
    /// A new track was created for the slice.
    Create,
    /// An existing duplicate track was overwritten with the slice.
    Overwrite,
    /// The slice was spliced into an existing duplicate track.
    Transfer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitTarget {
    pub location_track_id: LocationTrackId,
    /// Edges of the source geometry this target was cut from.
    pub edge_indices: RangeInclusive<usize>,
    /// Segments of the source geometry this target was cut from.
    pub segment_indices: RangeInclusive<usize>,
    pub operation: SplitTargetOperation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub id: SplitId,
    pub source_location_track_id: LocationTrackId,
    /// Track number of the source track when the split was made.
    pub track_number_id: TrackNumberId,
    pub bulk_transfer_state: BulkTransferState,
    pub error_cause: Option<String>,
    pub publication_id: Option<PublicationId>,
    pub targets: Vec<SplitTarget>,
    pub relinked_switches: Vec<SwitchId>,
    /// Duplicates of the source that were re-pointed to a target track.
    pub updated_duplicates: Vec<LocationTrackId>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Split {
    /// Not yet published and no transfer started.
    pub fn is_pending(&self) -> bool {
        self.bulk_transfer_state == BulkTransferState::Pending && self.publication_id.is_none()
    }

    pub fn is_unfinished(&self) -> bool {
        self.bulk_transfer_state != BulkTransferState::Done
    }

    /// Target tracks followed by the source track.
    pub fn location_tracks(&self) -> Vec<LocationTrackId> {
        self.targets
            .iter()
            .map(|t| t.location_track_id)
            .chain(std::iter::once(self.source_location_track_id))
            .collect()
    }

    pub fn contains_location_track(&self, id: LocationTrackId) -> bool {
        self.source_location_track_id == id || self.contains_target_track(id)
    }

    pub fn contains_target_track(&self, id: LocationTrackId) -> bool {
        self.targets.iter().any(|t| t.location_track_id == id)
    }

    pub fn contains_switch(&self, id: SwitchId) -> bool {
        self.relinked_switches.contains(&id)
    }

    pub fn target(&self, id: LocationTrackId) -> Option<&SplitTarget> {
        self.targets.iter().find(|t| t.location_track_id == id)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use uuid::Uuid;

    pub fn split(source: i64, targets: &[i64], switches: &[i64]) -> Split {
        let now = Utc::now();
        Split {
            id: SplitId(Uuid::new_v4()),
            source_location_track_id: LocationTrackId(source),
            track_number_id: TrackNumberId(1),
            bulk_transfer_state: BulkTransferState::Pending,
            error_cause: None,
            publication_id: None,
            targets: targets
                .iter()
                .enumerate()
                .map(|(i, id)| SplitTarget {
                    location_track_id: LocationTrackId(*id),
                    edge_indices: i..=i,
                    segment_indices: i..=i,
                    operation: SplitTargetOperation::Create,
                })
                .collect(),
            relinked_switches: switches.iter().copied().map(SwitchId).collect(),
            updated_duplicates: vec![],
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}
