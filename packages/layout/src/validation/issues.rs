//! Validation issues reported for splits at publication time.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::address::AddressPoint;
use crate::ids::{KmPostId, LocationTrackId, ReferenceLineId, SplitId, SwitchId, TrackNumberId};

/// A publication-blocking problem with a split.
///
/// All split issues have error severity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "key", rename_all = "kebab-case")]
pub enum SplitIssue {
    /// The source's draft geometry no longer matches its official geometry.
    SourceGeometryChanged { point: AddressPoint },
    /// The target's geometry is not a slice of the source's official geometry.
    TargetGeometryChanged { point: AddressPoint },
    /// Address points could not be resolved for the source or the target.
    NoGeometry,
    /// The entity takes part in a split that is already being transferred.
    SplitInProgress { split_id: SplitId },
    SplitMissingLocationTracks { split_id: SplitId },
    SplitMissingSwitches { split_id: SplitId },
    MultipleSplitsNotAllowed,
    SourceNotDeleted { split_id: SplitId },
    SourceAndTargetTrackNumbersAreDifferent { split_id: SplitId, track_name: String },
    /// The track's draft was cancelled while it still takes part in a split.
    TrackIsCancelled { split_id: SplitId },
}

impl SplitIssue {
    pub fn key(&self) -> &'static str {
        match self {
            SplitIssue::SourceGeometryChanged { .. } => "source-geometry-changed",
            SplitIssue::TargetGeometryChanged { .. } => "target-geometry-changed",
            SplitIssue::NoGeometry => "no-geometry",
            SplitIssue::SplitInProgress { .. } => "split-in-progress",
            SplitIssue::SplitMissingLocationTracks { .. } => "split-missing-location-tracks",
            SplitIssue::SplitMissingSwitches { .. } => "split-missing-switches",
            SplitIssue::MultipleSplitsNotAllowed => "multiple-splits-not-allowed",
            SplitIssue::SourceNotDeleted { .. } => "source-not-deleted",
            SplitIssue::SourceAndTargetTrackNumbersAreDifferent { .. } => {
                "source-and-target-track-numbers-are-different"
            }
            SplitIssue::TrackIsCancelled { .. } => "track-is-cancelled",
        }
    }
}

/// Split issues grouped by the entity they are attached to.
///
/// Entities without issues are left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SplitPublishValidationErrors {
    pub track_numbers: BTreeMap<TrackNumberId, Vec<SplitIssue>>,
    pub reference_lines: BTreeMap<ReferenceLineId, Vec<SplitIssue>>,
    pub km_posts: BTreeMap<KmPostId, Vec<SplitIssue>>,
    pub location_tracks: BTreeMap<LocationTrackId, Vec<SplitIssue>>,
    pub switches: BTreeMap<SwitchId, Vec<SplitIssue>>,
}

impl SplitPublishValidationErrors {
    /// True when nothing blocks the publication.
    pub fn is_empty(&self) -> bool {
        self.issue_count() == 0
    }

    pub fn issue_count(&self) -> usize {
        self.track_numbers.values().map(Vec::len).sum::<usize>()
            + self.reference_lines.values().map(Vec::len).sum::<usize>()
            + self.km_posts.values().map(Vec::len).sum::<usize>()
            + self.location_tracks.values().map(Vec::len).sum::<usize>()
            + self.switches.values().map(Vec::len).sum::<usize>()
    }

    pub fn location_track_keys(&self, id: LocationTrackId) -> Vec<&'static str> {
        self.location_tracks
            .get(&id)
            .map(|issues| issues.iter().map(SplitIssue::key).collect())
            .unwrap_or_default()
    }
}

pub(crate) fn insert_non_empty<K: Ord>(
    map: &mut BTreeMap<K, Vec<SplitIssue>>,
    key: K,
    issues: Vec<SplitIssue>,
) {
    if !issues.is_empty() {
        map.entry(key).or_default().extend(issues);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_issue_serializes_with_key_tag() {
        let json = serde_json::to_value(SplitIssue::MultipleSplitsNotAllowed).unwrap();
        assert_eq!(json, serde_json::json!({ "key": "multiple-splits-not-allowed" }));
    }

    #[test]
    fn test_empty_issue_lists_are_dropped() {
        let mut errors = SplitPublishValidationErrors::default();
        insert_non_empty(&mut errors.location_tracks, LocationTrackId(1), vec![]);
        assert!(errors.is_empty());

        insert_non_empty(
            &mut errors.location_tracks,
            LocationTrackId(1),
            vec![SplitIssue::NoGeometry],
        );
        assert_eq!(errors.issue_count(), 1);
        assert_eq!(errors.location_track_keys(LocationTrackId(1)), vec!["no-geometry"]);
    }
}
