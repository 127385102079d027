//! Split checks run before layout changes are published.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use super::geometry::{validate_source_geometry, validate_target_geometry};
use super::issues::{insert_non_empty, SplitIssue, SplitPublishValidationErrors};
use crate::address::{AddressPoint, TrackMeter};
use crate::geometry::{Point, TrackGeometry};
use crate::ids::{KmPostId, LocationTrackId, ReferenceLineId, SplitId, SwitchId, TrackNumberId};
use crate::model::{Split, SplitTargetOperation};
use crate::track::LocationTrack;

/// Entities about to be published together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVersions {
    pub track_numbers: Vec<TrackNumberId>,
    pub reference_lines: Vec<ReferenceLineId>,
    pub km_posts: Vec<KmPostId>,
    pub location_tracks: Vec<LocationTrackId>,
    pub switches: Vec<SwitchId>,
}

impl ValidationVersions {
    pub fn is_empty(&self) -> bool {
        self.track_numbers.is_empty()
            && self.reference_lines.is_empty()
            && self.km_posts.is_empty()
            && self.location_tracks.is_empty()
            && self.switches.is_empty()
    }
}

/// Layout state the split checks read from.
///
/// Track records and address points are the versions being validated: the draft for
/// candidates, the official version for everything else. A candidate track missing
/// from `location_tracks` has had its draft cancelled.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub unfinished_splits: Vec<Split>,
    pub location_tracks: HashMap<LocationTrackId, LocationTrack>,
    pub address_points: HashMap<LocationTrackId, Vec<AddressPoint>>,
    pub official_address_points: HashMap<LocationTrackId, Vec<AddressPoint>>,
    /// Official geometry of split sources, used to find the slice each target was cut from.
    pub official_geometries: HashMap<LocationTrackId, TrackGeometry>,
    pub track_number_tracks: HashMap<TrackNumberId, Vec<LocationTrackId>>,
    pub reference_line_track_numbers: HashMap<ReferenceLineId, TrackNumberId>,
    pub km_post_track_numbers: HashMap<KmPostId, TrackNumberId>,
}

impl ValidationContext {
    fn splits_with_track(&self, id: LocationTrackId) -> impl Iterator<Item = &Split> {
        self.unfinished_splits
            .iter()
            .filter(move |s| s.contains_location_track(id))
    }

    fn splits_on_track_number(&self, track_number: TrackNumberId) -> Vec<SplitId> {
        let tracks: HashSet<LocationTrackId> = self
            .track_number_tracks
            .get(&track_number)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        self.unfinished_splits
            .iter()
            .filter(|s| {
                s.track_number_id == track_number
                    || s.location_tracks().iter().any(|id| tracks.contains(id))
            })
            .map(|s| s.id)
            .collect()
    }
}

/// Validate all unfinished splits touched by `candidates`.
///
/// Problems are collected rather than returned early, so that the caller can
/// report everything that blocks the publication at once.
pub fn validate_splits(
    candidates: &ValidationVersions,
    context: &ValidationContext,
    allow_multiple_splits: bool,
) -> SplitPublishValidationErrors {
    let mut errors = SplitPublishValidationErrors::default();
    let content_issues = validate_split_content(candidates, context, allow_multiple_splits);

    for &track_number in &candidates.track_numbers {
        insert_non_empty(
            &mut errors.track_numbers,
            track_number,
            track_number_issues(track_number, context),
        );
    }
    for &reference_line in &candidates.reference_lines {
        if let Some(&track_number) = context.reference_line_track_numbers.get(&reference_line) {
            insert_non_empty(
                &mut errors.reference_lines,
                reference_line,
                track_number_issues(track_number, context),
            );
        }
    }
    for &km_post in &candidates.km_posts {
        if let Some(&track_number) = context.km_post_track_numbers.get(&km_post) {
            insert_non_empty(
                &mut errors.km_posts,
                km_post,
                track_number_issues(track_number, context),
            );
        }
    }

    for &track_id in &candidates.location_tracks {
        let mut issues = location_track_issues(track_id, context);
        issues.extend(
            content_issues
                .iter()
                .filter(|(split, _)| split.contains_location_track(track_id))
                .map(|(_, issue)| issue.clone()),
        );
        insert_non_empty(&mut errors.location_tracks, track_id, issues);
    }

    for &switch_id in &candidates.switches {
        let mut issues: Vec<SplitIssue> = context
            .unfinished_splits
            .iter()
            .filter(|s| s.contains_switch(switch_id) && !s.is_pending())
            .map(|s| SplitIssue::SplitInProgress { split_id: s.id })
            .collect();
        issues.extend(
            content_issues
                .iter()
                .filter(|(split, _)| split.contains_switch(switch_id))
                .map(|(_, issue)| issue.clone()),
        );
        insert_non_empty(&mut errors.switches, switch_id, issues);
    }

    if !errors.is_empty() {
        tracing::info!(issues = errors.issue_count(), "split validation found blocking issues");
    }
    errors
}

/// Pending splits going out with this publication must be published whole.
fn validate_split_content<'a>(
    candidates: &ValidationVersions,
    context: &'a ValidationContext,
    allow_multiple_splits: bool,
) -> Vec<(&'a Split, SplitIssue)> {
    let tracks: HashSet<LocationTrackId> = candidates.location_tracks.iter().copied().collect();
    let switches: HashSet<SwitchId> = candidates.switches.iter().copied().collect();

    let publication_splits: Vec<&Split> = context
        .unfinished_splits
        .iter()
        .filter(|s| s.is_pending())
        .filter(|s| {
            s.location_tracks().iter().any(|id| tracks.contains(id))
                || s.relinked_switches.iter().any(|id| switches.contains(id))
        })
        .collect();

    let mut issues = Vec::new();
    for split in &publication_splits {
        if !split.location_tracks().iter().all(|id| tracks.contains(id)) {
            issues.push((*split, SplitIssue::SplitMissingLocationTracks { split_id: split.id }));
        }
        if !split.relinked_switches.iter().all(|id| switches.contains(id)) {
            issues.push((*split, SplitIssue::SplitMissingSwitches { split_id: split.id }));
        }
        if !allow_multiple_splits && publication_splits.len() > 1 {
            issues.push((*split, SplitIssue::MultipleSplitsNotAllowed));
        }
    }
    issues
}

fn track_number_issues(track_number: TrackNumberId, context: &ValidationContext) -> Vec<SplitIssue> {
    context
        .splits_on_track_number(track_number)
        .into_iter()
        .map(|split_id| SplitIssue::SplitInProgress { split_id })
        .collect()
}

fn location_track_issues(track_id: LocationTrackId, context: &ValidationContext) -> Vec<SplitIssue> {
    let splits: Vec<&Split> = context.splits_with_track(track_id).collect();

    let Some(track) = context.location_tracks.get(&track_id) else {
        return splits
            .iter()
            .map(|s| SplitIssue::TrackIsCancelled { split_id: s.id })
            .collect();
    };

    let mut issues = Vec::new();
    for split in &splits {
        if !split.is_pending() {
            issues.push(SplitIssue::SplitInProgress { split_id: split.id });
        }
        if split.source_location_track_id == track_id && !track.state.is_removed() {
            issues.push(SplitIssue::SourceNotDeleted { split_id: split.id });
        }
    }

    // Geometry can only drift before publication; published splits are settled.
    let draft_splits: Vec<&Split> = splits
        .into_iter()
        .filter(|s| s.publication_id.is_none())
        .collect();

    let track_number_issues: Vec<SplitIssue> = draft_splits
        .iter()
        .filter(|s| s.contains_target_track(track_id) && s.track_number_id != track.track_number_id)
        .map(|s| SplitIssue::SourceAndTargetTrackNumbersAreDifferent {
            split_id: s.id,
            track_name: track.name.clone(),
        })
        .collect();

    if track_number_issues.is_empty() {
        for split in &draft_splits {
            issues.extend(split_geometry_issues(track_id, split, context));
        }
    }
    issues.extend(track_number_issues);
    issues
}

fn split_geometry_issues(
    track_id: LocationTrackId,
    split: &Split,
    context: &ValidationContext,
) -> Vec<SplitIssue> {
    let source_id = split.source_location_track_id;
    let official_source = context
        .official_address_points
        .get(&source_id)
        .map(Vec::as_slice);
    let mut issues = Vec::new();

    if let Some(target) = split.target(track_id) {
        let target_points = context.address_points.get(&track_id).map(|points| {
            match (target.operation, official_source) {
                (SplitTargetOperation::Transfer, Some(source)) => within_source_slice(
                    points,
                    source,
                    context.official_geometries.get(&source_id),
                    &target.edge_indices,
                ),
                _ => points.clone(),
            }
        });
        issues.extend(validate_target_geometry(
            target_points.as_deref(),
            official_source,
        ));
    }

    if track_id == source_id {
        issues.extend(validate_source_geometry(
            context.address_points.get(&track_id).map(Vec::as_slice),
            official_source,
        ));
    }
    issues
}

/// A transferred duplicate keeps its own geometry outside the slice it received;
/// only the part within the slice's address range must match the source.
///
/// Without the source geometry the whole source range is used.
fn within_source_slice(
    points: &[AddressPoint],
    source: &[AddressPoint],
    source_geometry: Option<&TrackGeometry>,
    edges: &RangeInclusive<usize>,
) -> Vec<AddressPoint> {
    let slice = source_geometry
        .and_then(|geometry| geometry.edge_range_start_and_end(edges))
        .and_then(|(start, end)| {
            Some((
                nearest_address(source, &start)?,
                nearest_address(source, &end)?,
            ))
        });
    let whole = || Some((source.first()?.address, source.last()?.address));
    let Some((first, last)) = slice.or_else(whole) else {
        return Vec::new();
    };
    points
        .iter()
        .filter(|p| p.address >= first && p.address <= last)
        .copied()
        .collect()
}

fn nearest_address(points: &[AddressPoint], point: &Point) -> Option<TrackMeter> {
    points
        .iter()
        .min_by(|a, b| a.point.distance(point).total_cmp(&b.point.distance(point)))
        .map(|p| p.address)
}
