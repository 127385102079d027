//! Point-by-point geometry comparisons for split validation.

use crate::address::AddressPoint;
use crate::validation::issues::SplitIssue;

/// A split source must not change geometry while the split is outstanding.
///
/// Reports the first point where the draft and official geometries differ.
pub fn validate_source_geometry(
    draft: Option<&[AddressPoint]>,
    official: Option<&[AddressPoint]>,
) -> Option<SplitIssue> {
    let (Some(draft), Some(official)) = (non_empty(draft), non_empty(official)) else {
        return Some(SplitIssue::NoGeometry);
    };
    let longest = draft.len().max(official.len());
    (0..longest).find_map(|i| match (draft.get(i), official.get(i)) {
        (Some(d), Some(o)) if d.is_same(o) => None,
        (Some(d), _) => Some(SplitIssue::SourceGeometryChanged { point: *d }),
        (None, Some(o)) => Some(SplitIssue::SourceGeometryChanged { point: *o }),
        (None, None) => None,
    })
}

/// Every target point must match the source geometry, aligned at the target's start.
pub fn validate_target_geometry(
    target: Option<&[AddressPoint]>,
    source: Option<&[AddressPoint]>,
) -> Option<SplitIssue> {
    let (Some(target), Some(source)) = (non_empty(target), non_empty(source)) else {
        return Some(SplitIssue::NoGeometry);
    };
    let first = target[0];
    let Some(offset) = source.iter().position(|p| p.is_same(&first)) else {
        return Some(SplitIssue::TargetGeometryChanged { point: first });
    };
    target.iter().enumerate().find_map(|(i, t)| match source.get(offset + i) {
        Some(s) if s.is_same(t) => None,
        _ => Some(SplitIssue::TargetGeometryChanged { point: *t }),
    })
}

fn non_empty(points: Option<&[AddressPoint]>) -> Option<&[AddressPoint]> {
    points.filter(|p| !p.is_empty())
}
