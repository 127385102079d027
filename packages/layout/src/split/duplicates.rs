//! Re-pointing duplicates of a split source track.
//!
//! A duplicate that no split target takes over would be left referencing a deleted
//! track. It is re-pointed to the target track it overlaps most along the reference
//! line instead.

use crate::address::AddressRange;
use crate::error::{Result, SplitError};
use crate::ids::LocationTrackId;

/// Overlap above which no better target is searched for.
const FULL_OVERLAP_PERCENTAGE: f64 = 99.9;

/// Target track overlapping `duplicate` the most, if any overlaps at all.
pub fn best_overlapping_target(
    duplicate: &AddressRange,
    targets: &[(LocationTrackId, AddressRange)],
) -> Option<LocationTrackId> {
    let mut best: Option<(LocationTrackId, f64)> = None;
    for (id, range) in targets {
        if best.is_some_and(|(_, pct)| pct > FULL_OVERLAP_PERCENTAGE) {
            break;
        }
        let pct = duplicate.overlap_percentage(range);
        if pct > best.map_or(0.0, |(_, p)| p) {
            best = Some((*id, pct));
        }
    }
    best.map(|(id, _)| id)
}

/// New `duplicate_of` reference for each unused duplicate.
pub fn reassign_duplicates(
    duplicates: &[(LocationTrackId, AddressRange)],
    targets: &[(LocationTrackId, AddressRange)],
) -> Result<Vec<(LocationTrackId, LocationTrackId)>> {
    duplicates
        .iter()
        .map(|(duplicate_id, range)| {
            best_overlapping_target(range, targets)
                .map(|target| (*duplicate_id, target))
                .ok_or(SplitError::DuplicateReassignmentFailed(*duplicate_id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn targets() -> Vec<(LocationTrackId, AddressRange)> {
        vec![
            (LocationTrackId(1), AddressRange::new(0.0, 100.0)),
            (LocationTrackId(2), AddressRange::new(100.0, 300.0)),
        ]
    }

    #[test]
    fn test_picks_largest_overlap() {
        let duplicate = AddressRange::new(80.0, 200.0);
        assert_eq!(
            best_overlapping_target(&duplicate, &targets()),
            Some(LocationTrackId(2))
        );
    }

    #[test]
    fn test_first_full_overlap_wins() {
        let duplicate = AddressRange::new(10.0, 90.0);
        let mut all = targets();
        all.push((LocationTrackId(3), AddressRange::new(0.0, 100.0)));
        assert_eq!(
            best_overlapping_target(&duplicate, &all),
            Some(LocationTrackId(1))
        );
    }

    #[test]
    fn test_reassign_fails_without_overlap() {
        let duplicates = vec![
            (LocationTrackId(10), AddressRange::new(20.0, 40.0)),
            (LocationTrackId(11), AddressRange::new(500.0, 600.0)),
        ];
        assert_eq!(
            reassign_duplicates(&duplicates, &targets()),
            Err(SplitError::DuplicateReassignmentFailed(LocationTrackId(11)))
        );
        assert_eq!(
            reassign_duplicates(&duplicates[..1], &targets()),
            Ok(vec![(LocationTrackId(10), LocationTrackId(1))])
        );
    }
}
