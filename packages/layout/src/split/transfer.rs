//! Splicing a split slice into an existing duplicate track.

use std::ops::RangeInclusive;

use crate::error::{Result, SplitError};
use crate::geometry::{Edge, Point, TrackGeometry};

/// Maximum distance an adjoining duplicate edge may be moved to meet the slice.
pub const MAX_SPLIT_GEOMETRY_ADJUSTMENT: f64 = 5.0;

/// Replace `replaced` edges of `geometry` with `replacements`.
///
/// The duplicate edges directly before and after the replaced range are adjusted so
/// that they meet the replacement edges; all other edges are kept as they are.
pub fn connect_partial_duplicate_edges(
    geometry: &TrackGeometry,
    replacements: &[Edge],
    replaced: &RangeInclusive<usize>,
) -> Result<Vec<Edge>> {
    let (Some(first), Some(last)) = (replacements.first(), replacements.last()) else {
        return Err(SplitError::SegmentAllocationFailed(
            "cannot replace duplicate edges with nothing".to_string(),
        ));
    };
    let edges = geometry.edges();
    let start = *replaced.start();
    let end = *replaced.end();

    let start_connection = match start.checked_sub(1).and_then(|i| edges.get(i)) {
        Some(previous) => Some(
            previous
                .connect_end_to(first, MAX_SPLIT_GEOMETRY_ADJUSTMENT)
                .ok_or_else(|| connection_failure(previous.end_point()))?,
        ),
        None => None,
    };
    let end_connection = match edges.get(end + 1) {
        Some(next) => Some(
            next.connect_start_from(last, MAX_SPLIT_GEOMETRY_ADJUSTMENT)
                .ok_or_else(|| connection_failure(last.end_point()))?,
        ),
        None => None,
    };

    let leading = &edges[..start.saturating_sub(1)];
    let trailing = edges.get(end + 2..).unwrap_or(&[]);

    Ok(leading
        .iter()
        .cloned()
        .chain(start_connection)
        .chain(replacements.iter().cloned())
        .chain(end_connection)
        .chain(trailing.iter().cloned())
        .collect())
}

fn connection_failure(at: Option<Point>) -> SplitError {
    let at = at.unwrap_or(Point::new(f64::NAN, f64::NAN));
    SplitError::EdgeConnectionFailed {
        x: at.x,
        y: at.y,
        max_adjustment: MAX_SPLIT_GEOMETRY_ADJUSTMENT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Segment;
    use pretty_assertions::assert_eq;

    fn edge(from: f64, to: f64) -> Edge {
        Edge::plain(vec![Segment::line(Point::new(from, 0.0), Point::new(to, 0.0))])
    }

    fn duplicate() -> TrackGeometry {
        TrackGeometry::new(vec![
            edge(0.0, 10.0),
            edge(10.0, 20.0),
            edge(20.0, 30.0),
            edge(30.0, 40.0),
            edge(40.0, 50.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_replaces_middle_range_and_adjusts_neighbours() {
        let replacement = vec![edge(21.0, 25.0), edge(25.0, 29.0)];

        let edges = connect_partial_duplicate_edges(&duplicate(), &replacement, &(2..=2)).unwrap();

        assert_eq!(edges.len(), 6);
        assert_eq!(edges[0], edge(0.0, 10.0));
        assert_eq!(edges[1].end_point(), Some(Point::new(21.0, 0.0)));
        assert_eq!(&edges[2..4], replacement.as_slice());
        assert_eq!(edges[4].start_point(), Some(Point::new(29.0, 0.0)));
        assert_eq!(edges[5], edge(40.0, 50.0));
        assert!(TrackGeometry::new(edges).is_ok());
    }

    #[test]
    fn test_replaces_leading_range() {
        let replacement = vec![edge(-2.0, 19.0)];

        let edges = connect_partial_duplicate_edges(&duplicate(), &replacement, &(0..=1)).unwrap();

        assert_eq!(edges.len(), 4);
        assert_eq!(edges[0], replacement[0]);
        assert_eq!(edges[1].start_point(), Some(Point::new(19.0, 0.0)));
        assert_eq!(edges[3], edge(40.0, 50.0));
    }

    #[test]
    fn test_gap_beyond_max_adjustment_fails() {
        let replacement = vec![edge(26.0, 29.0)];

        let err = connect_partial_duplicate_edges(&duplicate(), &replacement, &(2..=2)).unwrap_err();

        assert_eq!(err.key(), "edge-connection-failed");
    }

    #[test]
    fn test_empty_replacement_fails() {
        let err = connect_partial_duplicate_edges(&duplicate(), &[], &(1..=1)).unwrap_err();
        assert_eq!(err.key(), "segment-allocation-failed");
    }
}
