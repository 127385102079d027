//! Partitioning a location track into split targets.

use std::ops::RangeInclusive;

use super::transfer::connect_partial_duplicate_edges;
use super::types::{
    DuplicateOperation, SplitPointSwitch, SplitTargetDuplicate, SplitTargetParams,
    SplitTargetResult,
};
use crate::error::{Result, SplitError};
use crate::geometry::{Edge, TrackGeometry};
use crate::model::SplitTargetOperation;
use crate::track::{LocationTrack, TopologicalConnectivity};

/// Split `track` into the requested targets.
///
/// The first target starts at the first edge. Every following target starts at the
/// edge whose start node carries its start switch joint as an inner link. Switch
/// joints that do not land on such a boundary, or that appear out of order, fail
/// the whole split.
#[tracing::instrument(skip_all, fields(source = ?track.id, targets = targets.len()))]
pub fn split_location_track(
    track: &LocationTrack,
    geometry: &TrackGeometry,
    targets: &[SplitTargetParams],
) -> Result<Vec<SplitTargetResult>> {
    let ranges = partition_edges(geometry, targets)?;

    let results = targets
        .iter()
        .zip(ranges)
        .enumerate()
        .map(|(index, (params, edge_indices))| {
            let next_switch = targets
                .get(index + 1)
                .and_then(|next| next.start_switch.as_ref());
            build_target(track, geometry, params, next_switch, edge_indices)
        })
        .collect::<Result<Vec<_>>>()?;

    validate_split_result(&results, geometry)?;

    tracing::debug!(
        edges = geometry.edges().len(),
        targets = results.len(),
        "location track split computed"
    );
    Ok(results)
}

/// Walk the edges once, closing the current target whenever an edge starts at the
/// next pending split point.
fn partition_edges(
    geometry: &TrackGeometry,
    targets: &[SplitTargetParams],
) -> Result<Vec<RangeInclusive<usize>>> {
    let first = targets.first().ok_or(SplitError::NoTargets)?;
    if first.start_switch.is_some() {
        return Err(SplitError::FirstTargetHasStartSwitch);
    }
    let split_points = targets
        .iter()
        .enumerate()
        .skip(1)
        .map(|(target_index, t)| {
            t.start_switch
                .as_ref()
                .ok_or(SplitError::MissingStartSwitch { target_index })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut pending = split_points.into_iter().peekable();
    let mut ranges = Vec::with_capacity(targets.len());
    let mut current_start = 0;

    for (index, edge) in geometry.edges().iter().enumerate() {
        let Some(next) = pending.peek() else {
            break;
        };
        if edge.start_node.has_inner_joint(next.switch_id, next.joint) {
            if index == current_start {
                return Err(SplitError::SegmentAllocationFailed(format!(
                    "target {} would have no edges: split point {} is at edge {index}",
                    ranges.len(),
                    next.name
                )));
            }
            ranges.push(current_start..=index - 1);
            current_start = index;
            pending.next();
        }
    }

    if let Some(unmatched) = pending.next() {
        return Err(mapping_failure(unmatched));
    }

    ranges.push(current_start..=geometry.edges().len() - 1);
    Ok(ranges)
}

fn mapping_failure(switch: &SplitPointSwitch) -> SplitError {
    SplitError::SwitchSegmentMappingFailed {
        switch_id: switch.switch_id,
        joint: switch.joint,
        switch_name: switch.name.clone(),
    }
}

fn build_target(
    source: &LocationTrack,
    geometry: &TrackGeometry,
    params: &SplitTargetParams,
    next_switch: Option<&SplitPointSwitch>,
    edge_indices: RangeInclusive<usize>,
) -> Result<SplitTargetResult> {
    let edges: Vec<Edge> = geometry.edges()[edge_indices.clone()].to_vec();
    let segment_indices = geometry.segment_index_range(&edge_indices);
    let connectivity = TopologicalConnectivity::of(
        *edge_indices.start() != 0 || source.topological_connectivity.is_start_connected(),
        *edge_indices.end() + 1 != geometry.edges().len()
            || source.topological_connectivity.is_end_connected(),
    );

    let target_geometry = match &params.duplicate {
        Some(SplitTargetDuplicate {
            operation: DuplicateOperation::Transfer,
            geometry: duplicate_geometry,
            ..
        }) => {
            let replaced = duplicate_edge_range(
                duplicate_geometry,
                params.start_switch.as_ref(),
                next_switch,
            )?;
            TrackGeometry::new(connect_partial_duplicate_edges(
                duplicate_geometry,
                &edges,
                &replaced,
            )?)?
        }
        _ => TrackGeometry::new(edges)?,
    };

    let base = match &params.duplicate {
        Some(duplicate) => duplicate.track.clone(),
        None => source.clone(),
    };
    let location_track = LocationTrack {
        id: params.duplicate.as_ref().and_then(|d| d.track.id),
        name: params.name.clone(),
        description: params.description.clone(),
        track_number_id: source.track_number_id,
        state: source.state,
        track_type: source.track_type,
        source_id: source.source_id.clone(),
        duplicate_of: None,
        topological_connectivity: connectivity,
        ..base
    }
    .with_geometry(&target_geometry);

    Ok(SplitTargetResult {
        location_track,
        geometry: target_geometry,
        edge_indices,
        segment_indices,
        operation: params.operation(),
    })
}

/// Edge range of a duplicate's own geometry lying between the same switches as the
/// target it is transferred to.
fn duplicate_edge_range(
    geometry: &TrackGeometry,
    start: Option<&SplitPointSwitch>,
    end: Option<&SplitPointSwitch>,
) -> Result<RangeInclusive<usize>> {
    let start_index = match start {
        Some(s) => geometry
            .find_inner_boundary(s.switch_id, s.joint, 0)
            .ok_or_else(|| mapping_failure(s))?,
        None => 0,
    };
    let end_index = match end {
        Some(s) => {
            geometry
                .find_inner_boundary(s.switch_id, s.joint, start_index + 1)
                .ok_or_else(|| mapping_failure(s))?
                - 1
        }
        None => geometry.edges().len() - 1,
    };
    Ok(start_index..=end_index)
}

/// Check that the targets' edge ranges partition the source edges exactly.
pub fn validate_split_result(results: &[SplitTargetResult], geometry: &TrackGeometry) -> Result<()> {
    let mut expected_start = 0;
    for result in results {
        if *result.edge_indices.start() != expected_start {
            return Err(SplitError::SegmentAllocationFailed(format!(
                "expected target to start at edge {expected_start}, got {}",
                result.edge_indices.start()
            )));
        }
        let allocated = result.edge_indices.clone().count();
        if result.operation != SplitTargetOperation::Transfer
            && result.geometry.edges().len() != allocated
        {
            return Err(SplitError::SegmentAllocationFailed(format!(
                "target has {} edges but {allocated} were allocated",
                result.geometry.edges().len()
            )));
        }
        expected_start = result.edge_indices.end() + 1;
    }
    if expected_start != geometry.edges().len() {
        return Err(SplitError::SegmentAllocationFailed(format!(
            "allocated {expected_start} of {} edges",
            geometry.edges().len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{EdgeNode, Point, Segment, SwitchLink};
    use crate::ids::{JointNumber, LocationTrackId, SwitchId, TrackNumberId};
    use crate::track::{DescriptionStructure, DescriptionSuffix, LocationTrackState, LocationTrackType};
    use pretty_assertions::assert_eq;

    fn edge(from: f64, to: f64, start_node: EdgeNode) -> Edge {
        Edge::new(
            start_node,
            EdgeNode::empty(),
            vec![Segment::line(Point::new(from, 0.0), Point::new(to, 0.0))],
        )
    }

    fn inner(switch: i64, joint: u32) -> EdgeNode {
        EdgeNode::inner(SwitchLink::new(SwitchId(switch), JointNumber(joint)))
    }

    fn source_track() -> LocationTrack {
        LocationTrack {
            id: Some(LocationTrackId(100)),
            name: "source".to_string(),
            description: DescriptionStructure::new("source track", DescriptionSuffix::None),
            track_number_id: TrackNumberId(5),
            state: LocationTrackState::InUse,
            track_type: LocationTrackType::Main,
            source_id: Some("geom-1".to_string()),
            duplicate_of: None,
            topological_connectivity: TopologicalConnectivity::None,
            bounding_box: None,
            length: 0.0,
            segment_count: 0,
        }
    }

    fn target(name: &str) -> SplitTargetParams {
        SplitTargetParams::new(name, DescriptionStructure::new(name, DescriptionSuffix::SwitchToSwitch))
    }

    fn split_point(switch: i64, joint: u32) -> SplitPointSwitch {
        SplitPointSwitch::new(SwitchId(switch), JointNumber(joint), format!("V{switch}"))
    }

    fn e1_e2_e3() -> TrackGeometry {
        TrackGeometry::new(vec![
            edge(0.0, 10.0, EdgeNode::empty()),
            edge(10.0, 20.0, inner(1, 1)),
            edge(20.0, 30.0, EdgeNode::empty()),
        ])
        .unwrap()
    }

    #[test]
    fn test_split_at_inner_switch_link() {
        let geometry = e1_e2_e3();
        let targets = vec![target("A"), target("B").with_start_switch(split_point(1, 1))];

        let results = split_location_track(&source_track(), &geometry, &targets).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].geometry.edges(), &geometry.edges()[0..1]);
        assert_eq!(results[1].geometry.edges(), &geometry.edges()[1..3]);
        assert_eq!(results[0].edge_indices, 0..=0);
        assert_eq!(results[1].edge_indices, 1..=2);
        assert_eq!(results[1].segment_indices, 1..=2);
        assert_eq!(results[0].location_track.name, "A");
        assert_eq!(results[1].location_track.length, 20.0);
        assert_eq!(results[1].location_track.segment_count, 2);
        assert_eq!(results[0].location_track.id, None);
        assert_eq!(results[0].operation, SplitTargetOperation::Create);
    }

    #[test]
    fn test_targets_inherit_source_fields() {
        let mut source = source_track();
        source.duplicate_of = Some(LocationTrackId(55));
        source.topological_connectivity = TopologicalConnectivity::Start;
        let targets = vec![target("A"), target("B").with_start_switch(split_point(1, 1))];

        let results = split_location_track(&source, &e1_e2_e3(), &targets).unwrap();

        for result in &results {
            let t = &result.location_track;
            assert_eq!(t.track_number_id, source.track_number_id);
            assert_eq!(t.state, source.state);
            assert_eq!(t.track_type, source.track_type);
            assert_eq!(t.source_id, source.source_id);
            assert_eq!(t.duplicate_of, None);
        }
        assert_eq!(
            results[0].location_track.topological_connectivity,
            TopologicalConnectivity::StartAndEnd
        );
        assert_eq!(
            results[1].location_track.topological_connectivity,
            TopologicalConnectivity::Start
        );
    }

    #[test]
    fn test_outer_link_is_not_a_split_point() {
        let geometry = TrackGeometry::new(vec![
            edge(0.0, 10.0, EdgeNode::empty()),
            edge(
                10.0,
                20.0,
                EdgeNode::outer(SwitchLink::new(SwitchId(1), JointNumber(1))),
            ),
        ])
        .unwrap();
        let targets = vec![target("A"), target("B").with_start_switch(split_point(1, 1))];

        let err = split_location_track(&source_track(), &geometry, &targets).unwrap_err();
        assert_eq!(err.key(), "switch-segment-mapping-failed");
    }

    #[test]
    fn test_out_of_order_split_points_fail() {
        let geometry = TrackGeometry::new(vec![
            edge(0.0, 10.0, EdgeNode::empty()),
            edge(10.0, 20.0, inner(1, 1)),
            edge(20.0, 30.0, inner(2, 1)),
        ])
        .unwrap();
        let targets = vec![
            target("A"),
            target("B").with_start_switch(split_point(2, 1)),
            target("C").with_start_switch(split_point(1, 1)),
        ];

        let err = split_location_track(&source_track(), &geometry, &targets).unwrap_err();
        assert_eq!(
            err,
            SplitError::SwitchSegmentMappingFailed {
                switch_id: SwitchId(1),
                joint: JointNumber(1),
                switch_name: "V1".to_string(),
            }
        );
    }

    #[test]
    fn test_request_shape_errors() {
        let geometry = e1_e2_e3();
        assert_eq!(
            split_location_track(&source_track(), &geometry, &[]).unwrap_err(),
            SplitError::NoTargets
        );
        assert_eq!(
            split_location_track(
                &source_track(),
                &geometry,
                &[target("A").with_start_switch(split_point(1, 1))]
            )
            .unwrap_err(),
            SplitError::FirstTargetHasStartSwitch
        );
        assert_eq!(
            split_location_track(&source_track(), &geometry, &[target("A"), target("B")])
                .unwrap_err(),
            SplitError::MissingStartSwitch { target_index: 1 }
        );
    }

    #[test]
    fn test_split_point_on_first_edge_leaves_empty_target() {
        let geometry = TrackGeometry::new(vec![
            edge(0.0, 10.0, inner(1, 1)),
            edge(10.0, 20.0, EdgeNode::empty()),
        ])
        .unwrap();
        let targets = vec![target("A"), target("B").with_start_switch(split_point(1, 1))];

        let err = split_location_track(&source_track(), &geometry, &targets).unwrap_err();
        assert_eq!(err.key(), "segment-allocation-failed");
    }

    #[test]
    fn test_overwrite_duplicate_keeps_identity_and_takes_new_geometry() {
        let geometry = e1_e2_e3();
        let duplicate_geometry = TrackGeometry::new(vec![edge(10.0, 35.0, inner(1, 1))]).unwrap();
        let duplicate = LocationTrack {
            id: Some(LocationTrackId(200)),
            name: "old duplicate".to_string(),
            duplicate_of: Some(LocationTrackId(100)),
            track_type: LocationTrackType::Side,
            ..source_track()
        }
        .with_geometry(&duplicate_geometry);
        let targets = vec![
            target("A"),
            target("B")
                .with_start_switch(split_point(1, 1))
                .with_duplicate(SplitTargetDuplicate {
                    operation: DuplicateOperation::Overwrite,
                    track: duplicate,
                    geometry: duplicate_geometry,
                }),
        ];

        let results = split_location_track(&source_track(), &geometry, &targets).unwrap();

        let b = &results[1];
        assert_eq!(b.location_track.id, Some(LocationTrackId(200)));
        assert_eq!(b.location_track.name, "B");
        assert_eq!(b.location_track.duplicate_of, None);
        assert_eq!(b.location_track.track_type, LocationTrackType::Main);
        assert_eq!(b.geometry.edges(), &geometry.edges()[1..3]);
        assert_eq!(b.location_track.length, 20.0);
        assert_eq!(b.operation, SplitTargetOperation::Overwrite);
    }

    #[test]
    fn test_transfer_splices_slice_into_duplicate() {
        let geometry = e1_e2_e3();
        // Duplicate runs from x=-5 with its own switch boundary at x=10.2.
        let duplicate_geometry = TrackGeometry::new(vec![
            edge(-5.0, 10.2, EdgeNode::empty()),
            edge(10.2, 40.0, inner(1, 1)),
        ])
        .unwrap();
        let duplicate = LocationTrack {
            id: Some(LocationTrackId(300)),
            duplicate_of: Some(LocationTrackId(100)),
            ..source_track()
        };
        let targets = vec![
            target("A"),
            target("B")
                .with_start_switch(split_point(1, 1))
                .with_duplicate(SplitTargetDuplicate {
                    operation: DuplicateOperation::Transfer,
                    track: duplicate,
                    geometry: duplicate_geometry,
                }),
        ];

        let results = split_location_track(&source_track(), &geometry, &targets).unwrap();

        let b = &results[1];
        assert_eq!(b.location_track.id, Some(LocationTrackId(300)));
        assert_eq!(b.operation, SplitTargetOperation::Transfer);
        assert_eq!(b.edge_indices, 1..=2);
        // Leading duplicate edge kept, adjusted to meet the slice, then the slice itself.
        assert_eq!(b.geometry.edges().len(), 3);
        assert_eq!(b.geometry.start(), Some(Point::new(-5.0, 0.0)));
        assert_eq!(b.geometry.edges()[0].end_point(), Some(Point::new(10.0, 0.0)));
        assert_eq!(b.geometry.end(), Some(Point::new(30.0, 0.0)));
        assert_eq!(b.location_track.length, 35.0);
    }
}
