//! Track geometry model.
//!
//! A location track's geometry is an ordered sequence of [`Edge`]s. Each edge is a
//! polyline built from [`Segment`]s and has a node at either end. A node may link to
//! a switch joint either as an *inner* link (the track continues topologically
//! through the joint) or as an *outer* link (a directional reference only).

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;
use crate::ids::{JointNumber, SwitchId};

/// Tolerance for comparing layout coordinates, in meters.
pub const COORDINATE_DELTA: f64 = 0.001;

/// Tolerance for comparing distances along a track, in meters.
pub const M_DELTA: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Coordinate-wise equality within `delta`.
    pub fn is_same(&self, other: &Point, delta: f64) -> bool {
        (self.x - other.x).abs() <= delta && (self.y - other.y).abs() <= delta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Self> {
        points.into_iter().fold(None, |acc: Option<BoundingBox>, p| {
            Some(match acc {
                None => BoundingBox {
                    min_x: p.x,
                    max_x: p.x,
                    min_y: p.y,
                    max_y: p.y,
                },
                Some(b) => BoundingBox {
                    min_x: b.min_x.min(p.x),
                    max_x: b.max_x.max(p.x),
                    min_y: b.min_y.min(p.y),
                    max_y: b.max_y.max(p.y),
                },
            })
        })
    }

    #[must_use]
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            max_x: self.max_x.max(other.max_x),
            min_y: self.min_y.min(other.min_y),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn union_all(boxes: impl IntoIterator<Item = BoundingBox>) -> Option<BoundingBox> {
        boxes
            .into_iter()
            .fold(None, |acc, b| Some(acc.map_or(b, |a: BoundingBox| a.union(&b))))
    }

    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.min_x && point.x <= self.max_x && point.y >= self.min_y && point.y <= self.max_y
    }
}

/// A polyline piece of an edge. Always has at least two points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point>", into = "Vec<Point>")]
pub struct Segment {
    points: Vec<Point>,
}

impl Segment {
    pub fn new(points: Vec<Point>) -> Result<Self, GeometryError> {
        if points.len() < 2 {
            return Err(GeometryError::TooFewPoints(points.len()));
        }
        Ok(Self { points })
    }

    /// Straight segment between two points.
    pub fn line(start: Point, end: Point) -> Self {
        Self {
            points: vec![start, end],
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn start(&self) -> Point {
        self.points[0]
    }

    pub fn end(&self) -> Point {
        self.points[self.points.len() - 1]
    }

    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| w[0].distance(&w[1])).sum()
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.points)
    }

    #[must_use]
    fn with_start(mut self, point: Point) -> Self {
        self.points[0] = point;
        self
    }

    #[must_use]
    fn with_end(mut self, point: Point) -> Self {
        let last = self.points.len() - 1;
        self.points[last] = point;
        self
    }
}

impl TryFrom<Vec<Point>> for Segment {
    type Error = GeometryError;

    fn try_from(points: Vec<Point>) -> Result<Self, Self::Error> {
        Segment::new(points)
    }
}

impl From<Segment> for Vec<Point> {
    fn from(segment: Segment) -> Self {
        segment.points
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwitchLink {
    pub switch_id: SwitchId,
    pub joint: JointNumber,
}

impl SwitchLink {
    pub fn new(switch_id: SwitchId, joint: JointNumber) -> Self {
        Self { switch_id, joint }
    }
}

/// The end of an edge, with optional switch links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EdgeNode {
    /// Topological link: the track continues through this joint.
    pub inner: Option<SwitchLink>,
    /// Directional reference only.
    pub outer: Option<SwitchLink>,
}

impl EdgeNode {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn inner(link: SwitchLink) -> Self {
        Self {
            inner: Some(link),
            outer: None,
        }
    }

    pub fn outer(link: SwitchLink) -> Self {
        Self {
            inner: None,
            outer: Some(link),
        }
    }

    pub fn has_inner_joint(&self, switch_id: SwitchId, joint: JointNumber) -> bool {
        self.inner == Some(SwitchLink::new(switch_id, joint))
    }

    pub fn links(&self) -> impl Iterator<Item = &SwitchLink> {
        self.inner.iter().chain(self.outer.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub start_node: EdgeNode,
    pub end_node: EdgeNode,
    pub segments: Vec<Segment>,
}

impl Edge {
    pub fn new(start_node: EdgeNode, end_node: EdgeNode, segments: Vec<Segment>) -> Self {
        Self {
            start_node,
            end_node,
            segments,
        }
    }

    /// Edge without switch links.
    pub fn plain(segments: Vec<Segment>) -> Self {
        Self::new(EdgeNode::empty(), EdgeNode::empty(), segments)
    }

    pub fn start_point(&self) -> Option<Point> {
        self.segments.first().map(Segment::start)
    }

    pub fn end_point(&self) -> Option<Point> {
        self.segments.last().map(Segment::end)
    }

    pub fn length(&self) -> f64 {
        self.segments.iter().map(Segment::length).sum()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::union_all(self.segments.iter().filter_map(Segment::bounding_box))
    }

    /// Moves this edge's last point onto `next`'s start, if it is within `max_adjustment`.
    pub fn connect_end_to(&self, next: &Edge, max_adjustment: f64) -> Option<Edge> {
        let target = next.start_point()?;
        let current = self.end_point()?;
        if current.distance(&target) > max_adjustment {
            return None;
        }
        let mut edge = self.clone();
        let last = edge.segments.pop()?;
        edge.segments.push(last.with_end(target));
        Some(edge)
    }

    /// Moves this edge's first point onto `previous`'s end, if it is within `max_adjustment`.
    pub fn connect_start_from(&self, previous: &Edge, max_adjustment: f64) -> Option<Edge> {
        let target = previous.end_point()?;
        let current = self.start_point()?;
        if current.distance(&target) > max_adjustment {
            return None;
        }
        let mut edge = self.clone();
        if edge.segments.is_empty() {
            return None;
        }
        let first = edge.segments.remove(0);
        edge.segments.insert(0, first.with_start(target));
        Some(edge)
    }
}

/// Validated, contiguous sequence of edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Edge>", into = "Vec<Edge>")]
pub struct TrackGeometry {
    edges: Vec<Edge>,
}

impl TrackGeometry {
    pub fn new(edges: Vec<Edge>) -> Result<Self, GeometryError> {
        if edges.is_empty() {
            return Err(GeometryError::NoEdges);
        }
        if let Some(index) = edges.iter().position(|e| e.segments.is_empty()) {
            return Err(GeometryError::EmptyEdge(index));
        }
        for (index, pair) in edges.windows(2).enumerate() {
            if let (Some(end), Some(start)) = (pair[0].end_point(), pair[1].start_point()) {
                if !end.is_same(&start, COORDINATE_DELTA) {
                    return Err(GeometryError::NotContiguous {
                        index,
                        next: index + 1,
                        gap: end.distance(&start),
                    });
                }
            }
        }
        Ok(Self { edges })
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn into_edges(self) -> Vec<Edge> {
        self.edges
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.edges.iter().flat_map(|e| e.segments.iter())
    }

    pub fn segment_count(&self) -> usize {
        self.edges.iter().map(Edge::segment_count).sum()
    }

    pub fn length(&self) -> f64 {
        self.edges.iter().map(Edge::length).sum()
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::union_all(self.edges.iter().filter_map(Edge::bounding_box))
    }

    pub fn start(&self) -> Option<Point> {
        self.edges.first().and_then(Edge::start_point)
    }

    pub fn end(&self) -> Option<Point> {
        self.edges.last().and_then(Edge::end_point)
    }

    /// All switch links on all edge nodes, in track order.
    pub fn switch_links(&self) -> impl Iterator<Item = &SwitchLink> {
        self.edges
            .iter()
            .flat_map(|e| e.start_node.links().chain(e.end_node.links()))
    }

    /// Index of the first edge at or after `from` whose start node carries the given
    /// switch joint as an inner link.
    pub fn find_inner_boundary(
        &self,
        switch_id: SwitchId,
        joint: JointNumber,
        from: usize,
    ) -> Option<usize> {
        self.edges
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, e)| e.start_node.has_inner_joint(switch_id, joint))
            .map(|(index, _)| index)
    }

    /// Maps an edge index range onto the matching range of the flattened segment list.
    pub fn segment_index_range(&self, edges: &RangeInclusive<usize>) -> RangeInclusive<usize> {
        let before: usize = self.edges[..*edges.start()]
            .iter()
            .map(Edge::segment_count)
            .sum();
        let within: usize = self.edges[edges.clone()]
            .iter()
            .map(Edge::segment_count)
            .sum();
        before..=(before + within).saturating_sub(1)
    }

    /// Start point of the first and end point of the last edge in `edges`.
    pub fn edge_range_start_and_end(&self, edges: &RangeInclusive<usize>) -> Option<(Point, Point)> {
        let start = self.edges.get(*edges.start())?.start_point()?;
        let end = self.edges.get(*edges.end())?.end_point()?;
        Some((start, end))
    }
}

impl TryFrom<Vec<Edge>> for TrackGeometry {
    type Error = GeometryError;

    fn try_from(edges: Vec<Edge>) -> Result<Self, Self::Error> {
        TrackGeometry::new(edges)
    }
}

impl From<TrackGeometry> for Vec<Edge> {
    fn from(geometry: TrackGeometry) -> Self {
        geometry.edges
    }
}
