//! Geocoded track addresses.
//!
//! Geocoding is done elsewhere; this module only holds the values it produces.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, COORDINATE_DELTA, M_DELTA};

/// Track address: kilometre number plus meters within that kilometre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackMeter {
    pub km: u32,
    pub meters: f64,
}

impl TrackMeter {
    pub fn new(km: u32, meters: f64) -> Self {
        Self { km, meters }
    }

    pub fn is_same(&self, other: &TrackMeter, delta: f64) -> bool {
        self.km == other.km && (self.meters - other.meters).abs() <= delta
    }
}

impl PartialOrd for TrackMeter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.km.cmp(&other.km) {
            Ordering::Equal => self.meters.partial_cmp(&other.meters),
            ord => Some(ord),
        }
    }
}

impl fmt::Display for TrackMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}+{:08.3}", self.km, self.meters)
    }
}

/// A geometry point annotated with its track address.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AddressPoint {
    pub address: TrackMeter,
    pub point: Point,
    /// Distance along the reference line.
    pub m: f64,
}

impl AddressPoint {
    pub fn new(address: TrackMeter, point: Point, m: f64) -> Self {
        Self { address, point, m }
    }

    /// Same address and same location, within layout tolerances.
    pub fn is_same(&self, other: &AddressPoint) -> bool {
        self.address.is_same(&other.address, M_DELTA)
            && self.point.is_same(&other.point, COORDINATE_DELTA)
    }
}

/// Span of a track along its reference line, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AddressRange {
    pub start: f64,
    pub end: f64,
}

impl AddressRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Range covered by a sequence of address points, first to last.
    pub fn of(points: &[AddressPoint]) -> Option<Self> {
        Some(Self::new(points.first()?.m, points.last()?.m))
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    /// Share of `self` covered by `other`, as a percentage.
    pub fn overlap_percentage(&self, other: &AddressRange) -> f64 {
        let length = self.length();
        if length <= 0.0 {
            return 0.0;
        }
        let overlap = (self.end.min(other.end) - self.start.max(other.start)).max(0.0);
        overlap / length * 100.0
    }
}
