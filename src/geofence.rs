//! Campus geofence: accuracy gate plus even-odd point-in-polygon containment.
//!
//! Containment uses longitude as x and latitude as y. An edge counts as
//! crossed when exactly one of its endpoints has a latitude strictly greater
//! than the point's, and the point lies strictly west of where the edge meets
//! the point's latitude.
//!
//! Points exactly on the boundary follow from that half-open rule and are
//! not guaranteed either way: a point on a west-facing or south-facing edge
//! tends to test inside, one on an east-facing or north-facing edge tends to
//! test outside, and vertices follow the edge that owns them. Callers must not
//! rely on boundary behaviour.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CampusConfig, Position};

// ---

/// Vertices of the default campus ring, `[lat, lng]`.
pub const CAMPUS_RING: [[f64; 2]; 8] = [
    [12.8455, 80.1532],
    [12.8447, 80.1587],
    [12.8435, 80.1589],
    [12.8395, 80.1560],
    [12.8387, 80.1545],
    [12.8419, 80.1515],
    [12.8425, 80.1510],
    [12.8456, 80.1518],
];

/// Why a position was not trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Untrusted {
    #[error("reported accuracy is too low")]
    LowAccuracy,
    #[error("position is outside the campus boundary")]
    OutsideCampus,
}

/// Closed ring of `[lat, lng]` vertices; the closing edge is implicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct GeofencePolygon {
    vertices: Vec<[f64; 2]>,
}

/// Invalid polygon definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolygonError {
    #[error("polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),
    #[error("polygon vertex {0} is not a finite coordinate")]
    NonFiniteVertex(usize),
}

impl GeofencePolygon {
    // ---
    pub fn new(vertices: Vec<[f64; 2]>) -> Result<Self, PolygonError> {
        // ---
        if vertices.len() < 3 {
            return Err(PolygonError::TooFewVertices(vertices.len()));
        }
        if let Some(idx) = vertices
            .iter()
            .position(|[lat, lng]| !lat.is_finite() || !lng.is_finite())
        {
            return Err(PolygonError::NonFiniteVertex(idx));
        }
        Ok(Self { vertices })
    }

    /// The built-in campus boundary.
    pub fn campus() -> Self {
        Self {
            vertices: CAMPUS_RING.to_vec(),
        }
    }

    pub fn vertices(&self) -> &[[f64; 2]] {
        &self.vertices
    }

    /// Even-odd containment test.
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        // ---
        if !lat.is_finite() || !lng.is_finite() {
            return false;
        }

        let mut inside = false;
        let n = self.vertices.len();
        let mut j = n - 1;
        for i in 0..n {
            let [yi, xi] = self.vertices[i];
            let [yj, xj] = self.vertices[j];

            if (yi > lat) != (yj > lat) {
                let cross_lng = (xj - xi) * (lat - yi) / (yj - yi) + xi;
                if lng < cross_lng {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

impl TryFrom<Vec<[f64; 2]>> for GeofencePolygon {
    type Error = PolygonError;

    fn try_from(vertices: Vec<[f64; 2]>) -> Result<Self, Self::Error> {
        GeofencePolygon::new(vertices)
    }
}

impl From<GeofencePolygon> for Vec<[f64; 2]> {
    fn from(polygon: GeofencePolygon) -> Self {
        polygon.vertices
    }
}

// ---

/// Decides whether a reported position can be trusted.
#[derive(Debug, Clone)]
pub struct GeofenceValidator {
    polygon: GeofencePolygon,
    max_accuracy_m: f64,
}

impl GeofenceValidator {
    // ---
    pub fn new(polygon: GeofencePolygon, max_accuracy_m: f64) -> Self {
        Self {
            polygon,
            max_accuracy_m,
        }
    }

    pub fn from_config(campus: &CampusConfig) -> Self {
        Self::new(campus.polygon.clone(), campus.max_accuracy_m)
    }

    /// Accuracy gate first, then containment. Pure.
    pub fn is_trusted(&self, position: &Position) -> Result<(), Untrusted> {
        // ---
        // NaN accuracy fails this comparison too
        if !(position.accuracy_m <= self.max_accuracy_m) {
            return Err(Untrusted::LowAccuracy);
        }
        if !self.contains(position.lat, position.lng) {
            return Err(Untrusted::OutsideCampus);
        }
        Ok(())
    }

    /// Containment only, for server-asserted points with no accuracy.
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        self.polygon.contains(lat, lng)
    }
}
