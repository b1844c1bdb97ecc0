//! # Coordinates and Operating Zones
//!
//! WGS84 coordinates as supplied by the mobile clients, plus the two pieces
//! of planar geometry the in-memory candidate locator needs: great-circle
//! distance and point-in-polygon. Production lookups run in PostGIS.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Mean Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A validated latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPoint", into = "RawPoint")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

#[derive(Serialize, Deserialize)]
struct RawPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Create a point, rejecting non-finite or out-of-range coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::OutOfRange {
                field: "latitude",
                value: latitude.to_string(),
            });
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::OutOfRange {
                field: "longitude",
                value: longitude.to_string(),
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance to `other` in metres (haversine).
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

impl TryFrom<RawPoint> for GeoPoint {
    type Error = ValidationError;

    fn try_from(raw: RawPoint) -> Result<Self, Self::Error> {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl From<GeoPoint> for RawPoint {
    fn from(p: GeoPoint) -> Self {
        Self {
            latitude: p.latitude,
            longitude: p.longitude,
        }
    }
}

/// A simple (non-self-intersecting) polygon describing an operating zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPolygon", into = "RawPolygon")]
pub struct GeoPolygon {
    vertices: Vec<GeoPoint>,
}

#[derive(Serialize, Deserialize)]
struct RawPolygon {
    vertices: Vec<GeoPoint>,
}

impl TryFrom<RawPolygon> for GeoPolygon {
    type Error = ValidationError;

    fn try_from(raw: RawPolygon) -> Result<Self, Self::Error> {
        Self::new(raw.vertices)
    }
}

impl From<GeoPolygon> for RawPolygon {
    fn from(p: GeoPolygon) -> Self {
        Self {
            vertices: p.vertices,
        }
    }
}

impl GeoPolygon {
    /// Create a polygon from at least three vertices. The ring is closed
    /// implicitly; repeating the first vertex is allowed.
    pub fn new(vertices: Vec<GeoPoint>) -> Result<Self, ValidationError> {
        if vertices.len() < 3 {
            return Err(ValidationError::OutOfRange {
                field: "polygon vertices",
                value: vertices.len().to_string(),
            });
        }
        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[GeoPoint] {
        &self.vertices
    }

    /// Even-odd ray casting in lon/lat space.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        let (x, y) = (point.longitude, point.latitude);
        let mut inside = false;
        let n = self.vertices.len();
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = (self.vertices[i].longitude, self.vertices[i].latitude);
            let (xj, yj) = (self.vertices[j].longitude, self.vertices[j].latitude);
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn square() -> GeoPolygon {
        GeoPolygon::new(vec![
            GeoPoint::new(-1.0, -1.0).unwrap(),
            GeoPoint::new(-1.0, 1.0).unwrap(),
            GeoPoint::new(1.0, 1.0).unwrap(),
            GeoPoint::new(1.0, -1.0).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        assert!(GeoPoint::new(91.0, 0.0).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn rejects_out_of_range_longitude() {
        assert!(GeoPoint::new(0.0, -180.5).is_err());
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let a = GeoPoint::new(0.0, 0.0).unwrap();
        let b = GeoPoint::new(1.0, 0.0).unwrap();
        let d = a.distance_m(&b);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn polygon_contains_interior_point() {
        assert!(square().contains(&GeoPoint::new(0.2, -0.3).unwrap()));
        assert!(!square().contains(&GeoPoint::new(2.0, 0.0).unwrap()));
    }

    #[test]
    fn polygon_needs_three_vertices() {
        let two = vec![
            GeoPoint::new(0.0, 0.0).unwrap(),
            GeoPoint::new(1.0, 1.0).unwrap(),
        ];
        assert!(GeoPolygon::new(two).is_err());
    }

    #[test]
    fn deserialize_validates_range() {
        let bad: Result<GeoPoint, _> =
            serde_json::from_str(r#"{"latitude": 120.0, "longitude": 0.0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn deserialize_polygon_enforces_vertex_count() {
        let empty: Result<GeoPolygon, _> = serde_json::from_str(r#"{"vertices": []}"#);
        assert!(empty.is_err());

        let json = serde_json::to_string(&square()).unwrap();
        let back: GeoPolygon = serde_json::from_str(&json).unwrap();
        assert_eq!(back, square());
        assert!(back.contains(&GeoPoint::new(0.0, 0.0).unwrap()));
    }

    proptest! {
        #[test]
        fn valid_coordinates_accepted(lat in -90.0f64..=90.0, lon in -180.0f64..=180.0) {
            prop_assert!(GeoPoint::new(lat, lon).is_ok());
        }

        #[test]
        fn distance_is_symmetric(
            lat1 in -89.0f64..89.0, lon1 in -179.0f64..179.0,
            lat2 in -89.0f64..89.0, lon2 in -179.0f64..179.0,
        ) {
            let a = GeoPoint::new(lat1, lon1).unwrap();
            let b = GeoPoint::new(lat2, lon2).unwrap();
            prop_assert!((a.distance_m(&b) - b.distance_m(&a)).abs() < 1e-6);
        }
    }
}
