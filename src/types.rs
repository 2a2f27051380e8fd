use geo::{MultiPolygon, Point};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A point of interest in WGS84. `location` is (x = lon, y = lat).
#[derive(Debug, Clone)]
pub struct PointOfInterest {
    pub location: Point<f64>,
    pub name: Option<String>,
    pub amenity: Option<String>,
    pub brand: Option<String>,
}

impl PointOfInterest {
    /// A chain is anything carrying a non-empty brand.
    pub fn is_chain(&self) -> bool {
        self.brand.as_deref().is_some_and(|b| !b.trim().is_empty())
    }
}

// One line of a JSON-lines point file, as written by `osm-to-json` or
// found in the amenity dumps (which nest the brand under `tags`).
#[derive(Debug, Deserialize)]
pub struct RawPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub amenity: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, serde_json::Value>,
}

impl From<RawPoint> for PointOfInterest {
    fn from(raw: RawPoint) -> Self {
        let brand = non_empty(raw.brand).or_else(|| match raw.tags.get("brand") {
            Some(serde_json::Value::String(s)) => non_empty(Some(s.clone())),
            _ => None,
        });
        PointOfInterest {
            location: Point::new(raw.lon, raw.lat),
            name: non_empty(raw.name),
            amenity: non_empty(raw.amenity),
            brand,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// A census tract. Geometry and area live in the tracts' projected CRS.
#[derive(Debug, Clone)]
pub struct Tract {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    pub area_km2: f64,
}

/// A point that fell inside a tract. `location` is in the tracts' CRS.
#[derive(Debug, Clone)]
pub struct JoinedRecord {
    pub tract_id: String,
    pub is_chain: bool,
    pub name: Option<String>,
    pub location: Point<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRecord {
    pub tract_id: String,
    pub is_chain: bool,
    pub count: u64,
    pub total_count: u64,
    /// Points per km²; `None` when the tract has no area.
    pub density: Option<f64>,
}

/// A tract paired with one numeric value, ready for mapping or Moran's I.
#[derive(Debug, Clone)]
pub struct TractValue {
    pub tract_id: String,
    pub geometry: MultiPolygon<f64>,
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Listing {
    pub fn location(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// An amenity found near a reference point.
#[derive(Debug, Clone, Serialize)]
pub struct AmenityMatch {
    pub amenity: Option<String>,
    pub name: Option<String>,
    pub distance: f64,
    #[serde(skip)]
    pub location: Point<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> PointOfInterest {
        serde_json::from_str::<RawPoint>(json).unwrap().into()
    }

    #[test]
    fn brand_decides_chain() {
        assert!(raw(r#"{"lat":49.0,"lon":-123.0,"brand":"Starbucks"}"#).is_chain());
        assert!(!raw(r#"{"lat":49.0,"lon":-123.0,"brand":""}"#).is_chain());
        assert!(!raw(r#"{"lat":49.0,"lon":-123.0}"#).is_chain());
        assert!(!raw(r#"{"lat":49.0,"lon":-123.0,"brand":null}"#).is_chain());
    }

    #[test]
    fn brand_falls_back_to_tags() {
        let poi = raw(r#"{"lat":49.0,"lon":-123.0,"tags":{"brand":"Tim Hortons"}}"#);
        assert!(poi.is_chain());
        assert_eq!(poi.brand.as_deref(), Some("Tim Hortons"));
    }

    #[test]
    fn empty_name_becomes_none() {
        let poi = raw(r#"{"lat":49.25,"lon":-123.1,"name":"","amenity":"cafe"}"#);
        assert_eq!(poi.name, None);
        assert_eq!(poi.amenity.as_deref(), Some("cafe"));
        assert_eq!(poi.location, Point::new(-123.1, 49.25));
    }
}
