use serde::{Deserialize, Deserializer, Serialize};

use crate::geo::LatLng;

pub type Payload = serde_json::Map<String, serde_json::Value>;

/// One artisan record as supplied by the point feed.
///
/// Everything besides `id`/`lat`/`lng` is kept verbatim in `payload`.
/// Coordinates that are missing or unparsable deserialize as NaN; such a
/// point survives ingestion but is never placed on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(alias = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(
        default = "missing_coordinate",
        alias = "latitude",
        deserialize_with = "deserialize_coordinate"
    )]
    pub lat: f64,
    #[serde(
        default = "missing_coordinate",
        alias = "longitude",
        deserialize_with = "deserialize_coordinate"
    )]
    pub lng: f64,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Point {
    pub fn new(id: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: id.into(),
            lat,
            lng,
            payload: Payload::new(),
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// The point's position, or `None` when either coordinate is not finite.
    pub fn position(&self) -> Option<LatLng> {
        let pos = LatLng::new(self.lat, self.lng);
        pos.is_finite().then_some(pos)
    }
}

fn missing_coordinate() -> f64 {
    f64::NAN
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCoordinate {
    Number(f64),
    Text(String),
}

fn deserialize_coordinate<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawCoordinate>::deserialize(deserializer)? {
        Some(RawCoordinate::Number(value)) => value,
        Some(RawCoordinate::Text(text)) => text.trim().parse().unwrap_or(f64::NAN),
        None => f64::NAN,
    })
}

#[cfg(test)]
mod tests {
    use super::Point;

    #[test]
    fn deserializes_flat_record_with_payload() {
        let point: Point = serde_json::from_str(
            r#"{"id":"a1","lat":31.52,"lng":74.35,"name":"Potter","craft":"ceramics"}"#,
        )
        .expect("point should parse");

        assert_eq!(point.id, "a1");
        assert_eq!(point.lat, 31.52);
        assert_eq!(point.lng, 74.35);
        assert_eq!(
            point.payload.get("craft").and_then(|v| v.as_str()),
            Some("ceramics")
        );
        assert!(!point.payload.contains_key("lat"));
    }

    #[test]
    fn accepts_numeric_ids_aliases_and_string_coordinates() {
        let point: Point =
            serde_json::from_str(r#"{"_id":42,"latitude":"31.5","longitude":" 74.25 "}"#)
                .expect("point should parse");

        assert_eq!(point.id, "42");
        assert_eq!(point.lat, 31.5);
        assert_eq!(point.lng, 74.25);
    }

    #[test]
    fn missing_or_garbage_coordinates_become_non_finite() {
        let missing: Point = serde_json::from_str(r#"{"id":"x","lng":74.0}"#).expect("parse");
        assert!(missing.lat.is_nan());
        assert!(missing.position().is_none());

        let garbage: Point =
            serde_json::from_str(r#"{"id":"y","lat":"north","lng":null}"#).expect("parse");
        assert!(garbage.lat.is_nan());
        assert!(garbage.lng.is_nan());
        assert!(garbage.position().is_none());
    }

    #[test]
    fn position_requires_finite_coordinates() {
        assert!(Point::new("a", 1.0, 2.0).position().is_some());
        assert!(Point::new("b", f64::INFINITY, 2.0).position().is_none());
    }
}
