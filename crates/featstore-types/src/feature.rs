//! Generic features and the capabilities every stored value exposes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ValidationError, ValidationResult};
use crate::geometry::Geometry;
use crate::temporal::TimeExtent;

/// Read access to the fields a feature store persists out-of-band.
pub trait StoredFeature {
    /// Globally unique identifier (usually a URN).
    fn unique_identifier(&self) -> &str;

    /// Human readable name.
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    fn geometry(&self) -> Option<&Geometry> {
        None
    }

    /// Authoritative source for the persisted valid-time range.
    fn valid_time(&self) -> Option<&TimeExtent> {
        None
    }
}

/// Check that a feature can be persisted.
///
/// Requires a non-empty unique identifier without whitespace, a non-empty
/// name, a valid time that does not end before it begins and a well-formed
/// geometry.
pub fn check_feature_object<F: StoredFeature + ?Sized>(feature: &F) -> ValidationResult<()> {
    let uid = feature.unique_identifier();
    if uid.is_empty() {
        return Err(ValidationError::MissingUid);
    }
    if uid.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::InvalidUid(uid.to_string()));
    }
    if feature.name().trim().is_empty() {
        return Err(ValidationError::MissingName(uid.to_string()));
    }
    if feature.valid_time().is_some_and(TimeExtent::is_inverted) {
        return Err(ValidationError::InvalidValidTime(uid.to_string()));
    }
    if let Some(geometry) = feature.geometry() {
        geometry
            .check()
            .map_err(|source| ValidationError::InvalidGeometry {
                uid: uid.to_string(),
                source,
            })?;
    }
    Ok(())
}

/// A generic feature, serialized as a GeoJSON `Feature` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "GeoJsonFeature", try_from = "GeoJsonFeature")]
pub struct Feature {
    pub uid: String,
    pub name: String,
    pub description: Option<String>,
    /// Semantic type URI.
    pub feature_type: Option<String>,
    pub geometry: Option<Geometry>,
    pub valid_time: Option<TimeExtent>,
    /// Additional GeoJSON properties, kept verbatim.
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Create a feature with only identity fields set.
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            description: None,
            feature_type: None,
            geometry: None,
            valid_time: None,
            properties: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_type(mut self, feature_type: impl Into<String>) -> Self {
        self.feature_type = Some(feature_type.into());
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_valid_time(mut self, valid_time: TimeExtent) -> Self {
        self.valid_time = Some(valid_time);
        self
    }

    /// Set an extra GeoJSON property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

impl StoredFeature for Feature {
    fn unique_identifier(&self) -> &str {
        &self.uid
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    fn valid_time(&self) -> Option<&TimeExtent> {
        self.valid_time.as_ref()
    }
}

const GEOJSON_FEATURE: &str = "Feature";

#[derive(Serialize, Deserialize)]
struct GeoJsonFeature {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    geometry: Option<Geometry>,
    properties: GeoJsonProperties,
}

#[derive(Serialize, Deserialize)]
struct GeoJsonProperties {
    uid: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "featureType", default, skip_serializing_if = "Option::is_none")]
    feature_type: Option<String>,
    #[serde(rename = "validTime", default, skip_serializing_if = "Option::is_none")]
    valid_time: Option<TimeExtent>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<Feature> for GeoJsonFeature {
    fn from(f: Feature) -> Self {
        Self {
            kind: GEOJSON_FEATURE.to_string(),
            geometry: f.geometry,
            properties: GeoJsonProperties {
                uid: f.uid,
                name: f.name,
                description: f.description,
                feature_type: f.feature_type,
                valid_time: f.valid_time,
                extra: f.properties,
            },
        }
    }
}

impl TryFrom<GeoJsonFeature> for Feature {
    type Error = String;

    fn try_from(g: GeoJsonFeature) -> Result<Self, Self::Error> {
        if g.kind != GEOJSON_FEATURE {
            return Err(format!("expected GeoJSON type 'Feature', got '{}'", g.kind));
        }
        let p = g.properties;
        Ok(Self {
            uid: p.uid,
            name: p.name,
            description: p.description,
            feature_type: p.feature_type,
            geometry: g.geometry,
            valid_time: p.valid_time,
            properties: p.extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn station() -> Feature {
        Feature::new("urn:osh:foi:station1", "Station 1")
            .with_description("River gauge")
            .with_type("http://www.opengis.net/def/samplingFeatureType/OGC-OM/2.0/SF_SamplingPoint")
            .with_geometry(Geometry::Point([1.5, 43.2]))
            .with_valid_time(TimeExtent::beginning_at(datetime!(2024-03-01 0:00 UTC)))
            .with_property("river", "Garonne")
    }

    #[test]
    fn test_geojson_layout() {
        let json = serde_json::to_value(station()).unwrap();
        assert_eq!(json["type"], "Feature");
        assert_eq!(json["geometry"]["type"], "Point");
        assert_eq!(json["properties"]["uid"], "urn:osh:foi:station1");
        assert_eq!(json["properties"]["validTime"][0], "2024-03-01T00:00:00Z");
        assert_eq!(json["properties"]["validTime"][1], "..");
        assert_eq!(json["properties"]["river"], "Garonne");
    }

    #[test]
    fn test_round_trip_keeps_persisted_fields() {
        let original = station();
        let text = serde_json::to_string(&original).unwrap();
        let parsed: Feature = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_null_geometry() {
        let text = r#"{"type":"Feature","geometry":null,"properties":{"uid":"urn:x:1","name":"x"}}"#;
        let parsed: Feature = serde_json::from_str(text).unwrap();
        assert!(parsed.geometry.is_none());
        assert!(parsed.valid_time.is_none());
    }

    #[test]
    fn test_rejects_other_geojson_types() {
        let text = r#"{"type":"FeatureCollection","properties":{"uid":"urn:x:1","name":"x"}}"#;
        assert!(serde_json::from_str::<Feature>(text).is_err());
    }

    #[test]
    fn test_check_feature_object() {
        assert!(check_feature_object(&station()).is_ok());

        let err = check_feature_object(&Feature::new("", "nameless")).unwrap_err();
        assert!(matches!(err, ValidationError::MissingUid));

        let err = check_feature_object(&Feature::new("urn:x 1", "x")).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidUid(_)));

        let err = check_feature_object(&Feature::new("urn:x:1", " ")).unwrap_err();
        assert!(matches!(err, ValidationError::MissingName(_)));

        let inverted = Feature::new("urn:x:1", "x").with_valid_time(TimeExtent::period(
            datetime!(2024-02-01 0:00 UTC),
            datetime!(2024-01-01 0:00 UTC),
        ));
        assert!(matches!(
            check_feature_object(&inverted),
            Err(ValidationError::InvalidValidTime(_))
        ));

        let bad_geom = Feature::new("urn:x:1", "x").with_geometry(Geometry::LineString(vec![]));
        assert!(matches!(
            check_feature_object(&bad_geom),
            Err(ValidationError::InvalidGeometry { .. })
        ));
    }
}
