//! Store variants: what each kind of feature table holds and how its
//! values are serialized.

use featstore_types::{Feature, Geometry, ProcedureDesc, StoredFeature, SystemDesc};

use crate::error::{Error, Result};
use crate::filter::{FeatureFilter, TemporalFilter};

/// Capabilities a feature store needs from the values it holds.
pub trait FeatureKind: Send + Sync + 'static {
    /// Stored value type.
    type Value: StoredFeature + Clone + Send + Sync + 'static;

    /// Table used when the configuration does not name one.
    const DEFAULT_TABLE: &'static str;

    /// Serialize a value to its persisted text form.
    fn write(value: &Self::Value) -> Result<String>;

    /// Deserialize a value from its persisted text form.
    fn read(data: &str) -> Result<Self::Value>;

    /// Filter selecting the entries returned by `entries()`.
    fn entry_filter() -> FeatureFilter<Self::Value> {
        FeatureFilter::new()
    }
}

/// Generic features stored as GeoJSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoJsonFeatures;

impl FeatureKind for GeoJsonFeatures {
    type Value = Feature;
    const DEFAULT_TABLE: &'static str = "features";

    fn write(value: &Feature) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn read(data: &str) -> Result<Feature> {
        Ok(serde_json::from_str(data)?)
    }
}

/// Procedure descriptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcedureDescriptions;

impl FeatureKind for ProcedureDescriptions {
    type Value = ProcedureDesc;
    const DEFAULT_TABLE: &'static str = "procedures";

    fn write(value: &ProcedureDesc) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn read(data: &str) -> Result<ProcedureDesc> {
        Ok(serde_json::from_str(data)?)
    }
}

/// System descriptions. Only the latest version of each system is listed
/// as an entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDescriptions;

impl FeatureKind for SystemDescriptions {
    type Value = SystemDesc;
    const DEFAULT_TABLE: &'static str = "systems";

    /// Systems are located by a single point. Links to the system kind
    /// point at its SensorML rendition.
    fn write(value: &SystemDesc) -> Result<String> {
        match &value.position {
            None | Some(Geometry::Point(_)) => {}
            Some(other) => return Err(Error::UnsupportedGeometry(other.kind())),
        }
        match &value.system_kind {
            Some(link) if link.href.contains("f=json") => {
                let mut value = value.clone();
                if let Some(link) = value.system_kind.as_mut() {
                    link.href = link.href.replace("f=json", "f=sml");
                }
                Ok(serde_json::to_string(&value)?)
            }
            _ => Ok(serde_json::to_string(value)?),
        }
    }

    fn read(data: &str) -> Result<SystemDesc> {
        Ok(serde_json::from_str(data)?)
    }

    fn entry_filter() -> FeatureFilter<SystemDesc> {
        FeatureFilter::new().valid_time(TemporalFilter::LatestVersion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use featstore_types::{Link, TimeExtent};
    use time::macros::datetime;

    #[test]
    fn test_feature_round_trip() {
        let feature = Feature::new("urn:osh:foi:1", "Gauge")
            .with_geometry(Geometry::Point([1.0, 2.0]))
            .with_valid_time(TimeExtent::beginning_at(datetime!(2024-01-01 0:00 UTC)))
            .with_property("depth", 3.5);
        let text = GeoJsonFeatures::write(&feature).unwrap();
        assert_eq!(GeoJsonFeatures::read(&text).unwrap(), feature);
    }

    #[test]
    fn test_procedure_round_trip() {
        let mut procedure = ProcedureDesc::new("urn:osh:proc:1", "Datasheet");
        procedure.definition = Some("http://www.w3.org/ns/sosa/Sensor".into());
        let text = ProcedureDescriptions::write(&procedure).unwrap();
        assert_eq!(ProcedureDescriptions::read(&text).unwrap(), procedure);
    }

    #[test]
    fn test_system_rejects_non_point_location() {
        let mut system = SystemDesc::new("urn:osh:sys:1", "Buoy");
        system.position = Some(Geometry::LineString(vec![[0.0, 0.0], [1.0, 1.0]]));
        let err = SystemDescriptions::write(&system).unwrap_err();
        assert!(matches!(err, Error::UnsupportedGeometry("LineString")));
    }

    #[test]
    fn test_system_kind_link_rewritten() {
        let mut system = SystemDesc::new("urn:osh:sys:1", "Buoy");
        system.system_kind = Some(Link {
            href: "https://example.org/procedures/12?f=json".into(),
            title: Some("Buoy datasheet".into()),
        });
        let stored = SystemDescriptions::read(&SystemDescriptions::write(&system).unwrap()).unwrap();
        let link = stored.system_kind.unwrap();
        assert_eq!(link.href, "https://example.org/procedures/12?f=sml");
        assert_eq!(link.title.as_deref(), Some("Buoy datasheet"));
    }

    #[test]
    fn test_entry_filters() {
        assert!(GeoJsonFeatures::entry_filter().valid_time.is_none());
        assert_eq!(
            SystemDescriptions::entry_filter().valid_time,
            Some(TemporalFilter::LatestVersion)
        );
    }
}
