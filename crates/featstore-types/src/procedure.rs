//! Procedure and system descriptions (SensorML-like JSON).

use serde::{Deserialize, Serialize};

use crate::feature::StoredFeature;
use crate::geometry::Geometry;
use crate::temporal::TimeExtent;

/// Kind of process being described.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessType {
    #[default]
    SimpleProcess,
    AggregateProcess,
    PhysicalComponent,
    PhysicalSystem,
}

/// Reference to another resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A procedure (datasheet or method) description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureDesc {
    #[serde(rename = "type", default)]
    pub process_type: ProcessType,
    #[serde(rename = "uniqueId")]
    pub uid: String,
    #[serde(rename = "label")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Semantic definition URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_time: Option<TimeExtent>,
    /// Names of the outputs produced by the procedure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
}

impl ProcedureDesc {
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            process_type: ProcessType::default(),
            uid: uid.into(),
            name: name.into(),
            description: None,
            definition: None,
            valid_time: None,
            outputs: Vec::new(),
        }
    }
}

impl StoredFeature for ProcedureDesc {
    fn unique_identifier(&self) -> &str {
        &self.uid
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn valid_time(&self) -> Option<&TimeExtent> {
        self.valid_time.as_ref()
    }
}

/// A system (sensor, platform) description with an optional location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemDesc {
    #[serde(rename = "type", default = "physical_system")]
    pub system_type: ProcessType,
    #[serde(rename = "uniqueId")]
    pub uid: String,
    #[serde(rename = "label")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_time: Option<TimeExtent>,
    /// Static location of the system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Geometry>,
    /// Link to the system kind (datasheet) this system is an instance of.
    #[serde(rename = "typeOf", default, skip_serializing_if = "Option::is_none")]
    pub system_kind: Option<Link>,
}

fn physical_system() -> ProcessType {
    ProcessType::PhysicalSystem
}

impl SystemDesc {
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            system_type: ProcessType::PhysicalSystem,
            uid: uid.into(),
            name: name.into(),
            description: None,
            definition: None,
            valid_time: None,
            position: None,
            system_kind: None,
        }
    }
}

impl StoredFeature for SystemDesc {
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
        self.position.as_ref()
    }

    fn valid_time(&self) -> Option<&TimeExtent> {
        self.valid_time.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_procedure_json_names() {
        let mut proc = ProcedureDesc::new("urn:osh:procedure:thermo", "Thermometer datasheet");
        proc.outputs = vec!["temperature".into()];
        let json = serde_json::to_value(&proc).unwrap();
        assert_eq!(json["type"], "SimpleProcess");
        assert_eq!(json["uniqueId"], "urn:osh:procedure:thermo");
        assert_eq!(json["label"], "Thermometer datasheet");
        assert_eq!(json["outputs"][0], "temperature");
        assert!(json.get("validTime").is_none());
    }

    #[test]
    fn test_system_defaults_to_physical_system() {
        let text = r#"{"uniqueId":"urn:osh:sensor:1","label":"Sensor 1"}"#;
        let system: SystemDesc = serde_json::from_str(text).unwrap();
        assert_eq!(system.system_type, ProcessType::PhysicalSystem);
        assert!(system.position.is_none());
    }

    #[test]
    fn test_system_position_is_geometry() {
        let mut system = SystemDesc::new("urn:osh:sensor:1", "Sensor 1");
        system.position = Some(Geometry::Point([2.0, 48.0]));
        assert_eq!(system.geometry(), Some(&Geometry::Point([2.0, 48.0])));
    }
}
