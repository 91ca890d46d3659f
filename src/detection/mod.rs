pub mod http;

pub use http::HttpDetector;

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::GateConfig;
use crate::error::GateResult;

/// Known detector classes; anything else keeps its raw id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleClass {
    Person,
    Bicycle,
    Car,
    Motorcycle,
    Bus,
    Truck,
    Unknown(u32),
}

impl VehicleClass {
    pub fn from_class_id(id: u32) -> Self {
        match id {
            0 => VehicleClass::Person,
            1 => VehicleClass::Bicycle,
            2 => VehicleClass::Car,
            3 => VehicleClass::Motorcycle,
            5 => VehicleClass::Bus,
            7 => VehicleClass::Truck,
            other => VehicleClass::Unknown(other),
        }
    }

    pub fn class_id(&self) -> u32 {
        match self {
            VehicleClass::Person => 0,
            VehicleClass::Bicycle => 1,
            VehicleClass::Car => 2,
            VehicleClass::Motorcycle => 3,
            VehicleClass::Bus => 5,
            VehicleClass::Truck => 7,
            VehicleClass::Unknown(id) => *id,
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VehicleClass::Person => f.write_str("Person"),
            VehicleClass::Bicycle => f.write_str("Bicycle"),
            VehicleClass::Car => f.write_str("Car"),
            VehicleClass::Motorcycle => f.write_str("Motorcycle"),
            VehicleClass::Bus => f.write_str("Bus"),
            VehicleClass::Truck => f.write_str("Truck"),
            VehicleClass::Unknown(id) => write!(f, "Unknown-{}", id),
        }
    }
}

/// Highest-scoring vehicle in the image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleDetection {
    pub class: VehicleClass,
    /// In `[0, 1]`.
    pub confidence: f32,
}

/// Outcome of one detection call. `vehicle: None` and `plate_text: None`
/// are valid results, not errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResult {
    pub vehicle: Option<VehicleDetection>,
    /// Raw OCR text of the first plate found.
    pub plate_text: Option<String>,
}

/// External vehicle/plate recognizer.
///
/// Implementations may block for a long time; callers wrap every call in a
/// timeout and must not write any state before it returns.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, image_path: &Path) -> GateResult<DetectionResult>;
}

/// Build the configured detector
pub fn create_detector(config: &GateConfig) -> GateResult<Arc<dyn Detector>> {
    Ok(Arc::new(HttpDetector::new(
        &config.detector_url,
        config.detection_timeout,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_ids_map_to_closed_set() {
        assert_eq!(VehicleClass::from_class_id(2), VehicleClass::Car);
        assert_eq!(VehicleClass::from_class_id(7), VehicleClass::Truck);
        assert_eq!(VehicleClass::from_class_id(4), VehicleClass::Unknown(4));
        assert_eq!(VehicleClass::from_class_id(4).class_id(), 4);
        assert_eq!(VehicleClass::Bus.class_id(), 5);
    }

    #[test]
    fn unknown_classes_render_with_their_id() {
        assert_eq!(VehicleClass::Unknown(9).to_string(), "Unknown-9");
        assert_eq!(VehicleClass::Motorcycle.to_string(), "Motorcycle");
    }
}
