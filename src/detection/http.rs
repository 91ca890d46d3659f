use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::{DetectionResult, Detector, VehicleClass, VehicleDetection};
use crate::error::{GateError, GateResult};

/// Detector backed by an inference service.
///
/// Posts the image as multipart field `image` and expects
/// `{"vehicle": {"class_id": 2, "confidence": 0.91} | null, "plate_text": "..." | null}`.
pub struct HttpDetector {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct WireVehicle {
    class_id: u32,
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    #[serde(default)]
    vehicle: Option<WireVehicle>,
    #[serde(default)]
    plate_text: Option<String>,
}

impl From<WireDetection> for DetectionResult {
    fn from(wire: WireDetection) -> Self {
        DetectionResult {
            vehicle: wire.vehicle.map(|v| VehicleDetection {
                class: VehicleClass::from_class_id(v.class_id),
                confidence: if v.confidence.is_finite() {
                    v.confidence.clamp(0.0, 1.0)
                } else {
                    0.0
                },
            }),
            plate_text: wire
                .plate_text
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        }
    }
}

impl HttpDetector {
    pub fn new(endpoint: &str, timeout: Duration) -> GateResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GateError::Config(format!("detector client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, image_path: &Path) -> GateResult<DetectionResult> {
        // 1. read the saved upload
        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|e| GateError::Detection(format!("cannot read image: {}", e)))?;
        let file_name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        // 2. send to the inference service
        let form = Form::new().part("image", Part::bytes(bytes).file_name(file_name));
        let resp = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| GateError::Detection(format!("detector request failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(GateError::Detection(format!(
                "detector returned {}",
                resp.status()
            )));
        }

        // 3. decode
        let wire: WireDetection = resp
            .json()
            .await
            .map_err(|e| GateError::Detection(format!("bad detector response: {}", e)))?;
        debug!("detector response for {}: {:?}", image_path.display(), wire);
        Ok(wire.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> DetectionResult {
        serde_json::from_str::<WireDetection>(json).unwrap().into()
    }

    #[test]
    fn decodes_vehicle_and_plate() {
        let got = decode(r#"{"vehicle": {"class_id": 2, "confidence": 0.91}, "plate_text": " ab 12 cd3 "}"#);
        assert_eq!(
            got.vehicle,
            Some(VehicleDetection { class: VehicleClass::Car, confidence: 0.91 })
        );
        assert_eq!(got.plate_text.as_deref(), Some("ab 12 cd3"));
    }

    #[test]
    fn missing_fields_are_valid_empty_outcomes() {
        assert_eq!(decode("{}"), DetectionResult::default());
        let blank = decode(r#"{"vehicle": null, "plate_text": "   "}"#);
        assert!(blank.plate_text.is_none());
    }

    #[test]
    fn confidence_is_clamped() {
        let got = decode(r#"{"vehicle": {"class_id": 11, "confidence": 1.7}}"#);
        let vehicle = got.vehicle.unwrap();
        assert_eq!(vehicle.class, VehicleClass::Unknown(11));
        assert_eq!(vehicle.confidence, 1.0);
    }
}
