// src/model.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::GateError;

/// Opaque identifier of a pending preview.
pub type SessionId = String;

/// Direction of a gate crossing. No other value is ever persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(Direction::Inbound),
            "outbound" => Ok(Direction::Outbound),
            other => Err(GateError::Validation(format!(
                "invalid direction '{}', expected inbound or outbound",
                other
            ))),
        }
    }
}

// Pending detection, waiting for operator confirmation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionPreview {
    pub session_id: SessionId,
    pub asset_id: String,          // recognized plate text, or a generated ASSET-XXXX-XXXX
    pub asset_name: String,        // detected vehicle class
    pub image_path: String,
    pub confidence: f32,
    pub detected_class_id: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// Preview before the session store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPreview {
    pub asset_id: String,
    pub asset_name: String,
    pub image_path: String,
    pub confidence: f32,
    pub detected_class_id: Option<u32>,
    pub created_at: DateTime<Utc>,
}

// Registered vehicle (plate is unique and canonical)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRecord {
    pub id: i64,
    pub license_plate: String,
    pub vehicle_type: String,
    pub color: String,
    pub owner_name: String,
    pub authorized: bool,
    pub registered_at: DateTime<Utc>,
}

// One gate crossing; never mutated after append
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateLogEntry {
    pub id: i64,
    pub license_plate: String,
    pub vehicle_type: String,
    pub driver_name: String,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    /// Authorization status at the moment of crossing.
    pub authorized: bool,
    pub image_path: String,
    pub vehicle_id: Option<i64>,
}

/// Entry to append; the log assigns the id.
#[derive(Debug, Clone)]
pub struct NewGateLogEntry {
    pub license_plate: String,
    pub vehicle_type: String,
    pub driver_name: String,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    pub authorized: bool,
    pub image_path: String,
    pub vehicle_id: Option<i64>,
}

/// Vehicle to register; the plate is normalized on write.
#[derive(Debug, Clone)]
pub struct NewVehicle {
    pub license_plate: String,
    pub vehicle_type: String,
    pub color: String,
    pub owner_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectionCounts {
    pub inbound: u64,
    pub outbound: u64,
}

impl DirectionCounts {
    pub fn record(&mut self, direction: Direction) {
        match direction {
            Direction::Inbound => self.inbound += 1,
            Direction::Outbound => self.outbound += 1,
        }
    }
}

// ---------------------- request bodies ----------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReq {
    pub session_id: Option<String>,
    pub direction: Option<String>,
    pub driver_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVehicleReq {
    pub license_plate: Option<String>,
    pub vehicle_type: Option<String>,
    pub color: Option<String>,
    pub owner_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub period: Option<String>,
}

// ---------------------- response bodies ----------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResp {
    pub session_id: SessionId,
    pub asset_id: String,
    pub asset_name: String,
    pub confidence: f32,
    pub detected_class_id: Option<u32>,
    pub image_path: String,
    pub image_url: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CommitResp {
    pub authorized: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResp {
    pub plate: String,
    pub authorized: bool,
    pub vehicle_type: String,
    pub direction: Direction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVehicleResp {
    pub license_plate: String,
    pub vehicle_type: String,
    pub authorized: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPreviewResp {
    pub vehicle_type: String,
    pub license_plate: Option<String>,
    pub image_path: String,
    pub confidence: f32,
    pub detected_class_id: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct VehicleListResp {
    pub count: usize,
    pub vehicles: Vec<VehicleRecord>,
}

// Dashboard headline numbers
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GateSummary {
    pub total_authorized_vehicles: u64,
    pub vehicle_types_distribution: BTreeMap<String, u64>,
    #[serde(rename = "recentEntries24h")]
    pub recent_entries_24h: u64,
    pub authorized_entries: u64,
    pub unauthorized_entries: u64,
    pub inbound_count: u64,
    pub outbound_count: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResp {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parses_only_known_values() {
        assert_eq!("inbound".parse::<Direction>().unwrap(), Direction::Inbound);
        assert_eq!("outbound".parse::<Direction>().unwrap(), Direction::Outbound);
        assert!(matches!(
            "Inbound".parse::<Direction>(),
            Err(GateError::Validation(_))
        ));
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn direction_serializes_lowercase() {
        let json = serde_json::to_string(&Direction::Outbound).unwrap();
        assert_eq!(json, "\"outbound\"");
    }
}
