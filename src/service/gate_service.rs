use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::uploads::{SavedImage, UploadStore};
use crate::config::GateConfig;
use crate::db::{GateLogDB, VehicleDB};
use crate::detection::{create_detector, DetectionResult, Detector};
use crate::error::{GateError, GateResult};
use crate::model::*;
use crate::plate::{normalize, AssetIdGenerator, RandomAssetIds};
use crate::session::{MemorySessionStore, SessionStore};
use crate::stats::{AggregationEngine, Granularity, MovementBucket, MovementRange};

const RECENT_LOG_LIMIT: usize = 50;
const RECENT_MOVEMENT_LIMIT: usize = 20;
const GATE_CHECK_DRIVER: &str = "Gate Check";
const UNKNOWN: &str = "Unknown";

/// Collaborators of a `GateService`, injectable for tests.
pub struct GateParts {
    pub detector: Arc<dyn Detector>,
    pub sessions: Arc<dyn SessionStore>,
    pub asset_ids: Arc<dyn AssetIdGenerator>,
    pub vehicles: VehicleDB,
    pub gate_log: GateLogDB,
    pub uploads: UploadStore,
}

/// Gate orchestrator: detection → preview → commit, plus dashboard queries.
pub struct GateService {
    detector: Arc<dyn Detector>,
    sessions: Arc<dyn SessionStore>,
    asset_ids: Arc<dyn AssetIdGenerator>,
    vehicles: VehicleDB,
    gate_log: GateLogDB,
    uploads: UploadStore,
    detection_timeout: Duration,
    session_ttl: Option<Duration>,
    public_base_url: String,
}

impl GateService {
    /// Initialize the service from configuration
    pub fn new(config: &GateConfig) -> GateResult<Self> {
        // 1. registry and log share one database file, separate connections
        let vehicles = VehicleDB::open(&config.db_path)?;
        let gate_log = GateLogDB::open(&config.db_path)?;

        // 2. detection collaborator
        let detector = create_detector(config)?;

        // 3. upload directory
        let uploads = UploadStore::new(&config.upload_dir)?;

        Ok(Self::with_parts(
            config,
            GateParts {
                detector,
                sessions: Arc::new(MemorySessionStore::new()),
                asset_ids: Arc::new(RandomAssetIds),
                vehicles,
                gate_log,
                uploads,
            },
        ))
    }

    pub fn with_parts(config: &GateConfig, parts: GateParts) -> Self {
        Self {
            detector: parts.detector,
            sessions: parts.sessions,
            asset_ids: parts.asset_ids,
            vehicles: parts.vehicles,
            gate_log: parts.gate_log,
            uploads: parts.uploads,
            detection_timeout: config.detection_timeout,
            session_ttl: config.session_ttl,
            public_base_url: config.public_base_url.clone(),
        }
    }

    // ---------------------- detection ----------------------

    /// Run the detector with the configured timeout. Nothing is written
    /// before it returns.
    pub async fn detect(&self, image: &SavedImage) -> GateResult<DetectionResult> {
        match tokio::time::timeout(self.detection_timeout, self.detector.detect(&image.path)).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "detection timed out after {:?} for {}",
                    self.detection_timeout,
                    image.path.display()
                );
                Err(GateError::Detection("vehicle detection timed out".to_string()))
            }
        }
    }

    // save, detect, and drop the image again if detection fails
    async fn save_and_detect(
        &self,
        prefix: &str,
        bytes: &[u8],
    ) -> GateResult<(SavedImage, DetectionResult)> {
        let image = self.uploads.save(prefix, bytes).await?;
        match self.detect(&image).await {
            Ok(result) => Ok((image, result)),
            Err(e) => {
                warn!("detection failed for {}: {}", image.file_name, e);
                self.uploads.remove(&image).await;
                Err(e)
            }
        }
    }

    // ---------------------- preview / commit ----------------------

    /// Upload path of the two-phase flow: store the image, detect, preview.
    pub async fn preview_upload(&self, bytes: &[u8]) -> GateResult<PreviewResp> {
        let (image, detection) = self.save_and_detect("preview", bytes).await?;
        let preview = match self.preview(&detection, &image) {
            Ok(p) => p,
            Err(e) => {
                self.uploads.remove(&image).await;
                return Err(e);
            }
        };

        Ok(PreviewResp {
            image_url: format!("{}/uploads/{}", self.public_base_url, image.file_name),
            session_id: preview.session_id,
            asset_id: preview.asset_id,
            asset_name: preview.asset_name,
            confidence: preview.confidence,
            detected_class_id: preview.detected_class_id,
            image_path: preview.image_path,
        })
    }

    /// Turn a detection into a pending preview.
    ///
    /// Requires a detected vehicle. Without usable plate text the asset id
    /// falls back to the generator.
    pub fn preview(
        &self,
        detection: &DetectionResult,
        image: &SavedImage,
    ) -> GateResult<DetectionPreview> {
        let vehicle = detection
            .vehicle
            .ok_or_else(|| GateError::Detection("No vehicle detected in the image".to_string()))?;

        let plate = detection
            .plate_text
            .as_deref()
            .map(normalize)
            .filter(|p| !p.is_empty());
        let asset_id = match plate {
            Some(p) => p,
            None => self.asset_ids.generate(),
        };

        let preview = self.sessions.put(NewPreview {
            asset_id,
            asset_name: vehicle.class.to_string(),
            image_path: image.display_path(),
            confidence: vehicle.confidence,
            detected_class_id: Some(vehicle.class.class_id()),
            created_at: Utc::now(),
        })?;
        info!(
            "preview {} asset={} class={} confidence={:.3}",
            preview.session_id, preview.asset_id, preview.asset_name, preview.confidence
        );
        Ok(preview)
    }

    /// Commit a preview as a gate crossing.
    ///
    /// The direction is checked before the session is consumed, so a bad
    /// direction leaves the preview committable.
    pub fn commit(
        &self,
        session_id: &str,
        direction: &str,
        driver_name: Option<&str>,
    ) -> GateResult<GateLogEntry> {
        let direction: Direction = direction.parse()?;
        let preview = self.sessions.consume(session_id)?;

        let driver_name = driver_name
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string();
        let plate = normalize(&preview.asset_id);

        let appended = self.authorize_and_append(
            plate,
            Some(preview.asset_name.clone()),
            driver_name,
            direction,
            preview.image_path.clone(),
        );
        match appended {
            Ok(entry) => Ok(entry),
            Err(e) => {
                // nothing was logged, so the operator may retry the same session
                if let Err(restore_err) = self.sessions.restore(preview) {
                    warn!("could not restore session {}: {}", session_id, restore_err);
                }
                Err(e)
            }
        }
    }

    // ---------------------- direct check ----------------------

    /// Upload path of the direct gate check.
    pub async fn check_upload(&self, bytes: &[u8], direction: &str) -> GateResult<CheckResp> {
        let direction: Direction = direction.parse()?;
        let (image, detection) = self.save_and_detect("check", bytes).await?;
        let entry = match self.check_and_log(&detection, direction, &image) {
            Ok(entry) => entry,
            Err(e) => {
                self.uploads.remove(&image).await;
                return Err(e);
            }
        };
        Ok(CheckResp {
            plate: entry.license_plate,
            authorized: entry.authorized,
            vehicle_type: entry.vehicle_type,
            direction: entry.direction,
        })
    }

    /// Log a crossing straight from a detection result, no session involved.
    pub fn check_and_log(
        &self,
        detection: &DetectionResult,
        direction: Direction,
        image: &SavedImage,
    ) -> GateResult<GateLogEntry> {
        let plate = detection
            .plate_text
            .as_deref()
            .map(normalize)
            .unwrap_or_default();
        if plate.is_empty() {
            return Err(GateError::Detection("No license plate detected".to_string()));
        }
        self.authorize_and_append(
            plate,
            None,
            GATE_CHECK_DRIVER.to_string(),
            direction,
            image.display_path(),
        )
    }

    // Fail-closed decision plus append. Vehicle type comes from the detection
    // when given, otherwise from the registry record.
    fn authorize_and_append(
        &self,
        plate: String,
        detected_type: Option<String>,
        driver_name: String,
        direction: Direction,
        image_path: String,
    ) -> GateResult<GateLogEntry> {
        let vehicle = if plate.is_empty() {
            None
        } else {
            self.vehicles.lookup(&plate)?
        };
        let authorized = vehicle.as_ref().map(|v| v.authorized).unwrap_or(false);
        let vehicle_type = detected_type
            .or_else(|| vehicle.as_ref().map(|v| v.vehicle_type.clone()))
            .unwrap_or_else(|| UNKNOWN.to_string());

        let entry = self.gate_log.append(NewGateLogEntry {
            license_plate: plate,
            vehicle_type,
            driver_name,
            direction,
            timestamp: Utc::now(),
            authorized,
            image_path,
            vehicle_id: vehicle.map(|v| v.id),
        })?;
        info!(
            "gate {} plate={} authorized={}",
            entry.direction, entry.license_plate, entry.authorized
        );
        Ok(entry)
    }

    // ---------------------- registry ----------------------

    pub fn register_vehicle(&self, req: RegisterVehicleReq) -> GateResult<VehicleRecord> {
        let (license_plate, vehicle_type) = match (req.license_plate, req.vehicle_type) {
            (Some(p), Some(t)) if !p.trim().is_empty() && !t.trim().is_empty() => (p, t),
            _ => {
                return Err(GateError::Validation(
                    "License plate and vehicle type are required".to_string(),
                ))
            }
        };
        let or_unknown = |v: Option<String>| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNKNOWN.to_string())
        };
        self.vehicles.register(NewVehicle {
            license_plate,
            vehicle_type,
            color: or_unknown(req.color),
            owner_name: or_unknown(req.owner_name),
        })
    }

    /// Detection for the registration form; no session, no log entry.
    pub async fn registration_preview(&self, bytes: &[u8]) -> GateResult<RegistrationPreviewResp> {
        let (image, detection) = self.save_and_detect("register_preview", bytes).await?;
        let (vehicle_type, confidence, detected_class_id) = match detection.vehicle {
            Some(v) => (v.class.to_string(), v.confidence, Some(v.class.class_id())),
            None => (UNKNOWN.to_string(), 0.0, None),
        };
        Ok(RegistrationPreviewResp {
            vehicle_type,
            license_plate: detection
                .plate_text
                .as_deref()
                .map(normalize)
                .filter(|p| !p.is_empty()),
            image_path: image.display_path(),
            confidence,
            detected_class_id,
        })
    }

    pub fn authorized_vehicles(&self) -> GateResult<Vec<VehicleRecord>> {
        self.vehicles.list_authorized()
    }

    // ---------------------- queries ----------------------

    pub fn recent_logs(&self) -> GateResult<Vec<GateLogEntry>> {
        self.gate_log.recent(RECENT_LOG_LIMIT)
    }

    pub fn recent_movements(&self) -> GateResult<Vec<GateLogEntry>> {
        self.gate_log.recent(RECENT_MOVEMENT_LIMIT)
    }

    pub fn counts(&self) -> GateResult<DirectionCounts> {
        AggregationEngine::new(&self.gate_log).counts()
    }

    pub fn stats(&self, period: &str) -> GateResult<BTreeMap<String, DirectionCounts>> {
        let granularity: Granularity = period.parse()?;
        AggregationEngine::new(&self.gate_log).stats_by_period(granularity)
    }

    pub fn movements(
        &self,
        range: MovementRange,
        now: DateTime<Utc>,
    ) -> GateResult<Vec<MovementBucket>> {
        AggregationEngine::new(&self.gate_log).movements(range, now)
    }

    pub fn summary(&self, now: DateTime<Utc>) -> GateResult<GateSummary> {
        let counts = self.counts()?;
        let (authorized_entries, unauthorized_entries) = self.gate_log.count_by_authorization()?;
        Ok(GateSummary {
            total_authorized_vehicles: self.vehicles.count_authorized()?,
            vehicle_types_distribution: self.vehicles.type_distribution()?,
            recent_entries_24h: self.gate_log.count_since(now - ChronoDuration::days(1))?,
            authorized_entries,
            unauthorized_entries,
            inbound_count: counts.inbound,
            outbound_count: counts.outbound,
        })
    }

    pub fn image_file(&self, file_name: &str) -> GateResult<PathBuf> {
        self.uploads.resolve(file_name)
    }

    // ---------------------- session housekeeping ----------------------

    pub fn session_ttl(&self) -> Option<Duration> {
        self.session_ttl
    }

    /// Drop previews older than the configured TTL along with their saved
    /// images. No-op without a TTL.
    pub async fn evict_stale_sessions(&self, now: DateTime<Utc>) -> GateResult<usize> {
        let Some(ttl) = self.session_ttl else {
            return Ok(0);
        };
        let ttl = ChronoDuration::from_std(ttl)
            .map_err(|e| GateError::Config(format!("session ttl: {}", e)))?;
        let evicted = self.sessions.evict_older_than(now - ttl)?;
        for preview in &evicted {
            self.uploads.remove_path(Path::new(&preview.image_path)).await;
        }
        if !evicted.is_empty() {
            info!("evicted {} stale preview sessions", evicted.len());
        }
        Ok(evicted.len())
    }
}
