use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{GateError, GateResult};
use crate::model::*;
use crate::service::GateService;
use crate::stats::{MovementRange, MovementSeries};

type SharedService = State<Arc<GateService>>;

/// Build the API routes
pub fn build_router(service: Arc<GateService>, max_upload_bytes: usize) -> Router {
    Router::new()
        // 1. health check
        .route("/health", get(health_check))
        // 2. two-phase crossing: detect → operator review → commit
        .route("/preview", post(preview))
        .route("/commit", post(commit))
        // 3. direct gate check (no review step)
        .route("/check", post(check))
        // 4. registry
        .route("/vehicles", post(register_vehicle).get(list_vehicles))
        .route("/vehicles/preview", post(registration_preview))
        // 5. log and dashboard queries
        .route("/logs", get(recent_logs))
        .route("/recent-movements", get(recent_movements))
        .route("/counts", get(counts))
        .route("/stats", get(stats))
        .route("/movements/:period", get(movements))
        .route("/summary", get(summary))
        // 6. stored gate images
        .route("/uploads/:filename", get(uploaded_image))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

// ---------------------- request helpers ----------------------

#[derive(Default)]
struct GateUpload {
    image: Option<Vec<u8>>,
    direction: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> GateResult<GateUpload> {
    let mut upload = GateUpload::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GateError::Validation(format!("invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("image") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| GateError::Validation(format!("invalid image field: {}", e)))?;
                upload.image = Some(bytes.to_vec());
            }
            Some("direction") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| GateError::Validation(format!("invalid direction field: {}", e)))?;
                upload.direction = Some(text.trim().to_string());
            }
            _ => {}
        }
    }
    Ok(upload)
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> GateResult<T> {
    body.map(|Json(v)| v)
        .map_err(|e| GateError::Validation(format!("invalid JSON body: {}", e)))
}

// ---------------------- handlers ----------------------

async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn preview(
    State(service): SharedService,
    multipart: Multipart,
) -> GateResult<Json<PreviewResp>> {
    let upload = read_upload(multipart).await?;
    let image = upload
        .image
        .ok_or_else(|| GateError::Validation("No image provided".to_string()))?;
    Ok(Json(service.preview_upload(&image).await?))
}

async fn commit(
    State(service): SharedService,
    body: Result<Json<CommitReq>, JsonRejection>,
) -> GateResult<Json<CommitResp>> {
    let req = json_body(body)?;
    let session_id = req
        .session_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GateError::NotFound("invalid or expired session".to_string()))?;
    let entry = service.commit(
        &session_id,
        req.direction.as_deref().unwrap_or_default(),
        req.driver_name.as_deref(),
    )?;
    Ok(Json(CommitResp {
        authorized: entry.authorized,
    }))
}

async fn check(
    State(service): SharedService,
    multipart: Multipart,
) -> GateResult<Json<CheckResp>> {
    let upload = read_upload(multipart).await?;
    let (image, direction) = match (upload.image, upload.direction) {
        (Some(image), Some(direction)) => (image, direction),
        _ => {
            return Err(GateError::Validation(
                "Image and direction are required".to_string(),
            ))
        }
    };
    Ok(Json(service.check_upload(&image, &direction).await?))
}

async fn register_vehicle(
    State(service): SharedService,
    body: Result<Json<RegisterVehicleReq>, JsonRejection>,
) -> GateResult<(StatusCode, Json<RegisterVehicleResp>)> {
    let record = service.register_vehicle(json_body(body)?)?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterVehicleResp {
            license_plate: record.license_plate,
            vehicle_type: record.vehicle_type,
            authorized: record.authorized,
        }),
    ))
}

async fn list_vehicles(State(service): SharedService) -> GateResult<Json<VehicleListResp>> {
    let vehicles = service.authorized_vehicles()?;
    Ok(Json(VehicleListResp {
        count: vehicles.len(),
        vehicles,
    }))
}

async fn registration_preview(
    State(service): SharedService,
    multipart: Multipart,
) -> GateResult<Json<RegistrationPreviewResp>> {
    let upload = read_upload(multipart).await?;
    let image = upload
        .image
        .ok_or_else(|| GateError::Validation("Image is required".to_string()))?;
    Ok(Json(service.registration_preview(&image).await?))
}

async fn recent_logs(State(service): SharedService) -> GateResult<Json<Vec<GateLogEntry>>> {
    Ok(Json(service.recent_logs()?))
}

async fn recent_movements(State(service): SharedService) -> GateResult<Json<Vec<GateLogEntry>>> {
    Ok(Json(service.recent_movements()?))
}

async fn counts(State(service): SharedService) -> GateResult<Json<DirectionCounts>> {
    Ok(Json(service.counts()?))
}

async fn stats(
    State(service): SharedService,
    Query(query): Query<StatsQuery>,
) -> GateResult<Json<BTreeMap<String, DirectionCounts>>> {
    let period = query.period.as_deref().unwrap_or("day");
    Ok(Json(service.stats(period)?))
}

async fn movements(
    State(service): SharedService,
    Path(period): Path<String>,
) -> GateResult<Json<MovementSeries>> {
    let range: MovementRange = period.parse()?;
    Ok(Json(MovementSeries {
        period: range.as_str(),
        movements: service.movements(range, Utc::now())?,
    }))
}

async fn summary(State(service): SharedService) -> GateResult<Json<GateSummary>> {
    Ok(Json(service.summary(Utc::now())?))
}

async fn uploaded_image(
    State(service): SharedService,
    Path(filename): Path<String>,
) -> GateResult<impl IntoResponse> {
    let path = service.image_file(&filename)?;
    let bytes = tokio::fs::read(&path).await?;
    let mime = image::ImageFormat::from_path(&path)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");
    Ok(([(header::CONTENT_TYPE, mime)], bytes))
}
