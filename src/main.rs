use axum::Server;
use chrono::Utc;
use env_logger::Env;
use log::{info, warn};
use std::sync::Arc;

use vehicle_gate::{api, GateConfig, GateService};

fn spawn_session_eviction(service: Arc<GateService>, config: &GateConfig) {
    let Some(ttl) = service.session_ttl() else {
        info!("preview sessions never expire (GATE_SESSION_TTL_SECS unset)");
        return;
    };
    info!(
        "preview sessions expire after {:?}, sweep every {:?}",
        ttl, config.eviction_interval
    );
    let mut interval = tokio::time::interval(config.eviction_interval);
    tokio::spawn(async move {
        loop {
            interval.tick().await;
            if let Err(e) = service.evict_stale_sessions(Utc::now()).await {
                warn!("session eviction failed: {}", e);
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. logging to the console
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    info!("=== vehicle gate service starting ===");

    // 2. configuration and core service
    let config = GateConfig::from_env()?;
    let service = match GateService::new(&config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            warn!("service initialization failed: {}", e);
            return Err(e.into());
        }
    };
    info!(
        "database {}, uploads {}, detector {}",
        config.db_path,
        config.upload_dir.display(),
        config.detector_url
    );

    // 3. stale preview eviction
    spawn_session_eviction(service.clone(), &config);

    // 4. routes
    let app = api::build_router(service, config.max_upload_bytes);

    // 5. HTTP server
    info!("API server listening on http://{}", config.bind_addr);
    Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .await
        .map_err(|e| {
            warn!("server stopped: {}", e);
            e
        })?;

    Ok(())
}
