use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{GateError, GateResult};

/// Service configuration, read from `GATE_*` environment variables.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub bind_addr: SocketAddr,
    pub db_path: String,
    pub upload_dir: PathBuf,
    /// Prefix for `imageUrl` in preview responses.
    pub public_base_url: String,
    pub detector_url: String,
    pub detection_timeout: Duration,
    /// `None` keeps unconsumed previews forever.
    pub session_ttl: Option<Duration>,
    pub eviction_interval: Duration,
    pub max_upload_bytes: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            db_path: "./data/gate.sqlite".to_string(),
            upload_dir: PathBuf::from("./uploads"),
            public_base_url: "http://localhost:8080".to_string(),
            detector_url: "http://127.0.0.1:9000/detect".to_string(),
            detection_timeout: Duration::from_millis(10_000),
            session_ttl: None,
            eviction_interval: Duration::from_secs(60),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl GateConfig {
    pub fn from_env() -> GateResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> GateResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("GATE_BIND_ADDR") {
            config.bind_addr = parse("GATE_BIND_ADDR", &v)?;
        }
        if let Some(v) = get("GATE_DB_PATH") {
            config.db_path = v;
        }
        if let Some(v) = get("GATE_UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = get("GATE_PUBLIC_BASE_URL") {
            config.public_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("GATE_DETECTOR_URL") {
            config.detector_url = v;
        }
        if let Some(v) = get("GATE_DETECTION_TIMEOUT_MS") {
            config.detection_timeout =
                Duration::from_millis(positive("GATE_DETECTION_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = get("GATE_SESSION_TTL_SECS") {
            config.session_ttl = Some(Duration::from_secs(positive("GATE_SESSION_TTL_SECS", &v)?));
        }
        if let Some(v) = get("GATE_EVICTION_INTERVAL_SECS") {
            config.eviction_interval =
                Duration::from_secs(positive("GATE_EVICTION_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = get("GATE_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = positive("GATE_MAX_UPLOAD_BYTES", &v)? as usize;
        }
        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> GateResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| GateError::Config(format!("{}={}: {}", key, value, e)))
}

fn positive(key: &str, value: &str) -> GateResult<u64> {
    match parse::<u64>(key, value)? {
        0 => Err(GateError::Config(format!("{} must be greater than zero", key))),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> GateResult<GateConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GateConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_leave_sessions_unexpired() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.session_ttl.is_none());
        assert_eq!(config.detection_timeout, Duration::from_secs(10));
    }

    #[test]
    fn overrides_are_applied() {
        let config = from_pairs(&[
            ("GATE_BIND_ADDR", "127.0.0.1:9999"),
            ("GATE_SESSION_TTL_SECS", "900"),
            ("GATE_DETECTION_TIMEOUT_MS", "2500"),
            ("GATE_PUBLIC_BASE_URL", "https://gate.example.com/"),
            ("GATE_DB_PATH", " "),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9999);
        assert_eq!(config.session_ttl, Some(Duration::from_secs(900)));
        assert_eq!(config.detection_timeout, Duration::from_millis(2500));
        assert_eq!(config.public_base_url, "https://gate.example.com");
        assert_eq!(config.db_path, "./data/gate.sqlite");
    }

    #[test]
    fn bad_values_are_config_errors() {
        assert!(matches!(
            from_pairs(&[("GATE_SESSION_TTL_SECS", "soon")]),
            Err(GateError::Config(_))
        ));
        assert!(matches!(
            from_pairs(&[("GATE_DETECTION_TIMEOUT_MS", "0")]),
            Err(GateError::Config(_))
        ));
        assert!(matches!(
            from_pairs(&[("GATE_BIND_ADDR", "localhost")]),
            Err(GateError::Config(_))
        ));
    }
}
