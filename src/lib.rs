pub mod api;
pub mod config;
pub mod db;
pub mod detection;
pub mod error;
pub mod model;
pub mod plate;
pub mod service;
pub mod session;
pub mod stats;

pub use config::GateConfig;
pub use error::{GateError, GateResult};
pub use service::GateService;
