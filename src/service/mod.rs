mod gate_service;
pub mod uploads;

pub use gate_service::{GateParts, GateService};
