// src/api/mod.rs
mod router;

pub use router::build_router;
