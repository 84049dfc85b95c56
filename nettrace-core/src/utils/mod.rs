//! Serde helpers and small address utilities shared across modules.

pub mod duration_ms;
pub mod net;
