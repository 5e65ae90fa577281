//! Interface layer - External interfaces
//!
//! This layer handles:
//! - The dialing panel bridge (WebSocket)
//! - Health and Prometheus endpoints

pub mod api;
