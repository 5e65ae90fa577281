//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Session transports (simulated and SIP over UDP)
//! - Audio capture and user-facing cues
//! - In-memory repositories

pub mod media;
pub mod persistence;
pub mod protocols;
