//! Domain layer - Core business logic and rules
//!
//! This layer contains:
//! - Aggregates: the call occupying the line
//! - Value Objects: call state, direction, numbers, identifiers
//! - Domain Services: caller lookup and rejection classification
//! - Ports: transport, media devices, notifications and repositories
//! - Domain Events: what the controller tells the presentation layer

pub mod call;
pub mod dtmf;
pub mod media;
pub mod notification;
pub mod phonecall;
pub mod session;
pub mod shared;

// Re-export commonly used types
pub use shared::{DomainError, Result};
