//! Application layer - Use cases and application services
//!
//! This layer orchestrates domain objects to fulfill use cases:
//! - The call session controller and its state machine
//! - Fanning domain events out to the presentation layer
//! - Serializing UI commands and transport events

pub mod event_bus;
pub mod runner;
pub mod user_agent;

pub use event_bus::{EventBus, PublishedEvent};
pub use runner::{Command, SoftphoneHandle, SoftphoneService};
pub use user_agent::{CallSnapshot, Collaborators, UserAgent};
