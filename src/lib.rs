//! yakphone - a SIP softphone call-session controller
//!
//! The controller owns the single call line: it places and answers calls
//! through a session transport (SIP over UDP, or a simulated one for
//! demos), drives the microphone, ringtones and notifications, and reports
//! every transition to the dialing panel as events.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;
