//! Local media and user-facing cues

pub mod cues;
pub mod devices;

pub use cues::{LoggingNotifier, LoggingRingtonePlayer};
pub use devices::SimulatedMediaDevices;
