//! Audio cues and desktop notifications consumed by the controller

use crate::domain::call::entity::CallParams;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audio cue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Ringtone {
    /// Incoming invite waiting for an answer
    IncomingCall,
    /// Remote side is ringing
    Ringback,
}

impl Ringtone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ringtone::IncomingCall => "incoming-call",
            Ringtone::Ringback => "ringback",
        }
    }
}

impl fmt::Display for Ringtone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio cue player
#[cfg_attr(test, mockall::automock)]
pub trait RingtonePlayer: Send + Sync {
    /// Start looping a cue
    fn play(&self, ringtone: Ringtone);

    /// Silence every cue
    fn stop(&self);
}

/// Handle of a displayed notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationId(pub u64);

/// Desktop notifications
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// Announce an incoming call; `None` if nothing was shown
    fn notify_incoming_call(&self, params: &CallParams) -> Option<NotificationId>;

    /// Remove a notification that is no longer relevant
    fn dismiss(&self, id: NotificationId);
}
