//! Ringtones and desktop notifications rendered as log lines

use crate::domain::call::entity::CallParams;
use crate::domain::notification::{NotificationId, Notifier, Ringtone, RingtonePlayer};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct LoggingRingtonePlayer;

impl RingtonePlayer for LoggingRingtonePlayer {
    fn play(&self, ringtone: Ringtone) {
        info!("Playing {} tone", ringtone);
    }

    fn stop(&self) {
        debug!("Tones stopped");
    }
}

#[derive(Debug, Default)]
pub struct LoggingNotifier {
    next_id: AtomicU64,
}

impl LoggingNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Notifier for LoggingNotifier {
    fn notify_incoming_call(&self, params: &CallParams) -> Option<NotificationId> {
        let id = NotificationId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        match params.partner_id {
            Some(partner) => info!("Incoming call from {} (contact {})", params.number, partner),
            None => info!("Incoming call from {}", params.number),
        }
        Some(id)
    }

    fn dismiss(&self, id: NotificationId) {
        debug!("Notification {} dismissed", id.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_ids_are_unique() {
        let notifier = LoggingNotifier::new();
        let params = CallParams::new("999", None);

        let first = notifier.notify_incoming_call(&params).unwrap();
        let second = notifier.notify_incoming_call(&params).unwrap();
        assert_ne!(first, second);
    }
}
