//! Audio capture without a sound card
//!
//! Hands out synthetic tracks for the requested device. A failure can be
//! armed to exercise the controller's unwinding paths.

use crate::domain::media::{AudioTrack, MediaConstraints, MediaDevices, MediaError, MediaStream};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Default)]
pub struct SimulatedMediaDevices {
    failure: RwLock<Option<MediaError>>,
    acquisitions: AtomicUsize,
}

impl SimulatedMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices that refuse every request with `error`
    pub fn failing(error: MediaError) -> Self {
        Self {
            failure: RwLock::new(Some(error)),
            acquisitions: AtomicUsize::new(0),
        }
    }

    /// Arm or clear the failure returned by the next requests
    pub async fn set_failure(&self, error: Option<MediaError>) {
        *self.failure.write().await = error;
    }

    /// Number of streams handed out so far
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDevices for SimulatedMediaDevices {
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> std::result::Result<MediaStream, MediaError> {
        if let Some(error) = self.failure.read().await.clone() {
            warn!("Audio capture refused: {}", error);
            return Err(error);
        }

        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Audio capture granted on {}",
            constraints.audio_device_id.as_deref().unwrap_or("default device")
        );

        Ok(MediaStream::new(vec![AudioTrack::new(
            constraints.audio_device_id.clone(),
        )]))
    }
}
