//! Local audio capture and the outbound side of the peer connection
//!
//! The controller exclusively owns the microphone stream and the outbound
//! audio senders for the duration of one call. Nothing else mutates them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Why the microphone could not be acquired
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// The user or the platform denied access
    #[error("NotAllowedError")]
    NotAllowed,

    /// No capture device is present
    #[error("NotFoundError")]
    NotFound,

    /// A device exists but could not be opened
    #[error("NotReadableError")]
    NotReadable,

    #[error("{name}: {message}")]
    Other { name: String, message: String },
}

impl MediaError {
    /// Message shown to the user, specific to the device state
    pub fn user_message(&self) -> String {
        match self {
            MediaError::NotAllowed => "Cannot access audio recording device. If you have denied \
                access to your microphone, please allow it and try again. Otherwise, make sure \
                that this website is running over HTTPS and that your browser is not set to deny \
                access to media devices."
                .to_string(),
            MediaError::NotFound => "No audio recording device available. The application \
                requires a microphone in order to be used."
                .to_string(),
            MediaError::NotReadable => "A hardware error has occurred while trying to access the \
                audio recording device. Please ensure that your drivers are up to date and try \
                again."
                .to_string(),
            MediaError::Other { name, message } => format!(
                "An error occured involving the audio recording device ({}):\n{}",
                name, message
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaError::NotAllowed => "not_allowed",
            MediaError::NotFound => "not_found",
            MediaError::NotReadable => "not_readable",
            MediaError::Other { .. } => "other",
        }
    }
}

/// What to capture
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    /// Capture device, `None` for the system default
    pub audio_device_id: Option<String>,
    /// Always false: calls are audio only
    pub video: bool,
}

impl MediaConstraints {
    pub fn audio_only(device_id: Option<String>) -> Self {
        Self {
            audio_device_id: device_id,
            video: false,
        }
    }
}

/// One captured audio track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    id: String,
    device_id: Option<String>,
    enabled: bool,
    stopped: bool,
}

impl AudioTrack {
    pub fn new(device_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            device_id,
            enabled: true,
            stopped: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Local capture stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    tracks: Vec<AudioTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<AudioTrack>) -> Self {
        Self { tracks }
    }

    pub fn audio_tracks(&self) -> &[AudioTrack] {
        &self.tracks
    }

    /// Release the capture device
    pub fn stop(&mut self) {
        for track in &mut self.tracks {
            track.stop();
        }
    }

    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(|track| !track.is_stopped())
    }
}

/// Audio capture port
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire a stream, suspending until the platform grants or denies access
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> std::result::Result<MediaStream, MediaError>;
}

/// One outbound RTP sender of the peer connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSender {
    track: Option<AudioTrack>,
}

impl AudioSender {
    pub fn track(&self) -> Option<&AudioTrack> {
        self.track.as_ref()
    }
}

/// Outbound half of the call's peer connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConnection {
    senders: Vec<AudioSender>,
}

impl PeerConnection {
    /// One sender per captured track
    pub fn from_stream(stream: &MediaStream) -> Self {
        Self {
            senders: stream
                .audio_tracks()
                .iter()
                .cloned()
                .map(|track| AudioSender { track: Some(track) })
                .collect(),
        }
    }

    pub fn senders(&self) -> &[AudioSender] {
        &self.senders
    }

    /// Set the enablement of every sender's track
    ///
    /// Setting, not toggling: muting twice leaves everything muted.
    pub fn set_audio_enabled(&mut self, enabled: bool) {
        for track in self.senders.iter_mut().filter_map(|s| s.track.as_mut()) {
            track.set_enabled(enabled);
        }
    }

    /// Put a new capture track on every sender without renegotiating
    ///
    /// The current mute state carries over to the new track.
    pub fn replace_track(&mut self, track: &AudioTrack) {
        for sender in &mut self.senders {
            let enabled = sender.track.as_ref().map_or(true, AudioTrack::is_enabled);
            let mut replacement = track.clone();
            replacement.set_enabled(enabled);
            sender.track = Some(replacement);
        }
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.senders
            .iter()
            .filter_map(AudioSender::track)
            .all(AudioTrack::is_enabled)
    }
}
