//! Call session controller
//!
//! `UserAgent` owns the single call state machine of the softphone. It is
//! driven through `&mut self`, one UI command or transport event at a time,
//! and reports everything it does as [`SoftphoneEvent`]s on the [`EventBus`].
//!
//! ```text
//!   NoCall ──make_call / invite──▶ Ringing ──accepted──▶ Ongoing
//!     ▲                              │                     │
//!     ├──────cancel (Canceling)──────┤                     │
//!     ├──────reject (Rejecting)──────┤                     │
//!     ├──────rejected / CANCEL───────┘                     │
//!     └──────────────────hangup / BYE / REFER accepted─────┘
//! ```

use crate::application::event_bus::EventBus;
use crate::config::{CallPreferences, Config};
use crate::domain::call::{
    CallDirection, CallDomainService, CallParams, CallSession, CallState, ContactRepository,
    PhonecallRepository, RejectionKind, SipErrorPayload, SoftphoneEvent,
};
use crate::domain::dtmf::DtmfDigit;
use crate::domain::media::{MediaConstraints, MediaDevices, MediaError, MediaStream, PeerConnection};
use crate::domain::notification::{NotificationId, Notifier, Ringtone, RingtonePlayer};
use crate::domain::phonecall::{Phonecall, PhonecallOutcome, PhonecallState};
use crate::domain::session::{SessionTransport, TransportEvent};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{PartnerId, PhoneNumber, SessionId};
use metrics::{counter, gauge};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// SIP status sent when declining an invite
const DECLINE: u16 = 603;
/// SIP status sent when the organization refuses incoming calls
const NOT_ACCEPTABLE_HERE: u16 = 488;
/// SIP status answering an invite the caller canceled
const REQUEST_TERMINATED: u16 = 487;

/// Everything the controller talks to
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn SessionTransport>,
    pub media: Arc<dyn MediaDevices>,
    pub ringtones: Arc<dyn RingtonePlayer>,
    pub notifier: Arc<dyn Notifier>,
    pub contacts: Arc<dyn ContactRepository>,
    pub phonecalls: Arc<dyn PhonecallRepository>,
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    pub state: CallState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<CallDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<CallParams>,
    pub muted: bool,
}

/// Which raised error is waiting for a `sip_error_resolved`
#[derive(Debug, Default)]
struct PendingErrors {
    media: bool,
    registration: bool,
}

pub struct UserAgent {
    transport: Arc<dyn SessionTransport>,
    media: Arc<dyn MediaDevices>,
    ringtones: Arc<dyn RingtonePlayer>,
    notifier: Arc<dyn Notifier>,
    contacts: Arc<dyn ContactRepository>,
    phonecalls: Arc<dyn PhonecallRepository>,
    bus: EventBus,

    preferences: CallPreferences,
    pbx_problem: Option<&'static str>,

    call: Option<CallSession>,
    stream: Option<MediaStream>,
    peer: Option<PeerConnection>,
    notification: Option<NotificationId>,
    pending_errors: PendingErrors,
}

impl UserAgent {
    pub fn new(collaborators: Collaborators, config: &Config, bus: EventBus) -> Self {
        Self {
            transport: collaborators.transport,
            media: collaborators.media,
            ringtones: collaborators.ringtones,
            notifier: collaborators.notifier,
            contacts: collaborators.contacts,
            phonecalls: collaborators.phonecalls,
            bus,
            preferences: config.preferences.clone(),
            pbx_problem: config.pbx_problem(),
            call: None,
            stream: None,
            peer: None,
            notification: None,
            pending_errors: PendingErrors::default(),
        }
    }

    pub fn state(&self) -> CallState {
        self.call.as_ref().map_or(CallState::NoCall, CallSession::state)
    }

    pub fn current_call(&self) -> Option<&CallSession> {
        self.call.as_ref()
    }

    pub fn is_muted(&self) -> bool {
        self.peer.as_ref().is_some_and(|peer| !peer.is_audio_enabled())
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            state: self.state(),
            direction: self.call.as_ref().map(CallSession::direction),
            params: self.call.as_ref().map(|call| call.params().clone()),
            muted: self.is_muted(),
        }
    }

    pub fn preferences(&self) -> &CallPreferences {
        &self.preferences
    }

    /// Check the PBX settings and register with it
    pub async fn start(&mut self) -> Result<()> {
        if let Some(problem) = self.pbx_problem {
            self.raise_error(SipErrorPayload::blocking(problem));
            return Err(DomainError::Configuration(problem.to_string()));
        }

        info!("Starting softphone on the {} transport", self.transport.name());
        if let Err(e) = self.transport.register().await {
            self.pending_errors.registration = true;
            self.raise_error(SipErrorPayload::blocking(format!(
                "Failed to register to the PBX: {}",
                e
            )));
            return Err(e);
        }

        Ok(())
    }

    // ---------------------------------------------------------------------
    // UI commands
    // ---------------------------------------------------------------------

    /// Dial `number`
    pub async fn make_call(&mut self, number: &str, partner_id: Option<PartnerId>) -> Result<()> {
        if let Some(call) = &self.call {
            return Err(DomainError::InvalidOperation(format!(
                "Cannot place a call while another one is {}",
                call.state().as_str()
            )));
        }

        let number = match PhoneNumber::parse(number) {
            Ok(number) => number,
            Err(reason) => {
                self.raise_error(SipErrorPayload::non_blocking("Invalid phone number"));
                return Err(DomainError::ValidationError(reason));
            }
        };

        let session = SessionId::new();
        let params = CallParams::new(number.as_str(), partner_id);
        let mut call = CallSession::ringing(session, CallDirection::Outgoing, params.clone());

        let target = match self.preferences.external_device() {
            Some(device) => {
                info!("Ringing external device {} first", device);
                call.set_auto_transfer(number.to_string());
                device.to_string()
            }
            None => number.to_string(),
        };

        info!("Calling {} (session {})", number, session);
        self.call = Some(call);
        counter!("softphone_calls_total", "direction" => "outgoing").increment(1);
        gauge!("softphone_call_active").set(1.0);

        if let Err(e) = self.transport.invite(session, &target).await {
            error!("Failed to send invite to {}: {}", target, e);
            counter!("softphone_calls_failed_total", "reason" => "transport").increment(1);
            self.raise_error(SipErrorPayload::non_blocking(format!(
                "The call could not be placed: {}",
                e
            )));
            self.end_call(CallState::NoCall, None).await;
            return Err(e);
        }

        self.ringtones.play(Ringtone::Ringback);
        self.open_phonecall(Phonecall::new(
            CallDirection::Outgoing,
            params.number,
            params.partner_id,
        ))
        .await;

        Ok(())
    }

    /// Answer the ringing incoming call
    pub async fn accept_incoming_call(&mut self) -> Result<()> {
        let (session, params) = self.ringing_call(CallDirection::Incoming)?;

        self.ringtones.stop();
        self.dismiss_notification();

        let constraints = self.constraints();
        let stream = match self.media.get_user_media(&constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                self.media_failed(&e);
                if let Err(err) = self.transport.reject(session, DECLINE).await {
                    warn!("Failed to decline call {}: {}", session, err);
                }
                self.end_call(
                    CallState::Rejecting,
                    Some(PhonecallOutcome::new(PhonecallState::Failed).with_reason(e.as_str())),
                )
                .await;
                return Err(DomainError::Media(e.to_string()));
            }
        };

        if let Err(e) = self.transport.accept(session, &constraints).await {
            // Usually a CANCEL that removed the dialog meanwhile
            warn!("Failed to answer call {}: {}", session, e);
            let mut stream = stream;
            stream.stop();
            counter!("softphone_calls_failed_total", "reason" => "transport").increment(1);

            let params = self
                .end_call(
                    CallState::NoCall,
                    Some(PhonecallOutcome::new(PhonecallState::Missed).with_reason("answer failed")),
                )
                .await
                .map(|call| call.params().clone());
            self.bus.publish(SoftphoneEvent::CancelIncoming(params));
            return Err(e);
        }

        self.attach_audio(stream);
        self.answer_call().await?;

        info!("Incoming call from {} answered", params.number);
        self.bus.publish(SoftphoneEvent::IncomingCallAccepted(params));
        Ok(())
    }

    /// Decline the ringing incoming call
    pub async fn reject_incoming_call(&mut self) -> Result<()> {
        let (session, params) = self.ringing_call(CallDirection::Incoming)?;

        if let Err(e) = self.transport.reject(session, DECLINE).await {
            warn!("Failed to decline call {}: {}", session, e);
        }

        self.end_call(
            CallState::Rejecting,
            Some(PhonecallOutcome::new(PhonecallState::Rejected).with_sip_status(DECLINE)),
        )
        .await;

        info!("Incoming call from {} declined", params.number);
        self.bus.publish(SoftphoneEvent::Rejected(params));
        Ok(())
    }

    /// Abort the ringing outgoing call
    pub async fn cancel_call(&mut self) -> Result<()> {
        let (session, params) = self.ringing_call(CallDirection::Outgoing)?;

        if let Err(e) = self.transport.cancel(session).await {
            warn!("Failed to cancel call {}: {}", session, e);
        }

        self.end_call(
            CallState::Canceling,
            Some(PhonecallOutcome::new(PhonecallState::Cancelled).with_reason("canceled")),
        )
        .await;

        info!("Call to {} canceled", params.number);
        self.bus.publish(SoftphoneEvent::CancelOutgoing(Some(params)));
        Ok(())
    }

    /// End whatever call is in progress
    ///
    /// Cancels a ringing outgoing call and declines a ringing incoming one.
    /// A no-op without a call.
    pub async fn hangup(&mut self) -> Result<()> {
        let Some(call) = &self.call else {
            debug!("Hangup without a call");
            return Ok(());
        };

        match (call.state(), call.direction()) {
            (CallState::Ringing, CallDirection::Outgoing) => self.cancel_call().await,
            (CallState::Ringing, CallDirection::Incoming) => self.reject_incoming_call().await,
            (CallState::Ongoing, _) => {
                let session = call.session_id();
                if let Err(e) = self.transport.bye(session).await {
                    warn!("Failed to send BYE for {}: {}", session, e);
                }
                self.finish_established("hangup").await;
                Ok(())
            }
            (state, _) => Err(DomainError::InvalidStateTransition(format!(
                "Cannot hang up while {}",
                state.as_str()
            ))),
        }
    }

    pub fn mute_call(&mut self) -> Result<()> {
        self.set_audio_enabled(false)
    }

    pub fn unmute_call(&mut self) -> Result<()> {
        self.set_audio_enabled(true)
    }

    /// Send one keypad digit on the established call
    pub async fn send_dtmf(&mut self, digit: char) -> Result<()> {
        let session = self.ongoing_session()?;
        let digit = DtmfDigit::from_char(digit)
            .ok_or_else(|| DomainError::ValidationError(format!("Invalid DTMF digit: {:?}", digit)))?;

        debug!("Sending DTMF {} on {}", digit, session);
        self.transport.send_dtmf(session, digit).await
    }

    /// Blind transfer of the established call
    pub async fn transfer(&mut self, number: &str) -> Result<()> {
        let session = self.ongoing_session()?;
        let number = PhoneNumber::parse(number).map_err(DomainError::ValidationError)?;

        info!("Transferring call {} to {}", session, number);
        self.transport.refer(session, number.as_str()).await?;
        if let Some(call) = self.call.as_mut() {
            call.set_transferring(true);
        }
        Ok(())
    }

    /// Capture from another device, live if a call is up
    pub async fn switch_input_stream(&mut self, device_id: &str) -> Result<()> {
        self.preferences.audio_input_device = Some(device_id.to_string());

        if self.peer.is_none() {
            debug!("Input device set to {} for the next call", device_id);
            return Ok(());
        }

        let stream = match self.media.get_user_media(&self.constraints()).await {
            Ok(stream) => stream,
            Err(e) => {
                self.media_failed(&e);
                return Err(DomainError::Media(e.to_string()));
            }
        };

        let track = stream.audio_tracks().first().cloned().ok_or_else(|| {
            DomainError::Media(format!("Device {} produced no audio track", device_id))
        })?;

        if let Some(peer) = self.peer.as_mut() {
            peer.replace_track(&track);
        }
        if let Some(mut previous) = self.stream.replace(stream) {
            previous.stop();
        }
        self.resolve_media_error();

        info!("Input switched to {}", device_id);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Transport events
    // ---------------------------------------------------------------------

    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        debug!("Transport event: {:?}", event);

        match event {
            TransportEvent::Invite { session, number } => self.on_invite(session, number).await,
            TransportEvent::Registered => self.on_registered(),
            TransportEvent::RegistrationFailed { reason } => {
                self.pending_errors.registration = true;
                self.raise_error(SipErrorPayload::blocking(format!(
                    "Failed to register to the PBX: {}",
                    reason
                )));
            }
            TransportEvent::ConnectionLost => {
                self.pending_errors.registration = true;
                self.raise_error(SipErrorPayload::blocking(
                    "The connection to the PBX has been lost. Attempting to reestablish the \
                     connection...",
                ));
            }
            event => {
                let Some(session) = event.session() else {
                    return;
                };
                if !self.call.as_ref().is_some_and(|call| call.owns(session)) {
                    debug!("Ignoring event for stale session {}", session);
                    return;
                }

                match event {
                    TransportEvent::Progress { status_code, .. } => self.on_progress(status_code),
                    TransportEvent::Accepted { session } => self.on_accepted(session).await,
                    TransportEvent::Rejected {
                        status_code, reason, ..
                    } => self.on_rejected(status_code, &reason).await,
                    TransportEvent::Canceled { session } => self.on_remote_cancel(session).await,
                    TransportEvent::Bye { .. } => self.on_remote_bye().await,
                    TransportEvent::ReferAccepted { session } => {
                        self.on_refer_accepted(session).await
                    }
                    TransportEvent::ReferRejected { status_code, .. } => {
                        self.on_refer_rejected(status_code)
                    }
                    _ => {}
                }
            }
        }
    }

    async fn on_invite(&mut self, session: SessionId, number: String) {
        if self.preferences.reject_incoming_calls {
            info!("Incoming calls are refused by policy, declining {}", number);
            if let Err(e) = self.transport.reject(session, NOT_ACCEPTABLE_HERE).await {
                warn!("Failed to refuse call {}: {}", session, e);
            }
            return;
        }

        if let Some(call) = &self.call {
            info!(
                "Busy ({}), declining call from {}",
                call.state().as_str(),
                number
            );
            if let Err(e) = self.transport.reject(session, DECLINE).await {
                warn!("Failed to decline call {}: {}", session, e);
            }
            return;
        }

        let contact = match CallDomainService::find_matching_contact(self.contacts.as_ref(), &number)
            .await
        {
            Ok(contact) => contact,
            Err(e) => {
                warn!("Contact lookup for {} failed: {}", number, e);
                None
            }
        };

        let params = CallParams::new(number, contact.as_ref().map(|c| c.id()));
        info!("Incoming call from {} (session {})", params.number, session);

        self.call = Some(CallSession::ringing(
            session,
            CallDirection::Incoming,
            params.clone(),
        ));
        counter!("softphone_calls_total", "direction" => "incoming").increment(1);
        gauge!("softphone_call_active").set(1.0);

        self.ringtones.play(Ringtone::IncomingCall);
        self.notification = self.notifier.notify_incoming_call(&params);
        self.open_phonecall(Phonecall::new(
            CallDirection::Incoming,
            params.number.clone(),
            params.partner_id,
        ))
        .await;

        self.bus.publish(SoftphoneEvent::IncomingCall(params));
    }

    fn on_progress(&mut self, status_code: u16) {
        if !self.is_ringing(CallDirection::Outgoing) {
            return;
        }

        debug!("Remote side progressing ({})", status_code);
        self.ringtones.play(Ringtone::Ringback);
        self.bus.publish(SoftphoneEvent::ChangeStatus);
    }

    async fn on_accepted(&mut self, session: SessionId) {
        if !self.is_ringing(CallDirection::Outgoing) {
            return;
        }

        self.ringtones.stop();

        let stream = match self.media.get_user_media(&self.constraints()).await {
            Ok(stream) => stream,
            Err(e) => {
                self.media_failed(&e);
                if let Err(err) = self.transport.bye(session).await {
                    warn!("Failed to send BYE for {}: {}", session, err);
                }
                self.end_call(
                    CallState::NoCall,
                    Some(PhonecallOutcome::new(PhonecallState::Failed).with_reason(e.as_str())),
                )
                .await;
                return;
            }
        };

        self.attach_audio(stream);
        if let Err(e) = self.answer_call().await {
            error!("Call {} could not be established: {}", session, e);
            return;
        }

        info!("Call {} answered", session);
        self.bus.publish(SoftphoneEvent::Accepted);

        let auto_transfer = self.call.as_mut().and_then(CallSession::take_auto_transfer);
        if let Some(target) = auto_transfer {
            info!("Handing call {} over to {}", session, target);
            match self.transport.refer(session, &target).await {
                Ok(()) => {
                    if let Some(call) = self.call.as_mut() {
                        call.set_transferring(true);
                    }
                }
                Err(e) => {
                    warn!("Failed to transfer call {} to {}: {}", session, target, e);
                    self.raise_error(SipErrorPayload::non_blocking(format!(
                        "The call could not be transferred to {}",
                        target
                    )));
                }
            }
        }
    }

    async fn on_rejected(&mut self, status_code: u16, reason: &str) {
        if !self.is_ringing(CallDirection::Outgoing) {
            return;
        }

        let kind = RejectionKind::from_status(status_code, reason);
        info!("Call rejected with {} {} ({})", status_code, reason, kind.as_str());

        if let Some(message) = kind.user_message() {
            counter!("softphone_calls_failed_total", "reason" => kind.as_str()).increment(1);
            self.raise_error(SipErrorPayload::non_blocking(message));
        }

        let params = self.end_call(
            CallState::NoCall,
            Some(
                PhonecallOutcome::new(PhonecallState::Cancelled)
                    .with_reason(kind.as_str())
                    .with_sip_status(status_code),
            ),
        )
        .await
        .map(|call| call.params().clone());

        self.bus.publish(SoftphoneEvent::CancelOutgoing(params));
    }

    async fn on_remote_cancel(&mut self, session: SessionId) {
        if !self.is_ringing(CallDirection::Incoming) {
            return;
        }

        if let Err(e) = self.transport.reject(session, REQUEST_TERMINATED).await {
            warn!("Failed to terminate invite {}: {}", session, e);
        }

        let params = self
            .end_call(
                CallState::NoCall,
                Some(PhonecallOutcome::new(PhonecallState::Missed).with_sip_status(REQUEST_TERMINATED)),
            )
            .await
            .map(|call| call.params().clone());

        info!("Caller gave up on call {}", session);
        self.bus.publish(SoftphoneEvent::CancelIncoming(params));
    }

    async fn on_remote_bye(&mut self) {
        if self.state() != CallState::Ongoing {
            return;
        }

        self.finish_established("remote hangup").await;
    }

    async fn on_refer_accepted(&mut self, session: SessionId) {
        if !self.call.as_ref().is_some_and(CallSession::is_transferring) {
            return;
        }

        info!("Transfer of {} accepted, leaving the call", session);
        if let Err(e) = self.transport.bye(session).await {
            warn!("Failed to send BYE for {}: {}", session, e);
        }
        self.finish_established("transferred").await;
    }

    fn on_refer_rejected(&mut self, status_code: u16) {
        if let Some(call) = self.call.as_mut() {
            call.set_transferring(false);
        }

        warn!("Transfer refused with {}", status_code);
        self.raise_error(SipErrorPayload::non_blocking(format!(
            "The call could not be transferred (status {})",
            status_code
        )));
    }

    fn on_registered(&mut self) {
        info!("Registered to the PBX");
        if std::mem::take(&mut self.pending_errors.registration) {
            self.bus.publish(SoftphoneEvent::ErrorResolved);
        }
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn constraints(&self) -> MediaConstraints {
        MediaConstraints::audio_only(self.preferences.audio_input_device.clone())
    }

    fn is_ringing(&self, direction: CallDirection) -> bool {
        self.call
            .as_ref()
            .is_some_and(|call| call.state() == CallState::Ringing && call.direction() == direction)
    }

    fn ringing_call(&self, direction: CallDirection) -> Result<(SessionId, CallParams)> {
        match &self.call {
            Some(call) if call.state() == CallState::Ringing && call.direction() == direction => {
                Ok((call.session_id(), call.params().clone()))
            }
            Some(call) => Err(DomainError::InvalidOperation(format!(
                "No ringing {} call (current call is {} {})",
                direction.as_str(),
                call.direction().as_str(),
                call.state().as_str()
            ))),
            None => Err(DomainError::InvalidOperation(format!(
                "No ringing {} call",
                direction.as_str()
            ))),
        }
    }

    fn ongoing_session(&self) -> Result<SessionId> {
        match &self.call {
            Some(call) if call.state() == CallState::Ongoing => Ok(call.session_id()),
            _ => Err(DomainError::InvalidOperation(
                "No call in progress".to_string(),
            )),
        }
    }

    fn set_audio_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ongoing_session()?;
        let peer = self
            .peer
            .as_mut()
            .ok_or_else(|| DomainError::InvalidOperation("No audio connection".to_string()))?;

        peer.set_audio_enabled(enabled);
        debug!("Microphone {}", if enabled { "unmuted" } else { "muted" });
        Ok(())
    }

    fn raise_error(&self, payload: SipErrorPayload) {
        warn!("Softphone error: {}", payload.message);
        self.bus.publish(SoftphoneEvent::Error(payload));
    }

    fn media_failed(&mut self, error: &MediaError) {
        counter!("softphone_calls_failed_total", "reason" => "media").increment(1);
        self.pending_errors.media = true;
        self.raise_error(SipErrorPayload::non_blocking(error.user_message()));
    }

    fn resolve_media_error(&mut self) {
        if std::mem::take(&mut self.pending_errors.media) {
            self.bus.publish(SoftphoneEvent::ErrorResolved);
        }
    }

    fn attach_audio(&mut self, stream: MediaStream) {
        self.peer = Some(PeerConnection::from_stream(&stream));
        if let Some(mut previous) = self.stream.replace(stream) {
            previous.stop();
        }
        self.resolve_media_error();
    }

    fn release_audio(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        self.peer = None;
    }

    fn dismiss_notification(&mut self) {
        if let Some(id) = self.notification.take() {
            self.notifier.dismiss(id);
        }
    }

    async fn answer_call(&mut self) -> Result<()> {
        let call = self
            .call
            .as_mut()
            .ok_or_else(|| DomainError::InvalidOperation("No call to answer".to_string()))?;
        call.answer()?;

        if let Some(id) = call.phonecall_id() {
            if let Err(e) = self.phonecalls.mark_answered(&id).await {
                warn!("Failed to mark phonecall {} answered: {}", id, e);
            }
        }
        Ok(())
    }

    async fn open_phonecall(&mut self, phonecall: Phonecall) {
        if let Err(e) = self.phonecalls.create(&phonecall).await {
            warn!("Failed to record phonecall for {}: {}", phonecall.number, e);
            return;
        }

        if let Some(call) = self.call.as_mut() {
            call.set_phonecall_id(phonecall.id);
        }
    }

    async fn finish_established(&mut self, reason: &str) {
        counter!("softphone_calls_completed_total").increment(1);
        self.end_call(
            CallState::NoCall,
            Some(PhonecallOutcome::new(PhonecallState::Done).with_reason(reason)),
        )
        .await;

        info!("Call ended ({})", reason);
        self.bus.publish(SoftphoneEvent::Bye);
    }

    /// Drop the current call, passing through `via`, and release everything
    /// it held
    async fn end_call(
        &mut self,
        via: CallState,
        outcome: Option<PhonecallOutcome>,
    ) -> Option<CallSession> {
        let mut call = self.call.take()?;

        if let Err(e) = call.terminate(via) {
            warn!("Call {}: {}", call.session_id(), e);
        }

        if let (Some(id), Some(outcome)) = (call.phonecall_id(), outcome) {
            if let Err(e) = self.phonecalls.mark_ended(&id, outcome).await {
                warn!("Failed to close phonecall {}: {}", id, e);
            }
        }

        self.ringtones.stop();
        self.dismiss_notification();
        self.release_audio();
        gauge!("softphone_call_active").set(0.0);

        Some(call)
    }
}
