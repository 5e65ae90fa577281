//! Call session aggregate root

use crate::domain::call::entity::CallParams;
use crate::domain::call::value_object::{CallDirection, CallState};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{PhonecallId, SessionId};
use chrono::{DateTime, Utc};

/// The call currently occupying the line
///
/// Created on `make_call` or on invite receipt, dropped on any terminal
/// transition. Holding one of these is what makes the controller busy.
#[derive(Debug, Clone)]
pub struct CallSession {
    /// Transport session this call is bound to
    session_id: SessionId,
    /// Current state, never `NoCall` while the aggregate lives
    state: CallState,
    direction: CallDirection,
    params: CallParams,
    /// Call log entry, if the server accepted to create one
    phonecall_id: Option<PhonecallId>,
    /// Number to REFER the call to once answered ("call from another device")
    auto_transfer_to: Option<String>,
    /// A REFER is in flight
    transferring: bool,
    started_at: DateTime<Utc>,
    answered_at: Option<DateTime<Utc>>,
}

impl CallSession {
    /// Start a call in the `Ringing` state
    pub fn ringing(session_id: SessionId, direction: CallDirection, params: CallParams) -> Self {
        Self {
            session_id,
            state: CallState::Ringing,
            direction,
            params,
            phonecall_id: None,
            auto_transfer_to: None,
            transferring: false,
            started_at: Utc::now(),
            answered_at: None,
        }
    }

    /// Mark the call established
    pub fn answer(&mut self) -> Result<()> {
        self.transition_to(CallState::Ongoing)?;
        self.answered_at = Some(Utc::now());
        Ok(())
    }

    /// Enter a local teardown state (`Canceling`, `Rejecting`) or `NoCall`
    pub fn terminate(&mut self, via: CallState) -> Result<()> {
        if via != CallState::NoCall {
            self.transition_to(via)?;
        }
        self.transition_to(CallState::NoCall)
    }

    fn transition_to(&mut self, new_state: CallState) -> Result<()> {
        if !self.state.can_transition_to(&new_state) {
            return Err(DomainError::InvalidStateTransition(format!(
                "Cannot transition from {:?} to {:?}",
                self.state, new_state
            )));
        }

        self.state = new_state;
        Ok(())
    }

    pub fn set_phonecall_id(&mut self, id: PhonecallId) {
        self.phonecall_id = Some(id);
    }

    pub fn set_auto_transfer(&mut self, target: String) {
        self.auto_transfer_to = Some(target);
    }

    pub fn take_auto_transfer(&mut self) -> Option<String> {
        self.auto_transfer_to.take()
    }

    pub fn set_transferring(&mut self, transferring: bool) {
        self.transferring = transferring;
    }

    // Getters
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn is_outgoing(&self) -> bool {
        self.direction.is_outgoing()
    }

    pub fn params(&self) -> &CallParams {
        &self.params
    }

    pub fn phonecall_id(&self) -> Option<PhonecallId> {
        self.phonecall_id
    }

    pub fn is_transferring(&self) -> bool {
        self.transferring
    }

    pub fn started_at(&self) -> &DateTime<Utc> {
        &self.started_at
    }

    pub fn answered_at(&self) -> Option<&DateTime<Utc>> {
        self.answered_at.as_ref()
    }

    /// Whether a transport event refers to this call
    pub fn owns(&self, session_id: SessionId) -> bool {
        self.session_id == session_id
    }
}
