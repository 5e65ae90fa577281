//! Phonecall record domain model
//!
//! A phonecall is the call log entry kept by the server for every call
//! attempt, answered or not.

use crate::domain::call::value_object::CallDirection;
use crate::domain::shared::value_objects::{PartnerId, PhonecallId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phonecall record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phonecall {
    pub id: PhonecallId,
    pub direction: CallDirection,
    /// Remote number as dialed or as received
    pub number: String,
    pub partner_id: Option<PartnerId>,
    pub state: PhonecallState,

    pub started_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Talk time in seconds, set once an answered call ends
    pub duration_seconds: Option<i64>,

    pub end_reason: Option<String>,
    pub sip_status: Option<u16>,
}

/// Phonecall state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhonecallState {
    /// Outgoing invite sent
    Calling,
    /// Incoming invite waiting for an answer
    Ringing,
    /// Call established
    Ongoing,
    /// Established call ended normally
    Done,
    /// Incoming call the caller abandoned
    Missed,
    /// Incoming call declined locally
    Rejected,
    /// Outgoing call canceled locally, or refused by the callee
    Cancelled,
    /// Call failed on media or transport errors
    Failed,
}

impl PhonecallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhonecallState::Calling => "calling",
            PhonecallState::Ringing => "ringing",
            PhonecallState::Ongoing => "ongoing",
            PhonecallState::Done => "done",
            PhonecallState::Missed => "missed",
            PhonecallState::Rejected => "rejected",
            PhonecallState::Cancelled => "cancelled",
            PhonecallState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            PhonecallState::Calling | PhonecallState::Ringing | PhonecallState::Ongoing
        )
    }
}

/// How a call ended, as reported to the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhonecallOutcome {
    pub state: PhonecallState,
    pub reason: Option<String>,
    pub sip_status: Option<u16>,
}

impl PhonecallOutcome {
    pub fn new(state: PhonecallState) -> Self {
        Self {
            state,
            reason: None,
            sip_status: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_sip_status(mut self, status: u16) -> Self {
        self.sip_status = Some(status);
        self
    }
}

impl Phonecall {
    /// Create the record for a call attempt
    pub fn new(direction: CallDirection, number: String, partner_id: Option<PartnerId>) -> Self {
        let state = match direction {
            CallDirection::Outgoing => PhonecallState::Calling,
            CallDirection::Incoming => PhonecallState::Ringing,
        };

        Self {
            id: PhonecallId::new(),
            direction,
            number,
            partner_id,
            state,
            started_at: Utc::now(),
            answered_at: None,
            ended_at: None,
            duration_seconds: None,
            end_reason: None,
            sip_status: None,
        }
    }

    /// Mark the call as answered
    pub fn mark_answered(&mut self) {
        self.answered_at = Some(Utc::now());
        self.state = PhonecallState::Ongoing;
    }

    /// Mark the call as ended
    pub fn mark_ended(&mut self, outcome: PhonecallOutcome) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.state = outcome.state;
        self.end_reason = outcome.reason;
        self.sip_status = outcome.sip_status;

        if let Some(answered_at) = self.answered_at {
            self.duration_seconds = Some((now - answered_at).num_seconds());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phonecall_lifecycle() {
        let mut call = Phonecall::new(CallDirection::Outgoing, "5551234".to_string(), None);
        assert_eq!(call.state, PhonecallState::Calling);

        call.mark_answered();
        assert_eq!(call.state, PhonecallState::Ongoing);
        assert!(call.answered_at.is_some());

        call.mark_ended(PhonecallOutcome::new(PhonecallState::Done));
        assert_eq!(call.state, PhonecallState::Done);
        assert!(call.duration_seconds.is_some());
        assert!(call.state.is_terminal());
    }

    #[test]
    fn test_unanswered_call_has_no_duration() {
        let mut call = Phonecall::new(
            CallDirection::Incoming,
            "999".to_string(),
            Some(PartnerId::new(42)),
        );
        assert_eq!(call.state, PhonecallState::Ringing);

        call.mark_ended(PhonecallOutcome::new(PhonecallState::Missed).with_sip_status(487));
        assert_eq!(call.state, PhonecallState::Missed);
        assert_eq!(call.sip_status, Some(487));
        assert_eq!(call.duration_seconds, None);
    }
}
