//! Call value objects

use serde::{Deserialize, Serialize};

/// Which party sent the INVITE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// We sent the INVITE
    Outgoing,
    /// The remote party sent the INVITE
    Incoming,
}

impl CallDirection {
    pub fn is_outgoing(&self) -> bool {
        matches!(self, CallDirection::Outgoing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Outgoing => "outgoing",
            CallDirection::Incoming => "incoming",
        }
    }
}

/// Call state
///
/// `Canceling` and `Rejecting` only exist for the duration of the local
/// teardown; they always end in `NoCall`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// No call in progress
    #[default]
    NoCall,
    /// Outgoing invite sent, or incoming invite waiting for an answer
    Ringing,
    /// Call is established
    Ongoing,
    /// Outgoing call being canceled locally
    Canceling,
    /// Incoming call being rejected locally
    Rejecting,
}

impl CallState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_state: &CallState) -> bool {
        use CallState::*;

        match (self, new_state) {
            (NoCall, Ringing) => true,

            (Ringing, Ongoing) => true,
            (Ringing, Canceling) => true,
            (Ringing, Rejecting) => true,
            (Ringing, NoCall) => true,

            (Ongoing, NoCall) => true,

            (Canceling, NoCall) => true,
            (Rejecting, NoCall) => true,

            _ => false,
        }
    }

    /// A call occupies the line
    pub fn is_busy(&self) -> bool {
        !matches!(self, CallState::NoCall)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::NoCall => "no_call",
            CallState::Ringing => "ringing",
            CallState::Ongoing => "ongoing",
            CallState::Canceling => "canceling",
            CallState::Rejecting => "rejecting",
        }
    }
}

/// Classification of a final SIP status received for an outgoing INVITE
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionKind {
    /// 404, 488, 603: wrong number or broken PBX configuration
    IncorrectNumber { reason: String },
    /// 486, 600: the callee cannot take the call right now
    Busy,
    /// 487: our own CANCEL went through
    RequestTerminated,
    /// Anything else
    Other { reason: String },
}

impl RejectionKind {
    pub fn from_status(status_code: u16, reason: &str) -> Self {
        match status_code {
            404 | 488 | 603 => RejectionKind::IncorrectNumber {
                reason: reason.to_string(),
            },
            486 | 600 => RejectionKind::Busy,
            487 => RejectionKind::RequestTerminated,
            _ => RejectionKind::Other {
                reason: reason.to_string(),
            },
        }
    }

    /// Message shown to the user, `None` when the rejection must stay silent
    pub fn user_message(&self) -> Option<String> {
        match self {
            RejectionKind::IncorrectNumber { reason } => Some(format!(
                "The number is incorrect, the user credentials could be wrong or the connection \
                 cannot be made. Please check your configuration.\n(Reason received: {})",
                reason
            )),
            RejectionKind::Busy => {
                Some("The person you try to contact is currently unavailable.".to_string())
            }
            RejectionKind::RequestTerminated => None,
            RejectionKind::Other { reason } => Some(format!("Call rejected (reason: \"{}\")", reason)),
        }
    }

    /// Label used for metrics and call records
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionKind::IncorrectNumber { .. } => "incorrect_number",
            RejectionKind::Busy => "busy",
            RejectionKind::RequestTerminated => "request_terminated",
            RejectionKind::Other { .. } => "rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_state_transitions() {
        let no_call = CallState::NoCall;
        assert!(no_call.can_transition_to(&CallState::Ringing));
        assert!(!no_call.can_transition_to(&CallState::Ongoing));

        let ringing = CallState::Ringing;
        assert!(ringing.can_transition_to(&CallState::Ongoing));
        assert!(ringing.can_transition_to(&CallState::Canceling));
        assert!(ringing.can_transition_to(&CallState::Rejecting));
        assert!(ringing.can_transition_to(&CallState::NoCall));

        assert!(CallState::Ongoing.can_transition_to(&CallState::NoCall));
        assert!(CallState::Canceling.can_transition_to(&CallState::NoCall));
        assert!(CallState::Rejecting.can_transition_to(&CallState::NoCall));
    }

    #[test]
    fn test_invalid_state_transitions() {
        assert!(!CallState::Ongoing.can_transition_to(&CallState::Ringing));
        assert!(!CallState::Ongoing.can_transition_to(&CallState::Canceling));
        assert!(!CallState::Canceling.can_transition_to(&CallState::Ongoing));
        assert!(!CallState::Rejecting.can_transition_to(&CallState::Ringing));
        assert!(!CallState::NoCall.can_transition_to(&CallState::NoCall));
    }

    #[test]
    fn test_rejection_mapping_is_stable() {
        for code in [404, 488, 603] {
            let kind = RejectionKind::from_status(code, "Not Found");
            assert!(matches!(kind, RejectionKind::IncorrectNumber { .. }));
            assert!(kind
                .user_message()
                .unwrap()
                .contains("(Reason received: Not Found)"));
        }

        for code in [486, 600] {
            let kind = RejectionKind::from_status(code, "Busy Here");
            assert_eq!(kind, RejectionKind::Busy);
            assert_eq!(
                kind.user_message().as_deref(),
                Some("The person you try to contact is currently unavailable.")
            );
        }

        assert_eq!(
            RejectionKind::from_status(487, "Request Terminated").user_message(),
            None
        );

        let other = RejectionKind::from_status(480, "Temporarily Unavailable");
        assert_eq!(
            other.user_message().as_deref(),
            Some("Call rejected (reason: \"Temporarily Unavailable\")")
        );
    }
}
