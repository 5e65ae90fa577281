//! Softphone domain events
//!
//! These are the only way the controller talks to the presentation layer.
//! Event names and payload shapes are a wire contract with the dialing panel.

use crate::domain::call::entity::CallParams;
use crate::domain::shared::events::DomainEvent;
use serde::{Deserialize, Serialize};

/// Payload of `sip_error`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SipErrorPayload {
    pub message: String,
    pub is_non_blocking: bool,
}

impl SipErrorPayload {
    pub fn blocking(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_non_blocking: false,
        }
    }

    pub fn non_blocking(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_non_blocking: true,
        }
    }
}

/// Union of all events emitted by the call session controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoftphoneEvent {
    /// `incomingCall`: an invite arrived and the line is ringing
    IncomingCall(CallParams),
    /// `changeStatus`: provisional response on an outgoing call
    ChangeStatus,
    /// `sip_accepted`: outgoing call answered
    Accepted,
    /// `sip_bye`: established call terminated
    Bye,
    /// `sip_cancel_incoming`: caller gave up before we answered
    CancelIncoming(Option<CallParams>),
    /// `sip_cancel_outgoing`: outgoing attempt ended before being answered
    CancelOutgoing(Option<CallParams>),
    /// `sip_error`
    Error(SipErrorPayload),
    /// `sip_error_resolved`
    ErrorResolved,
    /// `sip_incoming_call`: incoming call answered locally
    IncomingCallAccepted(CallParams),
    /// `sip_rejected`: incoming call declined locally
    Rejected(CallParams),
}

impl SoftphoneEvent {
    /// JSON payload, `Null` for events without one
    pub fn payload(&self) -> serde_json::Value {
        let value = match self {
            SoftphoneEvent::IncomingCall(params)
            | SoftphoneEvent::IncomingCallAccepted(params)
            | SoftphoneEvent::Rejected(params) => serde_json::to_value(params),
            SoftphoneEvent::CancelIncoming(params) | SoftphoneEvent::CancelOutgoing(params) => {
                serde_json::to_value(params)
            }
            SoftphoneEvent::Error(error) => serde_json::to_value(error),
            SoftphoneEvent::ChangeStatus
            | SoftphoneEvent::Accepted
            | SoftphoneEvent::Bye
            | SoftphoneEvent::ErrorResolved => Ok(serde_json::Value::Null),
        };

        value.unwrap_or(serde_json::Value::Null)
    }
}

impl DomainEvent for SoftphoneEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SoftphoneEvent::IncomingCall(_) => "incomingCall",
            SoftphoneEvent::ChangeStatus => "changeStatus",
            SoftphoneEvent::Accepted => "sip_accepted",
            SoftphoneEvent::Bye => "sip_bye",
            SoftphoneEvent::CancelIncoming(_) => "sip_cancel_incoming",
            SoftphoneEvent::CancelOutgoing(_) => "sip_cancel_outgoing",
            SoftphoneEvent::Error(_) => "sip_error",
            SoftphoneEvent::ErrorResolved => "sip_error_resolved",
            SoftphoneEvent::IncomingCallAccepted(_) => "sip_incoming_call",
            SoftphoneEvent::Rejected(_) => "sip_rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::value_objects::PartnerId;
    use serde_json::json;

    #[test]
    fn test_event_names() {
        let params = CallParams::new("999", None);
        let names: Vec<&str> = [
            SoftphoneEvent::IncomingCall(params.clone()),
            SoftphoneEvent::ChangeStatus,
            SoftphoneEvent::Accepted,
            SoftphoneEvent::Bye,
            SoftphoneEvent::CancelIncoming(None),
            SoftphoneEvent::CancelOutgoing(None),
            SoftphoneEvent::Error(SipErrorPayload::blocking("boom")),
            SoftphoneEvent::ErrorResolved,
            SoftphoneEvent::IncomingCallAccepted(params.clone()),
            SoftphoneEvent::Rejected(params),
        ]
        .iter()
        .map(|event| event.event_type())
        .collect();

        assert_eq!(
            names,
            vec![
                "incomingCall",
                "changeStatus",
                "sip_accepted",
                "sip_bye",
                "sip_cancel_incoming",
                "sip_cancel_outgoing",
                "sip_error",
                "sip_error_resolved",
                "sip_incoming_call",
                "sip_rejected",
            ]
        );
    }

    #[test]
    fn test_payload_shapes() {
        let params = CallParams::new("999", Some(PartnerId::new(42)));
        assert_eq!(
            SoftphoneEvent::Rejected(params).payload(),
            json!({ "number": "999", "partnerId": 42 })
        );
        assert_eq!(
            SoftphoneEvent::Error(SipErrorPayload::non_blocking("oops")).payload(),
            json!({ "message": "oops", "isNonBlocking": true })
        );
        assert_eq!(SoftphoneEvent::CancelOutgoing(None).payload(), json!(null));
        assert_eq!(SoftphoneEvent::Bye.payload(), json!(null));
    }
}
