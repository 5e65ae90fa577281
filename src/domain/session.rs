//! Session transport port
//!
//! The transport owns the signaling dialogs. The controller only ever refers
//! to them through a [`SessionId`] and learns about remote activity through
//! [`TransportEvent`]s delivered on a channel, in the order the transport
//! produced them.

use crate::domain::dtmf::DtmfDigit;
use crate::domain::media::MediaConstraints;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::SessionId;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Something the transport observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Inbound INVITE; `number` is the caller's user part
    Invite { session: SessionId, number: String },
    /// 180 Ringing / 183 Session Progress on our INVITE
    Progress { session: SessionId, status_code: u16 },
    /// 2xx on our INVITE
    Accepted { session: SessionId },
    /// Final non-2xx on our INVITE
    Rejected {
        session: SessionId,
        status_code: u16,
        reason: String,
    },
    /// The caller canceled an INVITE we had not answered
    Canceled { session: SessionId },
    /// The remote party hung up
    Bye { session: SessionId },
    /// Our REFER was accepted (202)
    ReferAccepted { session: SessionId },
    /// Our REFER was refused
    ReferRejected { session: SessionId, status_code: u16 },
    /// Registration with the PBX succeeded
    Registered,
    /// Registration with the PBX failed
    RegistrationFailed { reason: String },
    /// The PBX stopped answering
    ConnectionLost,
}

impl TransportEvent {
    /// Session the event refers to, if any
    pub fn session(&self) -> Option<SessionId> {
        match self {
            TransportEvent::Invite { session, .. }
            | TransportEvent::Progress { session, .. }
            | TransportEvent::Accepted { session }
            | TransportEvent::Rejected { session, .. }
            | TransportEvent::Canceled { session }
            | TransportEvent::Bye { session }
            | TransportEvent::ReferAccepted { session }
            | TransportEvent::ReferRejected { session, .. } => Some(*session),
            TransportEvent::Registered
            | TransportEvent::RegistrationFailed { .. }
            | TransportEvent::ConnectionLost => None,
        }
    }
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Channel the transport reports on
pub fn transport_channel() -> (TransportEventSender, TransportEventReceiver) {
    mpsc::unbounded_channel()
}

/// Signaling primitives
///
/// Every method is fire-and-forget from the controller's point of view: the
/// outcome arrives later as a [`TransportEvent`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Register with the PBX
    async fn register(&self) -> Result<()>;

    /// Send an INVITE to `number` for a session minted by the caller
    async fn invite(&self, session: SessionId, number: &str) -> Result<()>;

    /// Answer an inbound INVITE
    async fn accept(&self, session: SessionId, constraints: &MediaConstraints) -> Result<()>;

    /// Refuse an inbound INVITE with a final status
    async fn reject(&self, session: SessionId, status_code: u16) -> Result<()>;

    /// Abort our pending INVITE
    async fn cancel(&self, session: SessionId) -> Result<()>;

    /// Terminate an established session
    async fn bye(&self, session: SessionId) -> Result<()>;

    /// Ask the remote party to call `number` instead
    async fn refer(&self, session: SessionId, number: &str) -> Result<()>;

    /// Send one keypad digit
    async fn send_dtmf(&self, session: SessionId, digit: DtmfDigit) -> Result<()>;

    /// Human readable transport name for logs
    fn name(&self) -> &'static str;
}
