//! SIP dialogs (RFC 3261 §12)
//!
//! One dialog per transport session. Headers are kept as rendered
//! name-addr values so in-dialog requests can be built without re-parsing.

use super::message::{addr_spec, header_param, strip_params, SipError, SipRequest, SipResponse};
use crate::domain::shared::value_objects::SessionId;
use std::collections::HashMap;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogRole {
    /// We sent the INVITE
    Uac,
    /// We received the INVITE
    Uas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    /// INVITE sent or received, no final response yet
    Early,
    /// CANCEL sent, waiting for the 487
    Canceling,
    /// 2xx sent or received
    Confirmed,
}

#[derive(Debug, Clone)]
pub struct Dialog {
    pub session: SessionId,
    pub role: DialogRole,
    pub call_id: String,
    /// Our name-addr, without tag
    pub local: String,
    pub local_tag: String,
    /// Peer name-addr, without tag
    pub remote: String,
    pub remote_tag: Option<String>,
    /// Request-URI for in-dialog requests
    pub remote_target: String,
    pub local_cseq: u32,
    pub invite_cseq: u32,
    pub invite_branch: String,
    /// Inbound INVITE, kept to answer it
    pub invite: Option<SipRequest>,
    /// Our SDP offer on outbound calls
    pub offer: Option<String>,
    pub peer: SocketAddr,
    pub state: DialogState,
    /// A digest challenge was already answered for the INVITE
    pub auth_attempted: bool,
}

impl Dialog {
    #[allow(clippy::too_many_arguments)]
    pub fn outgoing(
        session: SessionId,
        call_id: String,
        local: String,
        local_tag: String,
        remote: String,
        target: String,
        branch: String,
        offer: String,
        peer: SocketAddr,
    ) -> Self {
        Self {
            session,
            role: DialogRole::Uac,
            call_id,
            local,
            local_tag,
            remote,
            remote_tag: None,
            remote_target: target,
            local_cseq: 1,
            invite_cseq: 1,
            invite_branch: branch,
            invite: None,
            offer: Some(offer),
            peer,
            state: DialogState::Early,
            auth_attempted: false,
        }
    }

    /// Dialog for an inbound INVITE; our tag goes into every response
    pub fn incoming(
        session: SessionId,
        invite: &SipRequest,
        local_tag: String,
        peer: SocketAddr,
    ) -> Result<Self, SipError> {
        let missing = |name: &str| SipError::InvalidMessage(format!("INVITE without {}", name));

        let call_id = invite.call_id().ok_or_else(|| missing("Call-ID"))?;
        let from = invite.header("From").ok_or_else(|| missing("From"))?;
        let to = invite.header("To").ok_or_else(|| missing("To"))?;
        let (cseq, _) = invite.cseq().ok_or_else(|| missing("CSeq"))?;
        let branch = invite
            .header("Via")
            .and_then(|via| header_param(&via, "branch"))
            .unwrap_or_default();

        let remote_target = invite
            .header("Contact")
            .map(|contact| addr_spec(&contact))
            .unwrap_or_else(|| addr_spec(&from));

        Ok(Self {
            session,
            role: DialogRole::Uas,
            call_id,
            local: strip_params(&to),
            local_tag,
            remote: strip_params(&from),
            remote_tag: header_param(&from, "tag"),
            remote_target,
            local_cseq: 0,
            invite_cseq: cseq,
            invite_branch: branch,
            invite: Some(invite.clone()),
            offer: None,
            peer,
            state: DialogState::Early,
            auth_attempted: false,
        })
    }

    /// `From` of requests we send in this dialog
    pub fn local_header(&self) -> String {
        format!("{};tag={}", self.local, self.local_tag)
    }

    /// `To` of requests we send in this dialog
    pub fn remote_header(&self) -> String {
        match &self.remote_tag {
            Some(tag) => format!("{};tag={}", self.remote, tag),
            None => self.remote.clone(),
        }
    }

    pub fn next_cseq(&mut self) -> u32 {
        self.local_cseq += 1;
        self.local_cseq
    }

    /// Learn the peer's tag and target from a response to our INVITE
    pub fn update_from_response(&mut self, response: &SipResponse) {
        if let Some(tag) = response.to_tag() {
            self.remote_tag = Some(tag);
        }
        if response.is_success() {
            if let Some(contact) = response.header("Contact") {
                self.remote_target = addr_spec(&contact);
            }
        }
    }

    pub fn is_established(&self) -> bool {
        self.state == DialogState::Confirmed
    }
}

/// Dialogs by session, with lookup by Call-ID
#[derive(Debug, Default)]
pub struct DialogSet {
    dialogs: HashMap<SessionId, Dialog>,
}

impl DialogSet {
    pub fn insert(&mut self, dialog: Dialog) {
        self.dialogs.insert(dialog.session, dialog);
    }

    pub fn get_mut(&mut self, session: SessionId) -> Option<&mut Dialog> {
        self.dialogs.get_mut(&session)
    }

    pub fn by_call_id(&mut self, call_id: &str) -> Option<&mut Dialog> {
        self.dialogs.values_mut().find(|d| d.call_id == call_id)
    }

    pub fn remove(&mut self, session: SessionId) -> Option<Dialog> {
        self.dialogs.remove(&session)
    }

    pub fn len(&self) -> usize {
        self.dialogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }
}
