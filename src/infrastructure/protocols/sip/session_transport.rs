//! SIP user agent implementing the session transport port
//!
//! Registers the configured account with the PBX and runs one dialog per
//! transport session over UDP. Every request goes to the PBX; responses go
//! back to wherever the request came from.

use super::auth::{DigestChallenge, DigestCredentials};
use super::builder::{new_branch, new_call_id, new_tag, RequestBuilder, ResponseBuilder, ALLOW};
use super::dialog::{Dialog, DialogRole, DialogSet, DialogState};
use super::message::{SipError, SipMessage, SipMethod, SipRequest, SipResponse};
use super::sdp::SdpSession;
use super::transport::{IncomingMessage, UdpTransport};
use crate::config::PbxConfig;
use crate::domain::dtmf::{DtmfDigit, DEFAULT_TONE_DURATION};
use crate::domain::media::MediaConstraints;
use crate::domain::session::{SessionTransport, TransportEvent, TransportEventSender};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{SessionId, SipUri};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEFAULT_SIP_PORT: u16 = 5060;

/// 64*T1: how long a request may stay unanswered
const TRANSACTION_TIMEOUT: Duration = Duration::from_secs(32);

/// SIP account the softphone registers
#[derive(Debug, Clone)]
pub struct SipAccount {
    pub server: String,
    pub domain: String,
    pub login: String,
    pub password: String,
    pub display_name: Option<String>,
    pub bind_address: SocketAddr,
    pub rtp_port: u16,
    pub register_expires: u32,
}

impl SipAccount {
    pub fn from_config(pbx: &PbxConfig) -> Result<Self> {
        let required = |value: &Option<String>, name: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| DomainError::Configuration(format!("PBX {} is not set", name)))
        };

        let bind_address = pbx.bind_address.parse().map_err(|e| {
            DomainError::Configuration(format!(
                "Invalid bind address {}: {}",
                pbx.bind_address, e
            ))
        })?;

        Ok(Self {
            server: required(&pbx.server, "server")?,
            domain: required(&pbx.domain, "domain")?,
            login: required(&pbx.login, "login")?,
            password: required(&pbx.password, "password")?,
            display_name: pbx
                .display_name
                .clone()
                .filter(|name| !name.trim().is_empty()),
            bind_address,
            rtp_port: pbx.rtp_port,
            register_expires: pbx.register_expires,
        })
    }

    /// Address of record
    pub fn aor(&self) -> String {
        format!("sip:{}@{}", self.login, self.domain)
    }

    fn name_addr(&self) -> String {
        match &self.display_name {
            Some(name) => format!("\"{}\" <{}>", name, self.aor()),
            None => format!("<{}>", self.aor()),
        }
    }

    fn uri_for(&self, number: &str) -> String {
        format!("sip:{}@{}", number, self.domain)
    }

    fn registrar(&self) -> String {
        format!("sip:{}", self.domain)
    }

    fn credentials(&self) -> DigestCredentials {
        DigestCredentials::new(self.login.clone(), self.password.clone())
    }
}

/// Resolve `host[:port]`, defaulting to 5060
async fn resolve(server: &str) -> Result<SocketAddr> {
    let has_port = server.parse::<SocketAddr>().is_ok()
        || server
            .rsplit_once(':')
            .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
    let target = if has_port {
        server.to_string()
    } else {
        format!("{}:{}", server, DEFAULT_SIP_PORT)
    };

    let addr = tokio::net::lookup_host(&target)
        .await
        .map_err(|e| DomainError::Transport(format!("Cannot resolve {}: {}", target, e)))?
        .next()
        .ok_or_else(|| DomainError::Transport(format!("No address for {}", target)));
    addr
}

/// Local interface address used to reach `server`
async fn local_ip_towards(server: SocketAddr) -> Result<IpAddr> {
    let any: SocketAddr = if server.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let io = |e: std::io::Error| DomainError::Transport(e.to_string());

    let probe = UdpSocket::bind(any).await.map_err(io)?;
    probe.connect(server).await.map_err(io)?;
    Ok(probe.local_addr().map_err(io)?.ip())
}

#[derive(Debug)]
struct Registration {
    call_id: String,
    from_tag: String,
    cseq: u32,
    /// CSeq of the REGISTER waiting for a final response
    awaiting: Option<u32>,
    auth_attempted: bool,
    registered: bool,
}

struct Inner {
    account: SipAccount,
    udp: UdpTransport,
    server: SocketAddr,
    /// Address advertised in Via, Contact and SDP
    local: SocketAddr,
    events: TransportEventSender,
    dialogs: Mutex<DialogSet>,
    registration: Mutex<Registration>,
    refresh: Mutex<Option<JoinHandle<()>>>,
}

/// Session transport speaking SIP over UDP to a PBX
#[derive(Clone)]
pub struct SipSessionTransport {
    inner: Arc<Inner>,
}

impl SipSessionTransport {
    /// Bind the signaling socket and start processing inbound traffic
    pub async fn connect(account: SipAccount, events: TransportEventSender) -> Result<Self> {
        let server = resolve(&account.server).await?;
        let (udp, incoming) = UdpTransport::bind(account.bind_address).await?;

        let bound = udp.local_addr()?;
        let ip = if bound.ip().is_unspecified() {
            local_ip_towards(server).await?
        } else {
            bound.ip()
        };
        let local = SocketAddr::new(ip, bound.port());
        info!("SIP account {} via {} from {}", account.aor(), server, local);

        let registration = Registration {
            call_id: new_call_id(&ip.to_string()),
            from_tag: new_tag(),
            cseq: 0,
            awaiting: None,
            auth_attempted: false,
            registered: false,
        };

        let inner = Arc::new(Inner {
            account,
            udp,
            server,
            local,
            events,
            dialogs: Mutex::new(DialogSet::default()),
            registration: Mutex::new(registration),
            refresh: Mutex::new(None),
        });

        tokio::spawn(Inner::process(inner.clone(), incoming));

        Ok(Self { inner })
    }

    /// Address the PBX sees us at
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local
    }
}

impl Inner {
    async fn process(self: Arc<Self>, mut incoming: tokio::sync::mpsc::Receiver<IncomingMessage>) {
        while let Some(IncomingMessage { message, source }) = incoming.recv().await {
            if self.events.is_closed() {
                debug!("Controller gone, stopping SIP processing");
                break;
            }

            match message {
                SipMessage::Request(request) => self.on_request(request, source).await,
                SipMessage::Response(response) => self.on_response(response).await,
            }
        }
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            debug!("Transport event dropped, controller is gone");
        }
    }

    async fn send(&self, message: String, to: SocketAddr) -> Result<()> {
        self.udp.send_to(&message, to).await?;
        Ok(())
    }

    async fn respond(&self, request: &SipRequest, response: ResponseBuilder, to: SocketAddr) {
        let message = response.build_for_request(request);
        if let Err(e) = self.send(message, to).await {
            warn!("Failed to answer {}: {}", request.method_name(), e);
        }
    }

    fn via(&self, branch: &str) -> String {
        format!("SIP/2.0/UDP {};branch={};rport", self.local, branch)
    }

    fn contact(&self) -> String {
        format!("<sip:{}@{}>", self.account.login, self.local)
    }

    fn offer(&self) -> SdpSession {
        SdpSession::create_audio_session(self.local.ip(), self.account.rtp_port)
    }

    // ---------------------------------------------------------------------
    // Registration
    // ---------------------------------------------------------------------

    async fn start_registration(self: &Arc<Self>) -> Result<()> {
        self.registration.lock().await.auth_attempted = false;
        self.send_register(None).await
    }

    async fn send_register(self: &Arc<Self>, authorization: Option<(&str, String)>) -> Result<()> {
        let (call_id, from_tag, cseq) = {
            let mut registration = self.registration.lock().await;
            registration.cseq += 1;
            registration.awaiting = Some(registration.cseq);
            (
                registration.call_id.clone(),
                registration.from_tag.clone(),
                registration.cseq,
            )
        };

        let mut request = RequestBuilder::new(SipMethod::Register, self.account.registrar())
            .header("Via", self.via(&new_branch()))
            .header(
                "From",
                format!("{};tag={}", self.account.name_addr(), from_tag),
            )
            .header("To", self.account.name_addr())
            .header("Call-ID", call_id)
            .header("CSeq", format!("{} REGISTER", cseq))
            .header("Contact", self.contact())
            .header("Expires", self.account.register_expires.to_string());
        if let Some((name, value)) = authorization {
            request = request.header(name, value);
        }

        debug!("Sending REGISTER {} for {}", cseq, self.account.aor());
        self.send(request.build(), self.server).await?;
        self.watch_registration(cseq);
        Ok(())
    }

    /// Report the registrar as unreachable if `cseq` gets no final answer
    fn watch_registration(self: &Arc<Self>, cseq: u32) {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(TRANSACTION_TIMEOUT).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };

            let mut registration = inner.registration.lock().await;
            if registration.awaiting != Some(cseq) {
                return;
            }
            registration.awaiting = None;

            let event = if std::mem::take(&mut registration.registered) {
                warn!("PBX stopped answering REGISTER");
                TransportEvent::ConnectionLost
            } else {
                warn!("REGISTER timed out");
                TransportEvent::RegistrationFailed {
                    reason: "Registration timed out".to_string(),
                }
            };
            inner.emit(event);
        });
    }

    async fn schedule_refresh(self: &Arc<Self>, expires: u32) {
        let delay = Duration::from_secs(u64::from(expires.max(1))).mul_f32(0.9);
        let weak = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                if let Err(e) = inner.start_registration().await {
                    warn!("Registration refresh failed: {}", e);
                    inner.emit(TransportEvent::ConnectionLost);
                }
            }
        });

        if let Some(previous) = self.refresh.lock().await.replace(task) {
            previous.abort();
        }
    }

    async fn on_register_response(self: &Arc<Self>, response: &SipResponse, cseq: u32) {
        if response.is_provisional() {
            return;
        }

        let mut registration = self.registration.lock().await;
        if registration.awaiting != Some(cseq)
            || response.call_id().as_deref() != Some(registration.call_id.as_str())
        {
            debug!("Ignoring stale REGISTER response {}", cseq);
            return;
        }
        registration.awaiting = None;

        let code = response.status_code();
        match code {
            200..=299 => {
                registration.registered = true;
                drop(registration);

                let expires = response
                    .header("Expires")
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(self.account.register_expires);
                info!("Registered {} for {}s", self.account.aor(), expires);
                self.schedule_refresh(expires).await;
                self.emit(TransportEvent::Registered);
            }
            401 | 407 if !registration.auth_attempted => {
                registration.auth_attempted = true;
                drop(registration);

                let challenge = match DigestChallenge::from_response(response) {
                    Ok(challenge) => challenge,
                    Err(e) => {
                        self.emit(TransportEvent::RegistrationFailed {
                            reason: e.to_string(),
                        });
                        return;
                    }
                };
                let authorization = self.account.credentials().authorization(
                    &challenge,
                    SipMethod::Register.as_str(),
                    &self.account.registrar(),
                );

                if let Err(e) = self
                    .send_register(Some((challenge.authorization_header_name(), authorization)))
                    .await
                {
                    self.emit(TransportEvent::RegistrationFailed {
                        reason: e.to_string(),
                    });
                }
            }
            _ => {
                registration.registered = false;
                drop(registration);

                warn!("Registration refused: {} {}", code, response.reason());
                self.emit(TransportEvent::RegistrationFailed {
                    reason: format!("{} {}", code, response.reason()),
                });
            }
        }
    }

    // ---------------------------------------------------------------------
    // Outgoing calls
    // ---------------------------------------------------------------------

    fn invite_request(&self, dialog: &Dialog, authorization: Option<(&str, String)>) -> String {
        let mut request = RequestBuilder::new(SipMethod::Invite, dialog.remote_target.clone())
            .header("Via", self.via(&dialog.invite_branch))
            .header("From", dialog.local_header())
            .header("To", dialog.remote_header())
            .header("Call-ID", dialog.call_id.clone())
            .header("CSeq", format!("{} INVITE", dialog.invite_cseq))
            .header("Contact", self.contact())
            .header("Allow", ALLOW);
        if let Some((name, value)) = authorization {
            request = request.header(name, value);
        }
        request
            .body("application/sdp", dialog.offer.clone().unwrap_or_default())
            .build()
    }

    /// ACK for a non-2xx final response: same transaction as the INVITE
    fn ack_for_failure(&self, dialog: &Dialog, response: &SipResponse) -> String {
        RequestBuilder::new(SipMethod::Ack, dialog.remote_target.clone())
            .header("Via", self.via(&dialog.invite_branch))
            .header("From", dialog.local_header())
            .header(
                "To",
                response
                    .header("To")
                    .unwrap_or_else(|| dialog.remote_header()),
            )
            .header("Call-ID", dialog.call_id.clone())
            .header("CSeq", format!("{} ACK", dialog.invite_cseq))
            .build()
    }

    /// ACK for a 2xx: a new transaction inside the dialog
    fn ack_for_success(&self, dialog: &Dialog) -> String {
        RequestBuilder::new(SipMethod::Ack, dialog.remote_target.clone())
            .header("Via", self.via(&new_branch()))
            .header("From", dialog.local_header())
            .header("To", dialog.remote_header())
            .header("Call-ID", dialog.call_id.clone())
            .header("CSeq", format!("{} ACK", dialog.invite_cseq))
            .build()
    }

    fn in_dialog(&self, dialog: &mut Dialog, method: SipMethod) -> RequestBuilder {
        let cseq = dialog.next_cseq();
        RequestBuilder::new(method, dialog.remote_target.clone())
            .header("Via", self.via(&new_branch()))
            .header("From", dialog.local_header())
            .header("To", dialog.remote_header())
            .header("Call-ID", dialog.call_id.clone())
            .header("CSeq", format!("{} {}", cseq, method))
            .header("Contact", self.contact())
    }

    async fn invite(&self, session: SessionId, number: &str) -> Result<()> {
        let target = self.account.uri_for(number);
        let dialog = Dialog::outgoing(
            session,
            new_call_id(&self.local.ip().to_string()),
            self.account.name_addr(),
            new_tag(),
            format!("<{}>", target),
            target,
            new_branch(),
            self.offer().to_string(),
            self.server,
        );
        let request = self.invite_request(&dialog, None);
        self.dialogs.lock().await.insert(dialog);

        info!("Sending INVITE to {} for session {}", number, session);
        if let Err(e) = self.send(request, self.server).await {
            self.dialogs.lock().await.remove(session);
            return Err(e);
        }
        Ok(())
    }

    async fn on_invite_response(self: &Arc<Self>, response: &SipResponse, cseq: u32) {
        let Some(call_id) = response.call_id() else {
            return;
        };

        let mut dialogs = self.dialogs.lock().await;
        let Some(dialog) = dialogs.by_call_id(&call_id) else {
            debug!("INVITE response for unknown call {}", call_id);
            return;
        };
        if dialog.role != DialogRole::Uac || cseq != dialog.invite_cseq {
            return;
        }

        let session = dialog.session;
        let code = response.status_code();
        match code {
            100 => {}
            101..=199 => {
                dialog.update_from_response(response);
                if dialog.state == DialogState::Early {
                    self.emit(TransportEvent::Progress {
                        session,
                        status_code: code,
                    });
                }
            }
            200..=299 => {
                let first = !dialog.is_established();
                let canceled = dialog.state == DialogState::Canceling;
                dialog.update_from_response(response);
                dialog.state = DialogState::Confirmed;
                let ack = self.ack_for_success(dialog);
                let peer = dialog.peer;
                drop(dialogs);

                if let Err(e) = self.send(ack, peer).await {
                    warn!("Failed to acknowledge answer on {}: {}", session, e);
                }
                if canceled {
                    // Answered while our CANCEL was in flight
                    if let Err(e) = self.bye(session).await {
                        warn!("Failed to hang up canceled call {}: {}", session, e);
                    }
                } else if first {
                    info!("Session {} answered", session);
                    self.emit(TransportEvent::Accepted { session });
                }
            }
            401 | 407 if !dialog.auth_attempted && dialog.state == DialogState::Early => {
                dialog.auth_attempted = true;
                let ack = self.ack_for_failure(dialog, response);
                let peer = dialog.peer;

                let retry = DigestChallenge::from_response(response).map(|challenge| {
                    dialog.remote_tag = None;
                    dialog.invite_cseq += 1;
                    dialog.local_cseq = dialog.invite_cseq;
                    dialog.invite_branch = new_branch();

                    let authorization = self.account.credentials().authorization(
                        &challenge,
                        SipMethod::Invite.as_str(),
                        &dialog.remote_target,
                    );
                    self.invite_request(
                        dialog,
                        Some((challenge.authorization_header_name(), authorization)),
                    )
                });
                if retry.is_err() {
                    dialogs.remove(session);
                }
                drop(dialogs);

                if let Err(e) = self.send(ack, peer).await {
                    warn!("Failed to acknowledge challenge on {}: {}", session, e);
                }
                match retry {
                    Ok(request) => {
                        debug!("Retrying INVITE for {} with credentials", session);
                        if let Err(e) = self.send(request, peer).await {
                            self.dialogs.lock().await.remove(session);
                            self.emit(TransportEvent::Rejected {
                                session,
                                status_code: code,
                                reason: e.to_string(),
                            });
                        }
                    }
                    Err(e) => {
                        self.emit(TransportEvent::Rejected {
                            session,
                            status_code: code,
                            reason: e.to_string(),
                        });
                    }
                }
            }
            _ => {
                let ack = self.ack_for_failure(dialog, response);
                let peer = dialog.peer;
                dialogs.remove(session);
                drop(dialogs);

                if let Err(e) = self.send(ack, peer).await {
                    warn!("Failed to acknowledge {} on {}: {}", code, session, e);
                }
                info!("Session {} refused: {} {}", session, code, response.reason());
                self.emit(TransportEvent::Rejected {
                    session,
                    status_code: code,
                    reason: response.reason().to_string(),
                });
            }
        }
    }

    async fn cancel(self: &Arc<Self>, session: SessionId) -> Result<()> {
        let mut dialogs = self.dialogs.lock().await;
        let dialog = dialogs
            .get_mut(session)
            .filter(|d| d.role == DialogRole::Uac && d.state == DialogState::Early)
            .ok_or_else(|| SipError::NoDialog(session.to_string()))?;

        dialog.state = DialogState::Canceling;
        let request = RequestBuilder::new(SipMethod::Cancel, dialog.remote_target.clone())
            .header("Via", self.via(&dialog.invite_branch))
            .header("From", dialog.local_header())
            .header("To", dialog.remote.clone())
            .header("Call-ID", dialog.call_id.clone())
            .header("CSeq", format!("{} CANCEL", dialog.invite_cseq))
            .build();
        let peer = dialog.peer;
        drop(dialogs);

        // Forget the dialog if the 487 never comes
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(TRANSACTION_TIMEOUT).await;
            if let Some(inner) = weak.upgrade() {
                let mut dialogs = inner.dialogs.lock().await;
                if dialogs
                    .get_mut(session)
                    .is_some_and(|d| d.state == DialogState::Canceling)
                {
                    dialogs.remove(session);
                }
            }
        });

        info!("Canceling session {}", session);
        self.send(request, peer).await
    }

    // ---------------------------------------------------------------------
    // Incoming calls
    // ---------------------------------------------------------------------

    async fn on_invite(&self, request: SipRequest, source: SocketAddr) {
        let Some(call_id) = request.call_id() else {
            self.respond(&request, ResponseBuilder::new(400), source).await;
            return;
        };

        let mut dialogs = self.dialogs.lock().await;
        if let Some(dialog) = dialogs.by_call_id(&call_id) {
            let tag = dialog.local_tag.clone();
            if dialog.is_established() && request.to_tag().is_some() {
                // Session refresh: keep the call as it is
                let sdp = SdpSession::parse(&String::from_utf8_lossy(request.body()))
                    .and_then(|offer| {
                        SdpSession::answer(&offer, self.local.ip(), self.account.rtp_port)
                    })
                    .unwrap_or_else(|| self.offer());
                drop(dialogs);
                let response = ResponseBuilder::ok()
                    .header("Contact", self.contact())
                    .body("application/sdp", sdp.to_string());
                self.respond(&request, response, source).await;
            } else {
                drop(dialogs);
                self.respond(&request, ResponseBuilder::new(180).to_tag(tag), source)
                    .await;
            }
            return;
        }

        let session = SessionId::new();
        let dialog = match Dialog::incoming(session, &request, new_tag(), source) {
            Ok(dialog) => dialog,
            Err(e) => {
                drop(dialogs);
                warn!("Malformed INVITE from {}: {}", source, e);
                self.respond(&request, ResponseBuilder::new(400), source).await;
                return;
            }
        };
        let tag = dialog.local_tag.clone();
        dialogs.insert(dialog);
        drop(dialogs);

        let number = request
            .header("From")
            .and_then(|from| SipUri::parse(&from).ok())
            .map(|uri| uri.user().to_string())
            .unwrap_or_else(|| "anonymous".to_string());
        info!("Incoming INVITE from {} as session {}", number, session);

        self.respond(&request, ResponseBuilder::new(100), source).await;
        self.respond(&request, ResponseBuilder::new(180).to_tag(tag), source)
            .await;
        self.emit(TransportEvent::Invite { session, number });
    }

    async fn accept(&self, session: SessionId, constraints: &MediaConstraints) -> Result<()> {
        let mut dialogs = self.dialogs.lock().await;
        let dialog = dialogs
            .get_mut(session)
            .filter(|d| d.role == DialogRole::Uas && d.state == DialogState::Early)
            .ok_or_else(|| SipError::NoDialog(session.to_string()))?;
        let invite = dialog
            .invite
            .clone()
            .ok_or_else(|| SipError::NoDialog(session.to_string()))?;
        let tag = dialog.local_tag.clone();
        let peer = dialog.peer;

        let body = String::from_utf8_lossy(invite.body()).to_string();
        let sdp = match SdpSession::parse(&body) {
            Some(offer) => SdpSession::answer(&offer, self.local.ip(), self.account.rtp_port),
            // Offerless INVITE: the offer goes in our 200
            None => Some(self.offer()),
        };

        let Some(sdp) = sdp else {
            dialogs.remove(session);
            drop(dialogs);
            warn!("No common audio codec with the caller on {}", session);
            self.respond(&invite, ResponseBuilder::new(488).to_tag(tag), peer)
                .await;
            self.emit(TransportEvent::Bye { session });
            return Err(DomainError::Transport("No common audio codec".to_string()));
        };

        dialog.state = DialogState::Confirmed;
        drop(dialogs);

        debug!(
            "Answering {} with capture device {:?}",
            session, constraints.audio_device_id
        );
        let response = ResponseBuilder::ok()
            .to_tag(tag)
            .header("Contact", self.contact())
            .header("Allow", ALLOW)
            .body("application/sdp", sdp.to_string())
            .build_for_request(&invite);
        self.send(response, peer).await
    }

    async fn reject(&self, session: SessionId, status_code: u16) -> Result<()> {
        let dialog = {
            let mut dialogs = self.dialogs.lock().await;
            let unanswered = dialogs
                .get_mut(session)
                .is_some_and(|d| d.role == DialogRole::Uas && !d.is_established());
            if unanswered {
                dialogs.remove(session)
            } else {
                None
            }
        }
        .ok_or_else(|| SipError::NoDialog(session.to_string()))?;

        let invite = dialog
            .invite
            .as_ref()
            .ok_or_else(|| SipError::NoDialog(session.to_string()))?;
        let response = ResponseBuilder::new(status_code)
            .to_tag(dialog.local_tag.clone())
            .build_for_request(invite);

        info!("Rejecting session {} with {}", session, status_code);
        self.send(response, dialog.peer).await
    }

    async fn on_cancel(&self, request: SipRequest, source: SocketAddr) {
        let call_id = request.call_id().unwrap_or_default();

        let canceled = {
            let mut dialogs = self.dialogs.lock().await;
            let session = dialogs
                .by_call_id(&call_id)
                .filter(|d| d.role == DialogRole::Uas && !d.is_established())
                .map(|d| d.session);
            session.and_then(|session| dialogs.remove(session))
        };

        let Some(dialog) = canceled else {
            self.respond(&request, ResponseBuilder::new(481), source).await;
            return;
        };

        self.respond(&request, ResponseBuilder::ok(), source).await;
        if let Some(invite) = &dialog.invite {
            let terminated = ResponseBuilder::new(487).to_tag(dialog.local_tag.clone());
            self.respond(invite, terminated, dialog.peer).await;
        }

        info!("Caller canceled session {}", dialog.session);
        self.emit(TransportEvent::Canceled {
            session: dialog.session,
        });
    }

    // ---------------------------------------------------------------------
    // Established sessions
    // ---------------------------------------------------------------------

    async fn bye(&self, session: SessionId) -> Result<()> {
        let mut dialogs = self.dialogs.lock().await;
        let dialog = dialogs
            .get_mut(session)
            .filter(|d| d.is_established())
            .ok_or_else(|| SipError::NoDialog(session.to_string()))?;

        let request = self.in_dialog(dialog, SipMethod::Bye).build();
        let peer = dialog.peer;
        dialogs.remove(session);
        drop(dialogs);

        info!("Hanging up session {}", session);
        self.send(request, peer).await
    }

    async fn on_bye(&self, request: SipRequest, source: SocketAddr) {
        let call_id = request.call_id().unwrap_or_default();

        let ended = {
            let mut dialogs = self.dialogs.lock().await;
            let session = dialogs.by_call_id(&call_id).map(|d| d.session);
            session.and_then(|session| dialogs.remove(session))
        };

        match ended {
            Some(dialog) => {
                self.respond(&request, ResponseBuilder::ok(), source).await;
                info!("Remote party hung up session {}", dialog.session);
                self.emit(TransportEvent::Bye {
                    session: dialog.session,
                });
            }
            None => {
                self.respond(&request, ResponseBuilder::new(481), source).await;
            }
        }
    }

    async fn refer(&self, session: SessionId, number: &str) -> Result<()> {
        let mut dialogs = self.dialogs.lock().await;
        let dialog = dialogs
            .get_mut(session)
            .filter(|d| d.is_established())
            .ok_or_else(|| SipError::NoDialog(session.to_string()))?;

        let request = self
            .in_dialog(dialog, SipMethod::Refer)
            .header("Refer-To", format!("<{}>", self.account.uri_for(number)))
            .header("Referred-By", format!("<{}>", self.account.aor()))
            .build();
        let peer = dialog.peer;
        drop(dialogs);

        info!("Transferring session {} to {}", session, number);
        self.send(request, peer).await
    }

    async fn on_refer_response(&self, response: &SipResponse) {
        if response.is_provisional() {
            return;
        }

        let call_id = response.call_id().unwrap_or_default();
        let Some(session) = self
            .dialogs
            .lock()
            .await
            .by_call_id(&call_id)
            .map(|d| d.session)
        else {
            return;
        };

        if response.is_success() {
            self.emit(TransportEvent::ReferAccepted { session });
        } else {
            warn!(
                "Transfer of {} refused: {} {}",
                session,
                response.status_code(),
                response.reason()
            );
            self.emit(TransportEvent::ReferRejected {
                session,
                status_code: response.status_code(),
            });
        }
    }

    async fn send_dtmf(&self, session: SessionId, digit: DtmfDigit) -> Result<()> {
        let mut dialogs = self.dialogs.lock().await;
        let dialog = dialogs
            .get_mut(session)
            .filter(|d| d.is_established())
            .ok_or_else(|| SipError::NoDialog(session.to_string()))?;

        let request = self
            .in_dialog(dialog, SipMethod::Info)
            .body(
                "application/dtmf-relay",
                digit.to_dtmf_relay(DEFAULT_TONE_DURATION),
            )
            .build();
        let peer = dialog.peer;
        drop(dialogs);

        self.send(request, peer).await
    }

    // ---------------------------------------------------------------------
    // Dispatch
    // ---------------------------------------------------------------------

    async fn on_request(self: &Arc<Self>, request: SipRequest, source: SocketAddr) {
        debug!("{} from {}", request.method_name(), source);

        match request.method() {
            Some(SipMethod::Invite) => self.on_invite(request, source).await,
            Some(SipMethod::Ack) => {}
            Some(SipMethod::Cancel) => self.on_cancel(request, source).await,
            Some(SipMethod::Bye) => self.on_bye(request, source).await,
            Some(SipMethod::Options) => {
                let response = ResponseBuilder::ok()
                    .header("Allow", ALLOW)
                    .header("Accept", "application/sdp");
                self.respond(&request, response, source).await;
            }
            // Transfer progress reports
            Some(SipMethod::Notify) => {
                self.respond(&request, ResponseBuilder::ok(), source).await;
            }
            Some(SipMethod::Info) => {
                let body = String::from_utf8_lossy(request.body()).to_string();
                if let Some(digit) = DtmfDigit::from_dtmf_relay(&body) {
                    debug!("Remote DTMF {}", digit);
                }
                self.respond(&request, ResponseBuilder::ok(), source).await;
            }
            _ => {
                self.respond(&request, ResponseBuilder::new(501), source).await;
            }
        }
    }

    async fn on_response(self: &Arc<Self>, response: SipResponse) {
        let Some((cseq, method)) = response.cseq() else {
            warn!("Response without CSeq dropped");
            return;
        };

        match method {
            SipMethod::Register => self.on_register_response(&response, cseq).await,
            SipMethod::Invite => self.on_invite_response(&response, cseq).await,
            SipMethod::Refer => self.on_refer_response(&response).await,
            other if response.is_provisional() || response.is_success() => {
                debug!("{} answered {}", other, response.status_code());
            }
            other => {
                warn!(
                    "{} failed: {} {}",
                    other,
                    response.status_code(),
                    response.reason()
                );
            }
        }
    }
}

#[async_trait]
impl SessionTransport for SipSessionTransport {
    async fn register(&self) -> Result<()> {
        self.inner.start_registration().await
    }

    async fn invite(&self, session: SessionId, number: &str) -> Result<()> {
        self.inner.invite(session, number).await
    }

    async fn accept(&self, session: SessionId, constraints: &MediaConstraints) -> Result<()> {
        self.inner.accept(session, constraints).await
    }

    async fn reject(&self, session: SessionId, status_code: u16) -> Result<()> {
        self.inner.reject(session, status_code).await
    }

    async fn cancel(&self, session: SessionId) -> Result<()> {
        self.inner.cancel(session).await
    }

    async fn bye(&self, session: SessionId) -> Result<()> {
        self.inner.bye(session).await
    }

    async fn refer(&self, session: SessionId, number: &str) -> Result<()> {
        self.inner.refer(session, number).await
    }

    async fn send_dtmf(&self, session: SessionId, digit: DtmfDigit) -> Result<()> {
        self.inner.send_dtmf(session, digit).await
    }

    fn name(&self) -> &'static str {
        "sip"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pbx() -> PbxConfig {
        PbxConfig {
            server: Some("127.0.0.1:5060".to_string()),
            domain: Some("pbx.example.com".to_string()),
            login: Some("alice".to_string()),
            password: Some("secret".to_string()),
            display_name: Some("Alice".to_string()),
            ..PbxConfig::default()
        }
    }

    #[test]
    fn test_account_from_config() {
        let account = SipAccount::from_config(&pbx()).unwrap();
        assert_eq!(account.aor(), "sip:alice@pbx.example.com");
        assert_eq!(account.name_addr(), "\"Alice\" <sip:alice@pbx.example.com>");
        assert_eq!(account.uri_for("100"), "sip:100@pbx.example.com");
    }

    #[test]
    fn test_account_requires_login() {
        let mut config = pbx();
        config.login = Some("  ".to_string());
        assert!(matches!(
            SipAccount::from_config(&config),
            Err(DomainError::Configuration(_))
        ));
    }

    #[test]
    fn test_account_rejects_bad_bind_address() {
        let mut config = pbx();
        config.bind_address = "not an address".to_string();
        assert!(SipAccount::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_resolve_defaults_port() {
        assert_eq!(
            resolve("127.0.0.1").await.unwrap(),
            "127.0.0.1:5060".parse().unwrap()
        );
        assert_eq!(
            resolve("127.0.0.1:5080").await.unwrap(),
            "127.0.0.1:5080".parse().unwrap()
        );
    }
}
