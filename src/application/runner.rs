//! Softphone service loop
//!
//! Serializes UI commands and transport events onto the [`UserAgent`]. Each
//! command is applied in arrival order and answered on its own oneshot
//! channel once the controller is done with it.

use crate::application::user_agent::{CallSnapshot, UserAgent};
use crate::domain::session::TransportEventReceiver;
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::PartnerId;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const COMMAND_QUEUE: usize = 64;

type Reply<T> = oneshot::Sender<Result<T>>;

/// Request from the presentation layer
#[derive(Debug)]
pub enum Command {
    Start(Reply<()>),
    MakeCall {
        number: String,
        partner_id: Option<PartnerId>,
        reply: Reply<()>,
    },
    AcceptIncomingCall(Reply<()>),
    RejectIncomingCall(Reply<()>),
    CancelCall(Reply<()>),
    Hangup(Reply<()>),
    Mute(Reply<()>),
    Unmute(Reply<()>),
    SendDtmf {
        digit: char,
        reply: Reply<()>,
    },
    Transfer {
        number: String,
        reply: Reply<()>,
    },
    SwitchInputStream {
        device_id: String,
        reply: Reply<()>,
    },
    Snapshot(oneshot::Sender<CallSnapshot>),
}

/// Cloneable front door to a running [`SoftphoneService`]
#[derive(Debug, Clone)]
pub struct SoftphoneHandle {
    tx: mpsc::Sender<Command>,
}

impl SoftphoneHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }

    pub async fn start(&self) -> Result<()> {
        self.request(Command::Start).await
    }

    pub async fn make_call(&self, number: impl Into<String>, partner_id: Option<PartnerId>) -> Result<()> {
        let number = number.into();
        self.request(|reply| Command::MakeCall {
            number,
            partner_id,
            reply,
        })
        .await
    }

    pub async fn accept_incoming_call(&self) -> Result<()> {
        self.request(Command::AcceptIncomingCall).await
    }

    pub async fn reject_incoming_call(&self) -> Result<()> {
        self.request(Command::RejectIncomingCall).await
    }

    pub async fn cancel_call(&self) -> Result<()> {
        self.request(Command::CancelCall).await
    }

    pub async fn hangup(&self) -> Result<()> {
        self.request(Command::Hangup).await
    }

    pub async fn mute_call(&self) -> Result<()> {
        self.request(Command::Mute).await
    }

    pub async fn unmute_call(&self) -> Result<()> {
        self.request(Command::Unmute).await
    }

    pub async fn send_dtmf(&self, digit: char) -> Result<()> {
        self.request(|reply| Command::SendDtmf { digit, reply }).await
    }

    pub async fn transfer(&self, number: impl Into<String>) -> Result<()> {
        let number = number.into();
        self.request(|reply| Command::Transfer { number, reply }).await
    }

    pub async fn switch_input_stream(&self, device_id: impl Into<String>) -> Result<()> {
        let device_id = device_id.into();
        self.request(|reply| Command::SwitchInputStream { device_id, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<CallSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot(reply))
            .await
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())
    }
}

fn stopped() -> DomainError {
    DomainError::Internal("Softphone service is not running".to_string())
}

pub struct SoftphoneService {
    agent: UserAgent,
    commands: mpsc::Receiver<Command>,
    events: TransportEventReceiver,
}

impl SoftphoneService {
    pub fn new(agent: UserAgent, events: TransportEventReceiver) -> (Self, SoftphoneHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_QUEUE);
        let service = Self {
            agent,
            commands,
            events,
        };
        (service, SoftphoneHandle { tx })
    }

    /// Run on a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process commands and transport events until every handle is dropped
    pub async fn run(mut self) {
        info!("Softphone service running");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.dispatch(command).await,
                    None => break,
                },
                Some(event) = self.events.recv() => {
                    self.agent.handle_transport_event(event).await;
                }
            }
        }

        info!("Softphone service stopped");
    }

    async fn dispatch(&mut self, command: Command) {
        debug!("Command: {:?}", command);

        let agent = &mut self.agent;
        match command {
            Command::Start(reply) => {
                let _ = reply.send(agent.start().await);
            }
            Command::MakeCall {
                number,
                partner_id,
                reply,
            } => {
                let _ = reply.send(agent.make_call(&number, partner_id).await);
            }
            Command::AcceptIncomingCall(reply) => {
                let _ = reply.send(agent.accept_incoming_call().await);
            }
            Command::RejectIncomingCall(reply) => {
                let _ = reply.send(agent.reject_incoming_call().await);
            }
            Command::CancelCall(reply) => {
                let _ = reply.send(agent.cancel_call().await);
            }
            Command::Hangup(reply) => {
                let _ = reply.send(agent.hangup().await);
            }
            Command::Mute(reply) => {
                let _ = reply.send(agent.mute_call());
            }
            Command::Unmute(reply) => {
                let _ = reply.send(agent.unmute_call());
            }
            Command::SendDtmf { digit, reply } => {
                let _ = reply.send(agent.send_dtmf(digit).await);
            }
            Command::Transfer { number, reply } => {
                let _ = reply.send(agent.transfer(&number).await);
            }
            Command::SwitchInputStream { device_id, reply } => {
                let _ = reply.send(agent.switch_input_stream(&device_id).await);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(agent.snapshot());
            }
        }
    }
}
