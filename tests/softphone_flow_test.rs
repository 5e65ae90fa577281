//! Call flows driven through the public softphone service

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use yakphone::application::{
    Collaborators, EventBus, PublishedEvent, SoftphoneHandle, SoftphoneService, UserAgent,
};
use yakphone::config::Config;
use yakphone::domain::call::{CallDirection, CallState, Contact, PhonecallRepository};
use yakphone::domain::dtmf::DtmfDigit;
use yakphone::domain::media::{MediaConstraints, MediaError};
use yakphone::domain::phonecall::PhonecallState;
use yakphone::domain::session::{
    transport_channel, SessionTransport, TransportEvent, TransportEventSender,
};
use yakphone::domain::shared::value_objects::{PartnerId, SessionId};
use yakphone::infrastructure::media::{LoggingNotifier, LoggingRingtonePlayer, SimulatedMediaDevices};
use yakphone::infrastructure::persistence::{InMemoryContactRepository, InMemoryPhonecallRepository};
use yakphone::DomainError;

/// What the controller asked the transport to do
#[derive(Debug, Clone, PartialEq, Eq)]
enum Sent {
    Register,
    Invite(SessionId, String),
    Accept(SessionId),
    Reject(SessionId, u16),
    Cancel(SessionId),
    Bye(SessionId),
    Refer(SessionId, String),
    Dtmf(SessionId, char),
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingTransport {
    fn record(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn last_invite(&self) -> Option<SessionId> {
        self.sent().into_iter().rev().find_map(|sent| match sent {
            Sent::Invite(session, _) => Some(session),
            _ => None,
        })
    }
}

#[async_trait]
impl SessionTransport for RecordingTransport {
    async fn register(&self) -> yakphone::Result<()> {
        self.record(Sent::Register);
        Ok(())
    }

    async fn invite(&self, session: SessionId, number: &str) -> yakphone::Result<()> {
        self.record(Sent::Invite(session, number.to_string()));
        Ok(())
    }

    async fn accept(&self, session: SessionId, _constraints: &MediaConstraints) -> yakphone::Result<()> {
        self.record(Sent::Accept(session));
        Ok(())
    }

    async fn reject(&self, session: SessionId, status_code: u16) -> yakphone::Result<()> {
        self.record(Sent::Reject(session, status_code));
        Ok(())
    }

    async fn cancel(&self, session: SessionId) -> yakphone::Result<()> {
        self.record(Sent::Cancel(session));
        Ok(())
    }

    async fn bye(&self, session: SessionId) -> yakphone::Result<()> {
        self.record(Sent::Bye(session));
        Ok(())
    }

    async fn refer(&self, session: SessionId, number: &str) -> yakphone::Result<()> {
        self.record(Sent::Refer(session, number.to_string()));
        Ok(())
    }

    async fn send_dtmf(&self, session: SessionId, digit: DtmfDigit) -> yakphone::Result<()> {
        self.record(Sent::Dtmf(session, digit.to_char()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

struct Harness {
    softphone: SoftphoneHandle,
    transport_events: TransportEventSender,
    bus: broadcast::Receiver<PublishedEvent>,
    transport: Arc<RecordingTransport>,
    media: Arc<SimulatedMediaDevices>,
    phonecalls: Arc<InMemoryPhonecallRepository>,
}

impl Harness {
    fn new(config: Config) -> Self {
        let transport = Arc::new(RecordingTransport::default());
        let media = Arc::new(SimulatedMediaDevices::new());
        let phonecalls = Arc::new(InMemoryPhonecallRepository::new());
        let contacts = InMemoryContactRepository::with_contacts(vec![Contact::new(
            PartnerId::new(42),
            "Deco Addict".to_string(),
            Some("999".to_string()),
            None,
        )]);

        let bus = EventBus::default();
        let subscriber = bus.subscribe();
        let agent = UserAgent::new(
            Collaborators {
                transport: transport.clone(),
                media: media.clone(),
                ringtones: Arc::new(LoggingRingtonePlayer),
                notifier: Arc::new(LoggingNotifier::new()),
                contacts: Arc::new(contacts),
                phonecalls: phonecalls.clone(),
            },
            &config,
            bus,
        );

        let (tx, rx) = transport_channel();
        let (service, softphone) = SoftphoneService::new(agent, rx);
        service.spawn();

        Self {
            softphone,
            transport_events: tx,
            bus: subscriber,
            transport,
            media,
            phonecalls,
        }
    }

    fn inject(&self, event: TransportEvent) {
        self.transport_events.send(event).unwrap();
    }

    async fn next_event(&mut self) -> PublishedEvent {
        tokio::time::timeout(Duration::from_secs(2), self.bus.recv())
            .await
            .expect("no event published")
            .unwrap()
    }

    async fn wait_for_state(&self, state: CallState) {
        for _ in 0..100 {
            if self.softphone.snapshot().await.unwrap().state == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("softphone never reached {:?}", state);
    }
}

#[tokio::test]
async fn test_successful_outbound_call() {
    let mut harness = Harness::new(Config::default());

    harness.softphone.make_call("555-1234", None).await.unwrap();
    let session = harness.transport.last_invite().unwrap();
    assert_eq!(
        harness.transport.sent(),
        vec![Sent::Invite(session, "5551234".to_string())]
    );

    let snapshot = harness.softphone.snapshot().await.unwrap();
    assert_eq!(snapshot.state, CallState::Ringing);
    assert_eq!(snapshot.direction, Some(CallDirection::Outgoing));

    harness.inject(TransportEvent::Accepted { session });
    assert_eq!(harness.next_event().await.name(), "sip_accepted");
    assert_eq!(harness.media.acquisitions(), 1);

    harness.softphone.send_dtmf('5').await.unwrap();
    harness.softphone.hangup().await.unwrap();
    assert_eq!(harness.next_event().await.name(), "sip_bye");
    assert!(harness.transport.sent().contains(&Sent::Dtmf(session, '5')));
    assert!(harness.transport.sent().contains(&Sent::Bye(session)));

    let snapshot = harness.softphone.snapshot().await.unwrap();
    assert_eq!(snapshot.state, CallState::NoCall);
    assert!(!snapshot.muted);

    let records = harness.phonecalls.list_recent(10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, PhonecallState::Done);
    assert_eq!(records[0].number, "5551234");
}

#[tokio::test]
async fn test_outbound_call_rejected_busy() {
    let mut harness = Harness::new(Config::default());

    harness.softphone.make_call("5551234", None).await.unwrap();
    let session = harness.transport.last_invite().unwrap();

    harness.inject(TransportEvent::Rejected {
        session,
        status_code: 486,
        reason: "Busy Here".to_string(),
    });

    let error = harness.next_event().await;
    assert_eq!(error.name(), "sip_error");
    let frame = error.to_frame();
    assert_eq!(frame["payload"]["isNonBlocking"], true);
    assert_eq!(frame["payload"]["message"], "The person you try to contact is currently unavailable.");

    assert_eq!(harness.next_event().await.name(), "sip_cancel_outgoing");
    harness.wait_for_state(CallState::NoCall).await;
    assert_eq!(harness.media.acquisitions(), 0);
}

#[tokio::test]
async fn test_declined_incoming_call() {
    let mut harness = Harness::new(Config::default());
    let session = SessionId::new();

    harness.inject(TransportEvent::Invite {
        session,
        number: "999".to_string(),
    });

    let incoming = harness.next_event().await;
    assert_eq!(incoming.name(), "incomingCall");
    let frame = incoming.to_frame();
    assert_eq!(frame["payload"]["number"], "999");
    assert_eq!(frame["payload"]["partnerId"], 42);

    harness.softphone.reject_incoming_call().await.unwrap();
    assert_eq!(harness.next_event().await.name(), "sip_rejected");
    assert_eq!(harness.transport.sent(), vec![Sent::Reject(session, 603)]);

    let records = harness.phonecalls.list_recent(10).await.unwrap();
    assert_eq!(records[0].state, PhonecallState::Rejected);
    assert_eq!(records[0].partner_id, Some(PartnerId::new(42)));
}

#[tokio::test]
async fn test_answered_incoming_call_and_remote_hangup() {
    let mut harness = Harness::new(Config::default());
    let session = SessionId::new();

    harness.inject(TransportEvent::Invite {
        session,
        number: "+32 2 555 12 34".to_string(),
    });
    assert_eq!(harness.next_event().await.name(), "incomingCall");

    harness.softphone.accept_incoming_call().await.unwrap();
    assert_eq!(harness.next_event().await.name(), "sip_incoming_call");
    assert!(harness.transport.sent().contains(&Sent::Accept(session)));

    harness.softphone.mute_call().await.unwrap();
    harness.softphone.mute_call().await.unwrap();
    assert!(harness.softphone.snapshot().await.unwrap().muted);

    harness.inject(TransportEvent::Bye { session });
    assert_eq!(harness.next_event().await.name(), "sip_bye");
    harness.wait_for_state(CallState::NoCall).await;
}

#[tokio::test]
async fn test_only_one_call_at_a_time() {
    let harness = Harness::new(Config::default());

    harness.softphone.make_call("100", None).await.unwrap();
    let error = tokio_test::assert_err!(harness.softphone.make_call("200", None).await);
    assert!(matches!(error, DomainError::InvalidOperation(_)));

    harness.softphone.cancel_call().await.unwrap();
    harness.wait_for_state(CallState::NoCall).await;
    harness.softphone.make_call("200", None).await.unwrap();
}

#[tokio::test]
async fn test_microphone_denied_on_answer() {
    let mut harness = Harness::new(Config::default());
    harness.media.set_failure(Some(MediaError::NotAllowed)).await;
    let session = SessionId::new();

    harness.inject(TransportEvent::Invite {
        session,
        number: "999".to_string(),
    });
    assert_eq!(harness.next_event().await.name(), "incomingCall");

    let result = harness.softphone.accept_incoming_call().await;
    assert!(matches!(result, Err(DomainError::Media(_))));

    let error = harness.next_event().await;
    assert_eq!(error.name(), "sip_error");
    assert_eq!(
        error.to_frame()["payload"]["message"],
        MediaError::NotAllowed.user_message()
    );
    assert_eq!(
        harness.softphone.snapshot().await.unwrap().state,
        CallState::NoCall
    );
}

#[tokio::test]
async fn test_prod_mode_without_settings() {
    let config = Config::from_toml("mode = \"prod\"").unwrap();
    let mut harness = Harness::new(config);

    let result = harness.softphone.start().await;
    assert!(matches!(result, Err(DomainError::Configuration(_))));

    let error = harness.next_event().await;
    assert_eq!(error.name(), "sip_error");
    assert_eq!(
        error.to_frame()["payload"]["message"],
        "PBX or Websocket address is missing. Please check your settings."
    );
    assert!(harness.transport.sent().is_empty());
}
