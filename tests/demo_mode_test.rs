//! Demo mode: the simulated transport answers every call after a delay

use std::sync::{Arc, Mutex};
use std::time::Duration;
use yakphone::application::{Collaborators, EventBus, SoftphoneService, UserAgent};
use yakphone::config::Config;
use yakphone::domain::call::CallState;
use yakphone::domain::notification::{Ringtone, RingtonePlayer};
use yakphone::domain::session::transport_channel;
use yakphone::infrastructure::media::{LoggingNotifier, SimulatedMediaDevices};
use yakphone::infrastructure::persistence::{InMemoryContactRepository, InMemoryPhonecallRepository};
use yakphone::infrastructure::protocols::DemoTransport;

#[derive(Default)]
struct RecordingRingtones {
    played: Mutex<Vec<String>>,
}

impl RingtonePlayer for RecordingRingtones {
    fn play(&self, ringtone: Ringtone) {
        self.played
            .lock()
            .unwrap()
            .push(format!("{}-start", ringtone));
    }

    fn stop(&self) {}
}

#[tokio::test(start_paused = true)]
async fn test_demo_call_is_answered_after_delay() {
    let config = Config::default();
    let ringtones = Arc::new(RecordingRingtones::default());
    let bus = EventBus::default();
    let mut events = bus.subscribe();

    let (tx, rx) = transport_channel();
    let agent = UserAgent::new(
        Collaborators {
            transport: Arc::new(DemoTransport::new(tx, config.demo.accept_delay())),
            media: Arc::new(SimulatedMediaDevices::new()),
            ringtones: ringtones.clone(),
            notifier: Arc::new(LoggingNotifier::new()),
            contacts: Arc::new(InMemoryContactRepository::new()),
            phonecalls: Arc::new(InMemoryPhonecallRepository::new()),
        },
        &config,
        bus,
    );
    let (service, softphone) = SoftphoneService::new(agent, rx);
    service.spawn();

    tokio_test::assert_ok!(softphone.start().await);
    softphone.make_call("5551234", None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2900)).await;
    assert_eq!(softphone.snapshot().await.unwrap().state, CallState::Ringing);

    let accepted = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(accepted.name(), "sip_accepted");
    assert_eq!(softphone.snapshot().await.unwrap().state, CallState::Ongoing);

    softphone.hangup().await.unwrap();
    let bye = events.recv().await.unwrap();
    assert_eq!(bye.name(), "sip_bye");

    assert_eq!(*ringtones.played.lock().unwrap(), vec!["ringback-start"]);
    assert_eq!(softphone.snapshot().await.unwrap().state, CallState::NoCall);
}

#[tokio::test(start_paused = true)]
async fn test_demo_start_registers_without_errors() {
    let config = Config::default();
    let bus = EventBus::default();
    let mut events = bus.subscribe();

    let (tx, rx) = transport_channel();
    let agent = UserAgent::new(
        Collaborators {
            transport: Arc::new(DemoTransport::new(tx, config.demo.accept_delay())),
            media: Arc::new(SimulatedMediaDevices::new()),
            ringtones: Arc::new(RecordingRingtones::default()),
            notifier: Arc::new(LoggingNotifier::new()),
            contacts: Arc::new(InMemoryContactRepository::new()),
            phonecalls: Arc::new(InMemoryPhonecallRepository::new()),
        },
        &config,
        bus,
    );
    let (service, softphone) = SoftphoneService::new(agent, rx);
    service.spawn();

    tokio_test::assert_ok!(softphone.start().await);
    assert_eq!(softphone.snapshot().await.unwrap().state, CallState::NoCall);
    assert!(events.try_recv().is_err());
}
