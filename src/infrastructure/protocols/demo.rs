//! Simulated session transport
//!
//! Every outgoing invite is answered after a fixed delay and every other
//! primitive succeeds without leaving the process, so the controller goes
//! through exactly the transitions it would against a real PBX.

use crate::domain::dtmf::DtmfDigit;
use crate::domain::media::MediaConstraints;
use crate::domain::session::{SessionTransport, TransportEvent, TransportEventSender};
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::SessionId;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

pub struct DemoTransport {
    events: TransportEventSender,
    accept_delay: Duration,
}

impl DemoTransport {
    pub fn new(events: TransportEventSender, accept_delay: Duration) -> Self {
        Self {
            events,
            accept_delay,
        }
    }
}

#[async_trait]
impl SessionTransport for DemoTransport {
    async fn register(&self) -> Result<()> {
        info!("Demo mode, skipping registration");
        let _ = self.events.send(TransportEvent::Registered);
        Ok(())
    }

    async fn invite(&self, session: SessionId, number: &str) -> Result<()> {
        info!(
            "Demo call to {} will be answered in {:?}",
            number, self.accept_delay
        );

        let events = self.events.clone();
        let delay = self.accept_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(TransportEvent::Accepted { session });
        });

        Ok(())
    }

    async fn accept(&self, session: SessionId, _constraints: &MediaConstraints) -> Result<()> {
        debug!("Demo accept {}", session);
        Ok(())
    }

    async fn reject(&self, session: SessionId, status_code: u16) -> Result<()> {
        debug!("Demo reject {} with {}", session, status_code);
        Ok(())
    }

    async fn cancel(&self, session: SessionId) -> Result<()> {
        debug!("Demo cancel {}", session);
        Ok(())
    }

    async fn bye(&self, session: SessionId) -> Result<()> {
        debug!("Demo bye {}", session);
        Ok(())
    }

    async fn refer(&self, session: SessionId, number: &str) -> Result<()> {
        debug!("Demo transfer of {} to {}", session, number);
        let _ = self.events.send(TransportEvent::ReferAccepted { session });
        Ok(())
    }

    async fn send_dtmf(&self, session: SessionId, digit: DtmfDigit) -> Result<()> {
        debug!("Demo DTMF {} on {}", digit, session);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "demo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::transport_channel;

    #[tokio::test(start_paused = true)]
    async fn test_invite_is_accepted_after_delay() {
        let (tx, mut rx) = transport_channel();
        let transport = DemoTransport::new(tx, Duration::from_secs(3));
        let session = SessionId::new();

        transport.invite(session, "5551234").await.unwrap();

        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(rx.recv().await, Some(TransportEvent::Accepted { session }));
    }

    #[tokio::test]
    async fn test_register_reports_success() {
        let (tx, mut rx) = transport_channel();
        let transport = DemoTransport::new(tx, Duration::from_secs(3));

        transport.register().await.unwrap();
        assert_eq!(rx.recv().await, Some(TransportEvent::Registered));
    }
}
