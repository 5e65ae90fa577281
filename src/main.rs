use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use yakphone::application::{Collaborators, EventBus, SoftphoneService, UserAgent};
use yakphone::config::{Config, Mode, DEFAULT_CONFIG_FILE};
use yakphone::domain::call::Contact;
use yakphone::domain::session::{transport_channel, SessionTransport};
use yakphone::domain::shared::value_objects::PartnerId;
use yakphone::infrastructure::media::{LoggingNotifier, LoggingRingtonePlayer, SimulatedMediaDevices};
use yakphone::infrastructure::persistence::{InMemoryContactRepository, InMemoryPhonecallRepository};
use yakphone::infrastructure::protocols::sip::SipAccount;
use yakphone::infrastructure::protocols::{DemoTransport, SipSessionTransport};
use yakphone::interface::api::{build_router, init_metrics, ApiState};

#[derive(Parser, Debug)]
#[command(author, version, about = "SIP softphone with a WebSocket dialing panel bridge", long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "SOFTPHONE_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

/// Address book used in demo mode
fn demo_contacts() -> Vec<Contact> {
    vec![
        Contact::new(
            PartnerId::new(1),
            "Azure Interior".to_string(),
            Some("+1 555-0101".to_string()),
            None,
        ),
        Contact::new(
            PartnerId::new(2),
            "Deco Addict".to_string(),
            Some("+1 555-0102".to_string()),
            Some("+1 555-0199".to_string()),
        ),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting yakphone in {:?} mode", config.mode);

    let prometheus_handle = init_metrics().context("Failed to install metrics recorder")?;

    let (events_tx, events_rx) = transport_channel();
    let (transport, contacts): (Arc<dyn SessionTransport>, InMemoryContactRepository) =
        match config.mode {
            Mode::Demo => (
                Arc::new(DemoTransport::new(events_tx, config.demo.accept_delay())),
                InMemoryContactRepository::with_contacts(demo_contacts()),
            ),
            Mode::Prod => {
                let transport: Arc<dyn SessionTransport> =
                    match SipAccount::from_config(&config.pbx) {
                        Ok(account) => Arc::new(
                            SipSessionTransport::connect(account, events_tx)
                                .await
                                .context("Failed to open the SIP transport")?,
                        ),
                        // start() reports the missing settings to the dialing panel
                        Err(e) => {
                            warn!("PBX settings unusable: {}", e);
                            Arc::new(DemoTransport::new(events_tx, config.demo.accept_delay()))
                        }
                    };
                (transport, InMemoryContactRepository::new())
            }
        };

    let bus = EventBus::default();
    let collaborators = Collaborators {
        transport,
        media: Arc::new(SimulatedMediaDevices::new()),
        ringtones: Arc::new(LoggingRingtonePlayer),
        notifier: Arc::new(LoggingNotifier::new()),
        contacts: Arc::new(contacts),
        phonecalls: Arc::new(InMemoryPhonecallRepository::new()),
    };

    let agent = UserAgent::new(collaborators, &config, bus.clone());
    let (service, softphone) = SoftphoneService::new(agent, events_rx);
    let service_handle = service.spawn();

    if let Err(e) = softphone.start().await {
        warn!("Softphone started with an error: {}", e);
    }

    let app = build_router(
        ApiState {
            softphone: softphone.clone(),
            bus,
        },
        prometheus_handle,
    );
    let address = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Dialing panel bridge listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await?;

    // Dropping the last handle stops the service
    drop(softphone);
    if let Err(e) = service_handle.await {
        warn!("Softphone service ended abnormally: {}", e);
    }

    Ok(())
}
