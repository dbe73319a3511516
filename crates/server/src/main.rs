use rustls::crypto;
use rustls::crypto::CryptoProvider;
use sea_orm::Database;
use stay_connected::AppResources;
use stay_connected::api::start_webserver;
use stay_connected::config::load_config_or_panic;
use stay_connected::domain_events::DomainEventBus;
use stay_connected::monitor::checks::scheduled_check_loop;
use stay_connected::notify::SenderRegistry;
use stay_connected::notify::http::HttpClient;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "stay_connected=info,hyper=warn,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install().expect("Failed to install `color_eyre::install`");
    initialize_tracing();

    // A missing .env file is normal outside development
    let _ = dotenvy::dotenv();

    let ring_provider = crypto::ring::default_provider();
    CryptoProvider::install_default(ring_provider).expect("Failed to install crypto provider");

    let config = Arc::new(load_config_or_panic());

    // The database is the only hard dependency; every notification channel degrades softly.
    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .expect("Failed to connect to database"),
    );

    let http = HttpClient::new()?;
    let senders = Arc::new(SenderRegistry::from_config(&config, &http)?);

    let resources = AppResources {
        db,
        senders,
        http,
        config,
        bus: DomainEventBus::new(),
    };

    tracing::info!(
        name = "main.configuration",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        scheduler_enabled = resources.config.scheduler.enabled,
        interval_secs = resources.config.scheduler.interval_secs,
        reminders_enabled = resources.config.reminders.enabled,
        message = "Service configured"
    );

    if resources.config.scheduler.enabled {
        tokio::spawn(scheduled_check_loop(resources.clone()));
    }

    start_webserver(resources).await?;
    Ok(())
}
