use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use auth::TokenCodec;
use credential_service::config::Config;
use credential_service::config::MailTransport;
use credential_service::config::StoreBackend;
use credential_service::domain::credential::ports::CredentialServicePort;
use credential_service::domain::credential::ports::CredentialStore;
use credential_service::domain::credential::service::CredentialService;
use credential_service::domain::credential::service::ServiceTimeouts;
use credential_service::inbound::http::router::create_router;
use credential_service::outbound::notifications::HttpResetNotifier;
use credential_service::outbound::notifications::LogResetNotifier;
use credential_service::outbound::repositories::InMemoryCredentialStore;
use credential_service::outbound::repositories::PostgresCredentialStore;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "credential_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        service = "credential-service",
        version = env!("CARGO_PKG_VERSION"),
        "Service starting"
    );

    let config = Config::load()?;

    tracing::info!(
        http_port = config.server.http_port,
        store = ?config.store.backend,
        mail = ?config.mail.transport,
        algorithm = %config.tokens.algorithm,
        access_ttl_minutes = config.tokens.access_ttl_minutes,
        reset_ttl_minutes = config.tokens.reset_ttl_minutes,
        "Configuration loaded"
    );

    let codec = Arc::new(TokenCodec::new(config.token_settings())?);
    let timeouts = ServiceTimeouts {
        store: config.timeouts.store(),
        mail: config.timeouts.mail(),
    };

    let service = match config.store.backend {
        StoreBackend::Postgres => {
            let pg_pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .acquire_timeout(config.timeouts.store())
                .connect(&config.database.url)
                .await?;
            tracing::info!(
                max_connections = config.database.max_connections,
                database = "postgresql",
                "Database connection pool created"
            );

            sqlx::migrate!("./migrations").run(&pg_pool).await?;
            tracing::info!(database = "postgresql", "Database migrations completed");

            let store = Arc::new(PostgresCredentialStore::new(pg_pool));
            assemble_service(store, &config, codec, timeouts)?
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory credential store; data is lost on restart");
            let store = Arc::new(InMemoryCredentialStore::new());
            assemble_service(store, &config, codec, timeouts)?
        }
    };

    spawn_reset_token_purge(
        Arc::clone(&service),
        Duration::from_secs(config.store.purge_interval_secs.max(1)),
    );

    let http_address = format!("0.0.0.0:{}", config.server.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_address).await?;
    tracing::info!(
        address = %http_address,
        port = config.server.http_port,
        protocol = "http",
        "Http server listening"
    );

    let http_application = create_router(service);
    axum::serve(http_listener, http_application).await?;

    tracing::info!("Server exited");

    Ok(())
}

/// Wire the configured mail transport in front of `store`.
fn assemble_service<CS: CredentialStore>(
    store: Arc<CS>,
    config: &Config,
    codec: Arc<TokenCodec>,
    timeouts: ServiceTimeouts,
) -> Result<Arc<dyn CredentialServicePort>, anyhow::Error> {
    let service: Arc<dyn CredentialServicePort> = match config.mail.transport {
        MailTransport::Log => {
            let notifier = Arc::new(LogResetNotifier::new());
            Arc::new(CredentialService::new(store, notifier, codec, timeouts)?)
        }
        MailTransport::Http => {
            let endpoint = config
                .mail
                .endpoint
                .clone()
                .ok_or_else(|| anyhow!("mail.endpoint is required for the http transport"))?;

            tracing::info!(endpoint = %endpoint, "Mail relay configured");

            let notifier = Arc::new(HttpResetNotifier::new(
                endpoint,
                config.mail.api_key.clone(),
                config.mail.from_address.clone(),
                config.mail.reset_url_base.clone(),
                config.timeouts.mail(),
            )?);
            Arc::new(CredentialService::new(store, notifier, codec, timeouts)?)
        }
    };

    Ok(service)
}

fn spawn_reset_token_purge(service: Arc<dyn CredentialServicePort>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match service.purge_reset_tokens().await {
                Ok(removed) => tracing::debug!(removed, "Reset token purge finished"),
                Err(e) => tracing::warn!(error = %e, "Reset token purge failed"),
            }
        }
    });
}
