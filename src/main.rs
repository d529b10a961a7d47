//! Chargify Billing API server
//!
//! Loads configuration, connects PostgreSQL, wires the Chargify client into
//! the application services and serves the billing routes.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tokio::time::{interval, Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chargify_billing::adapters::http::{billing_router, BillingAppState};
use chargify_billing::adapters::{
    ChargifyClient, ChargifyClientConfig, LoggingEventTracker, PostgresNonceStore,
    PostgresSubscriptionRepository, PostgresTrialCouponRepository, PostgresWebhookEventRepository,
};
use chargify_billing::application::{
    DirectFlowService, HandleChargifyWebhookHandler, ProductCatalogService, StartTrialHandler,
    SubscriptionService, UpdatePaymentMethodHandler,
};
use chargify_billing::config::AppConfig;
use chargify_billing::domain::direct::DirectSigner;
use chargify_billing::domain::webhook::ChargifyWebhookVerifier;
use chargify_billing::ports::{BillingProvider, EventTracker, WebhookEventRepository};

/// How often expired nonces and old webhook events are purged.
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Webhook ids are kept this long for de-duplication.
const WEBHOOK_RETENTION_DAYS: i64 = 30;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);
    tracing::info!(
        environment = ?config.server.environment,
        "Starting chargify-billing v{}",
        env!("CARGO_PKG_VERSION")
    );

    tracing::info!("Connecting to database...");
    let pool = config.database.connect().await?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let state = build_state(&config, pool.clone())?;

    spawn_purge_task(pool, config.chargify.nonce_ttl());

    let app = billing_router(
        state,
        config.server.request_timeout(),
        &config.server.cors_origins_list(),
    );

    let addr = config.server.socket_addr()?;
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

fn build_state(config: &AppConfig, pool: PgPool) -> Result<BillingAppState, url::ParseError> {
    let chargify = &config.chargify;

    let client_config = ChargifyClientConfig::new(&chargify.site_url, &chargify.api_key)?
        .with_direct_credentials(&chargify.direct_api_id, &chargify.direct_api_password);
    let provider: Arc<dyn BillingProvider> = Arc::new(ChargifyClient::new(client_config));
    let tracker: Arc<dyn EventTracker> = Arc::new(LoggingEventTracker::new());

    let subscription_repository = Arc::new(PostgresSubscriptionRepository::new(pool.clone()));
    let webhook_events = Arc::new(PostgresWebhookEventRepository::new(pool.clone()));

    let subscriptions = Arc::new(SubscriptionService::new(
        provider.clone(),
        subscription_repository.clone(),
        tracker.clone(),
    ));
    let catalog = Arc::new(ProductCatalogService::new(
        provider.clone(),
        config.catalog.paying_handles(),
        config.catalog.trial_product_handle.clone(),
        config.catalog.refresh_interval(),
    ));
    let trials = Arc::new(StartTrialHandler::new(
        subscriptions.clone(),
        catalog.clone(),
        Arc::new(PostgresTrialCouponRepository::new(pool.clone())),
        chargify.trial_default_token.clone(),
    ));
    let payment_method = Arc::new(UpdatePaymentMethodHandler::new(
        subscriptions.clone(),
        tracker,
    ));

    let verifier = if chargify.verifies_webhooks() {
        Some(ChargifyWebhookVerifier::new(&chargify.webhook_shared_key))
    } else {
        tracing::warn!("No webhook shared key configured, webhook signatures are not checked");
        None
    };
    let webhooks = Arc::new(HandleChargifyWebhookHandler::new(
        verifier,
        webhook_events,
        subscription_repository,
        provider.clone(),
    ));

    let direct = if chargify.direct_enabled() {
        Some(Arc::new(DirectFlowService::new(
            DirectSigner::new(&chargify.direct_api_id, &chargify.direct_api_secret),
            Arc::new(PostgresNonceStore::new(pool)),
            provider,
            chargify.nonce_ttl(),
        )))
    } else {
        tracing::info!("Chargify Direct credentials not configured, Direct routes disabled");
        None
    };

    let public_url = config
        .server
        .public_url
        .clone()
        .unwrap_or_else(|| format!("http://localhost:{}", config.server.port));

    Ok(BillingAppState {
        subscriptions,
        payment_method,
        trials,
        catalog,
        webhooks,
        direct,
        direct_redirect_uri: format!("{}/direct/callback", public_url.trim_end_matches('/')),
    })
}

/// Deletes expired Direct nonces and webhook events past retention.
fn spawn_purge_task(pool: PgPool, nonce_ttl: chrono::Duration) {
    let nonces = PostgresNonceStore::new(pool.clone());
    let webhook_events = PostgresWebhookEventRepository::new(pool);

    tokio::spawn(async move {
        let mut ticker = interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let now = Utc::now();

            match nonces.delete_before(now - nonce_ttl).await {
                Ok(count) if count > 0 => tracing::info!(count, "Expired nonces purged"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Nonce purge failed"),
            }

            let cutoff = now - chrono::Duration::days(WEBHOOK_RETENTION_DAYS);
            match webhook_events.delete_before(cutoff).await {
                Ok(count) if count > 0 => tracing::info!(count, "Old webhook events purged"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Webhook event purge failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
