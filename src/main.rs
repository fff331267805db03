use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use coursepay::adapters::http::{billing_router, BillingAppState};
use coursepay::adapters::notifications::{ResendConfig, ResendNotifier, SpawningNotifier};
use coursepay::adapters::postgres::{
    PostgresCatalogReader, PostgresCustomerRepository, PostgresDisputeRepository,
    PostgresEnrollmentRepository, PostgresPaymentRepository, PostgresPromoCodeRepository,
    PostgresRefundRepository, PostgresReminderScheduler, PostgresSubscriptionRepository,
    PostgresWebhookEventRepository,
};
use coursepay::adapters::stripe::{StripeGateway, StripeGatewayConfig};
use coursepay::application::handlers::webhook::{billing_registry, WebhookPorts};
use coursepay::application::handlers::{AccessLedger, HandleWebhookHandler, PurchaseOrchestrator};
use coursepay::config::{AppConfig, BillingConfig};
use coursepay::domain::foundation::Timestamp;
use coursepay::domain::webhook::{IdempotentWebhookProcessor, StripeWebhookVerifier};
use coursepay::ports::{Notifier, WebhookEventRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);

    tracing::info!(
        environment = ?config.server.environment,
        live_mode = config.payment.is_live_mode(),
        "Starting coursepay"
    );

    let pool = config.database.connect().await?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
    }

    // Repositories
    let enrollments = Arc::new(PostgresEnrollmentRepository::new(pool.clone()));
    let reminders = Arc::new(PostgresReminderScheduler::new(pool.clone()));
    let payments = Arc::new(PostgresPaymentRepository::new(pool.clone()));
    let subscriptions = Arc::new(PostgresSubscriptionRepository::new(pool.clone()));
    let refunds = Arc::new(PostgresRefundRepository::new(pool.clone()));
    let disputes = Arc::new(PostgresDisputeRepository::new(pool.clone()));
    let customers = Arc::new(PostgresCustomerRepository::new(pool.clone()));
    let promos = Arc::new(PostgresPromoCodeRepository::new(pool.clone()));
    let webhook_events = Arc::new(PostgresWebhookEventRepository::new(pool.clone()));
    let catalog = Arc::new(PostgresCatalogReader::new(
        pool.clone(),
        config.payment.membership_plans(),
    ));

    // Outbound integrations
    let mut gateway_config = StripeGatewayConfig::new(config.payment.stripe_api_key.clone());
    if let Some(base_url) = &config.payment.api_base_url {
        gateway_config = gateway_config.with_base_url(base_url.clone());
    }
    let gateway = Arc::new(StripeGateway::new(gateway_config));

    let resend = ResendNotifier::new(
        ResendConfig::new(
            config.email.resend_api_key.clone(),
            config.email.from_header(),
            config.email.operations_email.clone(),
        ),
        customers.clone(),
    );
    let notifier: Arc<dyn Notifier> = Arc::new(SpawningNotifier::new(Arc::new(resend)));

    // Application services
    let ledger = Arc::new(
        AccessLedger::new(enrollments, reminders)
            .with_default_grace_days(config.billing.default_grace_days),
    );

    let orchestrator = Arc::new(
        PurchaseOrchestrator::new(
            gateway,
            payments.clone(),
            subscriptions.clone(),
            customers.clone(),
            promos,
            catalog.clone(),
            ledger.clone(),
        )
        .with_tax_policy(config.billing.tax_policy())
        .with_default_currency(config.payment.currency.clone()),
    );

    let registry = billing_registry(
        WebhookPorts {
            payments,
            subscriptions,
            refunds,
            disputes,
            customers,
            catalog,
            notifier: notifier.clone(),
        },
        ledger.clone(),
    );
    let processor = Arc::new(IdempotentWebhookProcessor::new(
        webhook_events.clone(),
        Arc::new(registry),
    ));

    let verifier = StripeWebhookVerifier::new(config.payment.stripe_webhook_secret.clone())
        .with_tolerance(config.payment.webhook_tolerance_secs);
    let mut webhooks = HandleWebhookHandler::new(verifier, processor);
    if config.payment.enforce_livemode {
        webhooks = webhooks.with_expected_livemode(config.payment.is_live_mode());
    }

    spawn_sweeper(
        config.billing.clone(),
        ledger.clone(),
        notifier,
        webhook_events,
    );

    let state = BillingAppState::new(orchestrator, ledger, Arc::new(webhooks));
    let app = billing_router()
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.server.body_limit_bytes))
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.server.log_level.clone().into());

    // JSON lines in production, human-readable output otherwise
    let (json, pretty) = if config.is_production() {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .init();
}

/// Expires lapsed enrollments, sends due reminders and purges old webhook
/// events on a fixed interval.
fn spawn_sweeper(
    billing: BillingConfig,
    ledger: Arc<AccessLedger>,
    notifier: Arc<dyn Notifier>,
    webhook_events: Arc<dyn WebhookEventRepository>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(billing.sweep_interval());
        loop {
            ticker.tick().await;
            let now = Timestamp::now();

            match ledger.process_expired_at(now).await {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "expired enrollments"),
                Err(err) => tracing::error!(error = %err, "expiry sweep failed"),
            }

            match ledger.send_due_reminders(notifier.as_ref(), now).await {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "sent expiration reminders"),
                Err(err) => tracing::error!(error = %err, "reminder sweep failed"),
            }

            let cutoff = now.minus_days(i64::from(billing.webhook_retention_days));
            match webhook_events.delete_before(cutoff).await {
                Ok(0) => {}
                Ok(count) => tracing::debug!(count, "purged processed webhook events"),
                Err(err) => tracing::warn!(error = %err, "webhook event purge failed"),
            }
        }
    });
}

