use std::sync::Arc;

use anyhow::Result;
use meter_client::{
    db::{ReadingRepository, ReadingStore},
    domain::PortalClock,
};
use portal_ingestion::{
    backfill::BackfillOrchestrator,
    config::{AppConfig, Credentials},
    events::AccountEvents,
    metrics_server, observability, AccountCoordinator,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;
    let credentials = Credentials::from_env()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::serve(&metrics_cfg.bind_addr).await?;
    }

    let clock = Arc::new(PortalClock::new(cfg.portal.utc_offset()?));
    let repository = ReadingRepository::new(ReadingStore::new(&cfg.store.data_dir), clock);
    let backfill = Arc::new(BackfillOrchestrator::new(repository.clone(), cfg.backfill.settings()));
    let events = AccountEvents::new();

    // Log account events as JSON lines.
    let mut event_rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => tracing::info!(event = %json, "account event"),
                Err(e) => tracing::warn!(error = %e, "failed to serialize account event"),
            }
        }
    });

    let coordinator = AccountCoordinator::new(cfg.portal.clone(), repository, backfill.clone(), events);

    let account = match coordinator.connect(&credentials.username, &credentials.password).await {
        Ok(account) => account,
        Err(e) if e.is_credentials() => {
            tracing::error!("authentication failed: the portal rejected the username or password");
            anyhow::bail!("authentication failed");
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        account = %account.key,
        account_code = %account.identity.account_code,
        meter_point = %account.identity.meter_point_id,
        customer = account.profile.personal.customer_name.as_deref().unwrap_or("-"),
        today_readings = account.today.len(),
        backfill_started = account.backfill_started,
        "account connected"
    );
    match serde_json::to_string(&account.profile) {
        Ok(json) => tracing::debug!(profile = %json, "customer profile"),
        Err(e) => tracing::warn!(error = %e, "failed to serialize customer profile"),
    }

    // Ctrl-C stops the walk; already imported days are kept.
    let key = account.key.clone();
    let cancel_backfill = backfill.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping backfill");
            cancel_backfill.cancel(&key);
        }
    });

    if let Some(run) = backfill.wait(&account.key).await {
        tracing::info!(
            state = ?run.state,
            stopped_at = %run.cursor,
            days_imported = run.days_imported,
            days_skipped = run.days_skipped,
            day_errors = run.day_errors,
            readings = run.readings_imported,
            "backfill done"
        );
    }

    Ok(())
}
