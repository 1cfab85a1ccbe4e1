mod settings;

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, NotificationSink, PersistenceSink};
use cooldown::CooldownStore;
use engine::{BinanceGateway, Dispatcher, ScanScheduler};
use notifier::{heartbeat, Heartbeat, TelegramNotifier, WebhookNotifier};
use store::SqliteStore;
use strategy::{IndicatorPipeline, SignalClassifier};

use crate::settings::ScannerFileConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("Invalid environment configuration")?;
    let file = ScannerFileConfig::load(&cfg.scanner_config_path)?;
    info!(
        config = %cfg.scanner_config_path,
        seeds = file.targets.len(),
        "Trendwatch starting"
    );

    // ── Database ──────────────────────────────────────────────────────────────
    let store = Arc::new(
        SqliteStore::connect(&cfg.database_url)
            .await
            .with_context(|| format!("Failed to open database at '{}'", cfg.database_url))?,
    );
    store.seed_direction_toggles(&file.directions).await?;
    store.seed_targets(&file.scan_targets()).await?;

    // ── Sinks ─────────────────────────────────────────────────────────────────
    let sink_timeout = file.scheduler.sink_timeout();
    let mut notifiers: Vec<Arc<dyn NotificationSink>> = Vec::new();
    if let Some(telegram) = TelegramNotifier::new(cfg.telegram_token.as_deref(), &cfg.telegram_chat_ids) {
        notifiers.push(Arc::new(telegram));
    }
    match &cfg.webhook_url {
        Some(url) => notifiers.push(Arc::new(WebhookNotifier::new(
            url,
            cfg.webhook_secret.clone(),
            sink_timeout,
        )?)),
        None => warn!("WEBHOOK_URL not set, webhook notifier disabled"),
    }
    if notifiers.is_empty() {
        warn!("No notifier configured; signals are only logged and stored");
    }

    let persistence: Arc<dyn PersistenceSink> = store.clone();
    let dispatcher = Arc::new(Dispatcher::new(Some(persistence), notifiers, sink_timeout));

    // ── Scheduler ─────────────────────────────────────────────────────────────
    let gateway = Arc::new(BinanceGateway::new(&cfg.binance_base_url, file.scheduler.fetch_timeout())?);
    let (scheduler, handle) = ScanScheduler::new(
        file.scheduler.clone(),
        gateway,
        store.clone(),
        IndicatorPipeline::new(file.indicators.clone()),
        SignalClassifier::new(file.classifier.clone(), &file.indicators),
        Arc::new(CooldownStore::new(file.cooldown.clone())),
        dispatcher.clone(),
    );

    // ── Spawn tasks ───────────────────────────────────────────────────────────
    let heartbeat_task = match &cfg.ping_url {
        Some(url) => {
            let heartbeat = Heartbeat::new(url, cfg.webhook_secret.clone(), heartbeat::DEFAULT_INTERVAL)?;
            Some(tokio::spawn(heartbeat.run()))
        }
        None => None,
    };

    dispatcher
        .announce("✅ <b>Trendwatch started</b>\nScanning for trend signals.")
        .await;

    let mut scan_task = tokio::spawn(scheduler.run());
    info!(notifiers = ?dispatcher.notifier_names(), "All subsystems started. Waiting for shutdown signal.");

    let outcome = tokio::select! {
        finished = &mut scan_task => finished,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Draining current batch.");
            handle.shutdown();
            scan_task.await
        }
    };

    if let Some(task) = heartbeat_task {
        task.abort();
    }
    outcome
        .context("Scan task panicked")?
        .context("Scan loop stopped")?;
    info!("Shutdown complete");
    Ok(())
}
