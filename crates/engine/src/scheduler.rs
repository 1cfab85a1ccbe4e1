use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use common::{
    CandleWindow, CycleReport, Error, MarketDataGateway, Result, RuntimeConfigStore, ScanTarget,
};
use cooldown::{CooldownKey, CooldownStore};
use strategy::{IndicatorPipeline, SignalClassifier};

use crate::dispatch::Dispatcher;

/// Pacing and limits of the scan loop.
///
/// Example `[scheduler]` section of `config/scanner.toml`:
/// ```toml
/// [scheduler]
/// batch_size = 10
/// cycle_interval_secs = 15
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub cycle_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub sink_timeout_secs: u64,
    /// Candles requested per fetch. Must cover the pipeline's lookback plus
    /// the bar that may still be forming.
    pub candle_limit: usize,
    /// Consecutive target-enumeration failures tolerated before `run` gives up.
    pub max_config_failures: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_pause_ms: 500,
            cycle_interval_secs: 15,
            fetch_timeout_secs: 10,
            sink_timeout_secs: 10,
            candle_limit: 300,
            max_config_failures: 3,
        }
    }
}

impl SchedulerConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_secs(self.sink_timeout_secs)
    }

    pub fn validate(&self, minimum_candles: usize) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("scheduler.batch_size must be at least 1".into()));
        }
        if self.max_config_failures == 0 {
            return Err(Error::Config("scheduler.max_config_failures must be at least 1".into()));
        }
        if self.candle_limit <= minimum_candles {
            return Err(Error::Config(format!(
                "scheduler.candle_limit {} must exceed the {} closed candles the indicators need",
                self.candle_limit, minimum_candles
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    BatchFetch,
    Evaluate,
    Sleep,
    Stopped,
}

/// Cloneable handle for whoever owns the process lifecycle.
#[derive(Clone)]
pub struct SchedulerHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
    state: Arc<RwLock<SchedulerState>>,
}

impl SchedulerHandle {
    /// Ask the loop to stop. The current batch still completes.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn state(&self) -> SchedulerState {
        *self.state.read().await
    }
}

/// What happened to one target within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetOutcome {
    Skipped,
    NoSignal,
    Suppressed,
    Dispatched,
}

/// Walks the active targets in batches, forever, until shut down.
///
/// Per target: fetch → pipeline → classifier → cooldown → dispatch. Any
/// per-target failure is logged and the target skipped for the cycle.
/// Cycles never overlap.
pub struct ScanScheduler {
    config: SchedulerConfig,
    gateway: Arc<dyn MarketDataGateway>,
    runtime: Arc<dyn RuntimeConfigStore>,
    pipeline: IndicatorPipeline,
    classifier: SignalClassifier,
    cooldowns: Arc<CooldownStore>,
    dispatcher: Arc<Dispatcher>,
    state: Arc<RwLock<SchedulerState>>,
    shutdown_rx: watch::Receiver<bool>,
    cycle: u64,
}

impl ScanScheduler {
    pub fn new(
        config: SchedulerConfig,
        gateway: Arc<dyn MarketDataGateway>,
        runtime: Arc<dyn RuntimeConfigStore>,
        pipeline: IndicatorPipeline,
        classifier: SignalClassifier,
        cooldowns: Arc<CooldownStore>,
        dispatcher: Arc<Dispatcher>,
    ) -> (Self, SchedulerHandle) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(RwLock::new(SchedulerState::Idle));

        let handle = SchedulerHandle {
            shutdown_tx: Arc::new(shutdown_tx),
            state: state.clone(),
        };

        let scheduler = Self {
            config,
            gateway,
            runtime,
            pipeline,
            classifier,
            cooldowns,
            dispatcher,
            state,
            shutdown_rx,
            cycle: 0,
        };

        (scheduler, handle)
    }

    /// Run until shutdown. Call from `tokio::spawn`.
    ///
    /// Returns `Err` only when the target universe could not be read
    /// `max_config_failures` times in a row.
    pub async fn run(mut self) -> Result<()> {
        info!(
            batch_size = self.config.batch_size,
            interval_secs = self.config.cycle_interval_secs,
            "Scan scheduler running"
        );
        let mut failures = 0u32;

        loop {
            if self.shutdown_requested() {
                break;
            }

            match self.run_cycle_at(Utc::now()).await {
                Ok(_) => failures = 0,
                Err(e) => {
                    failures += 1;
                    error!(error = %e, failures, "Could not read scan targets");
                    if failures >= self.config.max_config_failures {
                        self.set_state(SchedulerState::Stopped).await;
                        return Err(e);
                    }
                }
            }

            self.set_state(SchedulerState::Sleep).await;
            if self.pause(self.config.cycle_interval()).await {
                break;
            }
        }

        self.set_state(SchedulerState::Stopped).await;
        info!("Scan scheduler stopped");
        Ok(())
    }

    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// One full pass over the active targets, with `now` as the evaluation
    /// and cooldown clock.
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        self.cycle += 1;
        let mut report = CycleReport {
            cycle: self.cycle,
            ..CycleReport::default()
        };

        if !self.runtime.scanning_enabled().await? {
            debug!(cycle = self.cycle, "Scanning disabled, skipping cycle");
            return Ok(report);
        }

        let targets = dedup(self.runtime.active_targets().await?);
        report.targets = targets.len();

        let batch_count = targets.chunks(self.config.batch_size.max(1)).count();
        for (i, batch) in targets.chunks(self.config.batch_size.max(1)).enumerate() {
            for outcome in self.run_batch(batch, now).await {
                match outcome {
                    TargetOutcome::Skipped => report.skipped += 1,
                    TargetOutcome::NoSignal => report.evaluated += 1,
                    TargetOutcome::Suppressed => {
                        report.evaluated += 1;
                        report.signals += 1;
                        report.suppressed += 1;
                    }
                    TargetOutcome::Dispatched => {
                        report.evaluated += 1;
                        report.signals += 1;
                        report.dispatched += 1;
                    }
                }
            }

            if i + 1 < batch_count && self.pause(self.config.batch_pause()).await {
                info!(cycle = self.cycle, "Shutdown requested, ending cycle early");
                break;
            }
        }

        let pruned = self.cooldowns.prune_expired(now).await;
        self.dispatcher.record_cycle(&report).await;

        info!(
            cycle = report.cycle,
            targets = report.targets,
            evaluated = report.evaluated,
            signals = report.signals,
            suppressed = report.suppressed,
            dispatched = report.dispatched,
            skipped = report.skipped,
            pruned,
            "Cycle complete"
        );
        Ok(report)
    }

    async fn run_batch(&self, batch: &[ScanTarget], now: DateTime<Utc>) -> Vec<TargetOutcome> {
        self.set_state(SchedulerState::BatchFetch).await;
        let windows = join_all(batch.iter().map(|target| self.fetch(target))).await;

        self.set_state(SchedulerState::Evaluate).await;
        join_all(
            batch
                .iter()
                .zip(windows)
                .map(|(target, window)| self.evaluate(target, window, now)),
        )
        .await
    }

    async fn fetch(&self, target: &ScanTarget) -> Result<CandleWindow> {
        let fetch = self
            .gateway
            .fetch_candles(&target.symbol, target.timeframe, self.config.candle_limit);
        match tokio::time::timeout(self.config.fetch_timeout(), fetch).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "fetching {target} took longer than {}s",
                self.config.fetch_timeout_secs
            ))),
        }
    }

    async fn evaluate(
        &self,
        target: &ScanTarget,
        window: Result<CandleWindow>,
        now: DateTime<Utc>,
    ) -> TargetOutcome {
        let window = match window {
            Ok(window) => window,
            Err(e) => {
                warn!(pair = %target, error = %e, "Fetch failed, skipping target");
                return TargetOutcome::Skipped;
            }
        };

        let toggles = match self.runtime.direction_toggles().await {
            Ok(toggles) => toggles,
            Err(e) => {
                warn!(pair = %target, error = %e, "Could not read direction toggles");
                return TargetOutcome::Skipped;
            }
        };

        let features = match self.pipeline.compute(&window) {
            Ok(features) => features,
            Err(e @ Error::InsufficientData { .. }) => {
                debug!(pair = %target, reason = %e, "Not enough history yet");
                return TargetOutcome::Skipped;
            }
            Err(e) => {
                warn!(pair = %target, error = %e, "Indicator pipeline failed");
                return TargetOutcome::Skipped;
            }
        };

        let verdict = self.classifier.classify(target, &features, &toggles, now);
        let Some(key) = CooldownKey::for_verdict(&verdict) else {
            return TargetOutcome::NoSignal;
        };

        if !self.cooldowns.admit(&key, now).await {
            return TargetOutcome::Suppressed;
        }

        info!(
            pair = %target,
            direction = %verdict.direction,
            price = verdict.price,
            reason = %verdict.reason,
            "Signal admitted"
        );
        self.dispatcher.dispatch(&verdict).await;
        TargetOutcome::Dispatched
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Sleep for `duration` unless shutdown is requested first. Returns true
    /// on shutdown.
    async fn pause(&mut self, duration: Duration) -> bool {
        if self.shutdown_requested() {
            return true;
        }
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return self.shutdown_requested(),
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() {
                        // Every handle is gone; nobody can ask us to stop.
                        (&mut sleep).await;
                        return false;
                    }
                    if *self.shutdown_rx.borrow() {
                        return true;
                    }
                }
            }
        }
    }

    async fn set_state(&self, state: SchedulerState) {
        *self.state.write().await = state;
    }
}

/// Collapse duplicate identities, keeping the first occurrence.
fn dedup(targets: Vec<ScanTarget>) -> Vec<ScanTarget> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|t| seen.insert((t.symbol.clone(), t.timeframe)))
        .collect()
}
