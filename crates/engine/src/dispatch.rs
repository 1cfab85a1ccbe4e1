use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{error, info, warn};

use common::{
    CycleReport, DispatchRecord, Error, NotificationSink, PersistenceSink, Result, SignalVerdict, SinkResult,
};

/// What happened to one admitted verdict.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// The audit entry, with one sink result per notifier in registration
    /// order.
    pub record: DispatchRecord,
    /// Whether the audit log accepted the record.
    pub persisted: bool,
}

impl DispatchOutcome {
    pub fn record_id(&self) -> &str {
        &self.record.id
    }

    pub fn results(&self) -> &[SinkResult] {
        &self.record.sink_results
    }

    /// True when at least one notifier accepted the verdict.
    pub fn delivered(&self) -> bool {
        self.results().iter().any(|r| r.ok)
    }
}

/// Fans an admitted verdict out to the audit log and every notifier.
///
/// This is the ONLY component that calls `NotificationSink::notify`. Every
/// sink call, the audit log included, runs under `sink_timeout`. A failure
/// or timeout is recorded and logged, never propagated, and never affects
/// other sinks. Nothing is retried.
pub struct Dispatcher {
    persistence: Option<Arc<dyn PersistenceSink>>,
    notifiers: Vec<Arc<dyn NotificationSink>>,
    sink_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        persistence: Option<Arc<dyn PersistenceSink>>,
        notifiers: Vec<Arc<dyn NotificationSink>>,
        sink_timeout: Duration,
    ) -> Self {
        Self {
            persistence,
            notifiers,
            sink_timeout,
        }
    }

    pub fn notifier_names(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    pub async fn dispatch(&self, verdict: &SignalVerdict) -> DispatchOutcome {
        let mut record = DispatchRecord::new(verdict.clone(), Utc::now());
        let target = &verdict.target;

        let persisted = match &self.persistence {
            Some(persistence) => match self.bounded(persistence.append(&record)).await {
                Ok(()) => true,
                Err(e) => {
                    error!(pair = %target, direction = %verdict.direction, error = %e, "Failed to persist signal");
                    false
                }
            },
            None => false,
        };

        record.sink_results =
            join_all(self.notifiers.iter().map(|sink| self.notify_one(sink.as_ref(), verdict))).await;

        if persisted {
            if let Some(persistence) = &self.persistence {
                let write = persistence.append_deliveries(&record.id, &record.sink_results);
                if let Err(e) = self.bounded(write).await {
                    error!(record_id = %record.id, error = %e, "Failed to persist delivery results");
                }
            }
        }

        let outcome = DispatchOutcome { record, persisted };
        if outcome.delivered() {
            info!(
                pair = %target,
                direction = %verdict.direction,
                price = verdict.price,
                "Signal dispatched"
            );
        } else if !self.notifiers.is_empty() {
            warn!(pair = %target, direction = %verdict.direction, "Signal reached no notifier");
        }
        outcome
    }

    /// Hand the cycle counters to the audit log, if there is one.
    pub async fn record_cycle(&self, report: &CycleReport) {
        if let Some(persistence) = &self.persistence {
            if let Err(e) = self.bounded(persistence.record_cycle(report)).await {
                warn!(cycle = report.cycle, error = %e, "Failed to record cycle stats");
            }
        }
    }

    async fn bounded<F>(&self, call: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        tokio::time::timeout(self.sink_timeout, call)
            .await
            .unwrap_or_else(|_| Err(Error::Timeout(format!("audit log after {:?}", self.sink_timeout))))
    }

    /// Send a notice to every notifier, ignoring failures beyond a log line.
    pub async fn announce(&self, text: &str) {
        let calls = self.notifiers.iter().map(|sink| async move {
            match tokio::time::timeout(self.sink_timeout, sink.announce(text)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(sink = sink.name(), error = %e, "Announcement failed"),
                Err(_) => warn!(sink = sink.name(), "Announcement timed out"),
            }
        });
        join_all(calls).await;
    }

    async fn notify_one(&self, sink: &dyn NotificationSink, verdict: &SignalVerdict) -> SinkResult {
        let name = sink.name();
        match tokio::time::timeout(self.sink_timeout, sink.notify(verdict)).await {
            Ok(Ok(())) => SinkResult::success(name),
            Ok(Err(e)) => {
                warn!(sink = name, pair = %verdict.target, error = %e, "Notifier failed");
                SinkResult::failure(name, e)
            }
            Err(_) => {
                warn!(sink = name, pair = %verdict.target, "Notifier timed out");
                SinkResult::failure(name, format!("timed out after {:?}", self.sink_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use common::{Direction, Error, Result, ScanTarget, Timeframe};

    use super::*;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Ok,
        Fail,
        Hang,
    }

    struct FakeNotifier {
        name: &'static str,
        behaviour: Behaviour,
        seen: Mutex<Vec<Direction>>,
    }

    impl FakeNotifier {
        fn new(name: &'static str, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                name,
                behaviour,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl NotificationSink for FakeNotifier {
        fn name(&self) -> &str {
            self.name
        }

        async fn notify(&self, verdict: &SignalVerdict) -> Result<()> {
            self.seen.lock().unwrap().push(verdict.direction);
            match self.behaviour {
                Behaviour::Ok => Ok(()),
                Behaviour::Fail => Err(Error::sink(self.name, "HTTP 502")),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
            }
        }
    }

    #[derive(Default)]
    struct FakeLog {
        fail_append: bool,
        hang: bool,
        records: Mutex<Vec<DispatchRecord>>,
        deliveries: Mutex<Vec<(String, Vec<SinkResult>)>>,
    }

    #[async_trait]
    impl PersistenceSink for FakeLog {
        async fn append(&self, record: &DispatchRecord) -> Result<()> {
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.fail_append {
                return Err(Error::Config("disk full".into()));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn append_deliveries(&self, record_id: &str, results: &[SinkResult]) -> Result<()> {
            self.deliveries
                .lock()
                .unwrap()
                .push((record_id.to_string(), results.to_vec()));
            Ok(())
        }

        async fn record_cycle(&self, _report: &CycleReport) -> Result<()> {
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(())
        }
    }

    fn verdict() -> SignalVerdict {
        SignalVerdict {
            target: ScanTarget::new("BTCUSDT", Timeframe::H1),
            direction: Direction::LongEntry,
            price: 100.0,
            reason: "trend bullish".into(),
            evaluated_at: Utc::now(),
        }
    }

    fn dispatcher(log: Arc<FakeLog>, notifiers: Vec<Arc<dyn NotificationSink>>) -> Dispatcher {
        let log: Arc<dyn PersistenceSink> = log;
        Dispatcher::new(Some(log), notifiers, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn failing_notifier_does_not_block_others() {
        let log = Arc::new(FakeLog::default());
        let broken = FakeNotifier::new("telegram", Behaviour::Fail);
        let healthy = FakeNotifier::new("webhook", Behaviour::Ok);
        let d = dispatcher(log.clone(), vec![broken.clone(), healthy.clone()]);

        let outcome = d.dispatch(&verdict()).await;

        assert!(outcome.delivered());
        assert!(outcome.persisted);
        assert_eq!(outcome.results()[0], SinkResult::failure("telegram", Error::sink("telegram", "HTTP 502")));
        assert_eq!(outcome.results()[1], SinkResult::success("webhook"));
        assert_eq!(healthy.seen.lock().unwrap().as_slice(), &[Direction::LongEntry]);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_notifier_times_out() {
        let log = Arc::new(FakeLog::default());
        let d = dispatcher(
            log.clone(),
            vec![FakeNotifier::new("slow", Behaviour::Hang), FakeNotifier::new("fast", Behaviour::Ok)],
        );

        let outcome = d.dispatch(&verdict()).await;

        assert!(!outcome.results()[0].ok);
        assert!(outcome.results()[0].error.as_deref().unwrap_or_default().contains("timed out"));
        assert!(outcome.results()[1].ok);
    }

    #[tokio::test]
    async fn record_is_kept_when_every_notifier_fails() {
        let log = Arc::new(FakeLog::default());
        let d = dispatcher(
            log.clone(),
            vec![FakeNotifier::new("a", Behaviour::Fail), FakeNotifier::new("b", Behaviour::Fail)],
        );

        let outcome = d.dispatch(&verdict()).await;

        assert!(!outcome.delivered());
        let records = log.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, outcome.record_id());

        let deliveries = log.deliveries.lock().unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0, outcome.record_id());
        assert!(deliveries[0].1.iter().all(|r| !r.ok));
        assert_eq!(deliveries[0].1.as_slice(), outcome.results());
    }

    #[tokio::test]
    async fn persistence_failure_does_not_block_notifiers() {
        let log = Arc::new(FakeLog {
            fail_append: true,
            ..FakeLog::default()
        });
        let healthy = FakeNotifier::new("webhook", Behaviour::Ok);
        let d = dispatcher(log.clone(), vec![healthy.clone()]);

        let outcome = d.dispatch(&verdict()).await;

        assert!(!outcome.persisted);
        assert!(outcome.delivered());
        assert_eq!(healthy.seen.lock().unwrap().len(), 1);
        assert!(log.deliveries.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_audit_log_times_out_and_notifiers_still_run() {
        let log = Arc::new(FakeLog {
            hang: true,
            ..FakeLog::default()
        });
        let healthy = FakeNotifier::new("webhook", Behaviour::Ok);
        let d = dispatcher(log.clone(), vec![healthy.clone()]);

        let started = tokio::time::Instant::now();
        let outcome = tokio::time::timeout(Duration::from_secs(60), d.dispatch(&verdict()))
            .await
            .expect("dispatch must not wait on a stalled audit log");

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!outcome.persisted);
        assert!(outcome.delivered());
        assert_eq!(healthy.seen.lock().unwrap().as_slice(), &[Direction::LongEntry]);
        assert!(log.records.lock().unwrap().is_empty());
        assert!(log.deliveries.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_cycle_stats_write_times_out() {
        let log = Arc::new(FakeLog {
            hang: true,
            ..FakeLog::default()
        });
        let d = dispatcher(log, Vec::new());

        let started = tokio::time::Instant::now();
        tokio::time::timeout(Duration::from_secs(60), d.record_cycle(&CycleReport::default()))
            .await
            .expect("record_cycle must give up after the sink timeout");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn works_without_any_sink() {
        let d = Dispatcher::new(None, Vec::new(), Duration::from_secs(1));
        let outcome = d.dispatch(&verdict()).await;
        assert!(!outcome.persisted);
        assert!(outcome.results().is_empty());
        assert!(!outcome.delivered());
        assert!(d.notifier_names().is_empty());
    }
}
