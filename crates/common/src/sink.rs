use async_trait::async_trait;

use crate::{CycleReport, DispatchRecord, Result, SignalVerdict, SinkResult};

/// Append-only audit log. The core never reads it back.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Record an admitted verdict. Called before any notifier runs.
    async fn append(&self, record: &DispatchRecord) -> Result<()>;

    /// Record how each notifier fared for a previously appended record.
    async fn append_deliveries(&self, record_id: &str, results: &[SinkResult]) -> Result<()>;

    /// Accumulate per-cycle counters.
    async fn record_cycle(&self, _report: &CycleReport) -> Result<()> {
        Ok(())
    }
}

/// A downstream consumer of admitted verdicts (chat, webhook, ...).
///
/// Implementations report any non-success as `Err`; the dispatcher wraps
/// every call in a timeout and never retries.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Short identifier used in logs and delivery records.
    fn name(&self) -> &str;

    async fn notify(&self, verdict: &SignalVerdict) -> Result<()>;

    /// Free-form operational notice, e.g. a startup message.
    async fn announce(&self, _text: &str) -> Result<()> {
        Ok(())
    }
}
