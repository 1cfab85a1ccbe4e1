use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{info, warn};

use common::{
    normalize_symbol, CycleReport, Direction, DirectionToggles, DispatchRecord, PersistenceSink,
    Result, RuntimeConfigStore, ScanTarget, SinkResult, Timeframe,
};

const SCANNING_KEY: &str = "scanning_enabled";
const STAT_KEYS: [&str; 4] = ["total_scans", "signals_sent", "suppressed", "errors"];

/// A row of the signal history, as stored.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SignalRow {
    pub id: String,
    pub symbol: String,
    pub timeframe: String,
    pub direction: String,
    pub price: f64,
    pub reason: String,
    pub evaluated_at: String,
    pub dispatched_at: String,
}

/// SQLite-backed runtime config and audit log.
///
/// Settings rows are updated one key at a time, which gives the
/// single-writer / many-reader, last-write-wins behaviour the scheduler
/// expects. The audit tables (`signals`, `deliveries`) are append-only.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect, run migrations, and make sure every setting has a row.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.init().await?;
        info!("Database ready");
        Ok(store)
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;

        // Direction rows are left to `seed_direction_toggles`; until then
        // they read as enabled.
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?1, '1')")
            .bind(SCANNING_KEY)
            .execute(&self.pool)
            .await?;
        for key in STAT_KEYS {
            sqlx::query("INSERT OR IGNORE INTO stats (key, value) VALUES (?1, 0)")
                .bind(key)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ─── Control-surface writes ──────────────────────────────────────────────

    /// Insert targets that are not known yet. Existing rows keep whatever
    /// the operator last set.
    pub async fn seed_targets(&self, targets: &[ScanTarget]) -> Result<()> {
        for target in targets {
            sqlx::query(
                "INSERT OR IGNORE INTO targets (symbol, timeframe, active) VALUES (?1, ?2, ?3)",
            )
            .bind(&target.symbol)
            .bind(target.timeframe.as_str())
            .bind(target.active)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Write the initial toggle values only where no row exists yet.
    pub async fn seed_direction_toggles(&self, toggles: &DirectionToggles) -> Result<()> {
        for direction in Direction::SIGNALS {
            if let Some(key) = direction.setting_key() {
                sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)")
                    .bind(key)
                    .bind(flag(toggles.is_enabled(direction)))
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn upsert_target(&self, symbol: &str, timeframe: Timeframe, active: bool) -> Result<()> {
        sqlx::query(
            "INSERT INTO targets (symbol, timeframe, active) VALUES (?1, ?2, ?3)
             ON CONFLICT(symbol, timeframe) DO UPDATE SET active = excluded.active",
        )
        .bind(normalize_symbol(symbol))
        .bind(timeframe.as_str())
        .bind(active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns false when the target does not exist.
    pub async fn set_target_active(&self, symbol: &str, timeframe: Timeframe, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE targets SET active = ?1 WHERE symbol = ?2 AND timeframe = ?3")
            .bind(active)
            .bind(normalize_symbol(symbol))
            .bind(timeframe.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_direction_enabled(&self, direction: Direction, enabled: bool) -> Result<()> {
        if let Some(key) = direction.setting_key() {
            self.set_setting(key, enabled).await?;
        }
        Ok(())
    }

    pub async fn set_scanning_enabled(&self, enabled: bool) -> Result<()> {
        self.set_setting(SCANNING_KEY, enabled).await
    }

    async fn set_setting(&self, key: &str, enabled: bool) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(flag(enabled))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn setting(&self, key: &str, default: bool) -> Result<bool> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.map_or(default, |v| v == "1"))
    }

    // ─── History reads (operator reconciliation) ─────────────────────────────

    pub async fn recent_signals(&self, limit: i64) -> Result<Vec<SignalRow>> {
        let rows = sqlx::query_as::<_, SignalRow>(
            "SELECT id, symbol, timeframe, direction, price, reason, evaluated_at, dispatched_at
             FROM signals ORDER BY dispatched_at DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn deliveries_for(&self, signal_id: &str) -> Result<Vec<SinkResult>> {
        let rows: Vec<(String, bool, Option<String>)> = sqlx::query_as(
            "SELECT sink, ok, error FROM deliveries WHERE signal_id = ?1 ORDER BY id ASC",
        )
        .bind(signal_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(sink, ok, error)| SinkResult { sink, ok, error })
            .collect())
    }

    pub async fn stats(&self) -> Result<BTreeMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT key, value FROM stats")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }
}

fn flag(enabled: bool) -> &'static str {
    if enabled {
        "1"
    } else {
        "0"
    }
}

#[async_trait]
impl RuntimeConfigStore for SqliteStore {
    /// Rows with a timeframe outside the supported set are skipped with a
    /// warning; the remaining targets are still returned.
    async fn active_targets(&self) -> Result<Vec<ScanTarget>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT symbol, timeframe FROM targets WHERE active = 1 ORDER BY symbol, timeframe",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut targets = Vec::with_capacity(rows.len());
        for (symbol, timeframe) in rows {
            match timeframe.parse::<Timeframe>() {
                Ok(timeframe) => targets.push(ScanTarget {
                    symbol,
                    timeframe,
                    active: true,
                }),
                Err(e) => warn!(symbol = %symbol, error = %e, "Skipping misconfigured target"),
            }
        }
        Ok(targets)
    }

    async fn direction_enabled(&self, direction: Direction) -> Result<bool> {
        match direction.setting_key() {
            Some(key) => self.setting(key, true).await,
            None => Ok(false),
        }
    }

    async fn scanning_enabled(&self) -> Result<bool> {
        self.setting(SCANNING_KEY, false).await
    }

    /// One query, so the four toggles come from the same snapshot.
    async fn direction_toggles(&self) -> Result<DirectionToggles> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;
        let settings: HashMap<String, String> = rows.into_iter().collect();

        let mut toggles = DirectionToggles::all_enabled();
        for direction in Direction::SIGNALS {
            let enabled = direction
                .setting_key()
                .and_then(|key| settings.get(key))
                .map_or(true, |v| v == "1");
            toggles.set(direction, enabled);
        }
        Ok(toggles)
    }
}

#[async_trait]
impl PersistenceSink for SqliteStore {
    async fn append(&self, record: &DispatchRecord) -> Result<()> {
        let v = &record.verdict;
        sqlx::query(
            "INSERT INTO signals (id, symbol, timeframe, direction, price, reason, evaluated_at, dispatched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&record.id)
        .bind(&v.target.symbol)
        .bind(v.target.timeframe.as_str())
        .bind(v.direction.as_str())
        .bind(v.price)
        .bind(&v.reason)
        .bind(v.evaluated_at.to_rfc3339())
        .bind(record.dispatched_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_deliveries(&self, record_id: &str, results: &[SinkResult]) -> Result<()> {
        let recorded_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for result in results {
            sqlx::query(
                "INSERT INTO deliveries (signal_id, sink, ok, error, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(record_id)
            .bind(&result.sink)
            .bind(result.ok)
            .bind(&result.error)
            .bind(&recorded_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn record_cycle(&self, report: &CycleReport) -> Result<()> {
        let increments = [
            ("total_scans", report.evaluated),
            ("signals_sent", report.dispatched),
            ("suppressed", report.suppressed),
            ("errors", report.skipped),
        ];
        for (key, amount) in increments {
            sqlx::query(
                "INSERT INTO stats (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = value + excluded.value",
            )
            .bind(key)
            .bind(amount as i64)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use common::SignalVerdict;

    use super::*;

    fn verdict(direction: Direction) -> SignalVerdict {
        SignalVerdict {
            target: ScanTarget::new("BTCUSDT", Timeframe::H1),
            direction,
            price: 101.5,
            reason: "trend bullish".into(),
            evaluated_at: Utc.with_ymd_and_hms(2026, 4, 1, 10, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn fresh_database_enables_every_direction() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.direction_toggles().await.unwrap(), DirectionToggles::all_enabled());
        assert!(store.scanning_enabled().await.unwrap());
        assert!(store.active_targets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn seeding_does_not_override_operator_changes() {
        let store = SqliteStore::in_memory().await.unwrap();
        let btc = ScanTarget::new("BTCUSDT", Timeframe::H1);
        store.seed_targets(&[btc.clone()]).await.unwrap();
        assert!(store.set_target_active("btc/usdt", Timeframe::H1, false).await.unwrap());

        store.seed_targets(&[btc]).await.unwrap();
        assert!(store.active_targets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_symbol_can_be_scanned_on_two_timeframes() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_target("ETHUSDT", Timeframe::M5, true).await.unwrap();
        store.upsert_target("ETHUSDT", Timeframe::H4, true).await.unwrap();
        store.upsert_target("ETHUSDT", Timeframe::H4, false).await.unwrap();

        let active = store.active_targets().await.unwrap();
        assert_eq!(active, vec![ScanTarget::new("ETHUSDT", Timeframe::M5)]);
    }

    #[tokio::test]
    async fn unsupported_timeframe_row_is_skipped() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_target("SOLUSDT", Timeframe::M15, true).await.unwrap();
        sqlx::query("INSERT INTO targets (symbol, timeframe, active) VALUES ('XRPUSDT', '45m', 1)")
            .execute(store.pool())
            .await
            .unwrap();

        let active = store.active_targets().await.unwrap();
        assert_eq!(active, vec![ScanTarget::new("SOLUSDT", Timeframe::M15)]);
    }

    #[tokio::test]
    async fn toggles_are_read_fresh() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.set_direction_enabled(Direction::CloseShort, false).await.unwrap();
        assert!(!store.direction_enabled(Direction::CloseShort).await.unwrap());
        assert!(!store.direction_toggles().await.unwrap().close_short);

        store.set_direction_enabled(Direction::CloseShort, true).await.unwrap();
        assert!(store.direction_toggles().await.unwrap().close_short);

        store.set_scanning_enabled(false).await.unwrap();
        assert!(!store.scanning_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn seeded_toggles_apply_to_fresh_database_once() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut initial = DirectionToggles::all_enabled();
        initial.short_entry = false;
        store.seed_direction_toggles(&initial).await.unwrap();

        assert!(!store.direction_enabled(Direction::ShortEntry).await.unwrap());
        assert_eq!(store.direction_toggles().await.unwrap(), initial);

        // A restart with a different file keeps the stored values.
        store
            .seed_direction_toggles(&DirectionToggles::all_disabled())
            .await
            .unwrap();
        assert_eq!(store.direction_toggles().await.unwrap(), initial);
    }

    #[tokio::test]
    async fn audit_log_keeps_record_and_failed_deliveries() {
        let store = SqliteStore::in_memory().await.unwrap();
        let record = DispatchRecord::new(verdict(Direction::LongEntry), Utc::now());
        store.append(&record).await.unwrap();
        store
            .append_deliveries(
                &record.id,
                &[
                    SinkResult::failure("telegram", "timed out"),
                    SinkResult::failure("webhook", "HTTP 500"),
                ],
            )
            .await
            .unwrap();

        let signals = store.recent_signals(10).await.unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].direction, "LONG_ENTRY");
        assert_eq!(signals[0].timeframe, "1h");
        assert_eq!(signals[0].price, 101.5);

        let deliveries = store.deliveries_for(&record.id).await.unwrap();
        assert_eq!(deliveries.len(), 2);
        assert!(deliveries.iter().all(|d| !d.ok));
        assert_eq!(deliveries[1].error.as_deref(), Some("HTTP 500"));
    }

    #[tokio::test]
    async fn cycle_reports_accumulate() {
        let store = SqliteStore::in_memory().await.unwrap();
        let report = CycleReport {
            cycle: 1,
            targets: 5,
            evaluated: 4,
            signals: 2,
            suppressed: 1,
            dispatched: 1,
            skipped: 1,
        };
        store.record_cycle(&report).await.unwrap();
        store.record_cycle(&report).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats["total_scans"], 8);
        assert_eq!(stats["signals_sent"], 2);
        assert_eq!(stats["suppressed"], 2);
        assert_eq!(stats["errors"], 2);
    }
}
