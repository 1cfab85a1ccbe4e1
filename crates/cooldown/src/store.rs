use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use common::{Direction, SignalVerdict, Timeframe};

/// Identity of a cooldown slot: one per (symbol, timeframe, direction).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: Direction,
}

impl CooldownKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, direction: Direction) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            direction,
        }
    }

    /// `None` for a `NONE` verdict, which never occupies a slot.
    pub fn for_verdict(verdict: &SignalVerdict) -> Option<Self> {
        if verdict.direction == Direction::None {
            return None;
        }
        Some(Self::new(
            verdict.target.symbol.clone(),
            verdict.target.timeframe,
            verdict.direction,
        ))
    }
}

impl std::fmt::Display for CooldownKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.symbol, self.timeframe, self.direction)
    }
}

/// How long a key stays suppressed after an emission.
///
/// Entry cooldowns grow with the timeframe; exits use `exit_factor` of the
/// entry cooldown so they are delivered sooner.
///
/// Example `[cooldown]` section of `config/scanner.toml`:
/// ```toml
/// [cooldown]
/// exit_factor = 0.5
///
/// [cooldown.entry_secs]
/// "1h" = 3600
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownPolicy {
    /// Per-timeframe overrides of the entry cooldown, in seconds.
    pub entry_secs: BTreeMap<Timeframe, u64>,
    pub exit_factor: f64,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            entry_secs: BTreeMap::new(),
            exit_factor: 0.5,
        }
    }
}

impl CooldownPolicy {
    fn default_entry_secs(timeframe: Timeframe) -> u64 {
        match timeframe {
            Timeframe::M1 => 240,
            Timeframe::M3 => 360,
            Timeframe::M5 => 480,
            Timeframe::M15 => 720,
            Timeframe::M30 => 1800,
            Timeframe::H1 => 3600,
            Timeframe::H4 => 10_800,
        }
    }

    pub fn cooldown(&self, timeframe: Timeframe, direction: Direction) -> Duration {
        let entry_secs = self
            .entry_secs
            .get(&timeframe)
            .copied()
            .unwrap_or_else(|| Self::default_entry_secs(timeframe));
        let entry = Duration::seconds(entry_secs as i64);
        if direction.is_exit() {
            let factor = self.exit_factor.clamp(0.0, 1.0);
            Duration::milliseconds((entry.num_milliseconds() as f64 * factor) as i64)
        } else {
            entry
        }
    }
}

/// Gatekeeper between the classifier and the dispatcher.
///
/// Every non-`NONE` verdict MUST pass `admit()` before dispatch. A key is
/// `Idle` when it has no entry or its cooldown has elapsed, and `Suppressed`
/// otherwise. Suppressed verdicts are dropped, never queued.
pub struct CooldownStore {
    policy: CooldownPolicy,
    last_emitted: Mutex<HashMap<CooldownKey, DateTime<Utc>>>,
}

impl CooldownStore {
    pub fn new(policy: CooldownPolicy) -> Self {
        Self {
            policy,
            last_emitted: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &CooldownPolicy {
        &self.policy
    }

    /// Atomically check and record an emission.
    ///
    /// Returns true and stores `now` iff the key is idle, i.e. it was never
    /// emitted or `now - last > cooldown`. Otherwise returns false and leaves
    /// the stored timestamp untouched.
    pub async fn admit(&self, key: &CooldownKey, now: DateTime<Utc>) -> bool {
        let cooldown = self.policy.cooldown(key.timeframe, key.direction);
        let mut last_emitted = self.last_emitted.lock().await;

        if let Some(&last) = last_emitted.get(key) {
            if now - last <= cooldown {
                debug!(
                    key = %key,
                    remaining_secs = (cooldown - (now - last)).num_seconds(),
                    "Verdict suppressed by cooldown"
                );
                return false;
            }
        }

        last_emitted.insert(key.clone(), now);
        true
    }

    pub async fn last_emitted(&self, key: &CooldownKey) -> Option<DateTime<Utc>> {
        self.last_emitted.lock().await.get(key).copied()
    }

    pub async fn len(&self) -> usize {
        self.last_emitted.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Forget keys whose cooldown has already elapsed. Such keys are idle
    /// either way, so admission results do not change. Returns the number
    /// of keys removed.
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let mut last_emitted = self.last_emitted.lock().await;
        let before = last_emitted.len();
        last_emitted.retain(|key, &mut last| {
            now - last <= self.policy.cooldown(key.timeframe, key.direction)
        });
        before - last_emitted.len()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
