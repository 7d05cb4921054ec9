// src/ingest/health.rs
//! Per-provider circuit breaker registry.
//!
//! Closed → Open after `failure_threshold` consecutive failures. Once
//! `disabled_until` has passed, the next `is_available` call moves the entry to
//! HalfOpen and grants exactly one trial call. Trial success closes the breaker;
//! trial failure re-opens it with the recovery delay doubled (capped).
//!
//! The provider map is fixed at construction; each entry has its own lock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerPolicy {
    pub failure_threshold: u32,
    pub recovery_delay: Duration,
    /// Upper bound for the backed-off delay after failed trials.
    pub max_recovery_delay: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_delay: Duration::seconds(180),
            max_recovery_delay: Duration::seconds(900),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open { until: DateTime<Utc> },
    /// Trial call granted and not yet settled.
    HalfOpen,
    /// No credential configured; skipped for the life of the process.
    Unconfigured,
}

impl BreakerState {
    fn label(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open { .. } => "open",
            BreakerState::HalfOpen => "half_open",
            BreakerState::Unconfigured => "unconfigured",
        }
    }
}

#[derive(Debug)]
struct Entry {
    consecutive_failures: u32,
    state: BreakerState,
    current_delay: Duration,
}

/// Read-only view of one provider's health.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProviderHealth {
    pub provider: String,
    pub state: &'static str,
    pub consecutive_failures: u32,
    pub disabled: bool,
    pub disabled_until: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct ProviderRegistry {
    policy: BreakerPolicy,
    entries: HashMap<String, Mutex<Entry>>,
}

impl ProviderRegistry {
    pub fn new<I, S>(providers: I, mut policy: BreakerPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        policy.failure_threshold = policy.failure_threshold.max(1);
        if policy.max_recovery_delay < policy.recovery_delay {
            policy.max_recovery_delay = policy.recovery_delay;
        }
        let entries = providers
            .into_iter()
            .map(|p| {
                (
                    p.into(),
                    Mutex::new(Entry {
                        consecutive_failures: 0,
                        state: BreakerState::Closed,
                        current_delay: policy.recovery_delay,
                    }),
                )
            })
            .collect();
        Self { policy, entries }
    }

    fn entry(&self, provider: &str) -> Option<MutexGuard<'_, Entry>> {
        match self.entries.get(provider) {
            Some(m) => Some(m.lock().unwrap_or_else(PoisonError::into_inner)),
            None => {
                warn!(provider, "health lookup for unregistered provider");
                None
            }
        }
    }

    pub fn is_available(&self, provider: &str) -> bool {
        self.is_available_at(provider, Utc::now())
    }

    /// May claim the single trial slot of an open breaker whose delay has elapsed.
    pub fn is_available_at(&self, provider: &str, now: DateTime<Utc>) -> bool {
        let Some(mut e) = self.entry(provider) else {
            return false;
        };
        let state = e.state;
        match state {
            BreakerState::Closed => true,
            BreakerState::Open { until } if now >= until => {
                e.state = BreakerState::HalfOpen;
                info!(provider, "recovery delay elapsed, granting trial call");
                true
            }
            BreakerState::Open { .. } | BreakerState::HalfOpen | BreakerState::Unconfigured => {
                false
            }
        }
    }

    pub fn record_success(&self, provider: &str) {
        self.record_success_at(provider, Utc::now());
    }

    pub fn record_success_at(&self, provider: &str, _now: DateTime<Utc>) {
        let Some(mut e) = self.entry(provider) else {
            return;
        };
        if e.state == BreakerState::Unconfigured {
            return;
        }
        if e.state != BreakerState::Closed {
            info!(provider, "breaker closed after successful call");
        }
        e.consecutive_failures = 0;
        e.current_delay = self.policy.recovery_delay;
        e.state = BreakerState::Closed;
    }

    pub fn record_failure(&self, provider: &str) {
        self.record_failure_at(provider, Utc::now());
    }

    pub fn record_failure_at(&self, provider: &str, now: DateTime<Utc>) {
        let Some(mut e) = self.entry(provider) else {
            return;
        };
        e.consecutive_failures = e.consecutive_failures.saturating_add(1);

        let state = e.state;
        match state {
            BreakerState::Closed if e.consecutive_failures >= self.policy.failure_threshold => {
                let until = now + e.current_delay;
                e.state = BreakerState::Open { until };
                counter!("news_breaker_open_total", "provider" => provider.to_string())
                    .increment(1);
                error!(
                    provider,
                    failures = e.consecutive_failures,
                    cooldown_secs = e.current_delay.num_seconds(),
                    "circuit breaker tripped, provider disabled"
                );
            }
            BreakerState::HalfOpen => {
                let next = (e.current_delay * 2).min(self.policy.max_recovery_delay);
                e.current_delay = next;
                e.state = BreakerState::Open { until: now + next };
                counter!("news_breaker_open_total", "provider" => provider.to_string())
                    .increment(1);
                warn!(
                    provider,
                    cooldown_secs = next.num_seconds(),
                    "trial call failed, breaker re-opened"
                );
            }
            _ => {}
        }
    }

    /// Credential missing: skip for the rest of the process, no breaker accounting.
    pub fn mark_unconfigured(&self, provider: &str) {
        if let Some(mut e) = self.entry(provider) {
            if e.state != BreakerState::Unconfigured {
                info!(provider, "no credential configured, provider skipped");
            }
            e.state = BreakerState::Unconfigured;
        }
    }

    /// A granted trial was cancelled before it settled: hand the slot back so the
    /// next caller can try again.
    pub fn abandon_trial_at(&self, provider: &str, now: DateTime<Utc>) {
        if let Some(mut e) = self.entry(provider) {
            if e.state == BreakerState::HalfOpen {
                e.state = BreakerState::Open { until: now };
            }
        }
    }

    pub fn health(&self, provider: &str) -> Option<ProviderHealth> {
        let e = self.entry(provider)?;
        Some(view(provider, &e))
    }

    /// Sorted by provider id.
    pub fn snapshot(&self) -> Vec<ProviderHealth> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .map(|(p, m)| view(p, &m.lock().unwrap_or_else(PoisonError::into_inner)))
            .collect();
        out.sort_by(|a, b| a.provider.cmp(&b.provider));
        out
    }
}

fn view(provider: &str, e: &Entry) -> ProviderHealth {
    ProviderHealth {
        provider: provider.to_string(),
        state: e.state.label(),
        consecutive_failures: e.consecutive_failures,
        disabled: e.state != BreakerState::Closed,
        disabled_until: match e.state {
            BreakerState::Open { until } => Some(until),
            _ => None,
        },
    }
}
