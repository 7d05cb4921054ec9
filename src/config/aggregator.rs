// src/config/aggregator.rs
use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::ingest::health::BreakerPolicy;

pub const ENV_CONFIG_PATH: &str = "AGGREGATOR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/aggregator.toml";

pub const ENV_FAILURE_THRESHOLD: &str = "NEWS_FAILURE_THRESHOLD";
pub const ENV_RECOVERY_DELAY_SECS: &str = "NEWS_RECOVERY_DELAY_SECS";
pub const ENV_CACHE_TTL_SECS: &str = "NEWS_CACHE_TTL_SECS";
pub const ENV_MARKET_TZ: &str = "NEWS_MARKET_TZ";

const MIN_RECOVERY_SECS: u64 = 120;
const MAX_RECOVERY_SECS: u64 = 300;

fn default_failure_threshold() -> u32 {
    5
}
fn default_recovery_delay_secs() -> u64 {
    180
}
fn default_max_recovery_delay_secs() -> u64 {
    900
}
fn default_cache_ttl_secs() -> u64 {
    12 * 3600
}
fn default_per_call_timeout_ms() -> u64 {
    8_000
}
fn default_lookback_hours() -> u32 {
    24
}
fn default_limit() -> usize {
    10
}
fn default_market_timezone() -> String {
    "America/New_York".to_string()
}
fn default_market_topic() -> String {
    "stock market".to_string()
}
fn default_enabled() -> bool {
    true
}

/// Per-provider knobs. Unset fields fall back to the adapter's own defaults.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProviderSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub min_interval_ms: Option<u64>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the env var holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_ms: None,
            base_url: None,
            api_key_env: None,
        }
    }
}

impl ProviderSettings {
    pub fn min_interval_or(&self, default_ms: u64) -> Duration {
        Duration::from_millis(self.min_interval_ms.unwrap_or(default_ms))
    }

    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| default.to_string())
    }

    /// Reads the API key from the configured env var (or `default_env`).
    /// Blank values count as missing.
    pub fn resolve_key(&self, default_env: &str) -> Option<String> {
        let var = self.api_key_env.as_deref().unwrap_or(default_env);
        std::env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Static configuration, loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_delay_secs")]
    pub recovery_delay_secs: u64,
    #[serde(default = "default_max_recovery_delay_secs")]
    pub max_recovery_delay_secs: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_per_call_timeout_ms")]
    pub per_call_timeout_ms: u64,
    /// Overall budget for one aggregation; unset means wait for every provider.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    #[serde(default = "default_lookback_hours")]
    pub default_lookback_hours: u32,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_market_timezone")]
    pub market_timezone: String,
    /// Topic used for general market news in `get_market_news`.
    #[serde(default = "default_market_topic")]
    pub market_topic: String,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
    /// Extra names that count as a mention of a ticker, e.g. AAPL = ["Apple"].
    #[serde(default)]
    pub aliases: HashMap<String, Vec<String>>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_delay_secs: default_recovery_delay_secs(),
            max_recovery_delay_secs: default_max_recovery_delay_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            per_call_timeout_ms: default_per_call_timeout_ms(),
            deadline_ms: None,
            default_lookback_hours: default_lookback_hours(),
            default_limit: default_limit(),
            market_timezone: default_market_timezone(),
            market_topic: default_market_topic(),
            providers: BTreeMap::new(),
            aliases: HashMap::new(),
        }
    }
}

impl AggregatorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AggregatorConfig = toml::from_str(s).context("parsing aggregator toml")?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Clamp values into their supported ranges.
    pub fn sanitize(&mut self) {
        self.failure_threshold = self.failure_threshold.max(1);
        self.recovery_delay_secs = self
            .recovery_delay_secs
            .clamp(MIN_RECOVERY_SECS, MAX_RECOVERY_SECS);
        self.max_recovery_delay_secs = self.max_recovery_delay_secs.max(self.recovery_delay_secs);
        if self.cache_ttl_secs == 0 {
            self.cache_ttl_secs = default_cache_ttl_secs();
        }
        if self.per_call_timeout_ms == 0 {
            self.per_call_timeout_ms = default_per_call_timeout_ms();
        }
        if self.deadline_ms == Some(0) {
            self.deadline_ms = None;
        }
        if self.default_lookback_hours == 0 {
            self.default_lookback_hours = default_lookback_hours();
        }
        if self.default_limit == 0 {
            self.default_limit = default_limit();
        }
        if self.market_timezone.parse::<Tz>().is_err() {
            warn!(tz = %self.market_timezone, "unknown market timezone, using America/New_York");
            self.market_timezone = default_market_timezone();
        }
    }

    /// Env vars win over file values.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = parse_env::<u32>(ENV_FAILURE_THRESHOLD) {
            self.failure_threshold = v;
        }
        if let Some(v) = parse_env::<u64>(ENV_RECOVERY_DELAY_SECS) {
            self.recovery_delay_secs = v;
        }
        if let Some(v) = parse_env::<u64>(ENV_CACHE_TTL_SECS) {
            self.cache_ttl_secs = v;
        }
        if let Ok(tz) = std::env::var(ENV_MARKET_TZ) {
            if !tz.trim().is_empty() {
                self.market_timezone = tz.trim().to_string();
            }
        }
        self.sanitize();
    }

    pub fn market_tz(&self) -> Tz {
        self.market_timezone
            .parse::<Tz>()
            .unwrap_or(chrono_tz::America::New_York)
    }

    pub fn breaker_policy(&self) -> BreakerPolicy {
        BreakerPolicy {
            failure_threshold: self.failure_threshold,
            recovery_delay: chrono::Duration::seconds(self.recovery_delay_secs as i64),
            max_recovery_delay: chrono::Duration::seconds(self.max_recovery_delay_secs as i64),
        }
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs as i64)
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// Settings for one provider (defaults when the section is absent).
    pub fn provider(&self, name: &str) -> ProviderSettings {
        self.providers.get(name).cloned().unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

/// Load config from an explicit TOML file, then apply env overrides.
pub fn load_config_from(path: &Path) -> Result<AggregatorConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading aggregator config from {}", path.display()))?;
    let mut cfg = AggregatorConfig::from_toml_str(&content)?;
    cfg.apply_env_overrides();
    Ok(cfg)
}

/// Load config using env var + fallbacks:
/// 1) $AGGREGATOR_CONFIG_PATH
/// 2) config/aggregator.toml
/// 3) built-in defaults
pub fn load_config_default() -> Result<AggregatorConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
    if default_p.exists() {
        return load_config_from(&default_p);
    }
    let mut cfg = AggregatorConfig::default();
    cfg.apply_env_overrides();
    Ok(cfg)
}
