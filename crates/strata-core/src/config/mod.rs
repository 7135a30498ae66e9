//! Configuration system for strata.
//!
//! Every numeric default (buffer capacity, fresh window, k, decay floor,
//! EMA alpha, ...) is a design default, not a fixed requirement, and can be
//! overridden from a file, from `STRATA_*` environment variables, or through
//! the builder.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{StrataError, StrataResult};
use crate::types::{Signal, MAX_LEAD_TIME_SECS};

/// Focus buffer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    /// Maximum resident items (5-9 is the intended range).
    pub capacity: usize,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self { capacity: 7 }
    }
}

/// Fresh buffer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshConfig {
    /// Retention window in seconds.
    pub window_secs: u64,
}

impl Default for FreshConfig {
    fn default() -> Self {
        Self { window_secs: 600 }
    }
}

/// Signal extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Time constant of the recency curve `exp(-dt / tau)`, in seconds.
    pub recency_tau_secs: f64,
    /// Similarity at or above which a stored item counts as a repetition.
    pub similarity_threshold: f32,
    /// Number of similar items fetched for novelty and repetition.
    pub comparison_window: usize,
    /// Repetitions at which the repetition signal saturates at 1.0.
    pub repetition_saturation: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            recency_tau_secs: 3600.0,
            similarity_threshold: 0.6,
            comparison_window: 20,
            repetition_saturation: 5,
        }
    }
}

/// Priority thresholds for tier assignment.
///
/// Priorities below `archival` are discarded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub focus: f32,
    pub fresh: f32,
    pub long_term: f32,
    pub archival: f32,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            focus: 0.85,
            fresh: 0.6,
            long_term: 0.25,
            archival: 0.0,
        }
    }
}

/// Router and weight-learning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub thresholds: TierThresholds,
    /// Initial weight per signal for agents with no learned vector.
    pub default_weights: BTreeMap<Signal, f32>,
    /// Initial gradient step size.
    pub learning_rate: f32,
    /// Largest absolute change of one weight in one cycle.
    pub max_step: f32,
    /// Learning rate never halves below this value.
    pub min_learning_rate: f32,
    /// Consecutive degrading cycles that halve the learning rate.
    pub degradation_cycles: usize,
    /// Cycles averaged into the rolling accuracy.
    pub accuracy_window: usize,
    /// Maximum feedback samples consumed per learning cycle.
    pub feedback_batch_size: usize,
}

impl RouterConfig {
    /// Weights used when nothing has been learned yet.
    pub fn builtin_weights() -> BTreeMap<Signal, f32> {
        BTreeMap::from([
            (Signal::Recency, 0.35),
            (Signal::Intensity, 0.3),
            (Signal::Novelty, 0.25),
            (Signal::GoalRelevance, 0.3),
            (Signal::SocialSignificance, 0.2),
            (Signal::Repetition, 0.15),
            (Signal::ExplicitFlag, 1.0),
        ])
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            thresholds: TierThresholds::default(),
            default_weights: Self::builtin_weights(),
            learning_rate: 0.05,
            max_step: 0.1,
            min_learning_rate: 0.001,
            degradation_cycles: 3,
            accuracy_window: 10,
            feedback_batch_size: 256,
        }
    }
}

/// Decay engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Base decay rate per hour for long_term items.
    pub long_term_base_rate: f64,
    /// Base decay rate per hour for archival items.
    pub archival_base_rate: f64,
    /// Items below this strength are purged.
    pub floor: f32,
    /// Strength restored by one reinforcement.
    pub reinforcement_boost: f32,
    /// long_term items below this strength move to archival.
    pub archive_threshold: f32,
    /// Minimum item age before the archival move, in hours.
    pub min_archive_age_hours: u64,
    /// Reinforcement count at which an item proposes a pattern; 0 disables.
    pub promotion_candidate_after: u32,
    /// Items scanned per sweep batch.
    pub batch_size: usize,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            long_term_base_rate: 0.02,
            archival_base_rate: 0.005,
            floor: 0.05,
            reinforcement_boost: 0.25,
            archive_threshold: 0.3,
            min_archive_age_hours: 24,
            promotion_candidate_after: 3,
            batch_size: 500,
        }
    }
}

/// Pattern sharing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharingConfig {
    /// Minimum corroborating occurrences before exposure.
    pub k: u64,
    /// Minimum distinct contributing agents before exposure.
    pub min_distinct_contributors: u64,
    /// Largest absolute noise added to exposed counts.
    pub noise_bound: u64,
    /// Vote tally at which a shared pattern is reinforced.
    pub reinforce_votes: i64,
    /// Negative vote tally at which a shared pattern is deprecated.
    pub deprecate_votes: i64,
    /// Confidence below which a shared pattern is deprecated.
    pub deprecate_confidence: f32,
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            k: 5,
            min_distinct_contributors: 5,
            noise_bound: 2,
            reinforce_votes: 3,
            deprecate_votes: 3,
            deprecate_confidence: 0.15,
        }
    }
}

/// Outcome predictor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// EMA weight of a new accuracy score.
    pub alpha: f32,
    /// Context matches below this score produce no prediction.
    pub min_match: f32,
    /// Half-width of a predicted window, in seconds.
    pub window_tolerance_secs: i64,
    /// Distance outside the window that still earns partial credit, in seconds.
    pub near_miss_tolerance_secs: i64,
    /// Maximum credit for a near miss.
    pub near_miss_credit: f32,
    /// How long verified and expired predictions are kept, in seconds.
    pub retention_secs: i64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            alpha: 0.2,
            min_match: 0.3,
            window_tolerance_secs: 1800,
            near_miss_tolerance_secs: 3600,
            near_miss_credit: 0.5,
            retention_secs: 7 * 24 * 3600,
        }
    }
}

/// Retry policy for compare-and-set conflicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 5,
            max_delay_ms: 200,
        }
    }
}

/// Recall settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    /// Upper bound on returned items.
    pub max_results: usize,
    /// Items scanned per persisted tier.
    pub scan_limit: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            max_results: 20,
            scan_limit: 1000,
        }
    }
}

/// Storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let strata_dir = dirs::home_dir()
            .map(|h| h.join(".strata"))
            .unwrap_or_else(|| PathBuf::from(".strata"));
        Self {
            backend: StoreBackend::Memory,
            path: strata_dir.join("memory.db"),
        }
    }
}

/// Background worker and job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Classification workers.
    pub workers: usize,
    /// Bounded inbound queue length.
    pub queue_capacity: usize,
    pub long_term_decay_interval_secs: u64,
    pub archival_decay_interval_secs: u64,
    pub fresh_flush_interval_secs: u64,
    pub learning_interval_secs: u64,
    pub prediction_expiry_interval_secs: u64,
    pub enable_decay: bool,
    pub enable_learning: bool,
    pub enable_prediction_expiry: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            long_term_decay_interval_secs: 3600,
            archival_decay_interval_secs: 86_400,
            fresh_flush_interval_secs: 30,
            learning_interval_secs: 300,
            prediction_expiry_interval_secs: 300,
            enable_decay: true,
            enable_learning: true,
            enable_prediction_expiry: true,
        }
    }
}

/// Main engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub focus: FocusConfig,
    pub fresh: FreshConfig,
    pub signals: SignalConfig,
    pub router: RouterConfig,
    pub decay: DecayConfig,
    pub sharing: SharingConfig,
    pub prediction: PredictionConfig,
    pub retry: RetryPolicy,
    pub recall: RecallConfig,
    pub runtime: RuntimeConfig,
    pub store: StoreConfig,
}

impl EngineConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> StrataResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => toml::from_str(&content).map_err(|e| StrataError::Configuration(e.to_string()))?,
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| StrataError::Configuration(e.to_string()))?
            }
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| StrataError::Configuration(e.to_string()))?
            }
            _ => {
                return Err(StrataError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables on top of the defaults.
    ///
    /// Reads `STRATA_FOCUS_CAPACITY`, `STRATA_FRESH_WINDOW_SECS`, `STRATA_K`,
    /// `STRATA_DECAY_FLOOR`, `STRATA_EMA_ALPHA`, `STRATA_WORKERS`,
    /// `STRATA_STORE_BACKEND` and `STRATA_DB_PATH`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse("STRATA_FOCUS_CAPACITY") {
            config.focus.capacity = v;
        }
        if let Some(v) = env_parse("STRATA_FRESH_WINDOW_SECS") {
            config.fresh.window_secs = v;
        }
        if let Some(v) = env_parse::<u64>("STRATA_K") {
            config.sharing.k = v;
            config.sharing.min_distinct_contributors = config.sharing.min_distinct_contributors.min(v);
        }
        if let Some(v) = env_parse("STRATA_DECAY_FLOOR") {
            config.decay.floor = v;
        }
        if let Some(v) = env_parse("STRATA_EMA_ALPHA") {
            config.prediction.alpha = v;
        }
        if let Some(v) = env_parse("STRATA_WORKERS") {
            config.runtime.workers = v;
        }
        if let Ok(backend) = std::env::var("STRATA_STORE_BACKEND") {
            config.store.backend = match backend.to_lowercase().as_str() {
                "sqlite" => StoreBackend::Sqlite,
                _ => StoreBackend::Memory,
            };
        }
        if let Ok(path) = std::env::var("STRATA_DB_PATH") {
            config.store.path = PathBuf::from(path);
        }

        config
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Reject settings the engine cannot honour.
    pub fn validate(&self) -> StrataResult<()> {
        let fail = |msg: &str| Err(StrataError::Configuration(msg.to_string()));

        if self.focus.capacity == 0 {
            return fail("focus.capacity must be at least 1");
        }
        if self.fresh.window_secs == 0 || self.fresh.window_secs > MAX_LEAD_TIME_SECS as u64 {
            return fail("fresh.window_secs must be positive and at most one year");
        }
        if self.signals.recency_tau_secs <= 0.0 {
            return fail("signals.recency_tau_secs must be positive");
        }
        let t = &self.router.thresholds;
        if !(t.focus >= t.fresh && t.fresh >= t.long_term && t.long_term >= t.archival) {
            return fail("router.thresholds must be descending: focus >= fresh >= long_term >= archival");
        }
        if self.router.learning_rate <= 0.0 || self.router.max_step <= 0.0 {
            return fail("router.learning_rate and router.max_step must be positive");
        }
        if self.router.default_weights.values().map(|w| w.abs()).sum::<f32>() <= 0.0 {
            return fail("router.default_weights must not all be zero");
        }
        if !(0.0..1.0).contains(&self.decay.floor) {
            return fail("decay.floor must be in [0, 1)");
        }
        if self.decay.long_term_base_rate < 0.0 || self.decay.archival_base_rate < 0.0 {
            return fail("decay base rates must be non-negative");
        }
        if self.sharing.k == 0 {
            return fail("sharing.k must be at least 1");
        }
        if !(self.prediction.alpha > 0.0 && self.prediction.alpha <= 1.0) {
            return fail("prediction.alpha must be in (0, 1]");
        }
        let tolerances = [
            self.prediction.window_tolerance_secs,
            self.prediction.near_miss_tolerance_secs,
        ];
        if tolerances.iter().any(|t| !(0..=MAX_LEAD_TIME_SECS).contains(t)) {
            return fail("prediction tolerances must be between 0 and one year (in seconds)");
        }
        if self.prediction.retention_secs < 0 {
            return fail("prediction.retention_secs must be non-negative");
        }
        if self.runtime.queue_capacity == 0 {
            return fail("runtime.queue_capacity must be at least 1");
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Builder for EngineConfig.
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set focus buffer capacity.
    pub fn focus_capacity(mut self, capacity: usize) -> Self {
        self.config.focus.capacity = capacity;
        self
    }

    /// Set the fresh buffer window.
    pub fn fresh_window_secs(mut self, secs: u64) -> Self {
        self.config.fresh.window_secs = secs;
        self
    }

    /// Set router thresholds.
    pub fn thresholds(mut self, thresholds: TierThresholds) -> Self {
        self.config.router.thresholds = thresholds;
        self
    }

    /// Set the router configuration.
    pub fn router(mut self, router: RouterConfig) -> Self {
        self.config.router = router;
        self
    }

    /// Set the decay configuration.
    pub fn decay(mut self, decay: DecayConfig) -> Self {
        self.config.decay = decay;
        self
    }

    /// Set k and the distinct-contributor requirement together.
    pub fn k_anonymity(mut self, k: u64) -> Self {
        self.config.sharing.k = k;
        self.config.sharing.min_distinct_contributors = k;
        self
    }

    /// Set the sharing configuration.
    pub fn sharing(mut self, sharing: SharingConfig) -> Self {
        self.config.sharing = sharing;
        self
    }

    /// Set the prediction configuration.
    pub fn prediction(mut self, prediction: PredictionConfig) -> Self {
        self.config.prediction = prediction;
        self
    }

    /// Set the runtime configuration.
    pub fn runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.config.runtime = runtime;
        self
    }

    /// Set the store configuration.
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.focus.capacity, 7);
        assert_eq!(config.fresh.window_secs, 600);
        assert_eq!(config.sharing.k, 5);
        assert_eq!(config.decay.floor, 0.05);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let config = EngineConfig::builder().focus_capacity(0).build();
        assert!(matches!(config.validate(), Err(StrataError::Configuration(_))));
    }

    #[test]
    fn test_rejects_unordered_thresholds() {
        let config = EngineConfig::builder()
            .thresholds(TierThresholds {
                focus: 0.5,
                fresh: 0.6,
                long_term: 0.2,
                archival: 0.0,
            })
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unrepresentable_durations() {
        let config = EngineConfig::builder().fresh_window_secs(u64::MAX).build();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.prediction.window_tolerance_secs = i64::MAX;
        assert!(config.validate().is_err());
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_toml_file_with_partial_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[focus]\ncapacity = 5\n\n[sharing]\nk = 3\nmin_distinct_contributors = 3\n"
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.focus.capacity, 5);
        assert_eq!(config.sharing.k, 3);
        assert_eq!(config.fresh.window_secs, 600);
    }

    #[test]
    fn test_from_json_file_with_weights() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"router": {{"default_weights": {{"recency": 0.5, "explicit_flag": 1.0}}}}}}"#
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.router.default_weights.get(&Signal::Recency), Some(&0.5));
        assert_eq!(config.router.learning_rate, 0.05);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(EngineConfig::from_file(file.path()).is_err());
    }
}
