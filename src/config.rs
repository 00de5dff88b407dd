//! Engine configuration for challenge runs.
//!
//! All knobs the invocation surface exposes live here: the per-step
//! iteration budget, capability retry and timeout policy, scoring weights,
//! and batch concurrency. Capability implementations receive their own
//! configuration explicitly at construction; there is no process-wide
//! client state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default iteration budget per step.
const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Default number of retries after a failed capability call.
const DEFAULT_CAPABILITY_RETRIES: u32 = 1;

/// Default agent call timeout.
const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 120;

/// Default comparator call timeout.
const DEFAULT_COMPARATOR_TIMEOUT_SECS: u64 = 60;

/// Default credit for a step satisfied only through non-gold alternatives.
const DEFAULT_NONGOLD_CREDIT: f64 = 0.5;

/// Default number of challenge runs evaluated concurrently in a batch.
const DEFAULT_BATCH_CONCURRENCY: usize = 2;

/// How a combinator node folds its children's weights into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineRule {
    /// Credit capped by the weakest child.
    Min,
    /// Credit via the best child.
    Max,
    /// Average credit across children.
    Mean,
}

impl CombineRule {
    /// Fold child weights according to this rule. Empty input yields 0.0.
    pub fn combine<I>(&self, values: I) -> f64
    where
        I: IntoIterator<Item = f64>,
    {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }

        if count == 0 {
            return 0.0;
        }

        match self {
            CombineRule::Min => min,
            CombineRule::Max => max,
            CombineRule::Mean => sum / count as f64,
        }
    }
}

/// Scoring weights for the alternative tree.
///
/// Both the non-gold credit and the And/Or combination rules are
/// configurable; min/max are the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightConfig {
    /// Credit in (0, 1) for a completed non-gold leaf.
    pub nongold_credit: f64,
    /// How an `and` group combines child weights.
    pub and_rule: CombineRule,
    /// How an `or` group combines child weights.
    pub or_rule: CombineRule,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            nongold_credit: DEFAULT_NONGOLD_CREDIT,
            and_rule: CombineRule::Min,
            or_rule: CombineRule::Max,
        }
    }
}

impl WeightConfig {
    /// Set the credit for completed non-gold leaves.
    pub fn with_nongold_credit(mut self, credit: f64) -> Self {
        self.nongold_credit = credit;
        self
    }

    /// Set the combination rule for `and` groups.
    pub fn with_and_rule(mut self, rule: CombineRule) -> Self {
        self.and_rule = rule;
        self
    }

    /// Set the combination rule for `or` groups.
    pub fn with_or_rule(mut self, rule: CombineRule) -> Self {
        self.or_rule = rule;
        self
    }

    /// Validate the weight configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.nongold_credit > 0.0 && self.nongold_credit < 1.0) {
            return Err(ConfigError::NongoldCreditOutOfRange(self.nongold_credit));
        }
        Ok(())
    }
}

/// Configuration for the evaluation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum Prompt/Evaluate iterations per step before `Exhausted`.
    pub max_iterations: u32,
    /// Retries after a failed agent or comparator call, per call site.
    /// The first attempt is not a retry: `1` means up to two attempts.
    pub capability_retries: u32,
    /// Timeout applied around each agent call.
    pub agent_timeout: Duration,
    /// Timeout applied around each comparator call.
    pub comparator_timeout: Duration,
    /// Scoring weights.
    pub weights: WeightConfig,
    /// Concurrent challenge runs in a batch.
    pub batch_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            capability_retries: DEFAULT_CAPABILITY_RETRIES,
            agent_timeout: Duration::from_secs(DEFAULT_AGENT_TIMEOUT_SECS),
            comparator_timeout: Duration::from_secs(DEFAULT_COMPARATOR_TIMEOUT_SECS),
            weights: WeightConfig::default(),
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

impl EngineConfig {
    /// Set the per-step iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the retry count for capability calls.
    pub fn with_capability_retries(mut self, retries: u32) -> Self {
        self.capability_retries = retries;
        self
    }

    /// Set the agent call timeout.
    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    /// Set the comparator call timeout.
    pub fn with_comparator_timeout(mut self, timeout: Duration) -> Self {
        self.comparator_timeout = timeout;
        self
    }

    /// Set the scoring weights.
    pub fn with_weights(mut self, weights: WeightConfig) -> Self {
        self.weights = weights;
        self
    }

    /// Set the batch concurrency limit.
    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency;
        self
    }

    /// Validate the configuration, rejecting values that would make the
    /// engine's termination or scoring guarantees meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::ZeroIterationBudget);
        }
        if self.batch_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.agent_timeout.is_zero() || self.comparator_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        self.weights.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = EngineConfig::default().with_max_iterations(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroIterationBudget)
        ));
    }

    #[test]
    fn test_nongold_credit_bounds() {
        for bad in [0.0, 1.0, -0.5, 1.5] {
            let config =
                EngineConfig::default().with_weights(WeightConfig::default().with_nongold_credit(bad));
            assert!(
                matches!(config.validate(), Err(ConfigError::NongoldCreditOutOfRange(v)) if v == bad),
                "credit {bad} should be rejected"
            );
        }
        let config =
            EngineConfig::default().with_weights(WeightConfig::default().with_nongold_credit(0.3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = EngineConfig::default().with_batch_concurrency(0);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroConcurrency)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = EngineConfig::default().with_agent_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn test_combine_rules() {
        let values = [0.2, 0.8, 0.5];
        assert_eq!(CombineRule::Min.combine(values), 0.2);
        assert_eq!(CombineRule::Max.combine(values), 0.8);
        assert!((CombineRule::Mean.combine(values) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_combine_empty_is_zero() {
        assert_eq!(CombineRule::Min.combine(std::iter::empty()), 0.0);
        assert_eq!(CombineRule::Max.combine(std::iter::empty()), 0.0);
        assert_eq!(CombineRule::Mean.combine(std::iter::empty()), 0.0);
    }
}
