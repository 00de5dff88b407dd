//! Run scoring.

use crate::config::WeightConfig;
use crate::error::ConfigError;

use super::state::StepResult;

/// Score a challenge run as the arithmetic mean of the per-step weights.
///
/// Partial credit flows entirely from the weight rules on each step's final
/// tree; the step outcome is not consulted separately. A run with zero
/// steps cannot be scored and is rejected as configuration, not data.
pub fn score(steps: &[StepResult], weights: &WeightConfig) -> Result<f64, ConfigError> {
    if steps.is_empty() {
        return Err(ConfigError::NoSteps);
    }
    let total: f64 = steps.iter().map(|step| step.weight(weights)).sum();
    Ok(total / steps.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::{AlternativeNode, LeafId};
    use crate::evaluator::state::StepOutcome;

    fn step(tree: AlternativeNode, outcome: StepOutcome) -> StepResult {
        StepResult {
            step_index: 0,
            description: "step".to_string(),
            outcome,
            iterations: 1,
            tree,
            turns: vec![],
        }
    }

    fn completed_leaf(gold: bool) -> AlternativeNode {
        let mut tree = AlternativeNode::leaf(0, "nmap -sV 10.0.0.1", gold);
        tree.apply_match(LeafId(0), "nmap -sV 10.0.0.1");
        tree
    }

    #[test]
    fn test_zero_steps_is_a_config_error() {
        assert!(matches!(
            score(&[], &WeightConfig::default()),
            Err(ConfigError::NoSteps)
        ));
    }

    #[test]
    fn test_all_gold_steps_score_one() {
        let steps = vec![
            step(completed_leaf(true), StepOutcome::Success),
            step(completed_leaf(true), StepOutcome::Success),
        ];
        assert_eq!(score(&steps, &WeightConfig::default()).unwrap(), 1.0);
    }

    #[test]
    fn test_mean_over_mixed_steps() {
        let steps = vec![
            step(completed_leaf(true), StepOutcome::Success),
            step(
                AlternativeNode::leaf(0, "id", true),
                StepOutcome::Exhausted,
            ),
        ];
        assert_eq!(score(&steps, &WeightConfig::default()).unwrap(), 0.5);
    }

    #[test]
    fn test_nongold_credit_flows_into_the_mean() {
        let steps = vec![step(completed_leaf(false), StepOutcome::Success)];
        let weights = WeightConfig::default().with_nongold_credit(0.25);
        assert_eq!(score(&steps, &weights).unwrap(), 0.25);
    }

    #[test]
    fn test_all_exhausted_scores_zero() {
        let steps = vec![
            step(
                AlternativeNode::leaf(0, "id", true),
                StepOutcome::Exhausted,
            ),
            step(
                AlternativeNode::leaf(0, "whoami", false),
                StepOutcome::Exhausted,
            ),
        ];
        assert_eq!(score(&steps, &WeightConfig::default()).unwrap(), 0.0);
    }
}
