//! The per-step evaluation state machine.
//!
//! One step runs as a loop over three working phases plus a terminal one:
//!
//! ```text
//! Prompt -> Evaluate -> CheckTermination -> Done(Success | Exhausted)
//!    ^                        |
//!    +------------------------+
//! ```
//!
//! `Prompt` asks the agent for its next command, `Evaluate` has the
//! comparator judge it against the still-incomplete leaves and applies any
//! matches to the tree, and `CheckTermination` decides whether the step is
//! satisfied, out of budget, or goes around again. Capability failures are
//! retried a bounded number of times and then consume the iteration as a
//! non-match, so a dead provider degrades the score instead of hanging the
//! run. Cancellation is honored between phases, never mid-call.

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::capability::{
    Agent, AgentContext, AgentError, Comparator, ComparatorError, Prediction, VerdictMap,
};
use crate::config::EngineConfig;
use crate::error::EngineResult;

use super::orchestrator::CancellationFlag;
use super::state::{StepOutcome, StepResult, StepState, Turn};

/// Phases of the step evaluation loop.
enum Phase {
    Prompt,
    Evaluate(Prediction),
    CheckTermination { gave_up: bool },
    Done(StepOutcome),
}

/// Drives one step through the evaluation loop.
///
/// Holds no per-step state itself; the orchestrator hands it a fresh
/// [`StepState`] per step and reuses the evaluator across the run.
pub struct StepEvaluator<'a> {
    agent: &'a dyn Agent,
    comparator: &'a dyn Comparator,
    config: &'a EngineConfig,
    cancel: &'a CancellationFlag,
    challenge: &'a str,
}

impl<'a> StepEvaluator<'a> {
    pub fn new(
        agent: &'a dyn Agent,
        comparator: &'a dyn Comparator,
        config: &'a EngineConfig,
        cancel: &'a CancellationFlag,
        challenge: &'a str,
    ) -> Self {
        Self {
            agent,
            comparator,
            config,
            cancel,
            challenge,
        }
    }

    /// Run the step to a terminal outcome.
    ///
    /// `prior_commands` is the context carried forward from the preceding
    /// steps of the challenge. The only error this returns is cancellation;
    /// capability trouble never escapes the loop.
    pub async fn evaluate(
        &self,
        mut state: StepState,
        prior_commands: &[String],
    ) -> EngineResult<StepResult> {
        let mut phase = Phase::Prompt;

        loop {
            self.cancel.check()?;

            phase = match phase {
                Phase::Prompt => match self.predict_with_retry(&state, prior_commands).await {
                    Some(prediction) if prediction.is_give_up() => {
                        info!(
                            step = state.step_index() + 1,
                            iteration = state.iteration(),
                            "Agent conceded the step"
                        );
                        state.record(Turn::conceded(state.iteration(), prediction));
                        Phase::CheckTermination { gave_up: true }
                    }
                    Some(prediction) => Phase::Evaluate(prediction),
                    None => {
                        state.record(Turn::degraded(state.iteration(), None));
                        Phase::CheckTermination { gave_up: false }
                    }
                },

                Phase::Evaluate(prediction) => {
                    match self.compare_with_retry(&state, &prediction).await {
                        Some(verdicts) => {
                            let newly_completed = state.apply_verdicts(&verdicts);
                            debug!(
                                step = state.step_index() + 1,
                                iteration = state.iteration(),
                                command = %prediction.command,
                                newly_completed,
                                "Prediction judged"
                            );
                            state.record(Turn::answered(state.iteration(), prediction, verdicts));
                        }
                        None => {
                            state.record(Turn::degraded(state.iteration(), Some(prediction)));
                        }
                    }
                    Phase::CheckTermination { gave_up: false }
                }

                Phase::CheckTermination { gave_up } => {
                    if state.is_satisfied() {
                        Phase::Done(StepOutcome::Success)
                    } else if gave_up || state.iteration() >= self.config.max_iterations {
                        Phase::Done(StepOutcome::Exhausted)
                    } else {
                        state.advance();
                        Phase::Prompt
                    }
                }

                Phase::Done(outcome) => {
                    info!(
                        step = state.step_index() + 1,
                        iterations = state.iteration(),
                        outcome = %outcome,
                        "Step finished"
                    );
                    return Ok(state.into_result(outcome));
                }
            };
        }
    }

    /// Ask the agent for a prediction, retrying within the budget.
    ///
    /// `None` means the capability stayed down; the iteration then counts
    /// as a consumed non-match.
    async fn predict_with_retry(
        &self,
        state: &StepState,
        prior_commands: &[String],
    ) -> Option<Prediction> {
        let context = AgentContext {
            challenge: self.challenge.to_string(),
            step_index: state.step_index(),
            description: state.description().to_string(),
            prior_commands: prior_commands.to_vec(),
            rejected: state.rejected_predictions(),
        };

        let attempts = self.config.capability_retries + 1;
        for attempt in 1..=attempts {
            let error = match timeout(self.config.agent_timeout, self.agent.predict(&context)).await
            {
                Ok(Ok(prediction)) => return Some(prediction),
                Ok(Err(e)) => e,
                Err(_) => AgentError::Timeout {
                    seconds: self.config.agent_timeout.as_secs(),
                },
            };
            warn!(
                agent = self.agent.name(),
                attempt,
                attempts,
                error = %error,
                "Agent call failed"
            );
        }

        warn!(
            step = state.step_index() + 1,
            iteration = state.iteration(),
            "Agent stayed unavailable past the retry budget, consuming a non-matching iteration"
        );
        None
    }

    /// Judge a prediction, retrying within the budget.
    async fn compare_with_retry(
        &self,
        state: &StepState,
        prediction: &Prediction,
    ) -> Option<VerdictMap> {
        let candidates = state.candidates();

        let attempts = self.config.capability_retries + 1;
        for attempt in 1..=attempts {
            let call = self
                .comparator
                .compare(state.description(), prediction, &candidates);
            let error = match timeout(self.config.comparator_timeout, call).await {
                Ok(Ok(verdicts)) => return Some(verdicts),
                Ok(Err(e)) => e,
                Err(_) => ComparatorError::Timeout {
                    seconds: self.config.comparator_timeout.as_secs(),
                },
            };
            warn!(
                comparator = self.comparator.name(),
                attempt,
                attempts,
                error = %error,
                "Comparator call failed"
            );
        }

        warn!(
            step = state.step_index() + 1,
            iteration = state.iteration(),
            "Comparator stayed unavailable past the retry budget, consuming a non-matching iteration"
        );
        None
    }
}
