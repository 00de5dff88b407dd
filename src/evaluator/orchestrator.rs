//! Challenge run orchestration.
//!
//! The [`ChallengeRunner`] owns the wired capabilities and the engine
//! configuration, replays a challenge's steps strictly in order, carries
//! the established command context from step to step, and hands the
//! finished steps to the scorer. Batches run the same machinery over many
//! challenges with bounded concurrency; every run keeps its own step state,
//! so one poisoned challenge cannot leak into another.

use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::capability::{Agent, Comparator};
use crate::challenge::Challenge;
use crate::config::EngineConfig;
use crate::error::{ConfigError, EngineError, EngineResult};

use super::report::EvaluationResult;
use super::scorer;
use super::state::{StepResult, StepState};
use super::subgraph::StepEvaluator;

/// Cooperative cancellation handle.
///
/// Cloning shares the flag. Running work observes it at state-machine
/// transition boundaries and between steps, never mid-call, so the tree
/// mutations applied before the abort stay valid.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of all work observing this flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`EngineError::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One challenge's slot in a batch outcome, in input order.
#[derive(Debug)]
pub struct ChallengeRunOutcome {
    /// Name of the challenge this slot belongs to.
    pub challenge: String,
    /// The run result, or the fatal error that stopped this run alone.
    pub result: EngineResult<EvaluationResult>,
}

/// Replays challenges against an agent/comparator pair.
pub struct ChallengeRunner {
    agent: Arc<dyn Agent>,
    comparator: Arc<dyn Comparator>,
    config: EngineConfig,
    cancel: CancellationFlag,
}

impl ChallengeRunner {
    /// Create a runner, rejecting invalid configuration up front.
    pub fn new(
        agent: Arc<dyn Agent>,
        comparator: Arc<dyn Comparator>,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            agent,
            comparator,
            config,
            cancel: CancellationFlag::new(),
        })
    }

    /// Handle for cancelling runs started on this runner.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replay one challenge to a scored result.
    ///
    /// Steps run strictly sequentially; each later step sees the commands
    /// established by the earlier ones. A challenge with zero steps cannot
    /// produce a meaningful score and is rejected before any step runs.
    pub async fn run(&self, challenge: &Challenge) -> EngineResult<EvaluationResult> {
        if challenge.steps.is_empty() {
            return Err(ConfigError::NoSteps.into());
        }

        let run_id = Uuid::new_v4();
        info!(
            run_id = %run_id,
            challenge = %challenge.name,
            steps = challenge.steps.len(),
            agent = self.agent.name(),
            comparator = self.comparator.name(),
            "Starting challenge run"
        );

        let evaluator = StepEvaluator::new(
            self.agent.as_ref(),
            self.comparator.as_ref(),
            &self.config,
            &self.cancel,
            &challenge.name,
        );

        let mut results: Vec<StepResult> = Vec::with_capacity(challenge.steps.len());
        let mut prior_commands: Vec<String> = Vec::new();

        for (index, step) in challenge.steps.iter().enumerate() {
            self.cancel.check()?;
            info!(
                run_id = %run_id,
                step = index + 1,
                total = challenge.steps.len(),
                goal = %step.description,
                "Evaluating step"
            );

            let result = evaluator
                .evaluate(StepState::new(index, step), &prior_commands)
                .await?;

            // Carry forward what this step established: the matched command
            // after a success, the walkthrough's gold command otherwise.
            if let Some(command) = result.tree.resolved_command() {
                prior_commands.push(command.to_string());
            }
            results.push(result);
        }

        let score = scorer::score(&results, &self.config.weights)?;
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            run_id = %run_id,
            challenge = %challenge.name,
            score,
            steps_succeeded = succeeded,
            steps_total = results.len(),
            "Challenge run finished"
        );

        Ok(EvaluationResult::new(challenge.name.clone(), score, results))
    }

    /// Replay a batch of challenges with bounded concurrency.
    ///
    /// Outcomes come back in input order regardless of completion order.
    /// A failed run occupies its slot without sinking the rest of the
    /// batch; after a cancellation the remaining runs fail fast with
    /// [`EngineError::Cancelled`].
    pub async fn run_all(&self, challenges: &[Challenge]) -> Vec<ChallengeRunOutcome> {
        info!(
            challenges = challenges.len(),
            concurrency = self.config.batch_concurrency,
            "Starting batch run"
        );

        let mut outcomes: Vec<(usize, ChallengeRunOutcome)> =
            stream::iter(challenges.iter().enumerate().map(|(index, challenge)| async move {
                let result = self.run(challenge).await;
                (
                    index,
                    ChallengeRunOutcome {
                        challenge: challenge.name.clone(),
                        result,
                    },
                )
            }))
            .buffer_unordered(self.config.batch_concurrency)
            .collect()
            .await;

        outcomes.sort_by_key(|(index, _)| *index);
        let outcomes: Vec<ChallengeRunOutcome> =
            outcomes.into_iter().map(|(_, outcome)| outcome).collect();

        let succeeded = outcomes.iter().filter(|o| o.result.is_ok()).count();
        info!(
            challenges = outcomes.len(),
            runs_completed = succeeded,
            "Batch run finished"
        );
        outcomes
    }
}
