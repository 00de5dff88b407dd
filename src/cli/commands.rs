//! CLI command definitions for ctf-replay.
//!
//! This module provides the command-line interface for replaying recorded
//! CTF walkthroughs against an agent under test.

use crate::capability::{
    Agent, CachedComparator, Comparator, ExactComparator, LlmComparator, LlmComparatorConfig,
    MockAgent, ModelAgent, ModelAgentConfig, RemoteAgent,
};
use crate::challenge::{discover_challenges, load_challenge, load_challenges, ChallengeSelector};
use crate::config::{EngineConfig, WeightConfig};
use crate::error::LlmError;
use crate::evaluator::{write_batch_reports, write_report, ChallengeRunner};
use crate::llm::{LiteLlmClient, LlmProvider};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Model used for both the agent under test and the judge when none is given.
const DEFAULT_MODEL: &str = "anthropic/claude-opus-4.5";

/// Default directory holding challenge walkthroughs.
const DEFAULT_DATA_DIR: &str = "./writeups";

/// Walkthrough replay evaluator for CTF security assessments.
#[derive(Parser)]
#[command(name = "ctf-replay")]
#[command(about = "Replay CTF walkthroughs step-by-step against an agent under test")]
#[command(version)]
#[command(
    long_about = "ctf-replay replays recorded security-assessment walkthroughs one step at a time, asks an agent to predict each next command, judges predictions against the recorded alternatives, and scores the run.\n\nExample usage:\n  ctf-replay run --challenge hackme --data-dir ./writeups --mock-agent"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Replay challenges against an agent and score its predictions.
    #[command(alias = "r")]
    Run(Box<RunArgs>),

    /// List the challenges available in the data directory.
    #[command(alias = "ls")]
    List(ListArgs),
}

/// Arguments for `ctf-replay run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Challenge selector: a name, a comma-separated list of names, or "all".
    #[arg(short, long, default_value = "all")]
    pub challenge: String,

    /// Directory containing challenge walkthroughs.
    #[arg(short, long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    /// Maximum prediction iterations per step.
    #[arg(long, default_value = "5")]
    pub max_iterations: u32,

    /// Retries after a failed agent or judge call before the iteration is forfeited.
    #[arg(long, default_value = "1")]
    pub retries: u32,

    /// Agent call timeout in seconds.
    #[arg(long, default_value = "120")]
    pub agent_timeout: u64,

    /// Judge call timeout in seconds.
    #[arg(long, default_value = "60")]
    pub comparator_timeout: u64,

    /// Credit for steps satisfied only through non-gold alternatives (between 0 and 1).
    #[arg(long, default_value = "0.5")]
    pub nongold_credit: f64,

    /// Concurrent challenge runs when replaying more than one challenge.
    #[arg(long, default_value = "2")]
    pub concurrency: usize,

    /// Model for the agent under test.
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Judge model for the comparator (defaults to --model).
    #[arg(long)]
    pub judge_model: Option<String>,

    /// API key (can also be set via LITELLM_API_KEY env var).
    #[arg(long, env = "LITELLM_API_KEY")]
    pub api_key: Option<String>,

    /// API base URL (can also be set via LITELLM_API_BASE env var).
    #[arg(long, env = "LITELLM_API_BASE")]
    pub api_base: Option<String>,

    /// Evaluate a remote agent behind this HTTP endpoint instead of a model.
    #[arg(long, conflicts_with = "mock_agent")]
    pub agent_url: Option<String>,

    /// Use a canned agent reply instead of a model (handy for dry runs).
    #[arg(long, num_args = 0..=1, default_missing_value = "I don't know")]
    pub mock_agent: Option<String>,

    /// Judge with normalized string equality instead of an LLM.
    #[arg(long)]
    pub exact_comparator: bool,

    /// Disable the in-memory verdict cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Report destination: a file for a single challenge, a directory for a batch.
    #[arg(short, long)]
    pub output: Option<String>,
}

impl RunArgs {
    /// Whether this invocation needs an LLM provider at all. Mock and remote
    /// agents run without one, as does the exact comparator.
    fn needs_provider(&self) -> bool {
        let model_agent = self.mock_agent.is_none() && self.agent_url.is_none();
        model_agent || !self.exact_comparator
    }
}

/// Arguments for `ctf-replay list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Directory containing challenge walkthroughs.
    #[arg(short, long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,
}

/// Parse command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and dispatch to the requested command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Dispatch an already-parsed CLI invocation.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_replay_command(*args).await?,
        Commands::List(args) => run_list_command(&args)?,
    }
    Ok(())
}

/// Run one or more challenge replays and emit evaluation reports.
///
/// Exits successfully once results are produced, whatever the scores; an
/// error is returned only when no result could be produced at all.
async fn run_replay_command(args: RunArgs) -> anyhow::Result<()> {
    let data_dir = Path::new(&args.data_dir);
    if !data_dir.exists() {
        return Err(anyhow::anyhow!(
            "Challenge data directory does not exist: {}",
            args.data_dir
        ));
    }
    if !data_dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Challenge data path is not a directory: {}",
            args.data_dir
        ));
    }

    let config = EngineConfig::default()
        .with_max_iterations(args.max_iterations)
        .with_capability_retries(args.retries)
        .with_agent_timeout(Duration::from_secs(args.agent_timeout))
        .with_comparator_timeout(Duration::from_secs(args.comparator_timeout))
        .with_weights(WeightConfig::default().with_nongold_credit(args.nongold_credit))
        .with_batch_concurrency(args.concurrency);
    config.validate()?;

    let selector = ChallengeSelector::parse(&args.challenge);
    let challenges = load_challenges(data_dir, &selector)?;
    info!(count = challenges.len(), "Loaded challenges for replay");

    let provider: Option<Arc<dyn LlmProvider>> = if args.needs_provider() {
        Some(build_provider(&args)?)
    } else {
        None
    };
    let agent = wire_agent(&args, provider.as_ref())?;
    let (comparator, cache) = wire_comparator(&args, provider.as_ref())?;

    let runner = ChallengeRunner::new(agent, comparator, config)?;

    if challenges.len() == 1 {
        let result = runner.run(&challenges[0]).await?;
        info!(
            challenge = %result.challenge,
            score = result.score,
            steps_succeeded = result.steps_succeeded(),
            steps_total = result.steps.len(),
            "Replay finished"
        );
        match &args.output {
            Some(output) => {
                write_report(Path::new(output), &result)?;
                info!(path = %output, "Wrote evaluation report");
            }
            None => println!("{}", result.to_pretty_json()?),
        }
    } else {
        let outcomes = runner.run_all(&challenges).await;
        let mut results = Vec::new();
        let mut failed = 0usize;
        for outcome in outcomes {
            match outcome.result {
                Ok(result) => results.push(result),
                Err(err) => {
                    failed += 1;
                    error!(challenge = %outcome.challenge, error = %err, "Challenge run failed");
                }
            }
        }
        if results.is_empty() {
            anyhow::bail!("All {failed} challenge runs failed");
        }
        match &args.output {
            Some(output) => {
                write_batch_reports(Path::new(output), &results)?;
                info!(dir = %output, count = results.len(), "Wrote evaluation reports");
            }
            None => println!("{}", serde_json::to_string_pretty(&results)?),
        }
        let mean_score = results.iter().map(|r| r.score).sum::<f64>() / results.len() as f64;
        info!(
            challenges = results.len(),
            failed, mean_score, "Batch replay finished"
        );
    }

    if let Some(cache) = cache {
        let stats = cache.stats();
        info!(
            hits = stats.hits,
            misses = stats.misses,
            hit_rate = stats.hit_rate(),
            "Verdict cache statistics"
        );
    }
    Ok(())
}

/// List discoverable challenges with their step counts.
fn run_list_command(args: &ListArgs) -> anyhow::Result<()> {
    let data_dir = Path::new(&args.data_dir);
    let names = discover_challenges(data_dir)?;
    if names.is_empty() {
        println!("No challenges found under {}", args.data_dir);
        return Ok(());
    }
    for name in &names {
        match load_challenge(data_dir, name) {
            Ok(challenge) => println!("{}  ({} steps)", name, challenge.step_count()),
            Err(err) => println!("{name}  (unreadable: {err})"),
        }
    }
    Ok(())
}

fn build_provider(args: &RunArgs) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let client = match (&args.api_base, &args.api_key) {
        (Some(base), key) => {
            info!(api_base = %base, "Using custom LLM endpoint");
            LiteLlmClient::new(base.clone(), key.clone(), args.model.clone())
        }
        (None, Some(key)) => {
            info!("Using the default OpenRouter endpoint");
            LiteLlmClient::new_with_defaults(key.clone())
        }
        (None, None) => {
            return Err(anyhow::Error::new(LlmError::MissingApiKey).context(
                "provide --api-key (or set LITELLM_API_KEY), or point --api-base at a keyless proxy",
            ));
        }
    };
    // Per-call deadlines are enforced by the runner. The HTTP client just
    // needs a ceiling that never fires first.
    let timeout = Duration::from_secs(args.agent_timeout.max(args.comparator_timeout));
    Ok(Arc::new(client.with_timeout(timeout)))
}

fn wire_agent(
    args: &RunArgs,
    provider: Option<&Arc<dyn LlmProvider>>,
) -> anyhow::Result<Arc<dyn Agent>> {
    if let Some(reply) = &args.mock_agent {
        info!(reply = %reply, "Using mock agent");
        return Ok(Arc::new(MockAgent::new(reply.clone())));
    }
    if let Some(url) = &args.agent_url {
        info!(endpoint = %url, "Using remote agent");
        return Ok(Arc::new(RemoteAgent::new(
            url.clone(),
            Duration::from_secs(args.agent_timeout),
        )));
    }
    let provider =
        provider.ok_or_else(|| anyhow::anyhow!("a model-backed agent requires an LLM provider"))?;
    info!(model = %args.model, "Using model-backed agent");
    Ok(Arc::new(ModelAgent::new(
        provider.clone(),
        ModelAgentConfig::default().with_model(args.model.clone()),
    )))
}

fn wire_comparator(
    args: &RunArgs,
    provider: Option<&Arc<dyn LlmProvider>>,
) -> anyhow::Result<(Arc<dyn Comparator>, Option<Arc<CachedComparator>>)> {
    let base: Arc<dyn Comparator> = if args.exact_comparator {
        info!("Judging with normalized string equality");
        Arc::new(ExactComparator::new())
    } else {
        let provider = provider
            .ok_or_else(|| anyhow::anyhow!("the LLM comparator requires an LLM provider"))?;
        let judge_model = args
            .judge_model
            .clone()
            .unwrap_or_else(|| args.model.clone());
        info!(model = %judge_model, "Judging with an LLM comparator");
        Arc::new(LlmComparator::new(
            provider.clone(),
            LlmComparatorConfig::default().with_model(judge_model),
        ))
    };
    if args.no_cache {
        Ok((base, None))
    } else {
        let cache = Arc::new(CachedComparator::new(base));
        Ok((cache.clone() as Arc<dyn Comparator>, Some(cache)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Cli {
        Cli::try_parse_from(argv).unwrap()
    }

    fn run_args(argv: &[&str]) -> RunArgs {
        match parse(argv).command {
            Commands::Run(args) => *args,
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_run_defaults() {
        let args = run_args(&["ctf-replay", "run"]);
        assert_eq!(args.challenge, "all");
        assert_eq!(args.data_dir, DEFAULT_DATA_DIR);
        assert_eq!(args.max_iterations, 5);
        assert_eq!(args.retries, 1);
        assert_eq!(args.agent_timeout, 120);
        assert_eq!(args.comparator_timeout, 60);
        assert_eq!(args.nongold_credit, 0.5);
        assert_eq!(args.concurrency, 2);
        assert_eq!(args.model, DEFAULT_MODEL);
        assert!(args.judge_model.is_none());
        assert!(!args.exact_comparator);
        assert!(!args.no_cache);
        assert!(args.output.is_none());
    }

    #[test]
    fn test_run_alias() {
        let args = run_args(&["ctf-replay", "r", "-c", "hackme"]);
        assert_eq!(args.challenge, "hackme");
    }

    #[test]
    fn test_list_alias() {
        let cli = parse(&["ctf-replay", "ls", "-d", "/tmp/writeups"]);
        match cli.command {
            Commands::List(args) => assert_eq!(args.data_dir, "/tmp/writeups"),
            _ => panic!("Expected list command"),
        }
    }

    #[test]
    fn test_mock_agent_flag_without_value() {
        let args = run_args(&["ctf-replay", "run", "--mock-agent"]);
        assert_eq!(args.mock_agent.as_deref(), Some("I don't know"));
    }

    #[test]
    fn test_mock_agent_conflicts_with_agent_url() {
        let result = Cli::try_parse_from([
            "ctf-replay",
            "run",
            "--mock-agent",
            "ls",
            "--agent-url",
            "http://localhost:9000",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_needs_provider() {
        assert!(run_args(&["ctf-replay", "run"]).needs_provider());
        assert!(!run_args(&["ctf-replay", "run", "--mock-agent", "--exact-comparator"])
            .needs_provider());
        // An LLM judge still needs a provider even when the agent is mocked.
        assert!(run_args(&["ctf-replay", "run", "--mock-agent"]).needs_provider());
    }

    #[test]
    fn test_global_log_level() {
        let cli = parse(&["ctf-replay", "run", "--log-level", "debug"]);
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_wire_mock_agent_without_provider() {
        let args = run_args(&["ctf-replay", "run", "--mock-agent", "whoami"]);
        let agent = wire_agent(&args, None).unwrap();
        assert_eq!(agent.name(), "mock");
    }

    #[test]
    fn test_wire_exact_comparator_skips_cache() {
        let args = run_args(&["ctf-replay", "run", "--exact-comparator", "--no-cache"]);
        let (comparator, cache) = wire_comparator(&args, None).unwrap();
        assert_eq!(comparator.name(), "exact");
        assert!(cache.is_none());
    }

    #[test]
    fn test_wire_cached_comparator_by_default() {
        let args = run_args(&["ctf-replay", "run", "--exact-comparator"]);
        let (comparator, cache) = wire_comparator(&args, None).unwrap();
        assert_eq!(comparator.name(), "cached-exact");
        assert!(cache.is_some());
    }
}
