//! CLI command definitions for maac-forge.
//!
//! Generation runs a job through the orchestrator and streams its events to
//! stdout. Trials load generated scenarios, enqueue one trial per scenario
//! and configuration, and drain the queue with a worker pool.

use crate::complexity::{ComplexityValidator, ValidatorConfig};
use crate::config::ForgeConfig;
use crate::llm::{LiteLlmClient, ModelCatalog, ModelProvider, OpenRouterProvider, ProviderRegistry};
use crate::metrics::{export_metrics, init_metrics};
use crate::scenario::{IndexerConfig, Scenario, ScenarioIndexer};
use crate::scheduler::{
    ConfigId, GenerationHandle, GenerationJobStatus, GenerationRequest, JobEvent, JobOrchestrator,
    MemoryTrialQueue, RedisTrialQueue, RunningJobs, TrialJob, TrialQueue, TrialWorkerPool,
};
use crate::storage::{Database, ForgeStore, MemoryStore, StoreError, ValidationStats};
use clap::Parser;
use futures::{pin_mut, Stream, StreamExt};
use serde::Serialize;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Default provider for generation and trials.
const DEFAULT_PROVIDER: &str = "openrouter";

/// Default model recorded on generated scenarios.
const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Default output file for generated scenarios.
const DEFAULT_SCENARIOS_FILE: &str = "./scenarios.jsonl";
const DEFAULT_TRIALS_FILE: &str = "./trial-results.jsonl";

/// Scenario generator and trial runner for MAAC cognitive-architecture evaluation.
#[derive(Parser)]
#[command(name = "maac-forge")]
#[command(about = "Generate validated MAAC scenarios and run them against model providers")]
#[command(version)]
#[command(
    long_about = "maac-forge sweeps a domain x tier x repetition x model grid, renders one scenario per position,\nvalidates its complexity against the intended tier and stores accepted scenarios.\n\nExample usage:\n  maac-forge generate --domains analytical,planning --tiers simple,complex -r 3 -m openai/gpt-4o-mini\n  maac-forge trials --input ./scenarios.jsonl --config-ids 111111111111,000000000000"
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
    /// Run a generation job and stream its progress events.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Print the grid position at a flat index.
    Position(PositionArgs),

    /// Execute trials for generated scenarios through the worker pool.
    Trials(TrialsArgs),

    /// List the models a provider serves.
    Models(ModelsArgs),

    /// Summarize complexity validation over generated scenarios.
    Stats(StatsArgs),
}

/// Grid dimensions shared by `generate` and `position`.
#[derive(clap::Args, Debug, Clone)]
pub struct GridArgs {
    /// Comma-separated domains (analytical, planning, communication, problem_solving).
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "analytical,planning,communication,problem_solving"
    )]
    pub domains: Vec<String>,

    /// Comma-separated tiers (simple, moderate, complex).
    #[arg(long, value_delimiter = ',', default_value = "simple,moderate,complex")]
    pub tiers: Vec<String>,

    /// Scenarios per domain, tier and model.
    #[arg(short = 'r', long, default_value = "1")]
    pub repetitions: u32,

    /// Comma-separated model ids.
    #[arg(short = 'm', long, value_delimiter = ',', default_value = DEFAULT_MODEL)]
    pub models: Vec<String>,
}

/// Arguments for `maac-forge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub grid: GridArgs,

    /// Provider the scenarios are intended for.
    #[arg(short = 'p', long, default_value = DEFAULT_PROVIDER)]
    pub provider: String,

    /// Twelve-character capability bitmask.
    #[arg(short = 'c', long, default_value = "111111111111")]
    pub config_id: String,

    /// Scenarios generated in parallel. Defaults to MAAC_GENERATION_WORKERS.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// JSONL file receiving accepted scenarios.
    #[arg(short = 'o', long, default_value = DEFAULT_SCENARIOS_FILE)]
    pub output: String,

    /// YAML file overriding validator thresholds and weights.
    #[arg(long)]
    pub validator_config: Option<String>,

    /// Check requested models against the provider's model list first.
    #[arg(long)]
    pub check_models: bool,

    /// API key for --check-models (can also use OPENROUTER_API_KEY env var).
    #[arg(long, env = "OPENROUTER_API_KEY")]
    pub api_key: Option<String>,

    /// PostgreSQL URL. Without it the job runs against an in-memory store.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Write Prometheus metrics to this file when the job ends.
    #[arg(long)]
    pub metrics_out: Option<String>,
}

/// Arguments for `maac-forge position`.
#[derive(Parser, Debug)]
pub struct PositionArgs {
    /// Flat index into the grid.
    pub index: u64,

    #[command(flatten)]
    pub grid: GridArgs,
}

/// Arguments for `maac-forge trials`.
#[derive(Parser, Debug)]
pub struct TrialsArgs {
    /// JSONL file of scenarios, as written by `generate`.
    #[arg(short = 'i', long, default_value = DEFAULT_SCENARIOS_FILE)]
    pub input: String,

    /// Provider to run the trials against (openrouter, litellm).
    #[arg(short = 'p', long, default_value = DEFAULT_PROVIDER)]
    pub provider: String,

    /// Comma-separated capability bitmasks. Every scenario runs once per id.
    #[arg(short = 'c', long, value_delimiter = ',', default_value = "111111111111")]
    pub config_ids: Vec<String>,

    /// Run every scenario against this model instead of the scenario's own.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Number of trial workers. Defaults to MAAC_TRIAL_WORKERS.
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Requests per minute for the provider. Defaults to MAAC_REQUESTS_PER_MINUTE.
    #[arg(long)]
    pub rpm: Option<u32>,

    /// Attempts per trial. Defaults to MAAC_MAX_TRIAL_ATTEMPTS.
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// OpenRouter API key (can also use OPENROUTER_API_KEY env var).
    #[arg(long, env = "OPENROUTER_API_KEY")]
    pub api_key: Option<String>,

    /// JSONL file receiving trial results.
    #[arg(short = 'o', long, default_value = DEFAULT_TRIALS_FILE)]
    pub output: String,

    /// Write Prometheus metrics to this file when the pool drains.
    #[arg(long)]
    pub metrics_out: Option<String>,
}

/// Arguments for `maac-forge models`.
#[derive(Parser, Debug)]
pub struct ModelsArgs {
    /// Provider to query (openrouter, litellm).
    #[arg(short = 'p', long, default_value = DEFAULT_PROVIDER)]
    pub provider: String,

    /// OpenRouter API key (can also use OPENROUTER_API_KEY env var).
    #[arg(long, env = "OPENROUTER_API_KEY")]
    pub api_key: Option<String>,

    /// Output as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `maac-forge stats`.
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// JSONL file of scenarios.
    #[arg(short = 'i', long, default_value = DEFAULT_SCENARIOS_FILE)]
    pub input: String,
}

/// Summary printed when a trial run drains.
#[derive(Debug, Serialize)]
struct TrialRunSummary {
    provider: String,
    trials: usize,
    succeeded: u64,
    failed: u64,
    retries: u64,
    success_rate: f64,
    average_trial_ms: u64,
    output: String,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate_command(args).await?,
        Commands::Position(args) => run_position_command(args)?,
        Commands::Trials(args) => run_trials_command(args).await?,
        Commands::Models(args) => run_models_command(args).await?,
        Commands::Stats(args) => run_stats_command(args)?,
    }
    Ok(())
}

// ============================================================================
// Generation
// ============================================================================

async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let config = ForgeConfig::from_env()?;
    init_metrics()?;

    let store = open_store(args.database_url.as_deref()).await?;
    let mut orchestrator = JobOrchestrator::new(store, Arc::new(RunningJobs::new()));

    if let Some(path) = &args.validator_config {
        let validator_config = ValidatorConfig::from_yaml_file(path)?;
        info!(path = %path, "Loaded validator configuration");
        orchestrator = orchestrator.with_validator(ComplexityValidator::new(validator_config));
    }
    if args.check_models {
        let provider = build_provider(&args.provider, args.api_key.clone())?;
        let registry = Arc::new(ProviderRegistry::new().with_provider(provider));
        orchestrator = orchestrator
            .with_model_catalog(Arc::new(ModelCatalog::new(registry, config.model_cache_ttl)));
    }

    let request = GenerationRequest {
        domains: args.grid.domains,
        tiers: args.grid.tiers,
        repetitions: args.grid.repetitions,
        provider: args.provider,
        models: args.grid.models,
        config_id: args.config_id,
        concurrency: args.concurrency.unwrap_or(config.generation_workers),
    };

    let handle = orchestrator.start_generation(request).await?;
    let job_id = handle.job_id;

    if let Some(parent) = Path::new(&args.output).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut output = BufWriter::new(fs::File::create(&args.output)?);
    let mut stdout = std::io::stdout();
    let mut written = 0usize;

    let events = event_stream(handle);
    pin_mut!(events);

    loop {
        tokio::select! {
            next = events.next() => {
                let Some(event) = next else { break };
                stdout.write_all(event.to_sse_line()?.as_bytes())?;
                stdout.flush()?;

                if let JobEvent::Scenario { scenario } = &event {
                    serde_json::to_writer(&mut output, scenario)?;
                    output.write_all(b"\n")?;
                    written += 1;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!(job_id = %job_id, "Interrupted, cancelling generation job");
                if let Err(e) = orchestrator.cancel(job_id).await {
                    warn!(job_id = %job_id, error = %e, "Cancel failed");
                }
            }
        }
    }
    output.flush()?;

    let job = orchestrator.job(job_id).await?;
    info!(
        job_id = %job_id,
        status = %job.status,
        stored = job.stored_count,
        failed = job.failed_count,
        output = %args.output,
        written,
        "Generation finished"
    );

    if let Some(path) = &args.metrics_out {
        fs::write(path, export_metrics())?;
    }

    if job.status == GenerationJobStatus::Failed {
        anyhow::bail!(
            "generation job {} failed: {}",
            job_id,
            job.last_error.unwrap_or_default()
        );
    }
    Ok(())
}

/// Yields a job's events up to and including the terminal one.
fn event_stream(handle: GenerationHandle) -> impl Stream<Item = JobEvent> {
    async_stream::stream! {
        let mut events = handle.into_stream();
        while let Some(event) = events.next().await {
            let terminal = event.is_terminal();
            yield event;
            if terminal {
                break;
            }
        }
    }
}

async fn open_store(database_url: Option<&str>) -> anyhow::Result<Arc<dyn ForgeStore>> {
    match database_url {
        Some(url) => {
            let db = Database::connect(url).await?;
            db.ensure_schema().await?;
            info!("Using PostgreSQL store");
            Ok(Arc::new(db))
        }
        None => {
            info!("Using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn run_position_command(args: PositionArgs) -> anyhow::Result<()> {
    let config = IndexerConfig::parse(
        &args.grid.domains,
        &args.grid.tiers,
        args.grid.repetitions,
        args.grid.models,
    )?;
    let indexer = ScenarioIndexer::new(config);
    let total = indexer.total();
    let position = indexer.position_at(args.index).ok_or_else(|| {
        anyhow::anyhow!("index {} is out of range (total {})", args.index, total)
    })?;

    let output = serde_json::json!({
        "index": args.index,
        "total": total,
        "scenario_id": position.scenario_id(),
        "position": position,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

// ============================================================================
// Trials
// ============================================================================

async fn run_trials_command(args: TrialsArgs) -> anyhow::Result<()> {
    let mut config = ForgeConfig::from_env()?;
    if let Some(workers) = args.workers {
        config = config.with_trial_workers(workers);
    }
    if let Some(rpm) = args.rpm {
        config = config.with_provider_rpm(args.provider.clone(), rpm);
    }
    let max_attempts = args.max_attempts.unwrap_or(config.max_trial_attempts);
    config.validate()?;
    init_metrics()?;

    let config_ids = args
        .config_ids
        .iter()
        .map(|raw| ConfigId::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let scenarios = load_scenarios(Path::new(&args.input))?;
    if scenarios.is_empty() {
        anyhow::bail!("no scenarios found in {}", args.input);
    }

    let provider = build_provider(&args.provider, args.api_key.clone())?;
    let provider_name = provider.name().to_string();
    let registry = Arc::new(ProviderRegistry::new().with_provider(provider));

    let store = Arc::new(MemoryStore::new());
    for scenario in &scenarios {
        match store.create_scenario(scenario).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(id)) => warn!(scenario_id = %id, "Skipping duplicate scenario"),
            Err(e) => return Err(e.into()),
        }
    }

    let queue: Arc<dyn TrialQueue> = match &config.redis_url {
        Some(url) => Arc::new(RedisTrialQueue::connect(url, &config.queue_name).await?),
        None => Arc::new(MemoryTrialQueue::new(config.queue_name.clone())),
    };

    let trials: Vec<TrialJob> = scenarios
        .iter()
        .flat_map(|scenario| {
            let model = args.model.clone().unwrap_or_else(|| scenario.model.clone());
            let provider_name = provider_name.clone();
            config_ids.iter().map(move |config_id| {
                TrialJob::new(&scenario.scenario_id, &provider_name, &model, config_id.clone())
                    .with_max_attempts(max_attempts)
            })
        })
        .collect();
    let trial_count = trials.len();
    queue.enqueue_batch(trials).await?;
    info!(
        trials = trial_count,
        scenarios = scenarios.len(),
        configs = config_ids.len(),
        provider = %provider_name,
        "Trials enqueued"
    );

    let mut pool = TrialWorkerPool::new(
        config.worker_pool_config(),
        Arc::clone(&queue),
        store.clone(),
        registry,
        Arc::new(config.rate_limiter()),
    );
    let drained = pool.run_until_drained().await;

    let results = store.find_trial_results(None).await?;
    let mut output = BufWriter::new(fs::File::create(&args.output)?);
    for result in &results {
        serde_json::to_writer(&mut output, result)?;
        output.write_all(b"\n")?;
    }
    output.flush()?;

    if let Some(path) = &args.metrics_out {
        fs::write(path, export_metrics())?;
    }

    let stats = drained?;
    let summary = TrialRunSummary {
        provider: provider_name,
        trials: trial_count,
        succeeded: stats.trials_completed,
        failed: stats.trials_failed,
        retries: stats.retries,
        success_rate: stats.success_rate(),
        average_trial_ms: stats.average_trial_duration.as_millis() as u64,
        output: args.output,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn load_scenarios(path: &Path) -> anyhow::Result<Vec<Scenario>> {
    let file = fs::File::open(path)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", path.display(), e))?;
    let mut scenarios = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let scenario: Scenario = serde_json::from_str(&line).map_err(|e| {
            anyhow::anyhow!("{}:{}: invalid scenario: {}", path.display(), line_no + 1, e)
        })?;
        scenarios.push(scenario);
    }
    Ok(scenarios)
}

/// Builds the named provider. OpenRouter needs an API key from the flag or
/// the environment; LiteLLM reads its endpoint from the environment.
fn build_provider(name: &str, api_key: Option<String>) -> anyhow::Result<Arc<dyn ModelProvider>> {
    match name {
        "openrouter" => {
            let key = api_key
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .ok_or_else(|| {
                    anyhow::anyhow!("OpenRouter needs --api-key or OPENROUTER_API_KEY")
                })?;
            info!("Using OpenRouter provider");
            Ok(Arc::new(OpenRouterProvider::new(key)?))
        }
        "litellm" => {
            info!("Using LiteLLM client from environment");
            Ok(Arc::new(LiteLlmClient::from_env().map_err(|e| {
                anyhow::anyhow!(
                    "Failed to initialize LiteLLM client: {}. Set LITELLM_API_BASE.",
                    e
                )
            })?))
        }
        other => anyhow::bail!("unknown provider '{}' (expected openrouter or litellm)", other),
    }
}

// ============================================================================
// Models and stats
// ============================================================================

async fn run_models_command(args: ModelsArgs) -> anyhow::Result<()> {
    let config = ForgeConfig::from_env()?;
    let provider = build_provider(&args.provider, args.api_key)?;
    let name = provider.name().to_string();
    let registry = Arc::new(ProviderRegistry::new().with_provider(provider));
    let catalog = ModelCatalog::new(registry, config.model_cache_ttl);

    let models = catalog.models(&name).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&models)?);
    } else {
        for model in &models {
            match (&model.name, model.context_length) {
                (Some(label), Some(ctx)) => println!("{}\t{}\t{}", model.id, label, ctx),
                (Some(label), None) => println!("{}\t{}", model.id, label),
                _ => println!("{}", model.id),
            }
        }
        info!(provider = %name, count = models.len(), "Models listed");
    }
    Ok(())
}

fn run_stats_command(args: StatsArgs) -> anyhow::Result<()> {
    let scenarios = load_scenarios(Path::new(&args.input))?;
    let stats = ValidationStats::from_scenarios(&scenarios);
    let output = serde_json::json!({
        "stats": stats,
        "tier_match_rate": stats.tier_match_rate(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generate_command_defaults() {
        let cli = Cli::try_parse_from(["maac-forge", "generate"]).expect("should parse");

        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.grid.domains.len(), 4);
                assert_eq!(args.grid.tiers, vec!["simple", "moderate", "complex"]);
                assert_eq!(args.grid.repetitions, 1);
                assert_eq!(args.grid.models, vec![DEFAULT_MODEL.to_string()]);
                assert_eq!(args.provider, DEFAULT_PROVIDER);
                assert_eq!(args.config_id, "111111111111");
                assert_eq!(args.output, DEFAULT_SCENARIOS_FILE);
                assert!(args.concurrency.is_none());
                assert!(!args.check_models);
            }
            _ => panic!("Expected Generate command"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_generate_command_with_options() {
        let cli = Cli::try_parse_from([
            "maac-forge",
            "gen",
            "--domains",
            "analytical,communication",
            "--tiers",
            "complex",
            "-r",
            "3",
            "-m",
            "a/model,b/model",
            "-c",
            "101010101010",
            "--concurrency",
            "4",
            "-o",
            "./out/s.jsonl",
            "-l",
            "debug",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.grid.domains, vec!["analytical", "communication"]);
                assert_eq!(args.grid.tiers, vec!["complex"]);
                assert_eq!(args.grid.repetitions, 3);
                assert_eq!(args.grid.models, vec!["a/model", "b/model"]);
                assert_eq!(args.config_id, "101010101010");
                assert_eq!(args.concurrency, Some(4));
                assert_eq!(args.output, "./out/s.jsonl");
            }
            _ => panic!("Expected Generate command"),
        }
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_trials_command_config_ids() {
        let cli = Cli::try_parse_from([
            "maac-forge",
            "trials",
            "-i",
            "s.jsonl",
            "-c",
            "111111111111,000000000000",
            "-w",
            "8",
            "--max-attempts",
            "5",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Trials(args) => {
                assert_eq!(args.input, "s.jsonl");
                assert_eq!(args.config_ids.len(), 2);
                assert_eq!(args.workers, Some(8));
                assert_eq!(args.max_attempts, Some(5));
                assert!(args.model.is_none());
            }
            _ => panic!("Expected Trials command"),
        }
    }

    #[test]
    fn test_position_command_parses_index() {
        let cli = Cli::try_parse_from(["maac-forge", "position", "17", "-r", "2"])
            .expect("should parse");

        match cli.command {
            Commands::Position(args) => {
                assert_eq!(args.index, 17);
                assert_eq!(args.grid.repetitions, 2);
            }
            _ => panic!("Expected Position command"),
        }
    }

    #[test]
    fn test_position_out_of_range_is_an_error() {
        let cli = Cli::try_parse_from([
            "maac-forge",
            "position",
            "99",
            "--domains",
            "planning",
            "--tiers",
            "simple",
        ])
        .expect("should parse");

        let Commands::Position(args) = cli.command else {
            panic!("Expected Position command");
        };
        let err = run_position_command(args).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let err = build_provider("nope", None).err().expect("should fail");
        assert!(err.to_string().contains("unknown provider"));
    }

    #[test]
    fn test_load_scenarios_reports_bad_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.jsonl");
        fs::write(&path, "\n{not json}\n").expect("write");

        let err = load_scenarios(&path).unwrap_err();
        assert!(err.to_string().contains(":2:"));
    }

    #[test]
    fn test_load_scenarios_skips_blank_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.jsonl");
        fs::write(&path, "\n\n").expect("write");

        assert!(load_scenarios(&path).expect("should load").is_empty());
    }
}
