use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::{
    LimiterConfig, LoggingConfig, SlidingWindowConfig, TokenBucketConfig, TurnstileConfig,
};
use turnstile::ratelimit::build_limiter;
use turnstile::simulation::{self, SimulationPlan};

/// Exercise a turnstile rate limiter from the command line.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Cli {
    /// YAML configuration file; `TURNSTILE__*` environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Run this policy (with its defaults unless the configuration already selects it)
    #[arg(long, global = true, value_enum)]
    policy: Option<PolicyArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    SlidingWindow,
    TokenBucket,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration and print the effective settings
    Check,
    /// Drive the limiter with synthetic clients and print a JSON report
    Simulate(SimulateArgs),
}

#[derive(Debug, Args)]
struct SimulateArgs {
    /// Number of concurrent clients
    #[arg(long, default_value_t = 4)]
    clients: usize,

    /// Requests issued by each client
    #[arg(long, default_value_t = 20)]
    requests: usize,

    /// Pause between a client's requests, in milliseconds
    #[arg(long, default_value_t = 50)]
    interval_ms: u64,

    /// Random extra pause of up to this many milliseconds
    #[arg(long, default_value_t = 0)]
    jitter_ms: u64,

    /// Prefix for generated client keys
    #[arg(long, default_value = "client")]
    key_prefix: String,

    /// Send every request through the shared global budget
    #[arg(long)]
    global: bool,
}

impl From<&SimulateArgs> for SimulationPlan {
    fn from(args: &SimulateArgs) -> Self {
        SimulationPlan {
            clients: args.clients,
            requests_per_client: args.requests,
            interval: Duration::from_millis(args.interval_ms),
            jitter: Duration::from_millis(args.jitter_ms),
            key_prefix: args.key_prefix.clone(),
            use_global_key: args.global,
        }
    }
}

fn apply_policy_override(limiter: LimiterConfig, policy: Option<PolicyArg>) -> LimiterConfig {
    match (policy, limiter) {
        (Some(PolicyArg::SlidingWindow), LimiterConfig::TokenBucket(_)) => {
            LimiterConfig::SlidingWindow(SlidingWindowConfig::default())
        }
        (Some(PolicyArg::TokenBucket), LimiterConfig::SlidingWindow(_)) => {
            LimiterConfig::TokenBucket(TokenBucketConfig::default())
        }
        (_, limiter) => limiter,
    }
}

/// Where the effective configuration came from, for the startup log line.
fn config_source(path: Option<&Path>) -> String {
    match path {
        Some(path) => format!("{} + environment", path.display()),
        None => "defaults + environment".to_string(),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = TurnstileConfig::load(cli.config.as_deref())?;
    config.limiter = apply_policy_override(config.limiter, cli.policy);
    config.limiter.validate()?;

    init_tracing(&config.logging);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        source = %config_source(cli.config.as_deref()),
        limiter = ?config.limiter,
        "Configuration loaded"
    );

    match cli.command {
        Command::Check => {
            info!("Configuration is valid");
            println!("{}", serde_yaml::to_string(&config)?);
        }
        Command::Simulate(args) => {
            let limiter = build_limiter(&config.limiter)?;
            let report = simulation::run(limiter, &SimulationPlan::from(&args)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
