//! # Tidings — Scheduled Content Threads with x402 Paywalls
//!
//! Runs the scheduler loop and the HTTP gateway in one process.
//!
//! Usage:
//!   tidings                              # Defaults: 0.0.0.0:8000, ~/.tidings
//!   tidings --port 9000 --verbose        # Custom port, debug logging
//!   tidings --receiver <pubkey>          # Enable the premium-content paywall

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tidings_core::config::TidingsConfig;
use tidings_core::thread::resolve_timezone;
use tidings_gather::{DisabledFetcher, DisabledRetriever, GatherExecutor, MemoryProfileStore};
use tidings_payment::{
    PaymentPipeline, PaymentVerifier, Permissive, RetryPolicy, SolanaRpc, SpendPolicy,
    UnconfiguredWallet,
};
use tidings_scheduler::{FireHandler, JobRegistry, SqliteJobStore, spawn_scheduler};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tidings",
    version,
    about = "📨 Tidings — scheduled content threads with x402 paywalls"
)]
struct Cli {
    /// Path to config file (default: ~/.tidings/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind host for the gateway
    #[arg(long)]
    host: Option<String>,

    /// Bind port for the gateway
    #[arg(short, long)]
    port: Option<u16>,

    /// Scheduler database path
    #[arg(long)]
    db_path: Option<String>,

    /// Scheduler tick interval in seconds
    #[arg(long)]
    tick_secs: Option<u64>,

    /// Concurrent gathering workers
    #[arg(long)]
    workers: Option<usize>,

    /// Receiver wallet (base58 pubkey) for the premium-content paywall
    #[arg(long)]
    receiver: Option<String>,

    /// Price of the gated resource in SOL
    #[arg(long)]
    price_sol: Option<f64>,

    /// Solana JSON-RPC endpoint
    #[arg(long)]
    rpc_url: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> PathBuf {
    match p.strip_prefix("~/") {
        Some(rest) => TidingsConfig::home_dir().join(rest),
        None => PathBuf::from(p),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "tidings=debug,tower_http=debug"
    } else {
        "tidings=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Config file, then CLI overrides
    let mut config = match &cli.config {
        Some(path) => TidingsConfig::load_from(path)?,
        None => TidingsConfig::load().unwrap_or_default(),
    };
    if let Some(host) = cli.host {
        config.gateway.host = host;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(db_path) = cli.db_path {
        config.scheduler.db_path = db_path;
    }
    if let Some(tick_secs) = cli.tick_secs {
        config.scheduler.tick_secs = tick_secs;
    }
    if let Some(workers) = cli.workers {
        config.scheduler.workers = workers;
    }
    if let Some(receiver) = cli.receiver {
        config.payment.receiver_address = receiver;
    }
    if let Some(price_sol) = cli.price_sol {
        config.payment.price_sol = price_sol;
    }
    if let Some(rpc_url) = cli.rpc_url {
        config.payment.rpc_url = rpc_url;
    }

    let default_timezone = resolve_timezone(
        Some(config.scheduler.default_timezone.as_str()),
        chrono_tz::Asia::Shanghai,
    );

    // Scheduler registry, backed by SQLite
    let db_path = expand_path(&config.scheduler.db_path);
    let store = SqliteJobStore::open(Path::new(&db_path))?;
    let registry = JobRegistry::new(Box::new(store), config.scheduler.max_instances)?;
    let registry = Arc::new(tokio::sync::Mutex::new(registry));

    let chain = Arc::new(SolanaRpc::new(&config.payment.rpc_url));

    // Payer-side pipeline. Budget and chain endpoint come from config;
    // without signing keys, approved transfers fail with a clear error.
    let payments = Arc::new(PaymentPipeline::new(
        Arc::new(UnconfiguredWallet),
        chain.clone(),
        RetryPolicy::default(),
        SpendPolicy::from_config(&config.payment),
        Arc::new(Permissive),
    ));

    // Gathering executor. Content backends are deployment-specific; until
    // one is wired in, fired blocks report errors instead of items.
    let handler: Arc<dyn FireHandler> = Arc::new(GatherExecutor::new(
        Arc::new(MemoryProfileStore::new()),
        Arc::new(DisabledFetcher),
        Arc::new(DisabledRetriever),
        Some(payments),
    ));

    // Paywall verifier against the same chain endpoint
    let verifier = Arc::new(PaymentVerifier::new(chain, RetryPolicy::default()));
    if config.payment.receiver_address.is_empty() {
        tracing::warn!("⚠️ No paywall receiver configured — /premium-content will return 503");
    }

    println!("📨 Tidings v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "   🌐 Gateway:   http://{}:{}",
        config.gateway.host, config.gateway.port
    );
    println!("   🗄️  Database:  {}", db_path.display());
    println!(
        "   ⏰ Scheduler: tick {}s, {} workers",
        config.scheduler.tick_secs, config.scheduler.workers
    );
    println!("   ⛓️  Chain RPC: {}", config.payment.rpc_url);
    println!();

    // Scheduler loop runs for the life of the process
    tokio::spawn(spawn_scheduler(
        registry.clone(),
        handler.clone(),
        config.scheduler.tick_secs,
        config.scheduler.workers,
    ));

    let state = tidings_gateway::AppState {
        registry,
        handler,
        payment: config.payment.clone(),
        verifier,
        default_timezone,
        start_time: std::time::Instant::now(),
    };
    tidings_gateway::serve(state, &config.gateway.host, config.gateway.port).await
}
