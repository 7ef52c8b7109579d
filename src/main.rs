//! sysdash - host system metrics dashboard binary.
//!
//! Runs the background sampler and serves the dashboard, or takes a single
//! snapshot and prints it.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use sysdash::{
    start_web_server, web::BuildInfo, MetricKind, MetricsPresenter, Sampler, SamplerConfig, Snapshot,
    SnapshotStore, SystemCollector, WebConfig, DEFAULT_CPU_WINDOW_MS,
    DEFAULT_DEGRADED_AFTER_TICKS, DEFAULT_HISTORY_CAPACITY, DEFAULT_INTERVAL_MS,
    DEFAULT_METRIC_TIMEOUT_MS, DEFAULT_WEB_PORT,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "sysdash")]
#[command(about = "System information dashboard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Samples host CPU, memory, disk and network metrics in the background and serves them on a live web dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Web server bind address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Web server port
    #[arg(short, long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    /// Sampling interval in milliseconds
    #[arg(short, long, default_value_t = DEFAULT_INTERVAL_MS)]
    interval: u64,

    /// CPU measurement window in milliseconds
    #[arg(long, default_value_t = DEFAULT_CPU_WINDOW_MS)]
    cpu_window: u64,

    /// Upper bound for a single metric read in milliseconds
    #[arg(long, default_value_t = DEFAULT_METRIC_TIMEOUT_MS)]
    metric_timeout: u64,

    /// Path whose filesystem usage is reported
    #[arg(long, default_value = "/")]
    disk_path: PathBuf,

    /// Number of CPU readings kept for the trend chart
    #[arg(long, default_value_t = DEFAULT_HISTORY_CAPACITY)]
    history: usize,

    /// Failed ticks in a row before the sampler reports degraded
    #[arg(long, default_value_t = DEFAULT_DEGRADED_AFTER_TICKS)]
    degraded_after: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server (default)
    Serve(ServeArgs),

    /// Take a single snapshot and exit
    Snapshot(SnapshotArgs),

    /// Show host identity and current resource usage
    Info,
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Directory with a custom dashboard (index.html plus assets)
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,

    /// Maximum WebSocket connections
    #[arg(long, default_value_t = 100)]
    max_connections: usize,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum OutputFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Args)]
struct SnapshotArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    match &cli.command {
        Some(Commands::Serve(args)) => serve_command(&cli, args).await,
        Some(Commands::Snapshot(args)) => snapshot_command(&cli, args).await,
        Some(Commands::Info) => info_command(&cli).await,
        None => serve_command(&cli, &ServeArgs {
            max_connections: 100,
            ..Default::default()
        })
        .await,
    }
}

/// Filter implied by `--verbose` / `--debug`.
fn flag_filter(cli: &Cli) -> EnvFilter {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };
    EnvFilter::new(level.as_str().to_lowercase())
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    // RUST_LOG wins over the flags when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| flag_filter(cli));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    Ok(())
}

fn sampler_config(cli: &Cli) -> SamplerConfig {
    SamplerConfig::default()
        .with_interval_ms(cli.interval)
        .with_cpu_window_ms(cli.cpu_window)
        .with_metric_timeout_ms(cli.metric_timeout)
        .with_disk_path(cli.disk_path.clone())
        .with_history_capacity(cli.history)
        .with_degraded_after_ticks(cli.degraded_after)
}

fn build_sampler(cli: &Cli) -> anyhow::Result<Sampler> {
    let config = sampler_config(cli);
    let store = Arc::new(SnapshotStore::new(config.history_capacity));
    let collector = SystemCollector::new().context("failed to initialize system collector")?;
    Sampler::new(Arc::new(collector), store, config).context("invalid sampler configuration")
}

async fn serve_command(cli: &Cli, args: &ServeArgs) -> anyhow::Result<()> {
    info!("Starting sysdash...");

    let (handle, task) = build_sampler(cli)?.spawn();

    let web_config = WebConfig::new(&cli.host, cli.port)
        .with_dashboard_dir(args.static_dir.clone())
        .with_cors(!args.no_cors)
        .with_max_websocket_connections(args.max_connections);

    info!("Web server configuration:");
    info!("  - Bind address: {}", web_config.bind_address());
    info!("  - CORS enabled: {}", web_config.enable_cors);
    info!("  - Max WebSocket connections: {}", args.max_connections);
    info!("  - Sampling interval: {}ms", cli.interval);

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
        }
        on_signal.cancel();
    });

    println!(
        "sysdash {} serving on http://{}/",
        env!("CARGO_PKG_VERSION"),
        web_config.bind_address()
    );
    let served = start_web_server(web_config, Arc::new(handle), shutdown).await;

    task.shutdown().await?;
    served?;
    Ok(())
}

async fn snapshot_command(cli: &Cli, args: &SnapshotArgs) -> anyhow::Result<()> {
    let mut sampler = build_sampler(cli)?;
    let snapshot = sampler
        .tick(&CancellationToken::new())
        .await
        .context("snapshot was not published")?;

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
        }
        OutputFormat::Pretty => print_pretty_snapshot(&snapshot),
    }

    Ok(())
}

async fn info_command(cli: &Cli) -> anyhow::Result<()> {
    let (handle, task) = build_sampler(cli)?.spawn();
    let snapshot = handle.trigger_refresh().await;
    task.shutdown().await?;
    let snapshot = snapshot?;

    println!("System Information");
    println!("==================");
    println!();

    match snapshot.host() {
        Some(host) => {
            println!("  Hostname: {}", host.hostname);
            println!("  OS: {} {}", host.os, host.version);
            println!("  Kernel: {}", host.release);
            println!("  Architecture: {}", host.arch);
            println!("  Processor: {}", host.processor);
        }
        None => println!("  Host identity unavailable"),
    }
    println!();

    println!("Resources:");
    match snapshot.memory() {
        Some(memory) => println!("  Memory: {:.1} GB total", gib(memory.total_bytes())),
        None => println!("  Memory: unavailable"),
    }
    match snapshot.disk() {
        Some(disk) => println!(
            "  Disk {}: {:.1} GB total, {:.1}% used",
            disk.path(),
            gib(disk.total_bytes()),
            disk.percent()
        ),
        None => println!("  Disk: unavailable"),
    }
    match snapshot.network() {
        Some(network) => println!("  Network interfaces: {}", network.interface_count),
        None => println!("  Network: unavailable"),
    }
    println!();

    let build = BuildInfo::current();
    println!("Build:");
    println!("  sysdash {} ({} build)", build.version, build.profile);
    println!("  Target: {}/{}", build.os, build.arch);

    Ok(())
}

fn gib(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0 / 1024.0
}

fn unavailable(snapshot: &Snapshot, kind: MetricKind) -> String {
    snapshot
        .error(kind)
        .map(|err| format!("unavailable ({})", err.message))
        .unwrap_or_else(|| "unavailable".to_string())
}

fn print_pretty_snapshot(snapshot: &Snapshot) {
    println!(
        "System Snapshot #{} ({})",
        snapshot.sequence(),
        chrono::DateTime::from_timestamp_millis(snapshot.timestamp() as i64)
            .unwrap_or_default()
            .format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("==========================================");
    println!();

    println!("System:");
    match snapshot.host() {
        Some(host) => {
            println!("  OS: {} {}", host.os, host.version);
            println!("  Release: {}", host.release);
            println!("  Architecture: {}", host.arch);
            println!("  Processor: {}", host.processor);
            println!("  Hostname: {}", host.hostname);
        }
        None => println!("  {}", unavailable(snapshot, MetricKind::Host)),
    }
    println!();

    println!("Resources:");
    match snapshot.cpu_percent() {
        Some(cpu) => println!("  CPU Usage: {:.1}%", cpu),
        None => println!("  CPU Usage: {}", unavailable(snapshot, MetricKind::Cpu)),
    }
    match snapshot.memory() {
        Some(memory) => println!(
            "  Memory Usage: {:.1}% ({:.2} GB / {:.2} GB)",
            memory.percent(),
            gib(memory.used_bytes()),
            gib(memory.total_bytes())
        ),
        None => println!("  Memory Usage: {}", unavailable(snapshot, MetricKind::Memory)),
    }
    match snapshot.disk() {
        Some(disk) => println!(
            "  Disk Usage ({}): {:.1}% ({:.2} GB / {:.2} GB)",
            disk.path(),
            disk.percent(),
            gib(disk.used_bytes()),
            gib(disk.total_bytes())
        ),
        None => println!("  Disk Usage: {}", unavailable(snapshot, MetricKind::Disk)),
    }
    println!();

    println!("Network:");
    match snapshot.network() {
        Some(network) => {
            println!("  Interfaces: {}", network.interface_count);
            println!("  Active Connections: {}", network.active_connections);
        }
        None => println!("  {}", unavailable(snapshot, MetricKind::Network)),
    }
}
