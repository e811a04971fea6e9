/*
[INPUT]:  CLI arguments, optional YAML configuration file, OS shutdown signals
[OUTPUT]: Real-time channel updates printed as JSON lines
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, subcommands, or shutdown handling
*/

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use dex_aggregator::{DexAggregator, DexConfig, Resolution, SubscriptionGuard};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dex-stream", version, about = "Stream DEX real-time channels as JSON lines")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,
    #[arg(long = "token", env = "DEX_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
    #[arg(long = "server-url", value_name = "URL")]
    server_url: Option<String>,
    #[arg(long = "stream-url", value_name = "URL")]
    stream_url: Option<String>,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Candles for a token at one resolution
    Candles {
        chain: String,
        token: String,
        #[arg(long, default_value = "1m")]
        resolution: Resolution,
    },
    /// Rolling token statistics
    Stats { chain: String, token: String },
    /// Swaps and liquidity events
    Activities { chain: String, token: String },
    /// Trades
    Trades { chain: String, token: String },
    /// All balances of a wallet
    Balance { chain: String, wallet: String },
    /// Balance of one token in a wallet
    TokenBalance {
        chain: String,
        token: String,
        wallet: String,
    },
    /// Raw payloads of an arbitrary channel
    Raw { channel: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    let config = load_config(&args)?;
    let sdk = DexAggregator::from_config(config).context("initialize dex aggregator")?;
    info!(
        base_url = %sdk.request_context().base_url,
        stream_url = %sdk.request_context().stream_url,
        "starting dex-stream"
    );

    let shutdown = CancellationToken::new();
    spawn_shutdown_listener(shutdown.clone());

    let guard = subscribe(&sdk, args.command).context("subscribe")?;
    info!(channel = guard.channel().unwrap_or_default(), "subscribed");

    shutdown.cancelled().await;
    info!("shutdown signal received");

    drop(guard);
    sdk.shutdown();
    info!("stream closed");
    Ok(())
}

fn subscribe(sdk: &DexAggregator, command: Command) -> Result<SubscriptionGuard> {
    let stream = sdk.stream();
    let handle = match command {
        Command::Candles {
            chain,
            token,
            resolution,
        } => stream.subscribe_candles(&chain, &token, resolution, |candle| {
            emit(serde_json::to_string(&candle))
        })?,
        Command::Stats { chain, token } => {
            stream.subscribe_token_stats(&chain, &token, |stat| emit(serde_json::to_string(&stat)))?
        }
        Command::Activities { chain, token } => {
            stream.subscribe_token_activities(&chain, &token, |activities| {
                emit(serde_json::to_string(&activities))
            })?
        }
        Command::Trades { chain, token } => stream
            .subscribe_trades(&chain, &token, |trades| emit(serde_json::to_string(&trades)))?,
        Command::Balance { chain, wallet } => stream
            .subscribe_balances(&chain, &wallet, |balances| {
                emit(serde_json::to_string(&balances))
            })?,
        Command::TokenBalance {
            chain,
            token,
            wallet,
        } => stream.subscribe_token_balance(&chain, &token, &wallet, |balance| {
            emit(serde_json::to_string(&balance))
        })?,
        Command::Raw { channel } => stream.subscribe(
            &channel,
            std::sync::Arc::new(|payload: &serde_json::Value| {
                emit(serde_json::to_string(payload))
            }),
        )?,
    };
    Ok(handle.into_guard())
}

fn emit(line: serde_json::Result<String>) {
    match line {
        Ok(line) => println!("{line}"),
        Err(err) => warn!(error = %err, "failed to encode update"),
    }
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

/// YAML file first, then flags and environment on top
fn load_config(args: &Cli) -> Result<DexConfig> {
    let mut config = match &args.config_path {
        Some(path) => {
            let path_str = path.to_str().context("config path must be valid utf-8")?;
            DexConfig::from_file(path_str).context("load config")?
        }
        None => {
            let token = args
                .access_token
                .clone()
                .context("access token required: pass --token or set DEX_ACCESS_TOKEN")?;
            DexConfig::new(token)
        }
    };

    if args.config_path.is_some()
        && let Some(token) = &args.access_token
    {
        config.access_token = token.clone();
    }
    if let Some(url) = &args.server_url {
        config.server_url = Some(url.clone());
    }
    if let Some(url) = &args.stream_url {
        config.stream_url = Some(url.clone());
    }
    config.validate().context("validate config")?;
    Ok(config)
}

/// Cancel `shutdown` on the first SIGINT or SIGTERM
fn spawn_shutdown_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        info!(signal, "received shutdown signal");
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => tokio::select! {
            name = interrupt() => name,
            _ = terminate.recv() => "SIGTERM",
        },
        Err(err) => {
            warn!(error = %err, "SIGTERM handler unavailable, waiting for SIGINT only");
            interrupt().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    interrupt().await
}

async fn interrupt() -> &'static str {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "SIGINT handler unavailable");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
