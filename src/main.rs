use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use pronounce_proxy::config::{Config, Credentials, VendorKind};
use pronounce_proxy::signing::{HmacSigner, http_date};

#[derive(Parser, Debug)]
#[command(name = "pronounce-proxy", version, about = "Signing proxy for pronunciation practice vendors")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP proxy
    Serve(ServeArgs),
    /// Print the canonical string and headers of a signed request
    Sign(SignArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Path to the TOML config file
    #[arg(short, long, env = "PRONOUNCE_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind (overrides config)
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Vendor backing the proxy: gemini, baidu or xunfei (overrides config)
    #[arg(long, env = "PRONOUNCE_PROXY_VENDOR")]
    vendor: Option<VendorKind>,

    /// Emit JSON log lines
    #[arg(long)]
    log_json: bool,
}

#[derive(Args, Debug)]
struct SignArgs {
    /// Host header value, including a non-default port
    #[arg(long)]
    host: String,

    /// Request path
    #[arg(long)]
    path: String,

    #[arg(long, default_value = "GET")]
    method: String,

    /// RFC 1123 date; defaults to now
    #[arg(long)]
    date: Option<String>,

    /// Request body; adds the digest line when non-empty
    #[arg(long)]
    body: Option<String>,

    #[arg(long, env = "XUNFEI_API_KEY", hide_env_values = true)]
    api_key: String,

    #[arg(long, env = "XUNFEI_API_SECRET", hide_env_values = true)]
    api_secret: String,
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
            .ok();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Sign(args) => sign(args),
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut config = Config::load(args.config.as_deref()).context("failed to load config")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(vendor) = args.vendor {
        config.vendor.kind = vendor;
    }

    init_logging(&config.logging.level, args.log_json || config.logging.json);
    info!(version = env!("CARGO_PKG_VERSION"), "starting pronounce-proxy");

    let credentials = Credentials::from_env();
    tracing::debug!(?credentials, "credentials loaded");
    pronounce_proxy::server::serve(config, credentials).await
}

fn sign(args: SignArgs) -> Result<()> {
    init_logging("warn", false);

    let date = args.date.unwrap_or_else(|| http_date(Utc::now()));
    let body = args.body.unwrap_or_default();
    let signed = HmacSigner::new(args.api_key, args.api_secret).sign(
        &args.host,
        &args.path,
        &args.method,
        &date,
        body.as_bytes(),
    )?;

    println!("--- canonical string ---");
    println!("{}", signed.canonical);
    println!("--- headers ---");
    println!("Host: {}", signed.host);
    println!("Date: {}", signed.date);
    if let Some(digest) = &signed.digest {
        println!("Digest: {}", digest);
    }
    println!("Authorization: {}", signed.authorization);
    println!("--- signature ---");
    println!("{}", signed.signature);
    Ok(())
}
