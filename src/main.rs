//! vhost-proxy - Main entry point
//!
//! Simple reverse proxy for virtual hosting

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use vhost_proxy::config::{DEFAULT_FORWARD_ADDRESS, DEFAULT_HTTP_PORT, DEFAULT_LISTEN_ADDRESS};
use vhost_proxy::{ProxyOptions, ProxyServer, TlsMaterial};

/// vhost-proxy - simple reverse proxy for virtual hosting
#[derive(Parser, Debug)]
#[command(name = "vhost-proxy")]
#[command(version)]
#[command(about = "Simple reverse proxy for virtual hosting")]
#[command(arg_required_else_help = true)]
struct Args {
    /// The port to listen for HTTP traffic on
    #[arg(short = 'p', long, env = "HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    http_port: u16,

    /// The port to listen for HTTPS traffic on [default: 443]
    #[arg(short = 'q', long, env = "HTTPS_PORT")]
    https_port: Option<u16>,

    /// The address to listen on
    #[arg(short = 'a', long, env = "LISTEN_ADDRESS", default_value = DEFAULT_LISTEN_ADDRESS)]
    listen_address: String,

    /// The address to forward requests to
    #[arg(short = 'f', long, env = "FORWARD_ADDRESS", default_value = DEFAULT_FORWARD_ADDRESS)]
    forward_address: String,

    /// The certificate and key to use for HTTPS
    #[arg(short = 's', long = "tls", num_args = 2, value_names = ["CERTIFICATE", "KEY"])]
    tls: Option<Vec<PathBuf>>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Rules of the form [@|#]<host>:<port>[,...]; `@` is HTTPS only, `#` redirects HTTP to HTTPS
    #[arg(value_name = "RULES")]
    rules: Vec<String>,
}

/// Read certificate and key files into memory
fn read_tls_material(paths: &[PathBuf]) -> Result<TlsMaterial> {
    let [certificate, key] = paths else {
        anyhow::bail!("expected a certificate path and a key path");
    };

    Ok(TlsMaterial {
        certificate: std::fs::read(certificate)
            .with_context(|| format!("Failed to read certificate {}", certificate.display()))?,
        key: std::fs::read(key).with_context(|| format!("Failed to read key {}", key.display()))?,
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let tls = args.tls.as_deref().map(read_tls_material).transpose()?;

    let options = ProxyOptions {
        listen_address: args.listen_address,
        http_port: args.http_port,
        https_port: args.https_port,
        forward_address: args.forward_address,
        tls,
        rules: args.rules,
    };

    let config = match options.validate() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    info!("Starting vhost-proxy v{}", env!("CARGO_PKG_VERSION"));

    let server = Arc::new(ProxyServer::new(config));
    server.run().await?;

    Ok(ExitCode::SUCCESS)
}
