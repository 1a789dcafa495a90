//! `sseam-proxy` binary entrypoint.
//!
//! Binds the proxy, prints the bound port as the first line of stdout for
//! a supervising process to capture, then serves until killed.

use anyhow::Context;
use clap::Parser;
use sseam_proxy::{bind, ProxyConfig};
use tracing_subscriber::EnvFilter;

/// Normalizing proxy between an OpenAI-compatible streaming client and an
/// upstream chat-completions server.
#[derive(Parser, Debug)]
#[command(name = "sseam-proxy", version, about, long_about = None)]
struct Cli {
    /// Upstream base URL, e.g. `https://genai.example.com/openai/v1`
    upstream_base_url: String,

    /// API key injected as a bearer token on every forwarded request
    api_key: String,

    /// Model name substituted for hardcoded `gpt-4o-mini*` models
    model_name: Option<String>,

    /// Interface to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind; 0 lets the kernel pick a free one
    #[arg(long, default_value_t = 0)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr: stdout is reserved for the port line.
    // Respect `RUST_LOG` if set; otherwise stay quiet per request.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ProxyConfig::new(cli.upstream_base_url, cli.api_key, cli.model_name);

    let (server, port) = bind(config, &cli.host, cli.port)?;
    println!("{}", port);
    server.await.context("server error")
}
