use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use clap_verbosity_flag::InfoLevel;
use tokio_util::sync::CancellationToken;
use vfetch_core::ContentPath;
use vfetch_gateway::VerifiedFetcher;

use crate::helpers::{Overrides, apply_overrides, load_config};

mod helpers;

/// Fetch a file from trustless gateways, verifying every block on the way.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Content path to fetch, e.g. /ipfs/<cid>/dir/file or /ipns/<name>
    path: String,

    /// trustless gateway to download from; repeat to pick randomly among mirrors
    #[arg(short, long = "gateway", value_name = "URL")]
    gateways: Vec<String>,

    /// user agent to use during the HTTP requests
    #[arg(short, long, value_name = "UA")]
    user_agent: Option<String>,

    /// output path to store the fetched file
    #[arg(short, long, value_name = "PATH", default_value = "out")]
    output: PathBuf,

    /// response size limit in bytes, 0 for none
    #[arg(short, long, value_name = "BYTES")]
    limit: Option<u64>,

    /// TOML file with gateway settings; flags take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let path = ContentPath::parse(&cli.path)
        .with_context(|| format!("invalid content path {:?}", cli.path))?;
    let config = apply_overrides(
        load_config(cli.config.as_deref()).await?,
        Overrides {
            gateways: cli.gateways,
            user_agent: cli.user_agent,
            limit: cli.limit,
        },
    );
    tracing::debug!(?config, "gateway settings");

    let fetcher = VerifiedFetcher::new(&config).context("failed to set up gateway client")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling fetch");
            on_signal.cancel();
        }
    });

    let written = fetcher
        .fetch_to_path(&path, &cli.output, &cancel)
        .await
        .with_context(|| format!("failed to fetch {path}"))?;
    println!("{written} bytes written to {}", cli.output.display());
    Ok(())
}
