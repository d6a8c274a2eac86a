use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cardsmith_lib::application::services::RunControl;
use cardsmith_lib::settings::AppConfig;
use cardsmith_lib::{build_pipeline, init_tracing, load_units, BuildOptions, IndexTarget, SinkTarget};

#[derive(Parser, Debug)]
#[command(
    name = "cardsmith",
    about = "Generate novelty-filtered flashcards from a text document"
)]
struct Cli {
    /// UTF-8 text document to process
    input: PathBuf,

    /// Source label used in unit positions (defaults to the file stem)
    #[arg(long)]
    source: Option<String>,

    /// Optional JSON configuration file
    #[arg(long, env = "CARDSMITH_CONFIG")]
    config: Option<PathBuf>,

    /// Override the data directory holding the novelty index
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Append cards to this JSONL file instead of sending them to AnkiConnect
    #[arg(long)]
    export: Option<PathBuf>,

    /// Keep the novelty index in memory only (nothing is persisted)
    #[arg(long, default_value_t = false)]
    ephemeral: bool,

    /// Abort a unit that takes longer than this many seconds
    #[arg(long, env = "CARDSMITH_UNIT_TIMEOUT_SECS")]
    unit_timeout_secs: Option<u64>,

    /// Write the JSON run report here in addition to stdout
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = try_main().await {
        eprintln!("[cardsmith] run failed: {err:?}");
        std::process::exit(1);
    }
}

async fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())
        .map_err(|err| anyhow!(err))
        .context("failed to load configuration")?;
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = Some(dir);
    }

    let source = cli.source.clone().unwrap_or_else(|| {
        cli.input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".into())
    });
    let units = load_units(&cli.input, &source, &config)?;

    let options = BuildOptions {
        sink: match cli.export.clone() {
            Some(path) => SinkTarget::JsonlFile(path),
            None => SinkTarget::AnkiConnect,
        },
        index: if cli.ephemeral {
            IndexTarget::Ephemeral
        } else {
            IndexTarget::Persistent
        },
    };
    let service = build_pipeline(&config, &options)?;

    let token = CancellationToken::new();
    let control = RunControl::new(token.clone(), cli.unit_timeout_secs.map(Duration::from_secs));

    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling remaining units and delivering completed cards");
            signal_token.cancel();
        }
    });

    info!(units = units.len(), "starting pipeline run");
    let report = tokio::task::spawn_blocking(move || service.run(&units, &control))
        .await
        .context("pipeline task panicked")?
        .map_err(|err| anyhow!(err))
        .context("pipeline run aborted")?;

    let json = serde_json::to_string_pretty(&report).context("failed to render report")?;
    if let Some(path) = &cli.report {
        std::fs::write(path, &json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }
    println!("{json}");

    Ok(())
}
