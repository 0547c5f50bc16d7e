use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dcsignal::catalog::{FeatureCatalog, JsonFileCatalog, SqlMirrorCatalog};
use dcsignal::config::FeaturizerConfig;
use dcsignal::constraint::ConstraintSet;
use dcsignal::featurize::{run_featurizers, DcFeaturizer, Featurizer, Mode};
use dcsignal::sink::{ChannelSink, QuerySink};

/// Synthesize denial-constraint feature queries
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// JSON file with the parsed denial constraints
    #[arg(long)]
    constraints: PathBuf,

    /// TOML featurizer configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Feature catalog file (defaults to the platform data directory)
    #[arg(long)]
    catalog: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ModeArg::Training)]
    mode: ModeArg,

    /// Maximum number of queries handed to the executor at once
    #[arg(long, default_value_t = 16)]
    batch_size: usize,

    /// Also emit each catalog batch as an INSERT into the dataset's catalog table
    #[arg(long)]
    mirror_catalog: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Training,
    Inference,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Training => Mode::Training,
            ModeArg::Inference => Mode::Inference,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only SQL
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mode = Mode::from(cli.mode);

    let config = FeaturizerConfig::load_or_default(cli.config.as_deref())?;
    let json = std::fs::read_to_string(&cli.constraints)
        .with_context(|| format!("reading constraints {}", cli.constraints.display()))?;
    let constraints = ConstraintSet::from_json(&json)
        .with_context(|| format!("parsing constraints {}", cli.constraints.display()))?;

    let catalog_path = cli
        .catalog
        .unwrap_or_else(|| JsonFileCatalog::default_path(&config.dataset_id));
    info!(catalog = %catalog_path.display(), %mode, constraints = constraints.len(), "starting");

    let (sink, mut batches) = ChannelSink::channel("SignalDC", cli.batch_size);
    let file_catalog = JsonFileCatalog::new(catalog_path);
    let catalog: Arc<dyn FeatureCatalog> = if cli.mirror_catalog {
        let mirror: Arc<dyn QuerySink> = Arc::new(sink.with_origin("catalog"));
        Arc::new(SqlMirrorCatalog::new(
            file_catalog,
            config.catalog_table_name(),
            mirror,
        ))
    } else {
        Arc::new(file_catalog)
    };

    let printer = tokio::spawn(async move {
        let mut printed = 0usize;
        while let Some(batch) = batches.next_batch().await {
            for query in batch {
                println!("{};", query.sql);
                printed += 1;
            }
        }
        printed
    });

    let featurizer: Arc<dyn Featurizer> = Arc::new(DcFeaturizer::new(constraints, config));
    let sink: Arc<dyn QuerySink> = Arc::new(sink);
    let runs = run_featurizers(vec![featurizer], mode, catalog, Some(sink)).await?;

    // Every sender is gone once the featurizers return, so the printer drains and exits
    let printed = printer.await?;

    for run in runs {
        let queries = run
            .result
            .with_context(|| format!("featurizer {} failed", run.id))?;
        info!(featurizer = %run.id, queries = queries.len(), printed, "done");
    }

    Ok(())
}
