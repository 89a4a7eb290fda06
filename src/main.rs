use anyhow::{bail, Context, Result};
use clap::Parser;
use rfexport::{DirectorySink, ExportConfig, ExportOutcome, Preview, ReportPage};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Export an HTML report region as a paginated A4 PDF of raster pages
#[derive(Debug, Parser)]
#[command(name = "rfexport", version, about)]
struct Cli {
    /// HTML document containing the report
    input: PathBuf,

    /// CSS selector of the region to export
    #[arg(short, long, default_value = "#report")]
    selector: String,

    /// Directory the document is written to
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// JSON config file; omitted fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the capture scale
    #[arg(long)]
    scale: Option<u32>,

    /// Fetch remote images referenced by the region before capture
    #[arg(long)]
    preload: bool,

    /// Base URL for resolving relative image sources
    #[arg(long)]
    base_url: Option<String>,

    /// Print the page placements as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = try_main() {
        eprintln!("Error: {e:#}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[tokio::main(flavor = "current_thread")]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ExportConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))?,
        None => ExportConfig::default(),
    };
    if let Some(scale) = cli.scale {
        config.scale = scale;
    }

    let html = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let page = ReportPage::new(html, cli.selector.clone())?;
    let sink = Arc::new(DirectorySink::new(&cli.out_dir));
    let preview = Preview::new(page, config, sink).context("Invalid export configuration")?;

    if cli.preload {
        preload(&preview, &cli).await?;
    } else {
        preview.open();
    }

    match preview.export().await {
        ExportOutcome::Saved { path, placements } => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&placements)?);
            } else {
                println!("  PDF:   {}", path.display());
                println!("  Pages: {}", placements.len());
            }
            Ok(())
        }
        ExportOutcome::MissingRegion => bail!("no element matches '{}'", cli.selector),
        ExportOutcome::AlreadyRunning => bail!("an export is already running"),
        ExportOutcome::Failed(reason) => bail!("PDF generation failed: {}", reason),
    }
}

#[cfg(feature = "fetch")]
async fn preload(preview: &Preview, cli: &Cli) -> Result<()> {
    let mut preloader = rfexport::preload::ImagePreloader::new(preview.config())?;
    if let Some(base) = &cli.base_url {
        preloader = preloader.with_base_url(base)?;
    }
    let count = preview
        .open_and_preload(&preloader)
        .await
        .context("Failed to preload images")?;
    log::info!("preloaded {} image(s)", count);
    Ok(())
}

#[cfg(not(feature = "fetch"))]
async fn preload(_preview: &Preview, _cli: &Cli) -> Result<()> {
    bail!("image preloading requires the `fetch` feature")
}
