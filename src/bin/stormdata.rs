//! Command-line front end for the stormdata pipeline.

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use stormdata::{Pipeline, PipelineConfig, RetryPolicy};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "stormdata",
    version,
    about = "Digitise scanned NOAA storm-report documents into spreadsheet rows",
    after_help = "Credentials are read from the environment (or a .env file):\n  \
                  GEMINI_API_KEY          extraction adapter key\n  \
                  STORMDATA_EXPORT_URL    spreadsheet endpoint\n  \
                  STORMDATA_EXPORT_TOKEN  optional bearer token"
)]
struct Args {
    /// Directory scanned for incoming <month>_<year>.pdf documents
    #[arg(long, default_value = "data/input")]
    input_dir: PathBuf,

    /// Root of the working layout (pages, processed results, archive, state)
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Minimum distinct-keyword score for a page to be kept
    #[arg(long, default_value_t = 6)]
    threshold: u32,

    /// Stop after scoring; make no extraction calls
    #[arg(long)]
    no_extract: bool,

    /// Skip the export stage; results stay under processed/
    #[arg(long)]
    no_export: bool,

    /// Save recognised OCR text per kept page for auditing
    #[arg(long)]
    save_ocr_text: bool,

    /// Rasterisation DPI for page images (72-600)
    #[arg(long, default_value_t = 300)]
    dpi: u32,

    /// Extraction model identifier
    #[arg(long, default_value = "gemini-2.5-flash-lite")]
    model: String,

    /// Concurrent period extractions
    #[arg(long, default_value_t = 2)]
    concurrency: usize,

    /// Total attempts per adapter call, including the first
    #[arg(long, default_value_t = 4)]
    max_attempts: u32,

    /// Per-adapter-call timeout in seconds
    #[arg(long, default_value_t = 180)]
    timeout: u64,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    /// Spreadsheet endpoint the export adapter POSTs rows to
    #[arg(long, env = "STORMDATA_EXPORT_URL")]
    export_url: Option<String>,

    /// Bearer token for the export endpoint
    #[arg(long, env = "STORMDATA_EXPORT_TOKEN", hide_env_values = true)]
    export_token: Option<String>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "stormdata=info",
        1 => "stormdata=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let mut builder = PipelineConfig::builder()
        .input_dir(&args.input_dir)
        .data_dir(&args.data_dir)
        .keep_threshold(args.threshold)
        .enable_extraction(!args.no_extract)
        .enable_export(!args.no_export)
        .save_ocr_text(args.save_ocr_text)
        .dpi(args.dpi)
        .model(args.model.clone())
        .concurrency(args.concurrency)
        .api_timeout(Duration::from_secs(args.timeout))
        .retry(RetryPolicy {
            max_attempts: args.max_attempts,
            ..RetryPolicy::default()
        });
    if let Some(key) = args.gemini_api_key {
        builder = builder.gemini_api_key(key);
    }
    if let Some(url) = args.export_url {
        builder = builder.export_url(url);
    }
    if let Some(token) = args.export_token {
        builder = builder.export_token(token);
    }
    let config = builder.build().context("invalid configuration")?;

    let mut pipeline = Pipeline::new(config)?;

    let spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("processing");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let summary = pipeline.run().await;
    spinner.finish_and_clear();

    let summary = summary.context("pipeline run failed")?;
    println!("{summary}");

    if summary.documents_failed > 0 || summary.periods_failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
