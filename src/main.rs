mod browser;
mod config;
mod crawler;
mod detail;
mod fetch;
mod naming;
mod ocr;
mod parser;
mod select;
mod sink;
#[cfg(test)]
mod testing;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use browser::chrome::LaunchOptions;
use browser::{BrowserSession, ChromeSession};
use config::Config;
use crawler::{Crawler, RunSummary};
use fetch::HttpFetcher;
use ocr::{CommandRecognizer, TextRecognizer};
use sink::{FileSink, Sink, WorkbookSink};

#[derive(Parser)]
#[command(name = "errcode_crawler", about = "Error-code manual crawler for table-indexed knowledge bases")]
struct Cli {
    /// Config file (default: ./errcode_crawler.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RunArgs {
    /// Index page address (overrides config)
    #[arg(long)]
    index_url: Option<String>,
    /// Output directory (overrides config)
    #[arg(short, long)]
    out: Option<PathBuf>,
    /// Run the browser without a window
    #[arg(long)]
    headless: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Save each entry's image, or an empty .txt marker when it has none
    Crawl {
        #[command(flatten)]
        run: RunArgs,
    },
    /// OCR each entry's image and write all parsed records to one workbook
    Export {
        #[command(flatten)]
        run: RunArgs,
        /// Workbook path (overrides config)
        #[arg(short, long)]
        workbook: Option<PathBuf>,
    },
    /// Parse a file of recognized text and print the record as JSON
    Parse {
        file: PathBuf,
    },
    /// Recognize one image, parse it, and print the record as JSON
    Ocr {
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Crawl { run } => {
            let config = load_run_config(cli.config.as_deref(), &run)?;
            let sink = FileSink::new(&config.output.dir)?;
            println!("Saving entries to {}", config.output.dir.display());
            let (summary, _) = crawl(&config, sink, None).await?;
            print_summary(&summary);
            Ok(())
        }
        Commands::Export { run, workbook } => {
            let mut config = load_run_config(cli.config.as_deref(), &run)?;
            if let Some(w) = workbook {
                config.output.workbook = w;
            }
            // Load the recognizer before the browser so a missing engine fails fast.
            let recognizer = CommandRecognizer::new(&config.ocr)?;
            let sink = WorkbookSink::open(&config.output.workbook)?;
            let (summary, sink) = crawl(&config, sink, Some(&recognizer)).await?;
            print_summary(&summary);
            println!(
                "Workbook {} now holds {} rows",
                config.output.workbook.display(),
                sink.rows().len()
            );
            Ok(())
        }
        Commands::Parse { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let record = parser::parse(&text);
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Commands::Ocr { image } => {
            let config = Config::load(cli.config.as_deref())?;
            let recognizer = CommandRecognizer::new(&config.ocr)?;
            let bytes = std::fs::read(&image)
                .with_context(|| format!("Failed to read {}", image.display()))?;
            let lines = recognizer.recognize(&bytes)?;
            let record = parser::parse_lines(&lines);
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn load_run_config(path: Option<&Path>, run: &RunArgs) -> Result<Config> {
    let mut config = Config::load(path)?;
    if let Some(url) = &run.index_url {
        config.index_url = url.clone();
    }
    if let Some(out) = &run.out {
        config.output.dir = out.clone();
    }
    if run.headless {
        config.browser.headless = true;
    }
    config.validate()?;
    Ok(config)
}

/// Drive one crawl with a fresh browser session, closing it on every exit path.
async fn crawl<S: Sink>(
    config: &Config,
    sink: S,
    recognizer: Option<&dyn TextRecognizer>,
) -> Result<(RunSummary, S)> {
    let fetcher = HttpFetcher::new(config.timing.fetch_timeout())?;
    let session = ChromeSession::launch(&LaunchOptions {
        headless: config.browser.headless,
        executable: config.browser.executable.clone(),
    })
    .await?;

    let result = {
        let mut crawler = Crawler::new(&session, &fetcher, sink, config);
        if let Some(r) = recognizer {
            crawler = crawler.with_recognizer(r);
        }
        let outcome = crawler.run().await;
        outcome.map(|summary| (summary, crawler.into_sink()))
    };

    if let Err(e) = session.close().await {
        warn!("Failed to close browser session: {}", e);
    }
    result
}

fn print_summary(s: &RunSummary) {
    println!(
        "Processed {} of {} entries ({} saved, {} without image, {} skipped, {} failed).",
        s.processed(),
        s.discovered,
        s.saved,
        s.placeholders,
        s.skipped,
        s.failed
    );
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
