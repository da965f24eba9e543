//! CLI binary for docket-harvest.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `HarvestConfig` / `CombineOptions` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use docket_harvest::{
    combine_files, harvest, harvest_to_dir, CombineOptions, HarvestConfig, HarvestError,
    HarvestProgressCallback, HarvestStats, ProgressCallback, StopReason,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar counting comments, plus a log line per
/// page and per failed detail request.
struct CliProgressCallback {
    bar: ProgressBar,
    detail_errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Start as a spinner; the bar length is set once the first page reports
    /// `totalElements`.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Requesting first page…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            detail_errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: u64) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>5}/{len} comments  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Harvesting");
        self.bar.reset_eta();
    }
}

impl HarvestProgressCallback for CliProgressCallback {
    fn on_page_start(&self, page: u32) {
        self.bar.set_message(format!("page {page}"));
    }

    fn on_page_fetched(&self, page: u32, items: usize, total_elements: Option<u64>) {
        if let Some(total) = total_elements {
            if self.bar.length().unwrap_or(0) != total {
                self.activate_bar(total);
            }
        }
        self.bar.println(format!(
            "{} Page {:>4}  {}",
            cyan("◆"),
            page,
            dim(&format!("{items} comments")),
        ));
    }

    fn on_detail_error(&self, comment_id: &str, error: &str) {
        self.detail_errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            comment_id,
            red(&msg)
        ));
    }

    fn on_comment_complete(&self, _comment_id: &str, _emitted: bool) {
        self.bar.inc(1);
    }

    fn on_harvest_complete(&self, stats: &HarvestStats) {
        self.bar.finish_and_clear();
        let mark = if stats.stop_reason == StopReason::Cancelled {
            cyan("⚠")
        } else {
            green("✔")
        };
        eprintln!(
            "{} {} records from {} comments  ({} without text, {} detail failures)",
            mark,
            bold(&stats.records_emitted.to_string()),
            stats.items_seen,
            stats.items_dropped,
            stats.detail_failures,
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Pages 1-2 of a docket, written to ./IRS-2022-0029_comments_text_pdf_p1_to_p2.{json,csv}
  docket-harvest fetch IRS-2022-0029 --end-page 2

  # Whole docket into ./data, records also printed as JSON on stdout
  docket-harvest fetch IRS-2022-0029 -o data --json

  # Merge several harvests and build the cleaned corpus
  docket-harvest combine data/*.csv -o corpus --section-code 45Q --section-code 179D

ENVIRONMENT VARIABLES:
  REGULATIONS_API_KEY     regulations.gov API key (https://open.gsa.gov/api/regulationsgov/)
  DOCKET_HARVEST_OUT_DIR  Default output directory
  RUST_LOG                Override log filter (e.g. docket_harvest=debug)

RATE LIMITS:
  A key allows about 1,000 requests/hour. Each comment costs one detail request
  plus one request per attachment. HTTP 429 answers are retried with exponential
  backoff (1, 2, 4, 8, 16 s by default, or the server's Retry-After).
"#;

/// Harvest public comments and PDF attachment text from regulations.gov.
#[derive(Parser, Debug)]
#[command(
    name = "docket-harvest",
    version,
    about = "Harvest public comments and PDF attachment text from regulations.gov dockets",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCKET_HARVEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCKET_HARVEST_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a docket's comments and attachment text.
    Fetch(FetchArgs),
    /// Merge harvested CSV files and derive cleaned model text.
    Combine(CombineArgs),
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Docket identifier, e.g. IRS-2022-0029.
    docket: String,

    /// regulations.gov API key.
    #[arg(long, env = "REGULATIONS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// API root.
    #[arg(long, env = "DOCKET_HARVEST_BASE_URL", default_value = docket_harvest::config::DEFAULT_BASE_URL)]
    base_url: String,

    /// Comments per list page (1–250).
    #[arg(long, default_value_t = 250,
          value_parser = clap::value_parser!(u32).range(1..=250))]
    page_size: u32,

    /// First page to fetch (1-indexed).
    #[arg(long, default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(1..))]
    start_page: u32,

    /// Last page to fetch (inclusive). Default: until the server reports no next page.
    #[arg(long)]
    end_page: Option<u32>,

    /// Pause after each detail request, in milliseconds.
    #[arg(long, default_value_t = 300)]
    detail_sleep_ms: u64,

    /// Pause after each attachment download, in milliseconds.
    #[arg(long, default_value_t = 100)]
    attachment_sleep_ms: u64,

    /// Pause between list pages, in milliseconds.
    #[arg(long, default_value_t = 500)]
    page_sleep_ms: u64,

    /// Maximum pages of text read from each PDF attachment.
    #[arg(long, default_value_t = 20)]
    max_pdf_pages: usize,

    /// Retries on HTTP 429 (and on failed downloads).
    #[arg(long, default_value_t = 5)]
    max_retries: u32,

    /// JSON request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    request_timeout: u64,

    /// Attachment download timeout in seconds.
    #[arg(long, default_value_t = 60)]
    download_timeout: u64,

    /// Directory for the JSON and CSV output files.
    #[arg(short, long, env = "DOCKET_HARVEST_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Print records as a JSON array on stdout instead of writing files.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCKET_HARVEST_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct CombineArgs {
    /// CSV files produced by `fetch` (missing files are skipped).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for the combined raw and clean outputs.
    #[arg(short, long, env = "DOCKET_HARVEST_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Keep the original letter case in text_clean.
    #[arg(long)]
    keep_case: bool,

    /// Tax-code section to normalise ("section 45Q" → "45Q"). Repeatable.
    #[arg(long = "section-code")]
    section_codes: Vec<String>,

    /// Drop rows whose cleaned text is shorter than this.
    #[arg(long, default_value_t = 5)]
    min_length: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = match &cli.command {
        Command::Fetch(args) => !cli.quiet && !args.no_progress,
        Command::Combine(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Fetch(args) => run_fetch(args, show_progress, cli.quiet).await,
        Command::Combine(args) => run_combine(args, cli.quiet),
    }
}

async fn run_fetch(args: FetchArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn HarvestProgressCallback>)
    } else {
        None
    };

    // Ctrl-C stops between comments and still writes what was gathered.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let config = build_config(&args, progress_cb, cancel)?;

    if args.json {
        let output = harvest(&config).await.map_err(harvest_failed)?;
        let json =
            serde_json::to_string_pretty(&output.records).context("Failed to serialise records")?;
        println!("{json}");
        if !quiet && !show_progress {
            print_stats(&output.stats);
        }
        return Ok(());
    }

    let (stats, paths) = harvest_to_dir(&config, &args.out_dir)
        .await
        .map_err(harvest_failed)?;

    if !quiet {
        if !show_progress {
            print_stats(&stats);
        }
        eprintln!(
            "   {}  {}ms  →  {}  {}",
            dim(&format!("pages {}–{}", config.start_page, stats.last_page)),
            stats.duration_ms,
            bold(&paths.json.display().to_string()),
            bold(&paths.csv.display().to_string()),
        );
    }
    Ok(())
}

fn run_combine(args: CombineArgs, quiet: bool) -> Result<()> {
    let options = CombineOptions {
        lowercase: !args.keep_case,
        section_codes: args.section_codes,
        min_clean_len: args.min_length,
    };
    let summary =
        combine_files(&args.inputs, &args.out_dir, &options).context("Combine failed")?;

    if !quiet {
        for skipped in &summary.files_skipped {
            eprintln!("  {} not found, skipped: {}", cyan("⚠"), skipped.display());
        }
        eprintln!(
            "{} {} files  {} rows raw  →  {}",
            green("✔"),
            summary.files_read,
            summary.raw_rows,
            bold(&summary.raw_csv.display().to_string()),
        );
        eprintln!(
            "{} {} rows clean  →  {}",
            green("✔"),
            summary.clean_rows,
            bold(&summary.clean_csv.display().to_string()),
        );
    }
    Ok(())
}

/// Attach a hint telling remote failures apart from local ones.
fn harvest_failed(err: HarvestError) -> anyhow::Error {
    let hint = if err.is_remote() {
        "Harvest failed talking to regulations.gov; re-run with --start-page at the last page reached"
    } else {
        "Harvest failed"
    };
    anyhow::Error::new(err).context(hint)
}

fn print_stats(stats: &HarvestStats) {
    eprintln!(
        "Harvested {} records from {} comments on {} pages in {}ms ({:?})",
        stats.records_emitted,
        stats.items_seen,
        stats.pages_fetched,
        stats.duration_ms,
        stats.stop_reason,
    );
    if stats.detail_failures > 0 {
        eprintln!("  {} detail requests failed", stats.detail_failures);
    }
    if stats.attachments_empty > 0 {
        eprintln!(
            "  {}/{} attachments yielded no text",
            stats.attachments_empty, stats.attachments_found
        );
    }
}

/// Map CLI args to `HarvestConfig`.
fn build_config(
    args: &FetchArgs,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
) -> Result<HarvestConfig> {
    let mut builder = HarvestConfig::builder()
        .docket_id(args.docket.trim())
        .base_url(&args.base_url)
        .page_size(args.page_size)
        .pages(args.start_page, args.end_page)
        .per_detail_sleep(Duration::from_millis(args.detail_sleep_ms))
        .per_attachment_sleep(Duration::from_millis(args.attachment_sleep_ms))
        .per_page_sleep(Duration::from_millis(args.page_sleep_ms))
        .max_pdf_pages(args.max_pdf_pages)
        .max_retries(args.max_retries)
        .request_timeout_secs(args.request_timeout)
        .download_timeout_secs(args.download_timeout)
        .cancel_token(cancel);

    if let Some(ref key) = args.api_key {
        builder = builder.api_key(key.as_str());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_failures_get_a_resume_hint() {
        let err = harvest_failed(HarvestError::RateLimitExhausted {
            url: "https://api.regulations.gov/v4/comments".into(),
            attempts: 6,
        });
        assert!(err.to_string().contains("--start-page"));

        let err = harvest_failed(HarvestError::MissingApiKey);
        assert_eq!(err.to_string(), "Harvest failed");
    }
}
