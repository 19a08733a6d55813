//! CLI binary for orccortex.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use orccortex::{
    convert, convert_to_file, get_problem, inspect, BlobStore, InMemoryDocumentStore,
    LocalBlobStore, PageProgress, PipelineConfig, ProblemRecord, ProcessingMode, ProgressCallback,
    UnconfiguredBlobStore, UploadService,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ── Terminal output ──────────────────────────────────────────────────────────

const GREEN: &str = "32";
const RED: &str = "31";
const YELLOW: &str = "33";
const DIM: &str = "2";

fn paint(code: &str, s: &str) -> String {
    format!("\x1b[{code}m{s}\x1b[0m")
}

/// First line of `error`, cut to `max` characters.
fn one_line(error: &str, max: usize) -> String {
    let line = error.lines().next().unwrap_or_default();
    if line.chars().count() > max {
        format!("{}\u{2026}", line.chars().take(max - 1).collect::<String>())
    } else {
        line.to_string()
    }
}

/// Page counter on stderr with one line per finished page.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{prefix} [{wide_bar}] {pos}/{len} pages {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix("structuring");
        Arc::new(Self { bar })
    }
}

impl PageProgress for CliProgress {
    fn on_document_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
    }

    fn on_page_complete(&self, page_num: usize, _total: usize, markdown_len: usize) {
        self.bar.println(format!(
            "  {} page {page_num:>3}  {}",
            paint(GREEN, "ok"),
            paint(DIM, &format!("{markdown_len} chars"))
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, _total: usize, error: &str) {
        self.bar.println(format!(
            "  {} page {page_num:>3}  {}",
            paint(RED, "failed"),
            one_line(error, 80)
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_pages.saturating_sub(success_count);
        let status = if failed == 0 {
            paint(GREEN, "done")
        } else {
            paint(YELLOW, "done with errors")
        };
        eprintln!("{status}: {success_count}/{total_pages} pages structured");
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Merge all pages into one Markdown document (stdout)
  orccortex --mode single worksheet.pdf

  # Write the merged document to a file
  orccortex --mode single worksheet.pdf -o worksheet.md

  # One problem record per page, as JSON
  orccortex --mode multi --json worksheet.pdf > problems.json

  # Scanned sheets: OCR in German, four pages at a time
  orccortex --lang deu --concurrency 4 scan.pdf

  # Page count only
  orccortex --inspect-only worksheet.pdf

ENVIRONMENT VARIABLES:
  ORCCORTEX_PDFIUM_DIR    Directory containing libpdfium
  TESSERACT_CMD           tesseract binary to run for OCR
  UPLOAD_DIR              Where uploads are staged in multi mode
  MAX_FILE_SIZE           Largest accepted upload, in bytes
  ORCCORTEX_BLOB_DIR      Copy uploads here, as the blob store would
  RUST_LOG                Overrides --verbose / --quiet log filtering
"#;

/// Structure PDF math worksheets into Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "orccortex",
    version,
    about = "Structure PDF math worksheets into Markdown",
    long_about = "Read each page of a PDF (text layer first, tesseract OCR as fallback), \
classify every line as header, numbered item, lettered item, math, list item or prose, \
and render the result as Markdown, either one problem per page or one merged document.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    input: PathBuf,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long, env = "ORCCORTEX_OUTPUT")]
    output: Option<PathBuf>,

    /// multi: one problem record per page. single: one merged document.
    #[arg(long, env = "ORCCORTEX_MODE", value_enum, default_value = "multi")]
    mode: ModeArg,

    /// Page rasterisation zoom for OCR (1.0–4.0).
    #[arg(long, env = "ORCCORTEX_RENDER_SCALE", default_value_t = 2.0)]
    render_scale: f32,

    /// Tesseract language code(s), e.g. eng or eng+deu.
    #[arg(long, env = "ORCCORTEX_OCR_LANG", default_value = "eng")]
    lang: String,

    /// tesseract binary to run.
    #[arg(long, env = "TESSERACT_CMD", default_value = "tesseract")]
    tesseract_cmd: String,

    /// Pages processed at the same time.
    #[arg(short, long, env = "ORCCORTEX_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Staging directory for uploads (multi mode).
    #[arg(long, env = "UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Largest accepted file, in bytes.
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = 10_485_760)]
    max_file_size: u64,

    /// Copy uploads into this directory as the blob store (multi mode).
    #[arg(long, env = "ORCCORTEX_BLOB_DIR")]
    blob_dir: Option<PathBuf>,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "ORCCORTEX_PDFIUM_DIR")]
    pdfium_dir: Option<PathBuf>,

    /// Owner recorded on problem records (multi mode).
    #[arg(long, env = "ORCCORTEX_USER", default_value = "cli")]
    user: String,

    /// Output JSON instead of Markdown.
    #[arg(long, env = "ORCCORTEX_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "ORCCORTEX_NO_PROGRESS")]
    no_progress: bool,

    /// Print the page count only, no structuring.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ORCCORTEX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ORCCORTEX_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Multi,
    Single,
}

impl From<ModeArg> for ProcessingMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Multi => ProcessingMode::MultiProblem,
            ModeArg::Single => ProcessingMode::SingleDocument,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // With the progress bar active only errors are logged; the bar covers the rest.
    let show_progress = show_bar(&cli);
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

    let progress_cb: Option<ProgressCallback> = if show_progress && !cli.inspect_only {
        let cb = CliProgress::new();
        Some(cb as Arc<dyn PageProgress>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let doc = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&doc).context("Failed to serialize document")?
            );
        } else {
            println!("File:   {}", cli.input.display());
            println!("Pages:  {}", doc.page_count);
        }
        return Ok(());
    }

    match config.mode {
        ProcessingMode::SingleDocument => run_single(&cli, &config).await,
        ProcessingMode::MultiProblem => run_multi(&cli, config).await,
    }
}

/// Merge every page into one document, no records.
async fn run_single(cli: &Cli, config: &PipelineConfig) -> Result<()> {
    if let Some(ref output_path) = cli.output {
        let stats = convert_to_file(&cli.input, output_path, config)
            .await
            .context("Conversion failed")?;
        if !cli.quiet {
            eprintln!(
                "{}/{} pages in {}ms, written to {}",
                stats.processed_pages,
                stats.total_pages,
                stats.total_duration_ms,
                output_path.display(),
            );
        }
        return Ok(());
    }

    let output = convert(&cli.input, config)
        .await
        .context("Conversion failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        write_stdout(&output.markdown)?;
    }

    if !cli.quiet && !show_bar(cli) {
        eprintln!(
            "Structured {}/{} pages in {}ms ({} empty)",
            output.stats.processed_pages,
            output.stats.total_pages,
            output.stats.total_duration_ms,
            output.stats.empty_pages
        );
        if output.stats.failed_pages > 0 {
            eprintln!("  {} pages failed", output.stats.failed_pages);
        }
    }
    Ok(())
}

/// Run the upload pipeline against an in-memory store and print the records.
async fn run_multi(cli: &Cli, config: PipelineConfig) -> Result<()> {
    let filename = cli
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bytes = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;

    let store = Arc::new(InMemoryDocumentStore::new());
    let blobs: Arc<dyn BlobStore> = match cli.blob_dir {
        Some(ref dir) => Arc::new(LocalBlobStore::new(dir)),
        None => Arc::new(UnconfiguredBlobStore),
    };
    let service = UploadService::from_config(config, store.clone(), blobs);

    let handle = service
        .upload(&cli.user, &filename, &bytes)
        .await
        .context("Upload rejected")?;
    let ids: Vec<String> = handle.receipt.problems.iter().map(|p| p.id.clone()).collect();
    let report = handle.wait().await.context("Processing failed")?;

    let mut records: Vec<ProblemRecord> = Vec::with_capacity(ids.len());
    for id in &ids {
        let record = get_problem(store.as_ref(), &cli.user, &cli.user, id)
            .await
            .with_context(|| format!("Failed to read problem {id}"))?;
        records.push(record);
    }
    records.sort_by_key(|r| r.page_number);

    let rendered = if cli.json {
        serde_json::to_string_pretty(&records).context("Failed to serialise records")?
    } else {
        records
            .iter()
            .map(|r| {
                format!(
                    "<!-- problem {} page {} {} -->\n\n{}",
                    r.id,
                    r.page_number.map(|p| p.to_string()).unwrap_or_default(),
                    r.status,
                    r.markdown_content.as_deref().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    match cli.output {
        Some(ref path) => tokio::fs::write(path, &rendered)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => write_stdout(&rendered)?,
    }

    if !cli.quiet && !show_bar(cli) {
        eprintln!(
            "{} problems: {} completed, {} failed",
            report.jobs.len(),
            report.completed,
            report.failed
        );
    }
    Ok(())
}

fn show_bar(cli: &Cli) -> bool {
    !cli.quiet && !cli.no_progress && !cli.json
}

fn write_stdout(text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .render_scale(cli.render_scale)
        .ocr_lang(cli.lang.clone())
        .tesseract_cmd(cli.tesseract_cmd.clone())
        .concurrency(cli.concurrency)
        .mode(cli.mode.into())
        .max_file_size(cli.max_file_size)
        .upload_dir(
            cli.upload_dir
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("orccortex-uploads")),
        );

    if let Some(ref dir) = cli.pdfium_dir {
        builder = builder.pdfium_dir(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
