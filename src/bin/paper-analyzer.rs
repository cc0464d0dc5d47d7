//! CLI binary for paper-analyzer.
//!
//! A thin shim over the library crate: maps CLI flags to `AnalyzerConfig`,
//! drives an `AnalysisSession`, and prints rendered results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use paper_analyzer::config::DEFAULT_BASE_URL;
use paper_analyzer::images;
use paper_analyzer::render::pass_markdown;
use paper_analyzer::{
    render_payload, AnalysisSession, AnalyzerConfig, BackendMode, Document, FailurePolicy,
    PassNumber, PassOutcome, PassState, SessionObserver,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
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

// ── Loading indicator ────────────────────────────────────────────────────────

/// Spinner shown while a request is in flight.
struct SpinnerObserver {
    bar: ProgressBar,
}

impl SpinnerObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        Arc::new(Self { bar })
    }

    fn spin(&self, prefix: &str, msg: String) {
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.reset();
        self.bar.set_prefix(prefix.to_string());
        self.bar.set_message(msg);
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn stop(&self) {
        self.bar.disable_steady_tick();
        self.bar.finish_and_clear();
    }
}

impl SessionObserver for SpinnerObserver {
    fn on_upload_start(&self, document_name: &str) {
        self.spin("Uploading", document_name.to_string());
    }

    fn on_upload_complete(&self, document_id: &str) {
        self.bar
            .println(format!("  {} Uploaded  {}", green("✓"), dim(document_id)));
    }

    fn on_pass_start(&self, pass: PassNumber) {
        self.spin("Analysing", format!("{} (pass {pass}/3)", pass.title()));
    }

    fn on_pass_complete(&self, pass: PassNumber, image_count: usize) {
        let elapsed = self.bar.elapsed().as_secs_f64();
        self.stop();
        let images = if image_count > 0 {
            format!("  {image_count} images")
        } else {
            String::new()
        };
        eprintln!(
            "  {} Pass {pass}  {}{}",
            green("✓"),
            dim(&format!("{elapsed:.1}s")),
            dim(&images)
        );
    }

    fn on_pass_failed(&self, pass: PassNumber, error: &str) {
        self.stop();
        eprintln!("  {} Pass {pass}  {}", red("✗"), red(error));
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # First-pass skim of a local paper
  paper-analyzer paper.pdf

  # All three passes, Markdown report written to a file
  paper-analyzer --passes 3 --markdown -o report.md paper.pdf

  # Analyse a paper straight from arXiv, saving extracted figures
  paper-analyzer --passes 2 --images-dir figures https://arxiv.org/pdf/1706.03762

  # Backend without the upload endpoint: re-send the PDF every pass
  paper-analyzer --mode single paper.pdf

  # Full session state as JSON
  paper-analyzer --passes 3 --json paper.pdf > analysis.json

  # Interactive session (open / pass / show / status)
  paper-analyzer --interactive

PASSES:
  1  Title, abstract, structure, conclusions, and the five C's
  2  Figures, statistics, main thrust, key concepts and references
  3  Virtual re-implementation, assumptions, critique, future work
  Pass N is only requested once pass N-1 has a result.

ENVIRONMENT VARIABLES:
  PAPER_ANALYZER_URL      Backend base URL (default http://localhost:8000)
  PAPER_ANALYZER_MODE     upload | single
  RUST_LOG                Override log filter (e.g. paper_analyzer=debug)
"#;

/// Analyse research papers with the three-pass analysis backend.
#[derive(Parser, Debug)]
#[command(
    name = "paper-analyzer",
    version,
    about = "Analyse research papers with the three-pass analysis backend",
    long_about = "Send a PDF (local file or URL) to the research paper analysis backend and \
render its first, second, and third pass analyses as text, Markdown, or JSON.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "interactive")]
    input: Option<String>,

    /// Run passes 1 through N.
    #[arg(short, long, env = "PAPER_ANALYZER_PASSES", default_value_t = 1,
          value_parser = clap::value_parser!(u8).range(1..=3))]
    passes: u8,

    /// How the PDF reaches the backend.
    #[arg(long, env = "PAPER_ANALYZER_MODE", value_enum, default_value = "upload")]
    mode: ModeArg,

    /// Backend base URL.
    #[arg(long, env = "PAPER_ANALYZER_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Per-request timeout in seconds (default: none).
    #[arg(long, env = "PAPER_ANALYZER_TIMEOUT")]
    timeout: Option<u64>,

    /// Download timeout for URL inputs in seconds.
    #[arg(long, env = "PAPER_ANALYZER_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// What to do when a request fails.
    #[arg(long, env = "PAPER_ANALYZER_ON_ERROR", value_enum, default_value = "report")]
    on_error: OnErrorArg,

    /// Write the report to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Render results as Markdown.
    #[arg(long, conflicts_with = "json")]
    markdown: bool,

    /// Output the full session state as JSON.
    #[arg(long)]
    json: bool,

    /// Save extracted images into this directory.
    #[arg(long, env = "PAPER_ANALYZER_IMAGES_DIR")]
    images_dir: Option<PathBuf>,

    /// Interactive session reading commands from stdin.
    #[arg(short, long, conflicts_with_all = ["json", "output"])]
    interactive: bool,

    /// Disable the loading spinner.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Upload,
    Single,
}

impl From<ModeArg> for BackendMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Upload => BackendMode::UploadOnce,
            ModeArg::Single => BackendMode::SingleRequest,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OnErrorArg {
    /// Log the failure and stop quietly.
    Silent,
    /// Print the failure and exit non-zero.
    Report,
}

impl From<OnErrorArg> for FailurePolicy {
    fn from(v: OnErrorArg) -> Self {
        match v {
            OnErrorArg::Silent => FailurePolicy::Silent,
            OnErrorArg::Report => FailurePolicy::Surface,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner covers progress; keep library INFO logs out of its way.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    let config = build_config(&cli)?;
    let mut session = AnalysisSession::new(config).context("Failed to create session")?;
    if show_progress {
        session = session.with_observer(SpinnerObserver::new());
    }

    if cli.interactive {
        return interactive(&cli, &mut session).await;
    }

    // ── Batch mode ───────────────────────────────────────────────────────
    let input = cli.input.as_deref().context("No input given")?;
    let document = Document::resolve(input, cli.download_timeout)
        .await
        .context("Failed to load PDF")?;
    session.select_document(document);

    let mut report = String::new();
    let mut completed = Vec::new();

    for n in 1..=cli.passes {
        let pass = PassNumber::new(n)?;
        match session.run_pass(pass).await.context("Analysis failed")? {
            PassOutcome::Failed(e) => {
                tracing::warn!("Stopping after pass {} failed: {}", pass, e);
                break;
            }
            PassOutcome::Cached | PassOutcome::Fetched { .. } | PassOutcome::Discarded => {}
        }

        let image_files = save_images(&cli, &session, pass).await?;
        if !cli.json {
            report.push_str(&format_pass(&cli, &session, pass, &image_files));
        }
        completed.push(pass);
    }

    if cli.json {
        report = serde_json::to_string_pretty(&session.snapshot())
            .context("Failed to serialise session")?;
        report.push('\n');
    }

    match cli.output {
        Some(ref path) => {
            write_atomic(path, &report).await?;
            if !cli.quiet {
                eprintln!(
                    "{}  {}/{} passes  →  {}",
                    if completed.len() == usize::from(cli.passes) {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    completed.len(),
                    cli.passes,
                    bold(&path.display().to_string())
                );
            }
        }
        None => print!("{report}"),
    }

    Ok(())
}

/// Map CLI args to `AnalyzerConfig`.
fn build_config(cli: &Cli) -> Result<AnalyzerConfig> {
    let mut builder = AnalyzerConfig::builder()
        .base_url(cli.base_url.as_str())
        .mode(cli.mode.into())
        .failure_policy(cli.on_error.into());
    if let Some(secs) = cli.timeout {
        builder = builder.request_timeout_secs(secs);
    }
    builder.build().context("Invalid configuration")
}

/// Save the images belonging to `pass` when `--images-dir` is set.
async fn save_images(
    cli: &Cli,
    session: &AnalysisSession,
    pass: PassNumber,
) -> Result<Vec<Option<PathBuf>>> {
    match (&cli.images_dir, session.images_pass()) {
        (Some(dir), Some(p)) if p == pass && !session.images().is_empty() => {
            images::save_all(dir, pass, session.images())
                .await
                .context("Failed to save images")
        }
        _ => Ok(Vec::new()),
    }
}

/// Text or Markdown rendering of one pass.
fn format_pass(
    cli: &Cli,
    session: &AnalysisSession,
    pass: PassNumber,
    image_files: &[Option<PathBuf>],
) -> String {
    let Some(payload) = session.result(pass) else {
        return String::new();
    };
    let images = if session.images_pass() == Some(pass) {
        session.images()
    } else {
        &[]
    };

    if cli.markdown || cli.output.is_some() {
        let mut md = pass_markdown(pass, payload, images, image_files);
        md.push('\n');
        return md;
    }

    let mut out = format!("{}\n\n{}", bold(&format!("━━ {} ━━", pass.title())), render_payload(payload));
    if !images.is_empty() {
        out.push_str(&format!("\n{}\n", bold("Figures")));
        for (i, img) in images.iter().enumerate() {
            let caption = img.caption.as_deref().unwrap_or("");
            let saved = match image_files.get(i) {
                Some(Some(p)) => format!("  {}", dim(&p.display().to_string())),
                _ => String::new(),
            };
            out.push_str(&format!("  • page {}  {caption}{saved}\n", img.page_number));
        }
    }
    out.push('\n');
    out
}

/// Atomic write: temp file in the same directory, then rename.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

// ── Interactive mode ─────────────────────────────────────────────────────────

const INTERACTIVE_HELP: &str = "\
commands:
  open <path|url>   select a PDF (clears all results)
  pass <1|2|3>      request a pass (stored passes are shown without a request)
  show [1|2|3]      show a stored pass (default: current)
  status            document, passes, images
  help              this text
  quit              exit";

async fn interactive(cli: &Cli, session: &mut AnalysisSession) -> Result<()> {
    if let Some(ref input) = cli.input {
        open(cli, session, input).await;
    }
    eprintln!("{}", dim(INTERACTIVE_HELP));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("{} ", cyan("›"));
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let arg = words.next();

        match command {
            "open" | "o" => match arg {
                Some(input) => open(cli, session, input).await,
                None => eprintln!("{}", red("usage: open <path|url>")),
            },
            "pass" | "p" => match parse_pass(arg) {
                Ok(pass) => run_interactive_pass(cli, session, pass).await?,
                Err(e) => eprintln!("{}", red(&e.to_string())),
            },
            "show" | "s" => {
                let pass = match arg {
                    Some(_) => match parse_pass(arg) {
                        Ok(p) => p,
                        Err(e) => {
                            eprintln!("{}", red(&e.to_string()));
                            continue;
                        }
                    },
                    None => session.current_pass(),
                };
                if session.show(pass).is_some() {
                    print!("{}", format_pass(cli, session, pass, &[]));
                } else {
                    eprintln!("{}", dim(&format!("pass {pass} has no result yet")));
                }
            }
            "status" | "st" => print_status(session),
            "help" | "h" | "?" => eprintln!("{}", dim(INTERACTIVE_HELP)),
            "quit" | "q" | "exit" => break,
            other => eprintln!("{}", red(&format!("unknown command '{other}' (try help)"))),
        }
    }
    Ok(())
}

async fn open(cli: &Cli, session: &mut AnalysisSession, input: &str) {
    match Document::resolve(input, cli.download_timeout).await {
        Ok(doc) => {
            eprintln!("{} {}", green("◆"), bold(doc.name()));
            session.select_document(doc);
        }
        Err(e) => eprintln!("{} {}", red("✗"), e),
    }
}

async fn run_interactive_pass(
    cli: &Cli,
    session: &mut AnalysisSession,
    pass: PassNumber,
) -> Result<()> {
    match session.run_pass(pass).await {
        Ok(PassOutcome::Cached) | Ok(PassOutcome::Fetched { .. }) => {
            let files = save_images(cli, session, pass).await?;
            print!("{}", format_pass(cli, session, pass, &files));
        }
        Ok(PassOutcome::Failed(_)) | Ok(PassOutcome::Discarded) => {}
        // Failures and locked passes are shown; the session stays usable.
        Err(e) => eprintln!("{} {}", red("✗"), e),
    }
    Ok(())
}

fn parse_pass(arg: Option<&str>) -> Result<PassNumber> {
    let Some(raw) = arg else {
        bail!("usage: pass <1|2|3>");
    };
    let n: u8 = raw
        .parse()
        .with_context(|| format!("invalid pass number: '{raw}'"))?;
    Ok(PassNumber::new(n)?)
}

fn print_status(session: &AnalysisSession) {
    let Some(doc) = session.document() else {
        eprintln!("{}", dim("no document selected"));
        return;
    };
    eprintln!("Document:  {} ({} bytes)", bold(doc.name()), doc.len());
    eprintln!("Phase:     {:?}", session.phase());
    if let Some(id) = session.document_id() {
        eprintln!("Id:        {id}");
    }
    for pass in PassNumber::ALL {
        let marker = match session.pass_state(pass) {
            PassState::Fulfilled => green("✓"),
            PassState::Pending => cyan("…"),
            PassState::NotRequested if session.can_request(pass) => "○".to_string(),
            PassState::NotRequested => dim("🔒"),
        };
        let current = if session.current_pass() == pass {
            dim("  (current)")
        } else {
            String::new()
        };
        eprintln!("  {marker} {}{current}", pass.title());
    }
    if !session.images().is_empty() {
        eprintln!("Images:    {}", session.images().len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["paper-analyzer", "paper.pdf"]).unwrap();
        assert_eq!(cli.passes, 1);
        assert_eq!(cli.base_url, DEFAULT_BASE_URL);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.mode, BackendMode::UploadOnce);
        assert_eq!(config.failure_policy, FailurePolicy::Surface);
        assert_eq!(config.request_timeout_secs, None);
    }

    #[test]
    fn passes_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["paper-analyzer", "--passes", "4", "p.pdf"]).is_err());
    }

    #[test]
    fn interactive_needs_no_input() {
        let cli = Cli::try_parse_from(["paper-analyzer", "--interactive"]).unwrap();
        assert!(cli.input.is_none());
    }

    #[test]
    fn parse_pass_arg() {
        assert_eq!(parse_pass(Some("2")).unwrap(), PassNumber::SECOND);
        assert!(parse_pass(Some("0")).is_err());
        assert!(parse_pass(Some("two")).is_err());
        assert!(parse_pass(None).is_err());
    }
}
