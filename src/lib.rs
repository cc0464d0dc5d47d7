//! # paper-analyzer
//!
//! Client for the three-pass research paper analysis backend.
//!
//! The backend does the actual reading: it extracts the PDF's text and runs a
//! language model over it three times, each pass going deeper (first skim,
//! second read, critical third read). This crate owns everything on the
//! client side of that exchange:
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Document  load a local file or URL, check it is a PDF
//!  ├─ 2. Session   gate passes 1 → 2 → 3, upload once, cache results
//!  ├─ 3. Backend   POST /upload/paper, POST /analyze/paper[/{id}]?pass_number=N
//!  ├─ 4. Payload   validate the JSON analysis into a sum type
//!  └─ 5. Render    labelled sections → terminal text or Markdown
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paper_analyzer::{render_payload, AnalysisSession, AnalyzerConfig, Document, PassNumber};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = AnalysisSession::new(AnalyzerConfig::default())?;
//!     session.select_document(Document::from_path("paper.pdf").await?);
//!
//!     for pass in PassNumber::ALL {
//!         session.run_pass(pass).await?;
//!         if let Some(result) = session.result(pass) {
//!             println!("{}", render_payload(result));
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paper-analyzer` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod images;
pub mod pass;
pub mod payload;
pub mod progress;
pub mod render;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{AnalysisStrategy, HttpTransport, SingleRequest, Transport, UploadOnce};
pub use config::{AnalyzerConfig, AnalyzerConfigBuilder, BackendMode, FailurePolicy};
pub use document::Document;
pub use error::AnalyzerError;
pub use pass::{PassNumber, PassState};
pub use payload::{AnalysisPayload, ImageRecord, Scalar};
pub use progress::{NoopObserver, SessionObserver};
pub use render::{render, render_payload, RenderInput, Rendered, Section, SectionBody};
pub use session::{AnalysisSession, DocumentPhase, PassOutcome, SessionSnapshot};
