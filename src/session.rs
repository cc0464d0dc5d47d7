//! The analysis session: upload/reset and pass-execution state machines.
//!
//! ## Document lifecycle
//!
//! ```text
//! NoFile ──select──▶ FileSelected ──pass──▶ Uploading ──▶ Uploaded
//!    ▲                    ▲                                   │
//!    └────────────────────┴────────── select (full reset) ────┘
//! ```
//!
//! ## Pass lifecycle
//!
//! ```text
//! NotRequested ──begin_pass──▶ Pending ──complete_pass(Ok)──▶ Fulfilled
//!       ▲                         │
//!       └──── complete_pass(Err) ─┘
//! ```
//!
//! Pass N can start only when a document is selected, nothing is pending,
//! and pass N−1 is fulfilled. Asking for a fulfilled pass never touches the
//! network; it only moves the "current pass" pointer.
//!
//! ## Split begin/complete
//!
//! [`AnalysisSession::run_pass`] is the usual entry point. Hosts that keep the
//! session behind their own event loop can instead call
//! [`AnalysisSession::begin_pass`], perform [`AnalysisSession::fetch`]
//! elsewhere, and hand the response to [`AnalysisSession::complete_pass`].
//! Every [`PassTicket`] remembers which document it was issued for, so a
//! response that arrives after the user switched documents is dropped rather
//! than written into the new document's results.

use crate::backend::{strategy_for, Analysis, AnalysisStrategy, HttpTransport, Transport, Upload};
use crate::config::{AnalyzerConfig, FailurePolicy};
use crate::document::Document;
use crate::error::AnalyzerError;
use crate::pass::{PassNumber, PassState};
use crate::payload::{AnalysisPayload, ImageRecord};
use crate::progress::{NoopObserver, Observer};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the current document stands with respect to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentPhase {
    NoFile,
    FileSelected,
    Uploading,
    Uploaded,
}

/// Result of a pass request that did not fail with a usage error.
#[derive(Debug)]
pub enum PassOutcome {
    /// The pass was already fulfilled; only the current pass changed.
    Cached,
    /// A new result was fetched and stored.
    Fetched { image_count: usize },
    /// The backend request failed and the pass was reverted
    /// ([`FailurePolicy::Silent`] only; other errors are returned).
    Failed(AnalyzerError),
    /// The response belonged to a document that has since been replaced.
    Discarded,
}

/// What [`AnalysisSession::begin_pass`] decided.
#[derive(Debug)]
pub enum PassStart {
    Cached,
    Started(PassTicket),
}

/// A pass that has been marked pending and is waiting for its response.
///
/// Not `Clone`: each ticket completes its pass at most once.
#[derive(Debug)]
pub struct PassTicket {
    pass: PassNumber,
    generation: u64,
    document: Arc<Document>,
    document_id: Option<String>,
    needs_upload: bool,
}

impl PassTicket {
    pub fn pass(&self) -> PassNumber {
        self.pass
    }

    /// Whether an upload will be performed before the analysis request.
    pub fn needs_upload(&self) -> bool {
        self.needs_upload
    }
}

/// Everything the backend returned for one ticket.
#[derive(Debug)]
pub struct PassResponse {
    /// Set when an upload happened and succeeded, even if the analysis
    /// request after it failed.
    pub upload: Option<Upload>,
    pub analysis: Result<Analysis, AnalyzerError>,
}

/// Client-side state for one analysed paper at a time.
pub struct AnalysisSession {
    config: AnalyzerConfig,
    transport: Arc<dyn Transport>,
    strategy: Arc<dyn AnalysisStrategy>,
    observer: Observer,

    document: Option<Arc<Document>>,
    /// Bumped on every document selection; tickets from older generations
    /// are stale.
    generation: u64,
    document_id: Option<String>,
    metadata: Option<Value>,
    results: [Option<AnalysisPayload>; 3],
    images: Vec<ImageRecord>,
    images_pass: Option<PassNumber>,
    current_pass: PassNumber,
    pending: Option<PassNumber>,
    uploading: bool,
}

impl std::fmt::Debug for AnalysisSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisSession")
            .field("config", &self.config)
            .field("document", &self.document)
            .field("document_id", &self.document_id)
            .field("current_pass", &self.current_pass)
            .field("pending", &self.pending)
            .field("fulfilled", &self.results.iter().map(Option::is_some).collect::<Vec<_>>())
            .finish()
    }
}

impl AnalysisSession {
    /// Session talking to the configured backend over HTTP.
    pub fn new(config: AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Session over a caller-supplied transport.
    pub fn with_transport(config: AnalyzerConfig, transport: Arc<dyn Transport>) -> Self {
        let strategy = strategy_for(config.mode);
        Self {
            config,
            transport,
            strategy,
            observer: Arc::new(NoopObserver),
            document: None,
            generation: 0,
            document_id: None,
            metadata: None,
            results: [None, None, None],
            images: Vec::new(),
            images_pass: None,
            current_pass: PassNumber::FIRST,
            pending: None,
            uploading: false,
        }
    }

    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = observer;
        self
    }

    // ── Document selection ───────────────────────────────────────────────

    /// Make `document` the current document.
    ///
    /// Always a full reset: all pass results, the image list, metadata, the
    /// document id and any pending request are dropped, and the current pass
    /// returns to 1.
    pub fn select_document(&mut self, document: Document) {
        info!("Selected document: {} ({} bytes)", document.name(), document.len());
        if let Some(pass) = self.pending {
            debug!("Abandoning pending pass {} for previous document", pass);
        }

        self.generation += 1;
        self.document = Some(Arc::new(document));
        self.document_id = None;
        self.metadata = None;
        self.results = [None, None, None];
        self.images.clear();
        self.images_pass = None;
        self.current_pass = PassNumber::FIRST;
        self.pending = None;
        self.uploading = false;
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_deref()
    }

    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    /// Images from the most recent response that carried any.
    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    /// The pass whose response produced [`AnalysisSession::images`].
    pub fn images_pass(&self) -> Option<PassNumber> {
        self.images_pass
    }

    pub fn result(&self, pass: PassNumber) -> Option<&AnalysisPayload> {
        self.results[pass.index()].as_ref()
    }

    /// The pass currently on display.
    pub fn current_pass(&self) -> PassNumber {
        self.current_pass
    }

    pub fn current_result(&self) -> Option<&AnalysisPayload> {
        self.result(self.current_pass)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn phase(&self) -> DocumentPhase {
        match (&self.document, self.uploading, &self.document_id) {
            (None, _, _) => DocumentPhase::NoFile,
            (Some(_), true, _) => DocumentPhase::Uploading,
            (Some(_), false, Some(_)) => DocumentPhase::Uploaded,
            (Some(_), false, None) => DocumentPhase::FileSelected,
        }
    }

    pub fn pass_state(&self, pass: PassNumber) -> PassState {
        if self.pending == Some(pass) {
            PassState::Pending
        } else if self.results[pass.index()].is_some() {
            PassState::Fulfilled
        } else {
            PassState::NotRequested
        }
    }

    /// Whether the control for `pass` would be enabled.
    pub fn can_request(&self, pass: PassNumber) -> bool {
        self.document.is_some()
            && self.pending.is_none()
            && pass
                .previous()
                .is_none_or(|prev| self.pass_state(prev) == PassState::Fulfilled)
    }

    /// Display an already fulfilled pass. Returns its result, or `None`
    /// (and leaves the current pass alone) when it has none yet.
    pub fn show(&mut self, pass: PassNumber) -> Option<&AnalysisPayload> {
        if self.results[pass.index()].is_some() {
            self.current_pass = pass;
        }
        self.results[pass.index()].as_ref()
    }

    // ── Pass execution ───────────────────────────────────────────────────

    /// Request `pass`: serve it from the store or fetch it from the backend.
    pub async fn run_pass(&mut self, pass: PassNumber) -> Result<PassOutcome, AnalyzerError> {
        let ticket = match self.begin_pass(pass)? {
            PassStart::Cached => return Ok(PassOutcome::Cached),
            PassStart::Started(ticket) => ticket,
        };
        let response = self.fetch(&ticket).await;
        self.complete_pass(ticket, response)
    }

    /// Validate the request and mark `pass` pending.
    pub fn begin_pass(&mut self, pass: PassNumber) -> Result<PassStart, AnalyzerError> {
        if self.pending.is_some() {
            return Err(AnalyzerError::RequestPending);
        }
        let Some(document) = self.document.clone() else {
            return Err(AnalyzerError::NoDocument);
        };

        if self.results[pass.index()].is_some() {
            debug!("Pass {} already fulfilled; showing stored result", pass);
            self.current_pass = pass;
            return Ok(PassStart::Cached);
        }

        if !self.can_request(pass) {
            return Err(AnalyzerError::PassLocked { pass });
        }

        let needs_upload = self.strategy.needs_upload() && self.document_id.is_none();
        self.pending = Some(pass);
        self.uploading = needs_upload;

        Ok(PassStart::Started(PassTicket {
            pass,
            generation: self.generation,
            document,
            document_id: self.document_id.clone(),
            needs_upload,
        }))
    }

    /// Perform the network work for `ticket`. Never mutates the session.
    pub async fn fetch(&self, ticket: &PassTicket) -> PassResponse {
        let transport = self.transport.as_ref();
        let document = ticket.document.as_ref();

        let mut upload = None;
        let mut document_id = ticket.document_id.clone();

        if ticket.needs_upload {
            self.observer.on_upload_start(document.name());
            info!("Uploading {}", document.name());
            match self.strategy.upload(transport, document).await {
                Ok(up) => {
                    document_id = Some(up.document_id.clone());
                    upload = Some(up);
                }
                Err(e) => {
                    return PassResponse {
                        upload: None,
                        analysis: Err(e),
                    }
                }
            }
        }

        self.observer.on_pass_start(ticket.pass);
        info!("Requesting pass {} for {}", ticket.pass, document.name());
        let analysis = self
            .strategy
            .analyze(transport, document, document_id.as_deref(), ticket.pass)
            .await;

        PassResponse { upload, analysis }
    }

    /// Apply the backend's response for `ticket`.
    pub fn complete_pass(
        &mut self,
        ticket: PassTicket,
        response: PassResponse,
    ) -> Result<PassOutcome, AnalyzerError> {
        let pass = ticket.pass;

        if ticket.generation != self.generation {
            warn!(
                "Discarding pass {} response for replaced document '{}'",
                pass,
                ticket.document.name()
            );
            return Ok(PassOutcome::Discarded);
        }
        if self.pending != Some(pass) {
            warn!("Discarding pass {} response: pass is not pending", pass);
            return Ok(PassOutcome::Discarded);
        }

        self.pending = None;
        self.uploading = false;

        if let Some(up) = response.upload {
            info!("Uploaded; document id {}", up.document_id);
            self.observer.on_upload_complete(&up.document_id);
            self.document_id = Some(up.document_id);
            if self.metadata.is_none() {
                self.metadata = Some(up.metadata);
            }
        }

        match response.analysis {
            Ok(analysis) => {
                if let Some(message) = analysis.payload.backend_error() {
                    warn!("Pass {} analysis reports a backend failure: {}", pass, message);
                }

                let image_count = match analysis.images {
                    Some(images) => {
                        let n = images.len();
                        self.images = images;
                        self.images_pass = Some(pass);
                        n
                    }
                    None => 0,
                };

                self.results[pass.index()] = Some(analysis.payload);
                self.current_pass = pass;
                info!("Pass {} stored ({} images)", pass, image_count);
                self.observer.on_pass_complete(pass, image_count);
                Ok(PassOutcome::Fetched { image_count })
            }
            Err(e) => {
                warn!("Pass {} failed: {}", pass, e);
                self.observer.on_pass_failed(pass, &e.to_string());
                match self.config.failure_policy {
                    FailurePolicy::Silent if e.is_backend_failure() => Ok(PassOutcome::Failed(e)),
                    FailurePolicy::Silent | FailurePolicy::Surface => Err(e),
                }
            }
        }
    }

    /// Serializable view of the whole session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            document: self.document.as_ref().map(|d| d.name().to_string()),
            phase: self.phase(),
            document_id: self.document_id.clone(),
            metadata: self.metadata.clone(),
            current_pass: self.current_pass,
            passes: PassNumber::ALL
                .iter()
                .map(|&pass| PassSnapshot {
                    pass,
                    state: self.pass_state(pass),
                    analysis: self.result(pass).cloned(),
                })
                .collect(),
            images: self.images.clone(),
            images_pass: self.images_pass,
        }
    }
}

/// JSON-friendly copy of the session state.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub document: Option<String>,
    pub phase: DocumentPhase,
    pub document_id: Option<String>,
    pub metadata: Option<Value>,
    pub current_pass: PassNumber,
    pub passes: Vec<PassSnapshot>,
    pub images: Vec<ImageRecord>,
    pub images_pass: Option<PassNumber>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassSnapshot {
    pub pass: PassNumber,
    pub state: PassState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisPayload>,
}
