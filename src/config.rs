//! Configuration types for an analysis session.
//!
//! All client behaviour is controlled through [`AnalyzerConfig`], built via
//! its [`AnalyzerConfigBuilder`]. The defaults reproduce the browser client:
//! local backend on port 8000, upload-once strategy, no request timeout and
//! silent failures.

use crate::error::AnalyzerError;
use serde::{Deserialize, Serialize};

/// Address the analysis backend listens on by default.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Configuration for an [`crate::session::AnalysisSession`].
///
/// # Example
/// ```rust
/// use paper_analyzer::{AnalyzerConfig, BackendMode, FailurePolicy};
///
/// let config = AnalyzerConfig::builder()
///     .base_url("http://analysis.internal:8000/")
///     .mode(BackendMode::SingleRequest)
///     .failure_policy(FailurePolicy::Surface)
///     .request_timeout_secs(300)
///     .build()
///     .unwrap();
/// assert_eq!(config.base_url, "http://analysis.internal:8000");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Backend base URL, without a trailing slash. Default: `http://localhost:8000`.
    pub base_url: String,

    /// How the document reaches the backend. Default: [`BackendMode::UploadOnce`].
    pub mode: BackendMode,

    /// What a failed request does to the caller. Default: [`FailurePolicy::Silent`].
    pub failure_policy: FailurePolicy,

    /// Per-request timeout in seconds. Default: none.
    ///
    /// Analysis passes run a language model over the whole paper and can take
    /// minutes, so no timeout is applied unless one is asked for.
    pub request_timeout_secs: Option<u64>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            mode: BackendMode::default(),
            failure_policy: FailurePolicy::default(),
            request_timeout_secs: None,
        }
    }
}

impl AnalyzerConfig {
    /// Create a new builder for `AnalyzerConfig`.
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalyzerConfig`].
#[derive(Debug)]
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn mode(mut self, mode: BackendMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalyzerConfig, AnalyzerError> {
        let c = &self.config;
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(AnalyzerError::InvalidConfig(format!(
                "base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.request_timeout_secs == Some(0) {
            return Err(AnalyzerError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the document is sent to the backend.
///
/// | Mode | Requests for passes 1–3 |
/// |------|-------------------------|
/// | `UploadOnce` | one upload, then three bodiless analyze calls by document id |
/// | `SingleRequest` | three analyze calls, each re-sending the PDF |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    /// Upload once, then analyse by `document_id` (default).
    #[default]
    UploadOnce,
    /// Re-upload the PDF with every pass.
    SingleRequest,
}

/// What happens when a pass request fails at the transport, HTTP, or
/// decoding level.
///
/// In both cases the pass returns to `NotRequested` and a warning is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Report the failure as `Ok(PassOutcome::Failed)` (default).
    #[default]
    Silent,
    /// Return the failure as `Err(AnalyzerError)`.
    Surface,
}
