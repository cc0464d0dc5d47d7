//! Error types for the paper-analyzer library.
//!
//! Every failure the library can report is a variant of [`AnalyzerError`].
//! Whether a failed pass request actually reaches the caller as an `Err` is
//! decided by [`crate::config::FailurePolicy`]: under the default `Silent`
//! policy the session logs the error and reverts the pass instead.

use crate::pass::PassNumber;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the paper-analyzer library.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a usable PDF path or URL.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// The document was read, but it is not a PDF.
    #[error("'{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    // ── Session errors ────────────────────────────────────────────────────
    /// A pass number outside 1..=3.
    #[error("Invalid pass number {0}: passes are numbered 1 to 3")]
    InvalidPass(u8),

    /// No document has been selected yet.
    #[error("No document selected.\nOpen a PDF before requesting an analysis pass.")]
    NoDocument,

    /// Another request is still in flight.
    #[error("A request is already pending; wait for it to finish")]
    RequestPending,

    /// The previous pass has not produced a result yet.
    #[error("Pass {pass} is locked until pass {} has completed", .pass.get().saturating_sub(1))]
    PassLocked { pass: PassNumber },

    // ── Backend errors ────────────────────────────────────────────────────
    /// The request never produced an HTTP response.
    #[error("Request to '{url}' failed: {reason}")]
    Transport { url: String, reason: String },

    /// The backend answered with a non-2xx status.
    #[error("Backend returned HTTP {status} for '{url}'")]
    HttpStatus { url: String, status: u16 },

    /// The response body is not the JSON shape the endpoint promises.
    #[error("Malformed response from '{url}': {detail}")]
    MalformedResponse { url: String, detail: String },

    /// The backend reported a processing failure in its response body.
    #[error("Backend error: {message}")]
    Backend { message: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file (rendered report or image).
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An image record could not be decoded.
    #[error("Image on page {page} could not be decoded: {detail}")]
    ImageDecode { page: u32, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalyzerError {
    /// True for failures that happened while talking to the backend.
    ///
    /// Only these are swallowed under
    /// [`crate::config::FailurePolicy::Silent`]. Usage and internal errors
    /// are always returned.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            AnalyzerError::Transport { .. }
                | AnalyzerError::HttpStatus { .. }
                | AnalyzerError::MalformedResponse { .. }
                | AnalyzerError::Backend { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_locked_names_previous_pass() {
        let e = AnalyzerError::PassLocked {
            pass: PassNumber::THIRD,
        };
        let msg = e.to_string();
        assert!(msg.contains("Pass 3"), "got: {msg}");
        assert!(msg.contains("pass 2"), "got: {msg}");
    }

    #[test]
    fn http_status_display() {
        let e = AnalyzerError::HttpStatus {
            url: "http://localhost:8000/upload/paper".into(),
            status: 502,
        };
        assert!(e.to_string().contains("502"));
        assert!(e.to_string().contains("/upload/paper"));
    }

    #[test]
    fn backend_failures_are_classified() {
        assert!(AnalyzerError::Backend {
            message: "boom".into()
        }
        .is_backend_failure());
        assert!(AnalyzerError::Transport {
            url: "u".into(),
            reason: "refused".into()
        }
        .is_backend_failure());
        assert!(!AnalyzerError::NoDocument.is_backend_failure());
        assert!(!AnalyzerError::RequestPending.is_backend_failure());
    }
}
