//! Observer trait for session events.
//!
//! Inject an [`Arc<dyn SessionObserver>`] via
//! [`crate::session::AnalysisSession::with_observer`] to be told when a
//! request starts and finishes. The CLI uses this to drive its loading
//! spinner; a GUI would disable its pass buttons between `on_*_start` and
//! the matching completion event.
//!
//! # Example
//!
//! ```rust
//! use paper_analyzer::{PassNumber, SessionObserver};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingObserver {
//!     fetched: AtomicUsize,
//! }
//!
//! impl SessionObserver for CountingObserver {
//!     fn on_pass_complete(&self, pass: PassNumber, image_count: usize) {
//!         self.fetched.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("pass {pass} done ({image_count} images)");
//!     }
//! }
//! ```

use crate::pass::PassNumber;
use std::sync::Arc;

/// Called by the session around every backend request.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait SessionObserver: Send + Sync {
    /// The document is about to be uploaded.
    fn on_upload_start(&self, document_name: &str) {
        let _ = document_name;
    }

    /// The backend accepted the upload.
    fn on_upload_complete(&self, document_id: &str) {
        let _ = document_id;
    }

    /// An analysis request for `pass` is about to be sent.
    fn on_pass_start(&self, pass: PassNumber) {
        let _ = pass;
    }

    /// The result for `pass` was stored.
    fn on_pass_complete(&self, pass: PassNumber, image_count: usize) {
        let _ = (pass, image_count);
    }

    /// The request for `pass` (or the upload preceding it) failed and the
    /// pass was reverted.
    fn on_pass_failed(&self, pass: PassNumber, error: &str) {
        let _ = (pass, error);
    }
}

/// Observer that ignores every event. Used when none is configured.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Convenience alias for the type held by the session.
pub type Observer = Arc<dyn SessionObserver>;
