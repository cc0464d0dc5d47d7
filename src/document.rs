//! Document selection: load a user-supplied PDF into memory.
//!
//! The backend receives the PDF as a multipart upload, so the whole file is
//! read into a [`Document`] up front. Validation happens here (extension and
//! `%PDF` magic bytes) so an obviously wrong file never reaches the network.

use crate::error::AnalyzerError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A PDF held in memory for the lifetime of a session's current document.
#[derive(Clone, PartialEq, Eq)]
pub struct Document {
    name: String,
    bytes: Vec<u8>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Document {
    /// Wrap raw bytes, checking the PDF magic.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, AnalyzerError> {
        let name = name.into();
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(AnalyzerError::NotAPdf {
                name,
                magic: bytes.iter().take(4).copied().collect(),
            });
        }
        Ok(Self { name, bytes })
    }

    /// Read a local `.pdf` file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, AnalyzerError> {
        let path = path.as_ref();

        if !has_pdf_extension(path) {
            return Err(AnalyzerError::InvalidInput {
                input: path.display().to_string(),
                reason: "only .pdf files are accepted".into(),
            });
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => AnalyzerError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => AnalyzerError::FileNotFound {
                path: path.to_path_buf(),
            },
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
        Self::from_bytes(name, bytes)
    }

    /// Download a PDF over HTTP(S).
    pub async fn from_url(url: &str, timeout_secs: u64) -> Result<Self, AnalyzerError> {
        info!("Downloading PDF from: {}", url);

        let download_failed = |reason: String| AnalyzerError::DownloadFailed {
            url: url.to_string(),
            reason,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| download_failed(e.to_string()))?;

        let response = client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                download_failed(format!("timed out after {timeout_secs}s"))
            } else {
                download_failed(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(download_failed(format!("HTTP {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_failed(e.to_string()))?;

        info!("Downloaded {} bytes", bytes.len());
        Self::from_bytes(filename_from_url(url), bytes.to_vec())
    }

    /// Resolve a CLI argument: URLs are downloaded, anything else is a path.
    pub async fn resolve(input: &str, timeout_secs: u64) -> Result<Self, AnalyzerError> {
        if is_url(input) {
            Self::from_url(input, timeout_secs).await
        } else {
            Self::from_path(PathBuf::from(input)).await
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Last path segment of the URL when it looks like a filename.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
