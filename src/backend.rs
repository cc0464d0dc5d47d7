//! Talking to the analysis backend.
//!
//! Two layers:
//!
//! * [`Transport`] — the HTTP seam. It knows how to POST a PDF as a
//!   multipart form or POST an empty body, and returns the decoded JSON.
//!   [`HttpTransport`] is the reqwest implementation; tests substitute a
//!   recording fake.
//!
//! * [`AnalysisStrategy`] — how a pass is obtained from the backend.
//!   [`UploadOnce`] uploads the document a single time and then analyses it
//!   by id; [`SingleRequest`] re-sends the PDF with every pass. The session
//!   drives either one through the same interface.
//!
//! ```text
//! UploadOnce:     POST /upload/paper (file)  ──▶ { document_id, metadata }
//!                 POST /analyze/paper/{id}?pass_number=N ──▶ { analysis, images? }
//! SingleRequest:  POST /analyze/paper?pass_number=N (file) ──▶ { analysis }
//! ```

use crate::config::{AnalyzerConfig, BackendMode};
use crate::document::Document;
use crate::error::AnalyzerError;
use crate::pass::PassNumber;
use crate::payload::{decode_envelope, AnalysisPayload, AnalyzeResponse, ImageRecord, UploadResponse};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Multipart field name the backend reads the PDF from.
pub const FILE_FIELD: &str = "file";

/// Minimal HTTP surface the strategies need.
///
/// `path` is relative to the backend base URL and may carry a query string.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `document` as multipart field [`FILE_FIELD`].
    async fn post_document(&self, path: &str, document: &Document) -> Result<Value, AnalyzerError>;

    /// POST with no body.
    async fn post_empty(&self, path: &str) -> Result<Value, AnalyzerError>;

    /// Absolute URL for `path`, used in error messages.
    fn url(&self, path: &str) -> String;
}

/// [`Transport`] over reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| AnalyzerError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    async fn send(&self, url: String, request: reqwest::RequestBuilder) -> Result<Value, AnalyzerError> {
        let response = request.send().await.map_err(|e| AnalyzerError::Transport {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        debug!("{} → HTTP {}", url, status);
        if !status.is_success() {
            return Err(AnalyzerError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AnalyzerError::MalformedResponse {
                url,
                detail: e.to_string(),
            })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_document(&self, path: &str, document: &Document) -> Result<Value, AnalyzerError> {
        let url = self.url(path);
        let part = Part::bytes(document.bytes().to_vec())
            .file_name(document.name().to_string())
            .mime_str("application/pdf")
            .map_err(|e| AnalyzerError::Internal(format!("multipart: {e}")))?;
        let form = Form::new().part(FILE_FIELD, part);

        debug!("POST {} ({} bytes)", url, document.len());
        let request = self.client.post(&url).multipart(form);
        self.send(url, request).await
    }

    async fn post_empty(&self, path: &str) -> Result<Value, AnalyzerError> {
        let url = self.url(path);
        debug!("POST {}", url);
        let request = self.client.post(&url);
        self.send(url, request).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

// ── Strategies ───────────────────────────────────────────────────────────

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub document_id: String,
    pub metadata: Value,
}

/// Result of a successful analysis request.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub payload: AnalysisPayload,
    /// `None` when the response carried no `images` field.
    pub images: Option<Vec<ImageRecord>>,
}

impl From<AnalyzeResponse> for Analysis {
    fn from(r: AnalyzeResponse) -> Self {
        Self {
            payload: r.analysis,
            images: r.images,
        }
    }
}

/// How a pass is obtained from the backend.
#[async_trait]
pub trait AnalysisStrategy: Send + Sync {
    /// Whether [`AnalysisStrategy::upload`] must succeed before analysing.
    fn needs_upload(&self) -> bool;

    /// Upload the document and obtain its id.
    async fn upload(&self, transport: &dyn Transport, document: &Document) -> Result<Upload, AnalyzerError>;

    /// Request one pass. `document_id` is `Some` whenever
    /// [`AnalysisStrategy::needs_upload`] is true.
    async fn analyze(
        &self,
        transport: &dyn Transport,
        document: &Document,
        document_id: Option<&str>,
        pass: PassNumber,
    ) -> Result<Analysis, AnalyzerError>;
}

/// Upload once, then analyse by document id.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadOnce;

#[async_trait]
impl AnalysisStrategy for UploadOnce {
    fn needs_upload(&self) -> bool {
        true
    }

    async fn upload(&self, transport: &dyn Transport, document: &Document) -> Result<Upload, AnalyzerError> {
        let path = "/upload/paper";
        let body = transport.post_document(path, document).await?;
        let r: UploadResponse = decode_envelope(&transport.url(path), body, "document_id")?;
        Ok(Upload {
            document_id: r.document_id,
            metadata: r.metadata,
        })
    }

    async fn analyze(
        &self,
        transport: &dyn Transport,
        _document: &Document,
        document_id: Option<&str>,
        pass: PassNumber,
    ) -> Result<Analysis, AnalyzerError> {
        let id = document_id.ok_or_else(|| {
            AnalyzerError::Internal("analyze by id requested before upload".into())
        })?;
        // The id is opaque and may contain reserved characters.
        let path = format!(
            "/analyze/paper/{}?pass_number={pass}",
            urlencoding::encode(id)
        );
        let body = transport.post_empty(&path).await?;
        decode_envelope::<AnalyzeResponse>(&transport.url(&path), body, "analysis").map(Analysis::from)
    }
}

/// Send the PDF along with every pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleRequest;

#[async_trait]
impl AnalysisStrategy for SingleRequest {
    fn needs_upload(&self) -> bool {
        false
    }

    async fn upload(&self, _transport: &dyn Transport, _document: &Document) -> Result<Upload, AnalyzerError> {
        Err(AnalyzerError::Internal(
            "single-request mode has no upload step".into(),
        ))
    }

    async fn analyze(
        &self,
        transport: &dyn Transport,
        document: &Document,
        _document_id: Option<&str>,
        pass: PassNumber,
    ) -> Result<Analysis, AnalyzerError> {
        let path = format!("/analyze/paper?pass_number={pass}");
        let body = transport.post_document(&path, document).await?;
        decode_envelope::<AnalyzeResponse>(&transport.url(&path), body, "analysis").map(Analysis::from)
    }
}

/// The strategy selected by `mode`.
pub fn strategy_for(mode: BackendMode) -> Arc<dyn AnalysisStrategy> {
    match mode {
        BackendMode::UploadOnce => Arc::new(UploadOnce),
        BackendMode::SingleRequest => Arc::new(SingleRequest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// Records every call and answers from a queue.
    struct ScriptedTransport {
        calls: Mutex<Vec<String>>,
        replies: Mutex<Vec<Value>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Value>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                replies: Mutex::new(replies.into_iter().rev().collect()),
            }
        }

        fn reply(&self) -> Result<Value, AnalyzerError> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| AnalyzerError::Internal("no scripted reply".into()))
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post_document(&self, path: &str, _document: &Document) -> Result<Value, AnalyzerError> {
            self.calls.lock().unwrap().push(format!("file {path}"));
            self.reply()
        }

        async fn post_empty(&self, path: &str) -> Result<Value, AnalyzerError> {
            self.calls.lock().unwrap().push(format!("empty {path}"));
            self.reply()
        }

        fn url(&self, path: &str) -> String {
            format!("http://backend{path}")
        }
    }

    fn doc() -> Document {
        Document::from_bytes("paper.pdf", b"%PDF-1.5".to_vec()).unwrap()
    }

    #[tokio::test]
    async fn upload_once_paths() {
        let t = ScriptedTransport::new(vec![
            json!({"document_id": "abc", "metadata": {"pages": 9}}),
            json!({"analysis": {"conclusions": "ok"}}),
        ]);
        let s = UploadOnce;

        let up = s.upload(&t, &doc()).await.unwrap();
        assert_eq!(up.document_id, "abc");
        assert_eq!(up.metadata, json!({"pages": 9}));

        let a = s
            .analyze(&t, &doc(), Some("abc"), PassNumber::SECOND)
            .await
            .unwrap();
        assert!(a.images.is_none());

        let calls = t.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            [
                "file /upload/paper",
                "empty /analyze/paper/abc?pass_number=2"
            ]
        );
    }

    #[tokio::test]
    async fn single_request_sends_file_every_time() {
        let t = ScriptedTransport::new(vec![json!({"analysis": {"a": 1}})]);
        SingleRequest
            .analyze(&t, &doc(), None, PassNumber::THIRD)
            .await
            .unwrap();
        assert_eq!(
            t.calls.lock().unwrap().as_slice(),
            ["file /analyze/paper?pass_number=3"]
        );
    }

    #[tokio::test]
    async fn upload_once_requires_id() {
        let t = ScriptedTransport::new(vec![]);
        let err = UploadOnce
            .analyze(&t, &doc(), None, PassNumber::FIRST)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::Internal(_)));
        assert!(t.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn document_id_is_escaped_in_path() {
        let t = ScriptedTransport::new(vec![json!({"analysis": {}})]);
        UploadOnce
            .analyze(&t, &doc(), Some("doc?v=2/x y"), PassNumber::SECOND)
            .await
            .unwrap();

        let calls = t.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            ["empty /analyze/paper/doc%3Fv%3D2%2Fx%20y?pass_number=2"]
        );

        let url = reqwest::Url::parse(&t.url(&calls[0]["empty ".len()..])).unwrap();
        assert_eq!(url.path(), "/analyze/paper/doc%3Fv%3D2%2Fx%20y");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, [("pass_number".to_string(), "2".to_string())]);
    }

    #[test]
    fn strategy_for_mode() {
        assert!(strategy_for(BackendMode::UploadOnce).needs_upload());
        assert!(!strategy_for(BackendMode::SingleRequest).needs_upload());
    }

    // ── HttpTransport against a local socket ─────────────────────────────

    /// Serve one canned HTTP/1.1 reply and hand back the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let reply = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&request).into_owned()
        });
        (base_url, handle)
    }

    async fn read_request(socket: &mut TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return buf;
            }
            buf.extend_from_slice(&chunk[..n]);

            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let body = &buf[end + 4..];
            let content_length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok());

            let complete = match content_length {
                Some(len) => body.len() >= len,
                None if head.contains("transfer-encoding: chunked") => body.ends_with(b"0\r\n\r\n"),
                None => true,
            };
            if complete {
                return buf;
            }
        }
    }

    fn transport_for(base_url: &str) -> HttpTransport {
        let config = AnalyzerConfig::builder()
            .base_url(base_url)
            .request_timeout_secs(10)
            .build()
            .unwrap();
        HttpTransport::new(&config).unwrap()
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let (base_url, server) = serve_once("500 Internal Server Error", r#"{"detail":"boom"}"#).await;
        let t = transport_for(&base_url);

        let err = t.post_empty("/analyze/paper/abc?pass_number=1").await.unwrap_err();
        match err {
            AnalyzerError::HttpStatus { status, url } => {
                assert_eq!(status, 500);
                assert!(url.ends_with("/analyze/paper/abc?pass_number=1"), "got: {url}");
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let (base_url, server) = serve_once("200 OK", "not json").await;
        let t = transport_for(&base_url);

        let err = t.post_empty("/analyze/paper/abc?pass_number=1").await.unwrap_err();
        assert!(
            matches!(err, AnalyzerError::MalformedResponse { .. }),
            "got: {err:?}"
        );
        assert!(err.is_backend_failure());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn document_is_posted_as_file_field() {
        let (base_url, server) = serve_once("200 OK", r#"{"analysis":{}}"#).await;
        let t = transport_for(&base_url);

        let body = t
            .post_document("/analyze/paper?pass_number=1", &doc())
            .await
            .unwrap();
        assert_eq!(body, json!({"analysis": {}}));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /analyze/paper?pass_number=1 "), "got: {request}");
        assert!(request.contains(r#"name="file""#), "got: {request}");
        assert!(request.contains(r#"filename="paper.pdf""#), "got: {request}");
        assert!(request.contains("application/pdf"), "got: {request}");
        assert!(request.contains("%PDF-1.5"), "got: {request}");
    }

    #[test]
    fn http_transport_joins_base_url() {
        let config = AnalyzerConfig::builder()
            .base_url("http://localhost:8000/")
            .build()
            .unwrap();
        let t = HttpTransport::new(&config).unwrap();
        assert_eq!(
            t.url("/analyze/paper?pass_number=1"),
            "http://localhost:8000/analyze/paper?pass_number=1"
        );
    }
}
