//! Backend payloads, validated at the boundary.
//!
//! The backend returns whatever JSON its language model produced, so the
//! analysis has no fixed schema. Instead of probing raw `serde_json::Value`s
//! everywhere, responses are converted once into [`AnalysisPayload`], a
//! closed sum type the renderer can match exhaustively.

use crate::error::AnalyzerError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A leaf value inside an analysis payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// The analysis returned for one pass.
///
/// Maps keep the order the backend emitted their keys in.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisPayload {
    Scalar(Scalar),
    List(Vec<AnalysisPayload>),
    Map(Vec<(String, AnalysisPayload)>),
}

impl AnalysisPayload {
    /// Convert an arbitrary JSON value.
    ///
    /// A top-level JSON string whose content is itself a JSON object or array
    /// is decoded once more: the backend sometimes returns the model's output
    /// still serialised.
    pub fn from_json(value: Value) -> Self {
        if let Value::String(ref s) = value {
            let trimmed = s.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                if let Ok(inner) = serde_json::from_str::<Value>(s) {
                    return Self::from_value(inner);
                }
            }
        }
        Self::from_value(value)
    }

    /// Parse a serialised payload.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Value>(text).map(Self::from_json)
    }

    fn from_value(value: Value) -> Self {
        match value {
            Value::Null => AnalysisPayload::Scalar(Scalar::Null),
            Value::Bool(b) => AnalysisPayload::Scalar(Scalar::Bool(b)),
            Value::Number(n) => AnalysisPayload::Scalar(Scalar::Number(n)),
            Value::String(s) => AnalysisPayload::Scalar(Scalar::Text(s)),
            Value::Array(items) => {
                AnalysisPayload::List(items.into_iter().map(Self::from_value).collect())
            }
            Value::Object(map) => AnalysisPayload::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_value(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back to JSON (used for `--json` output and stringifying
    /// nested values).
    pub fn to_json(&self) -> Value {
        match self {
            AnalysisPayload::Scalar(Scalar::Null) => Value::Null,
            AnalysisPayload::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            AnalysisPayload::Scalar(Scalar::Number(n)) => Value::Number(n.clone()),
            AnalysisPayload::Scalar(Scalar::Text(s)) => Value::String(s.clone()),
            AnalysisPayload::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            AnalysisPayload::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Look up a top-level key of a map payload.
    pub fn get(&self, key: &str) -> Option<&AnalysisPayload> {
        match self {
            AnalysisPayload::Map(entries) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// The error message when the backend stored its own failure report
    /// (`{"error": "...", "details": "..."}`) in place of an analysis.
    pub fn backend_error(&self) -> Option<String> {
        let AnalysisPayload::Scalar(Scalar::Text(error)) = self.get("error")? else {
            return None;
        };
        match self.get("details") {
            Some(AnalysisPayload::Scalar(Scalar::Text(details))) => {
                Some(format!("{error}: {details}"))
            }
            _ => Some(error.clone()),
        }
    }
}

impl Serialize for AnalysisPayload {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AnalysisPayload {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(AnalysisPayload::from_json)
    }
}

/// An image the backend extracted alongside an analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Base64-encoded image bytes.
    pub image: String,
    #[serde(default)]
    pub caption: Option<String>,
    pub page_number: u32,
    #[serde(default)]
    pub reference: Option<String>,
}

// ── Response envelopes ───────────────────────────────────────────────────

/// `POST /upload/paper` response.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub document_id: String,
    #[serde(default)]
    pub metadata: Value,
}

/// `POST /analyze/paper...` response.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeResponse {
    pub analysis: AnalysisPayload,
    #[serde(default)]
    pub images: Option<Vec<ImageRecord>>,
}

/// Decode a response body into `T`, recognising the backend's
/// `{"error": "..."}` failure envelope first.
///
/// `required` is the field a well-formed success body must carry; a body
/// without it but with a top-level `error` string is a backend failure.
pub(crate) fn decode_envelope<T: serde::de::DeserializeOwned>(
    url: &str,
    body: Value,
    required: &str,
) -> Result<T, AnalyzerError> {
    if body.get(required).is_none() {
        if let Some(message) = body.get("error").and_then(Value::as_str) {
            return Err(AnalyzerError::Backend {
                message: message.to_string(),
            });
        }
    }
    serde_json::from_value(body).map_err(|e| AnalyzerError::MalformedResponse {
        url: url.to_string(),
        detail: e.to_string(),
    })
}
