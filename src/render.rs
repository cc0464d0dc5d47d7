//! Turn an analysis payload into labelled sections.
//!
//! One section per top-level key, in the order the backend wrote them:
//!
//! | Value   | Section body |
//! |---------|--------------|
//! | list    | one item per element |
//! | map     | one `key: value` item per entry (one level deep) |
//! | scalar  | a text block |
//!
//! Anything nested deeper is shown as compact JSON. Rendering is total:
//! malformed input produces [`Rendered::Placeholder`], never an error.

use crate::pass::PassNumber;
use crate::payload::{AnalysisPayload, ImageRecord, Scalar};
use serde_json::Value;
use std::fmt::{self, Write as _};
use std::path::PathBuf;

/// Text shown in place of an analysis that cannot be rendered.
pub const ERROR_PLACEHOLDER: &str = "Error rendering analysis";

/// Label used when the payload is not a map.
const FALLBACK_LABEL: &str = "Analysis";

/// Raw renderer input: either still serialised or already parsed.
#[derive(Debug, Clone, Copy)]
pub enum RenderInput<'a> {
    Text(&'a str),
    Json(&'a Value),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionBody {
    Text(String),
    Items(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub label: String,
    pub body: SectionBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Sections(Vec<Section>),
    Placeholder,
}

/// Render raw input, parsing it first when it is text.
pub fn render(input: RenderInput<'_>) -> Rendered {
    match input {
        RenderInput::Text(text) => match AnalysisPayload::parse(text) {
            Ok(payload) => render_payload(&payload),
            Err(_) => Rendered::Placeholder,
        },
        RenderInput::Json(value) => render_payload(&AnalysisPayload::from_json(value.clone())),
    }
}

/// Render a validated payload.
pub fn render_payload(payload: &AnalysisPayload) -> Rendered {
    match payload {
        AnalysisPayload::Map(entries) => Rendered::Sections(
            entries
                .iter()
                .map(|(key, value)| Section {
                    label: label_for(key),
                    body: section_body(value),
                })
                .collect(),
        ),
        // Textual analysis that did not decode to JSON.
        AnalysisPayload::Scalar(Scalar::Text(_)) => Rendered::Placeholder,
        other => Rendered::Sections(vec![Section {
            label: FALLBACK_LABEL.to_string(),
            body: section_body(other),
        }]),
    }
}

/// `five_cs` → `Five Cs`. Every underscore becomes one space.
pub fn label_for(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn section_body(value: &AnalysisPayload) -> SectionBody {
    match value {
        AnalysisPayload::Scalar(s) => SectionBody::Text(s.to_string()),
        AnalysisPayload::List(items) => SectionBody::Items(items.iter().map(inline).collect()),
        AnalysisPayload::Map(entries) => SectionBody::Items(
            entries
                .iter()
                .map(|(k, v)| format!("{k}: {}", inline(v)))
                .collect(),
        ),
    }
}

/// Single-line form of a value: scalars as text, containers as JSON.
fn inline(value: &AnalysisPayload) -> String {
    match value {
        AnalysisPayload::Scalar(s) => s.to_string(),
        nested => nested.to_json().to_string(),
    }
}

impl Rendered {
    /// Markdown with `##` section headings.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        match self {
            Rendered::Placeholder => {
                out.push_str(&format!("_{ERROR_PLACEHOLDER}_\n"));
            }
            Rendered::Sections(sections) => {
                for (i, section) in sections.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    out.push_str(&format!("## {}\n\n", section.label));
                    match &section.body {
                        SectionBody::Text(t) => {
                            out.push_str(t);
                            out.push('\n');
                        }
                        SectionBody::Items(items) => {
                            for item in items {
                                out.push_str(&format!("- {item}\n"));
                            }
                        }
                    }
                }
            }
        }
        out
    }
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rendered::Placeholder => writeln!(f, "{ERROR_PLACEHOLDER}"),
            Rendered::Sections(sections) => {
                for (i, section) in sections.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    writeln!(f, "{}", section.label)?;
                    match &section.body {
                        SectionBody::Text(t) => {
                            for line in t.lines() {
                                writeln!(f, "  {line}")?;
                            }
                        }
                        SectionBody::Items(items) => {
                            for item in items {
                                writeln!(f, "  • {item}")?;
                            }
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

/// Markdown list describing extracted images.
///
/// `files` holds the on-disk path of each image when they were saved.
pub fn images_markdown(images: &[ImageRecord], files: &[Option<PathBuf>]) -> String {
    let mut out = String::from("## Figures\n\n");
    for (i, img) in images.iter().enumerate() {
        let _ = write!(out, "- Page {}", img.page_number);
        if let Some(caption) = img.caption.as_deref().filter(|c| !c.is_empty()) {
            let _ = write!(out, ": {caption}");
        }
        if let Some(reference) = img.reference.as_deref().filter(|r| !r.is_empty()) {
            let _ = write!(out, " ({reference})");
        }
        if let Some(Some(path)) = files.get(i) {
            let path = path.display();
            let _ = write!(out, " [{path}]({path})");
        }
        out.push('\n');
    }
    out
}

/// Full Markdown report for one pass.
pub fn pass_markdown(
    pass: PassNumber,
    payload: &AnalysisPayload,
    images: &[ImageRecord],
    image_files: &[Option<PathBuf>],
) -> String {
    let mut out = format!("# {}\n\n", pass.title());
    out.push_str(&render_payload(payload).to_markdown());
    if !images.is_empty() {
        out.push('\n');
        out.push_str(&images_markdown(images, image_files));
    }
    out
}
