//! Decode and save the images that accompany an analysis pass.
//!
//! Records carry base64 data with no declared MIME type, so the format is
//! sniffed from the decoded bytes to pick a file extension.

use crate::error::AnalyzerError;
use crate::pass::PassNumber;
use crate::payload::ImageRecord;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Decode the base64 payload of `record`.
///
/// Tolerates a `data:<mime>;base64,` prefix.
pub fn decode(record: &ImageRecord) -> Result<Vec<u8>, AnalyzerError> {
    let data = match record.image.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => record.image.as_str(),
    };
    STANDARD
        .decode(data.trim())
        .map_err(|e| AnalyzerError::ImageDecode {
            page: record.page_number,
            detail: e.to_string(),
        })
}

/// File extension for decoded image bytes; `bin` when unrecognised.
pub fn extension_for(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "png",
        Ok(ImageFormat::Jpeg) => "jpg",
        Ok(ImageFormat::Gif) => "gif",
        Ok(ImageFormat::WebP) => "webp",
        Ok(ImageFormat::Bmp) => "bmp",
        Ok(ImageFormat::Tiff) => "tiff",
        _ => "bin",
    }
}

/// Write every image of `pass` into `dir`, returning the written paths in
/// record order.
///
/// Files are named `pass{N}_page{P}_{i}.{ext}`. A record that fails to
/// decode is skipped with a warning; write failures abort.
pub async fn save_all(
    dir: &Path,
    pass: PassNumber,
    images: &[ImageRecord],
) -> Result<Vec<Option<PathBuf>>, AnalyzerError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AnalyzerError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let mut written = Vec::with_capacity(images.len());
    for (i, record) in images.iter().enumerate() {
        let bytes = match decode(record) {
            Ok(b) => b,
            Err(e) => {
                warn!("Skipping image {}: {}", i + 1, e);
                written.push(None);
                continue;
            }
        };

        let path = dir.join(format!(
            "pass{}_page{}_{}.{}",
            pass,
            record.page_number,
            i + 1,
            extension_for(&bytes)
        ));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| AnalyzerError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        written.push(Some(path));
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn record(image: String, page: u32) -> ImageRecord {
        ImageRecord {
            image,
            caption: None,
            page_number: page,
            reference: None,
        }
    }

    #[test]
    fn decodes_plain_and_data_uri() {
        let b64 = STANDARD.encode(PNG_MAGIC);
        assert_eq!(decode(&record(b64.clone(), 1)).unwrap(), PNG_MAGIC);
        let uri = format!("data:image/png;base64,{b64}");
        assert_eq!(decode(&record(uri, 1)).unwrap(), PNG_MAGIC);
    }

    #[test]
    fn invalid_base64_reports_page() {
        let err = decode(&record("***".into(), 7)).unwrap_err();
        assert!(matches!(err, AnalyzerError::ImageDecode { page: 7, .. }));
    }

    #[test]
    fn sniffs_extension() {
        assert_eq!(extension_for(PNG_MAGIC), "png");
        assert_eq!(extension_for(b"\xFF\xD8\xFF\xE0\0\x10JFIF"), "jpg");
        assert_eq!(extension_for(b"hello"), "bin");
    }

    #[test]
    fn saves_images_and_skips_bad_records() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![
            record(STANDARD.encode(PNG_MAGIC), 2),
            record("not base64!".into(), 5),
        ];

        let written = tokio_test::block_on(save_all(dir.path(), PassNumber::SECOND, &images)).unwrap();

        assert_eq!(written.len(), 2);
        let first = written[0].as_ref().expect("first image written");
        assert_eq!(first.file_name().unwrap(), "pass2_page2_1.png");
        assert_eq!(std::fs::read(first).unwrap(), PNG_MAGIC);
        assert!(written[1].is_none());
    }
}
