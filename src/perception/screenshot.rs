use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use image::imageops::FilterType;
use image::ImageFormat;

use crate::capability::CapabilityProvider;
use crate::errors::AgentResult;

/// One captured screen, encoded and ready for a single decision request.
///
/// The artifact is exclusively owned by the in-flight iteration and its
/// backing file is deleted before the iteration ends (storage hygiene).
#[derive(Debug, Clone)]
pub struct ScreenshotArtifact {
    pub path: PathBuf,
    pub encoded_payload: String,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl ScreenshotArtifact {
    /// Captures the screen through the provider and encodes it at half scale.
    /// The backing file is left on disk; callers delete it via `delete_file`.
    ///
    /// Only the capture itself can fail here. An unreadable or unencodable
    /// file yields an empty payload, which callers treat as the signal to
    /// re-capture.
    pub async fn acquire(provider: &dyn CapabilityProvider) -> AgentResult<Self> {
        let path = provider.capture_screen().await?;
        let encoded_payload = encode_half_scale(&path);
        tracing::debug!(
            path = %path.display(),
            payload_len = encoded_payload.len(),
            "screenshot captured and encoded"
        );
        Ok(Self {
            path,
            encoded_payload,
            captured_at: chrono::Utc::now(),
        })
    }

    pub fn payload_is_empty(&self) -> bool {
        self.encoded_payload.trim().is_empty()
    }

    /// Removes the backing file. Best effort; a missing file is not an error.
    pub fn delete_file(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "screenshot file deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "screenshot file already gone");
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "screenshot file delete failed");
            }
        }
    }
}

/// Encodes the image at `path` as base64 PNG, halved in both dimensions.
///
/// The 0.5 scale factor is a fixed contract with the decision service: its
/// coordinate space is half of device space, and the dispatcher applies the
/// matching 2x back-transform. A file that exists but cannot be decoded as an
/// image is encoded raw and unscaled as a fallback; anything unreadable or
/// unwritable yields an empty string, the caller-visible re-capture signal.
pub fn encode_half_scale(path: &Path) -> String {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "screenshot file unreadable");
            return String::new();
        }
    };
    if bytes.is_empty() {
        tracing::warn!(path = %path.display(), "screenshot file is empty");
        return String::new();
    }

    match image::load_from_memory(&bytes) {
        Ok(img) => {
            let width = (img.width() / 2).max(1);
            let height = (img.height() / 2).max(1);
            let scaled = img.resize_exact(width, height, FilterType::Triangle);
            let mut buf = Vec::new();
            match scaled.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png) {
                Ok(()) => base64::engine::general_purpose::STANDARD.encode(&buf),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "png re-encode failed");
                    String::new()
                }
            }
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "screenshot not decodable as image, encoding raw bytes unscaled"
            );
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbaImage};

    fn write_test_png(dir: &Path, width: u32, height: u32) -> PathBuf {
        let path = dir.join("shot.png");
        let img = DynamicImage::ImageRgba8(RgbaImage::new(width, height));
        img.save(&path).expect("write test png");
        path
    }

    #[test]
    fn encode_halves_both_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_png(dir.path(), 8, 6);

        let payload = encode_half_scale(&path);
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .expect("payload is base64");
        let decoded = image::load_from_memory(&bytes).expect("payload is a png");
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn undecodable_file_falls_back_to_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let payload = encode_half_scale(&path);
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .unwrap();
        assert_eq!(bytes, b"definitely not a png");
    }

    #[test]
    fn unreadable_or_empty_file_yields_empty_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        std::fs::write(&path, b"").unwrap();
        assert!(encode_half_scale(&path).is_empty());
        assert!(encode_half_scale(&dir.path().join("missing.png")).is_empty());
    }

    #[test]
    fn delete_file_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_png(dir.path(), 2, 2);
        let artifact = ScreenshotArtifact {
            path: path.clone(),
            encoded_payload: "x".into(),
            captured_at: chrono::Utc::now(),
        };
        artifact.delete_file();
        assert!(!path.exists());
        artifact.delete_file();
    }
}
