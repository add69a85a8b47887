use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use core_types::{CompletionProvider, CompletionRequest, ImagePayload, Photo};
use tracing::{info, warn};

use crate::{LocalPhotoDir, image_media_type};

pub const DESCRIBE_PROMPT: &str = "Describe this image.";

const DESCRIBE_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationReport {
    pub described: Vec<String>,
    /// Photos that already had a description.
    pub skipped: usize,
    pub failed: Vec<String>,
}

/// Writes an AI description next to every photo that lacks one.
pub struct PhotoAnnotator {
    provider: Arc<dyn CompletionProvider>,
}

impl PhotoAnnotator {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    pub async fn annotate_dir(&self, photos: &LocalPhotoDir) -> Result<AnnotationReport> {
        let mut report = AnnotationReport::default();
        for photo in photos.scan().await? {
            let target = photos.description_file(&photo);
            let described = tokio::fs::metadata(&target)
                .await
                .is_ok_and(|metadata| metadata.is_file());
            if described {
                report.skipped += 1;
                continue;
            }

            let description = match self.describe(photos, &photo).await {
                Ok(description) => description,
                Err(err) => {
                    warn!(photo = %photo.filename, error = %err, "failed to describe photo");
                    report.failed.push(photo.filename);
                    continue;
                }
            };
            match tokio::fs::write(&target, description).await {
                Ok(()) => {
                    info!(photo = %photo.filename, "wrote photo description");
                    report.described.push(photo.filename);
                }
                Err(err) => {
                    warn!(path = %target.display(), error = %err, "failed to write photo description");
                    report.failed.push(photo.filename);
                }
            }
        }
        Ok(report)
    }

    async fn describe(&self, photos: &LocalPhotoDir, photo: &Photo) -> Result<String> {
        let path = photos.dir().join(&photo.filename);
        let media_type = image_media_type(&path).unwrap_or("image/jpeg");
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        let request = CompletionRequest::text(DESCRIBE_PROMPT, DESCRIBE_MAX_TOKENS).with_image(
            ImagePayload {
                media_type: media_type.to_string(),
                data_base64: STANDARD.encode(bytes),
            },
        );
        self.provider.complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;

    use anyhow::bail;
    use async_trait::async_trait;
    use tempfile::tempdir;

    use super::*;

    /// Records requests; fails for images whose bytes are `fail`.
    #[derive(Default)]
    struct RecordingProvider {
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionProvider for RecordingProvider {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            let data = request
                .image
                .as_ref()
                .map(|image| image.data_base64.clone())
                .unwrap_or_default();
            self.requests.lock().unwrap().push(request);
            if data == STANDARD.encode(b"fail") {
                bail!("model refused");
            }
            Ok("A photo of a desk".to_string())
        }
    }

    #[tokio::test]
    async fn describes_only_photos_without_text() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("a.png"), b"png-bytes").unwrap();
        fs::write(dir.path().join("b.jpg"), b"jpg").unwrap();
        fs::write(dir.path().join("b.txt"), "existing").unwrap();
        fs::write(dir.path().join("c.webp"), b"fail").unwrap();

        let provider = Arc::new(RecordingProvider::default());
        let annotator = PhotoAnnotator::new(provider.clone());
        let report = annotator
            .annotate_dir(&LocalPhotoDir::new(dir.path(), "/uploads"))
            .await
            .expect("annotate");

        assert_eq!(report.described, vec!["a.png".to_string()]);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, vec!["c.webp".to_string()]);
        assert_eq!(
            fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "A photo of a desk"
        );
        assert_eq!(fs::read_to_string(dir.path().join("b.txt")).unwrap(), "existing");
        assert!(!dir.path().join("c.txt").exists());

        let requests = provider.requests.lock().unwrap();
        let png = requests
            .iter()
            .find(|r| r.image.as_ref().unwrap().media_type == "image/png")
            .expect("png request");
        assert_eq!(png.prompt, DESCRIBE_PROMPT);
        assert_eq!(png.max_tokens, 1024);
        assert_eq!(png.image.as_ref().unwrap().data_base64, STANDARD.encode(b"png-bytes"));
    }

    #[tokio::test]
    async fn unwritable_description_is_reported_and_others_continue() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("a.jpg"), b"jpg").unwrap();
        fs::write(dir.path().join("b.png"), b"png").unwrap();
        fs::write(dir.path().join("c.gif"), b"gif").unwrap();
        // A directory sitting where b's description should go.
        fs::create_dir(dir.path().join("b.txt")).unwrap();

        let annotator = PhotoAnnotator::new(Arc::new(RecordingProvider::default()));
        let photos = LocalPhotoDir::new(dir.path(), "/uploads");
        let report = annotator.annotate_dir(&photos).await.expect("annotate");

        assert_eq!(report.skipped, 0);
        assert_eq!(report.failed, vec!["b.png".to_string()]);
        let mut described = report.described.clone();
        described.sort();
        assert_eq!(described, vec!["a.jpg".to_string(), "c.gif".to_string()]);
        assert!(dir.path().join("a.txt").is_file());
        assert!(dir.path().join("c.txt").is_file());
    }
}
