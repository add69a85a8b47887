use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{DescriptionStore, Photo};
use note_engine::photo_time_from_filename;
use tracing::debug;

use crate::image_media_type;

/// A directory of captured photos with `.txt` descriptions beside them.
///
/// Photo paths are reported as `<url_prefix>/<filename>`, matching the
/// backend's static routes.
#[derive(Debug, Clone)]
pub struct LocalPhotoDir {
    dir: PathBuf,
    url_prefix: String,
}

impl LocalPhotoDir {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Image files in the directory, oldest first.
    pub async fn scan(&self) -> Result<Vec<Photo>> {
        let mut read_dir = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("failed to read {}", self.dir.display()))?;

        let mut photos = Vec::new();
        while let Some(item) = read_dir.next_entry().await? {
            let path = item.path();
            if image_media_type(&path).is_none() {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let metadata = item
                .metadata()
                .await
                .with_context(|| format!("failed to stat {}", path.display()))?;
            if !metadata.is_file() {
                continue;
            }

            let upload_time = match photo_time_from_filename(filename) {
                Some(time) => time,
                None => DateTime::<Utc>::from(
                    metadata
                        .modified()
                        .with_context(|| format!("no modification time for {}", path.display()))?,
                ),
            };
            photos.push(Photo {
                filename: filename.to_string(),
                path: format!("{}/{filename}", self.url_prefix),
                upload_time,
                size: Some(metadata.len()),
            });
        }

        photos.sort_by(|a, b| {
            a.upload_time
                .cmp(&b.upload_time)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        debug!(dir = %self.dir.display(), count = photos.len(), "scanned photo directory");
        Ok(photos)
    }

    pub fn description_file(&self, photo: &Photo) -> PathBuf {
        self.dir.join(&photo.filename).with_extension("txt")
    }
}

#[async_trait]
impl DescriptionStore for LocalPhotoDir {
    async fn description(&self, photo: &Photo) -> Result<Option<String>> {
        let path = self.description_file(photo);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        }
    }
}
