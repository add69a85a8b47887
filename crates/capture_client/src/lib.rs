//! Collaborators that bring captures in: the backend HTTP listings, photo
//! descriptions, and a local photo directory with its annotator.

mod annotate;
mod backend;
mod local;

use std::path::Path;

use thiserror::Error;

pub use annotate::{AnnotationReport, DESCRIBE_PROMPT, PhotoAnnotator};
pub use backend::BackendClient;
pub use local::LocalPhotoDir;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("backend rejected {endpoint}: {message}")]
    Rejected { endpoint: String, message: String },
    #[error("backend returned {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

pub(crate) fn image_media_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    Some(match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/jpeg",
    })
}
