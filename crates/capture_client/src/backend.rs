use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{CaptureSource, DescriptionStore, Photo, TranscriptionLog};
use note_engine::photo_time_from_filename;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::CaptureError;

#[derive(Debug, Deserialize)]
struct PhotoListing {
    success: bool,
    #[serde(default)]
    photos: Vec<ListedPhoto>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedPhoto {
    filename: String,
    path: String,
    #[serde(default)]
    upload_time: Option<DateTime<Utc>>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionListing {
    success: bool,
    #[serde(default)]
    transcriptions: Vec<TranscriptionLog>,
    #[serde(default)]
    message: Option<String>,
}

trait Listing {
    fn success(&self) -> bool;
    fn message(&self) -> Option<&str>;
}

impl Listing for PhotoListing {
    fn success(&self) -> bool {
        self.success
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl Listing for TranscriptionListing {
    fn success(&self) -> bool {
        self.success
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// HTTP client for the capture backend's listing and static routes.
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    user_id: Option<String>,
    photo_endpoints: Vec<String>,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: None,
            photo_endpoints: vec!["/photos".to_string()],
        })
    }

    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id.filter(|id| !id.trim().is_empty());
        self
    }

    pub fn with_photo_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.photo_endpoints = endpoints;
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    fn transcriptions_endpoint(&self) -> String {
        match &self.user_id {
            Some(user_id) => format!("/transcriptions/{user_id}"),
            None => "/transcriptions".to_string(),
        }
    }

    async fn get_listing<T>(&self, endpoint: &str) -> Result<T>
    where
        T: DeserializeOwned + Listing,
    {
        let response = self
            .client
            .get(self.url(endpoint))
            .send()
            .await
            .with_context(|| format!("failed to reach backend at {endpoint}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CaptureError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let listing: T = response
            .json()
            .await
            .with_context(|| format!("invalid listing from {endpoint}"))?;
        if !listing.success() {
            return Err(CaptureError::Rejected {
                endpoint: endpoint.to_string(),
                message: listing.message().unwrap_or("unknown error").to_string(),
            }
            .into());
        }
        Ok(listing)
    }

    /// Photos from one endpoint, timed by filename when possible.
    pub async fn list_photos(&self, endpoint: &str) -> Result<Vec<Photo>> {
        let listing: PhotoListing = self.get_listing(endpoint).await?;
        Ok(listing
            .photos
            .into_iter()
            .filter_map(|listed| {
                let upload_time = photo_time_from_filename(&listed.filename).or(listed.upload_time);
                let Some(upload_time) = upload_time else {
                    warn!(photo = %listed.filename, "skipping photo without a usable timestamp");
                    return None;
                };
                Some(Photo {
                    filename: listed.filename,
                    path: listed.path,
                    upload_time,
                    size: listed.size,
                })
            })
            .collect())
    }
}

fn is_rejection(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<CaptureError>(),
        Some(CaptureError::Rejected { .. })
    )
}

#[async_trait]
impl CaptureSource for BackendClient {
    /// Merges every photo endpoint. One failing endpoint is skipped; the call
    /// only fails when all of them do.
    async fn fetch_photos(&self) -> Result<Vec<Photo>> {
        let mut seen = HashSet::new();
        let mut photos = Vec::new();
        let mut last_error = None;
        let mut any_ok = false;

        for endpoint in &self.photo_endpoints {
            match self.list_photos(endpoint).await {
                Ok(listed) => {
                    any_ok = true;
                    debug!(endpoint = %endpoint, count = listed.len(), "listed photos");
                    photos.extend(
                        listed
                            .into_iter()
                            .filter(|photo| seen.insert(photo.filename.clone())),
                    );
                }
                Err(err) if is_rejection(&err) => {
                    any_ok = true;
                    warn!(endpoint = %endpoint, error = %err, "photo listing rejected");
                }
                Err(err) => {
                    warn!(endpoint = %endpoint, error = %err, "photo listing failed");
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) if !any_ok => Err(err),
            _ => Ok(photos),
        }
    }

    async fn fetch_transcriptions(&self) -> Result<Vec<TranscriptionLog>> {
        let endpoint = self.transcriptions_endpoint();
        match self.get_listing::<TranscriptionListing>(&endpoint).await {
            Ok(listing) => Ok(listing.transcriptions),
            Err(err) if is_rejection(&err) => {
                warn!(error = %err, "transcription listing rejected");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl DescriptionStore for BackendClient {
    /// Any non-success status means the photo has no description.
    async fn description(&self, photo: &Photo) -> Result<Option<String>> {
        let path = photo.description_path();
        let response = self
            .client
            .get(self.url(&path))
            .send()
            .await
            .with_context(|| format!("failed to fetch description {path}"))?;
        if !response.status().is_success() {
            debug!(photo = %photo.filename, status = %response.status(), "no description");
            return Ok(None);
        }
        let text = response
            .text()
            .await
            .with_context(|| format!("failed to read description {path}"))?;
        Ok(Some(text))
    }
}
