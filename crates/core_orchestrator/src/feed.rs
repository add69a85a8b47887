use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use core_types::{CaptureSource, GeneratedNote, Photo, TranscriptionEntry};
use note_engine::{NoteSynthesizer, parse_logs};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Result of one refresh of the capture collections.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    pub photos: Vec<Photo>,
    pub entries: Vec<TranscriptionEntry>,
    /// Most recent group first.
    pub notes: Vec<GeneratedNote>,
    /// Set when a source failed; its collection is served empty.
    pub last_error: Option<String>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Periodically re-derives generated notes from the capture source.
///
/// Every refresh recomputes from scratch; nothing carries over between
/// snapshots except the last published one.
pub struct NoteFeed {
    source: Arc<dyn CaptureSource>,
    synthesizer: NoteSynthesizer,
    tx: watch::Sender<Arc<FeedSnapshot>>,
}

impl NoteFeed {
    pub fn new(source: Arc<dyn CaptureSource>, synthesizer: NoteSynthesizer) -> Self {
        let (tx, _) = watch::channel(Arc::new(FeedSnapshot::default()));
        Self {
            source,
            synthesizer,
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<FeedSnapshot>> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Arc<FeedSnapshot> {
        self.tx.borrow().clone()
    }

    pub async fn refresh(&self) -> Arc<FeedSnapshot> {
        let (photos, logs) = tokio::join!(
            self.source.fetch_photos(),
            self.source.fetch_transcriptions()
        );

        let mut errors = Vec::new();
        let photos = photos.unwrap_or_else(|err| {
            warn!(error = %err, "failed to fetch photos");
            errors.push(format!("photos: {err:#}"));
            Vec::new()
        });
        let logs = logs.unwrap_or_else(|err| {
            warn!(error = %err, "failed to fetch transcriptions");
            errors.push(format!("transcriptions: {err:#}"));
            Vec::new()
        });

        let report = parse_logs(&logs);
        let notes = self
            .synthesizer
            .derive_notes(report.entries.clone(), &photos);
        info!(
            logs = logs.len(),
            entries = report.entries.len(),
            rejected = report.rejected,
            photos = photos.len(),
            notes = notes.len(),
            "refreshed note feed"
        );

        let snapshot = Arc::new(FeedSnapshot {
            photos,
            entries: report.entries,
            notes,
            last_error: (!errors.is_empty()).then(|| errors.join("; ")),
            refreshed_at: Some(Utc::now()),
        });
        self.tx.send_replace(snapshot.clone());
        snapshot
    }

    /// Refreshes immediately and then every `interval` until `shutdown`
    /// turns true or its sender is dropped.
    pub async fn run_polling(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("note feed polling stopped");
                        return;
                    }
                }
            }
        }
    }
}
