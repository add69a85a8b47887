use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use core_types::{DescriptionStore, Note};
use futures::future::join_all;
use note_engine::{SearchQuery, description_matches, matches_text};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Filters notes by text, or by photo description for `image:` queries.
pub struct SearchEngine {
    descriptions: Arc<dyn DescriptionStore>,
}

impl SearchEngine {
    pub fn new(descriptions: Arc<dyn DescriptionStore>) -> Self {
        Self { descriptions }
    }

    /// Matching notes in their input order.
    pub async fn search(&self, term: &str, notes: &[Note]) -> Vec<Note> {
        match SearchQuery::parse(term) {
            SearchQuery::All => notes.to_vec(),
            SearchQuery::Text(needle) => notes
                .iter()
                .filter(|note| matches_text(note, &needle))
                .cloned()
                .collect(),
            SearchQuery::Image(needle) => self.search_images(&needle, notes).await,
        }
    }

    async fn search_images(&self, needle: &str, notes: &[Note]) -> Vec<Note> {
        let mut unique = HashMap::new();
        for photo in notes.iter().flat_map(Note::photos) {
            unique.entry(photo.filename.as_str()).or_insert(photo);
        }

        let lookups = join_all(unique.into_values().map(|photo| async move {
            let description = match self.descriptions.description(photo).await {
                Ok(description) => description,
                Err(err) => {
                    warn!(photo = %photo.filename, error = %err, "description lookup failed during image search");
                    None
                }
            };
            (photo.filename.clone(), description)
        }))
        .await;
        let descriptions: HashMap<String, Option<String>> = lookups.into_iter().collect();

        notes
            .iter()
            .filter(|note| {
                note.photos().iter().any(|photo| {
                    let description = descriptions.get(&photo.filename).and_then(Option::as_deref);
                    description_matches(description, needle)
                })
            })
            .cloned()
            .collect()
    }
}

/// Debounced search where only the newest request may publish results.
///
/// Every `submit` takes a new version. A request that is superseded while
/// waiting out the debounce never runs; one that is superseded while running
/// has its results discarded.
pub struct SearchSession {
    engine: Arc<SearchEngine>,
    debounce: Duration,
    latest: AtomicU64,
    committed: Mutex<Option<(u64, Vec<Note>)>>,
}

impl SearchSession {
    pub fn new(engine: Arc<SearchEngine>, debounce: Duration) -> Self {
        Self {
            engine,
            debounce,
            latest: AtomicU64::new(0),
            committed: Mutex::new(None),
        }
    }

    /// Returns the results when this request is still the newest one.
    pub async fn submit(&self, term: &str, notes: &[Note]) -> Option<Vec<Note>> {
        let version = self.latest.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
            if self.latest.load(Ordering::SeqCst) != version {
                debug!(version, "search superseded before it started");
                return None;
            }
        }

        let results = self.engine.search(term, notes).await;

        let mut committed = self.committed.lock();
        let newer_committed = committed.as_ref().is_some_and(|(seen, _)| *seen > version);
        if self.latest.load(Ordering::SeqCst) != version || newer_committed {
            debug!(version, "discarding stale search results");
            return None;
        }
        *committed = Some((version, results.clone()));
        Some(results)
    }

    /// The most recently published results.
    pub fn current(&self) -> Option<Vec<Note>> {
        self.committed
            .lock()
            .as_ref()
            .map(|(_, notes)| notes.clone())
    }
}
