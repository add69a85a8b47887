//! Async coordination around the note engine: polling, summaries, chat,
//! search and manual-note editing.

mod chat;
mod context;
mod feed;
mod notebook;
mod search;
mod summary;

pub use chat::{CHAT_FALLBACK, ChatError, NoteChat, note_context};
pub use context::build_context_pairs;
pub use feed::{FeedSnapshot, NoteFeed};
pub use notebook::{NoteBook, starter_notes};
pub use search::{SearchEngine, SearchSession};
pub use summary::{NO_TRANSCRIPTION, SummaryCache, summary_prompt};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use core_types::{
        CompletionProvider, CompletionRequest, DescriptionStore, Photo, TranscriptionEntry,
    };
    use parking_lot::Mutex;

    pub fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, m, 0).unwrap()
    }

    pub fn entry(time: DateTime<Utc>, text: &str) -> TranscriptionEntry {
        TranscriptionEntry {
            timestamp: time,
            text: text.to_string(),
            original_line: format!("[{}] {text}", time.to_rfc3339()),
        }
    }

    pub fn photo(name: &str, time: DateTime<Utc>) -> Photo {
        Photo {
            filename: name.to_string(),
            path: format!("/uploads/{name}"),
            upload_time: time,
            size: None,
        }
    }

    /// Completion double that counts calls and records prompts.
    pub struct CountingProvider {
        pub calls: AtomicUsize,
        pub prompts: Mutex<Vec<String>>,
        reply: Option<String>,
        delay: Duration,
    }

    impl CountingProvider {
        pub fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                reply: Some(reply.to_string()),
                delay: Duration::ZERO,
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                reply: None,
                delay: Duration::ZERO,
            })
        }

        pub fn slow(reply: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                reply: Some(reply.to_string()),
                delay,
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionProvider for CountingProvider {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().push(request.prompt);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.reply {
                Some(reply) => Ok(reply.clone()),
                None => bail!("provider unavailable"),
            }
        }
    }

    /// Description double keyed by filename.
    pub struct MapDescriptions {
        pub calls: AtomicUsize,
        entries: Vec<(String, String)>,
        delay: Duration,
    }

    impl MapDescriptions {
        pub fn new(entries: &[(&str, &str)]) -> Arc<Self> {
            Self::slow(entries, Duration::ZERO)
        }

        pub fn slow(entries: &[(&str, &str)], delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                entries: entries
                    .iter()
                    .map(|(name, text)| (name.to_string(), text.to_string()))
                    .collect(),
                delay,
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DescriptionStore for MapDescriptions {
        async fn description(&self, photo: &Photo) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if photo.filename.starts_with("broken") {
                bail!("description fetch failed");
            }
            Ok(self
                .entries
                .iter()
                .find(|(name, _)| *name == photo.filename)
                .map(|(_, text)| text.clone()))
        }
    }
}
