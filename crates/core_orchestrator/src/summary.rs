use std::sync::Arc;
use std::time::Duration;

use core_types::{CompletionProvider, CompletionRequest, NoteId, PhotoContextPair, TranscriptionEntry};
use indexmap::IndexMap;
use note_engine::{NoteSynthesizer, extractive_summary};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub const NO_TRANSCRIPTION: &str = "No transcription content available.";

const SUMMARY_MAX_TOKENS: u32 = 512;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

struct Slot {
    fingerprint: String,
    summary: Arc<OnceCell<String>>,
}

/// Per-note summary cache with at-most-once generation.
///
/// Each note id owns one slot. A slot is filled by exactly one external call
/// (concurrent callers wait on the same cell) and keeps its value until the
/// summarized input changes, the note is regenerated or the slot is evicted
/// to stay within `capacity`.
pub struct SummaryCache {
    provider: Arc<dyn CompletionProvider>,
    slots: Mutex<IndexMap<NoteId, Slot>>,
    capacity: usize,
    timeout: Duration,
    formatter: NoteSynthesizer,
}

impl SummaryCache {
    pub fn new(provider: Arc<dyn CompletionProvider>, capacity: usize) -> Self {
        Self {
            provider,
            slots: Mutex::new(IndexMap::new()),
            capacity: capacity.max(1),
            timeout: DEFAULT_TIMEOUT,
            formatter: NoteSynthesizer::local(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Controls how photo times are rendered in the prompt.
    pub fn with_formatter(mut self, formatter: NoteSynthesizer) -> Self {
        self.formatter = formatter;
        self
    }

    pub async fn get_summary(
        &self,
        note_id: NoteId,
        entries: &[TranscriptionEntry],
        photo_pairs: &[PhotoContextPair],
        max_length: usize,
    ) -> String {
        let transcript = transcript_text(entries);
        if transcript.is_empty() {
            return NO_TRANSCRIPTION.to_string();
        }

        let prompt = summary_prompt(&transcript, photo_pairs, &self.formatter);
        let cell = self.slot_for(note_id, fingerprint(&prompt, max_length));
        cell.get_or_init(|| self.generate(note_id, prompt, &transcript, max_length))
            .await
            .clone()
    }

    /// Drops whatever is cached for `note_id` and summarizes again.
    pub async fn regenerate(
        &self,
        note_id: NoteId,
        entries: &[TranscriptionEntry],
        photo_pairs: &[PhotoContextPair],
        max_length: usize,
    ) -> String {
        self.evict(note_id);
        self.get_summary(note_id, entries, photo_pairs, max_length)
            .await
    }

    /// The finished summary for `note_id`, if one is cached.
    pub fn cached(&self, note_id: NoteId) -> Option<String> {
        self.slots
            .lock()
            .get(&note_id)
            .and_then(|slot| slot.summary.get().cloned())
    }

    pub fn evict(&self, note_id: NoteId) -> bool {
        self.slots.lock().shift_remove(&note_id).is_some()
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot_for(&self, note_id: NoteId, fingerprint: String) -> Arc<OnceCell<String>> {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(&note_id) {
            if slot.fingerprint == fingerprint {
                return slot.summary.clone();
            }
            debug!(note = %note_id, "summary input changed; replacing cached summary");
            slots.shift_remove(&note_id);
        }

        let summary = Arc::new(OnceCell::new());
        slots.insert(
            note_id,
            Slot {
                fingerprint,
                summary: summary.clone(),
            },
        );
        while slots.len() > self.capacity {
            if let Some((evicted, _)) = slots.shift_remove_index(0) {
                debug!(note = %evicted, "evicting oldest cached summary");
            }
        }
        summary
    }

    async fn generate(
        &self,
        note_id: NoteId,
        prompt: String,
        transcript: &str,
        max_length: usize,
    ) -> String {
        let request = CompletionRequest::text(prompt, SUMMARY_MAX_TOKENS).with_system(format!(
            "Summarize the user's transcript in no more than {max_length} characters. \
             Reply with the summary only."
        ));

        match tokio::time::timeout(self.timeout, self.provider.complete(request)).await {
            Ok(Ok(summary)) if !summary.trim().is_empty() => {
                info!(note = %note_id, "generated note summary");
                summary.trim().to_string()
            }
            Ok(Ok(_)) => {
                warn!(note = %note_id, "empty summary from provider; using extractive summary");
                extractive_summary(transcript, max_length)
            }
            Ok(Err(err)) => {
                warn!(note = %note_id, error = %err, "summary request failed; using extractive summary");
                extractive_summary(transcript, max_length)
            }
            Err(_) => {
                warn!(
                    note = %note_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "summary request timed out; using extractive summary"
                );
                extractive_summary(transcript, max_length)
            }
        }
    }
}

fn transcript_text(entries: &[TranscriptionEntry]) -> String {
    entries
        .iter()
        .map(|entry| entry.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Summary prompt for a transcript, enriched with any photo descriptions.
pub fn summary_prompt(
    transcript: &str,
    photo_pairs: &[PhotoContextPair],
    formatter: &NoteSynthesizer,
) -> String {
    let mut prompt = format!("Please summarize the following transcript:\n\n{transcript}");
    if !photo_pairs.is_empty() {
        prompt.push_str("\n\nAdditional visual context from photos taken during this session:\n");
        for (idx, pair) in photo_pairs.iter().enumerate() {
            prompt.push_str(&format!(
                "\nPhoto {} ({}): {}",
                idx + 1,
                formatter.format_time(pair.timestamp),
                pair.context
            ));
        }
        prompt.push_str("\n\nPlease incorporate this visual context into your summary when relevant.");
    }
    prompt
}

fn fingerprint(prompt: &str, max_length: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(max_length.to_le_bytes());
    hex::encode(hasher.finalize())
}
