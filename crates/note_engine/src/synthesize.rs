use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use core_types::{GeneratedNote, ManualNote, Note, Photo, TranscriptionEntry};

use crate::{GROUP_GAP, assign_photos, group_entries};

const TITLE_WORDS: usize = 6;

/// Turns transcription groups into read-only generated notes.
///
/// Times in titles and content are rendered in `offset`, which is the only
/// environment-dependent input; everything else is a function of the entries
/// and photos passed in.
#[derive(Debug, Clone)]
pub struct NoteSynthesizer {
    offset: FixedOffset,
    gap: Duration,
}

impl Default for NoteSynthesizer {
    fn default() -> Self {
        Self::local()
    }
}

impl NoteSynthesizer {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            gap: GROUP_GAP,
        }
    }

    pub fn local() -> Self {
        Self::new(*Local::now().offset())
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    pub fn with_gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    pub fn format_time(&self, time: DateTime<Utc>) -> String {
        time.with_timezone(&self.offset)
            .format("%-I:%M:%S %p")
            .to_string()
    }

    /// Groups `entries`, builds one note per group and attaches photos taken
    /// during each group. Notes come back most recent first.
    pub fn derive_notes(
        &self,
        entries: Vec<TranscriptionEntry>,
        photos: &[Photo],
    ) -> Vec<GeneratedNote> {
        let mut notes: Vec<GeneratedNote> = group_entries(entries, self.gap)
            .into_iter()
            .enumerate()
            .filter_map(|(index, group)| self.synthesize_group(index, group, photos))
            .collect();
        notes.reverse();
        notes
    }

    /// `index` is the group's chronological position; it becomes part of the id.
    pub fn synthesize_group(
        &self,
        index: usize,
        group: Vec<TranscriptionEntry>,
        photos: &[Photo],
    ) -> Option<GeneratedNote> {
        let start_time = group.first()?.timestamp;
        let end_time = group.last()?.timestamp;
        let duration_minutes = (end_time - start_time).num_milliseconds() as f64 / 60_000.0;

        let title = self.title_for(&group[0]);
        let content = group
            .iter()
            .map(|entry| format!("[{}] {}", self.format_time(entry.timestamp), entry.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        Some(GeneratedNote {
            index,
            title,
            content,
            created_at: start_time,
            updated_at: end_time,
            photos: assign_photos(photos, start_time, end_time),
            transcription_entries: group,
            start_time,
            end_time,
            duration_minutes,
        })
    }

    pub fn title_for(&self, first: &TranscriptionEntry) -> String {
        let words: Vec<&str> = first.text.split_whitespace().collect();
        let mut title = words
            .iter()
            .take(TITLE_WORDS)
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if title.is_empty() {
            return format!("Note from {}", self.format_time(first.timestamp));
        }
        if words.len() > TITLE_WORDS {
            title.push_str("...");
        }
        title
    }
}

/// Generated notes (already most recent first) followed by manual notes,
/// then stable-sorted by `updated_at`, newest first.
pub fn merge_notes(generated: Vec<GeneratedNote>, manual: Vec<ManualNote>) -> Vec<Note> {
    let mut merged: Vec<Note> = generated
        .into_iter()
        .map(Note::Generated)
        .chain(manual.into_iter().map(Note::Manual))
        .collect();
    merged.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
    merged
}
