use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use core_types::{NO_DESCRIPTION, Photo, PhotoContextPair, TranscriptionEntry};

use crate::millis;

/// Photos taken inside `[start, end]` (inclusive), first occurrence per filename.
pub fn assign_photos(photos: &[Photo], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Photo> {
    let mut seen = HashSet::new();
    photos
        .iter()
        .filter(|photo| start <= photo.upload_time && photo.upload_time <= end)
        .filter(|photo| seen.insert(photo.filename.as_str()))
        .cloned()
        .collect()
}

/// Entries within `window` of the photo, in either direction.
pub fn related_transcriptions(
    photo: &Photo,
    entries: &[TranscriptionEntry],
    window: Duration,
) -> Vec<TranscriptionEntry> {
    let window_ms = millis(window);
    entries
        .iter()
        .filter(|entry| {
            (entry.timestamp - photo.upload_time)
                .num_milliseconds()
                .abs()
                <= window_ms
        })
        .cloned()
        .collect()
}

pub fn context_pair(
    photo: Photo,
    description: Option<String>,
    entries: &[TranscriptionEntry],
    window: Duration,
) -> PhotoContextPair {
    let context = description
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| NO_DESCRIPTION.to_string());
    let related_transcriptions = related_transcriptions(&photo, entries, window);
    PhotoContextPair {
        timestamp: photo.upload_time,
        photo,
        context,
        related_transcriptions,
    }
}

pub fn sort_context_pairs(pairs: &mut [PhotoContextPair]) {
    pairs.sort_by_key(|pair| pair.timestamp);
}
