//! Pure derivation of notes from timestamped captures.
//!
//! Everything in this crate is synchronous and deterministic: the same
//! transcription lines and photos always produce the same notes.

mod correlate;
mod extractive;
mod grouping;
mod search;
mod synthesize;
mod timestamp;

use std::time::Duration;

pub use correlate::{assign_photos, context_pair, related_transcriptions, sort_context_pairs};
pub use extractive::{
    UNABLE_TO_SUMMARIZE, extractive_summary, format_duration, key_topics, truncate_with_ellipsis,
};
pub use grouping::group_entries;
pub use search::{SearchQuery, description_matches, filter_text, matches_text};
pub use synthesize::{NoteSynthesizer, merge_notes};
pub use timestamp::{
    ParseReport, parse_line, parse_logs, parse_timestamp, photo_time_from_filename,
};

/// Maximum silence between two consecutive entries of the same group.
pub const GROUP_GAP: Duration = Duration::from_secs(7 * 60);

/// Radius around a photo within which narration counts as its context.
/// Deliberately independent from [`GROUP_GAP`].
pub const CONTEXT_WINDOW: Duration = Duration::from_secs(5 * 60);

pub(crate) fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
