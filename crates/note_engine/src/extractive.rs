use core_types::TranscriptionEntry;
use indexmap::IndexMap;

pub const UNABLE_TO_SUMMARIZE: &str = "Unable to extract meaningful content from transcript.";

const MAX_SENTENCES: usize = 3;
const POSITION_BONUS: usize = 20;
const MAX_TOPICS: usize = 5;
const ELLIPSIS: &str = "...";

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "up", "about", "into", "through", "during", "before", "after", "above", "below",
    "between", "among", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "can",
    "this", "that", "these", "those", "i", "you", "he", "she", "it", "we", "they", "me", "him",
    "her", "us", "them",
];

/// Local summary used when the AI summarizer is unavailable.
///
/// Sentences are scored by length, with a bonus for the first and the last
/// one; the best three are kept in their original order.
pub fn extractive_summary(text: &str, max_length: usize) -> String {
    let sentences: Vec<&str> = text
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .collect();
    if sentences.is_empty() {
        return UNABLE_TO_SUMMARIZE.to_string();
    }

    let last = sentences.len() - 1;
    let mut scored: Vec<(usize, usize)> = sentences
        .iter()
        .enumerate()
        .map(|(idx, sentence)| {
            let bonus = if idx == 0 || idx == last {
                POSITION_BONUS
            } else {
                0
            };
            (idx, sentence.chars().count() + bonus)
        })
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut picked: Vec<usize> = scored
        .iter()
        .take(MAX_SENTENCES)
        .map(|(idx, _)| *idx)
        .collect();
    picked.sort_unstable();

    let mut summary = picked
        .iter()
        .map(|&idx| sentences[idx])
        .collect::<Vec<_>>()
        .join(". ");
    summary.push('.');
    truncate_with_ellipsis(&summary, max_length)
}

/// Cuts `text` to at most `max_length` characters, ending in `...` when cut.
pub fn truncate_with_ellipsis(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }
    if max_length < ELLIPSIS.len() {
        return text.chars().take(max_length).collect();
    }
    let keep = max_length - ELLIPSIS.len();
    let head: String = text.chars().take(keep).collect();
    format!("{}{ELLIPSIS}", head.trim_end())
}

/// The most frequent content words across the entries.
pub fn key_topics(entries: &[TranscriptionEntry]) -> Vec<String> {
    let full_text = entries
        .iter()
        .map(|entry| entry.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let cleaned: String = full_text
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c.is_whitespace() { c } else { ' ' })
        .collect();

    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for word in cleaned.split_whitespace() {
        if word.chars().count() > 3 && !STOP_WORDS.contains(&word) {
            *counts.entry(word).or_default() += 1;
        }
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .into_iter()
        .take(MAX_TOPICS)
        .map(|(word, _)| word.to_string())
        .collect()
}

pub fn format_duration(minutes: f64) -> String {
    if minutes < 1.0 {
        return "< 1 min".to_string();
    }
    if minutes < 60.0 {
        return format!("{} min", minutes.round() as i64);
    }
    let hours = (minutes / 60.0).floor() as i64;
    let remaining = (minutes % 60.0).round() as i64;
    format!("{hours}h {remaining}m")
}
