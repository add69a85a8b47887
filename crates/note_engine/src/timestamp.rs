use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use core_types::{TranscriptionEntry, TranscriptionLog};
use regex::Regex;
use tracing::{debug, warn};

static LINE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(.*?)\]\s*(.*)$").expect("line pattern"));

// `Date.toISOString()` with `:` and `.` replaced by `-`, as written by the capture device.
static DASHED_ISO_IN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})-(\d{2})-(\d{2})T(\d{2})-(\d{2})-(\d{2})-(\d{3})Z").expect("iso pattern")
});

static EPOCH_MS_IN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\D)(\d{13})(?:\D|$)").expect("epoch pattern"));

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const SAMPLE_BYTES: usize = 48;

/// Parses the bracketed prefix of a log line into an absolute UTC instant.
///
/// Attempts, in order: an explicit offset (`T` plus `Z` or `+`), the value
/// read as UTC, and finally the value stripped down to `[0-9-T:.]` read as
/// UTC. Locale artifacts such as direction marks are removed by the last step.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.contains('T') && (raw.contains('Z') || raw.contains('+')) {
        if let Some(parsed) = parse_absolute(raw) {
            return Some(parsed);
        }
    }

    if let Some(parsed) = parse_as_utc(raw) {
        return Some(parsed);
    }

    let stripped: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '-' | 'T' | ':' | '.'))
        .collect();
    if stripped.is_empty() || stripped == raw {
        return None;
    }
    parse_as_utc(&stripped)
}

fn parse_absolute(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn parse_as_utc(raw: &str) -> Option<DateTime<Utc>> {
    parse_absolute(&format!("{raw}Z")).or_else(|| {
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
    })
}

fn normalize_line(line: &str) -> String {
    line.replace("\r\n", "\n")
        .replace('\r', "\n")
        .trim_start_matches('\u{feff}')
        .trim()
        .to_string()
}

/// Parses one `[<timestamp>] <text>` line. Malformed lines yield `None`.
pub fn parse_line(line: &str) -> Option<TranscriptionEntry> {
    let normalized = normalize_line(line);
    let captures = LINE_PATTERN.captures(&normalized)?;
    let raw_timestamp = captures.get(1).map_or("", |m| m.as_str());
    let text = captures.get(2).map_or("", |m| m.as_str()).trim();

    let Some(timestamp) = parse_timestamp(raw_timestamp) else {
        warn!(raw = %raw_timestamp, "dropping transcription line with unparseable timestamp");
        return None;
    };
    if text.is_empty() {
        debug!(raw = %raw_timestamp, "dropping transcription line without text");
        return None;
    }

    Some(TranscriptionEntry {
        timestamp,
        text: text.to_string(),
        original_line: line.to_string(),
    })
}

/// Outcome of parsing a batch of logs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseReport {
    /// Parsed entries, sorted ascending by timestamp.
    pub entries: Vec<TranscriptionEntry>,
    /// Non-blank lines seen.
    pub line_count: usize,
    pub rejected: usize,
}

impl ParseReport {
    /// True when lines existed but none of them parsed.
    pub fn all_rejected(&self) -> bool {
        self.line_count > 0 && self.entries.is_empty()
    }
}

/// Parses every line of every log and returns the entries in time order.
pub fn parse_logs(logs: &[TranscriptionLog]) -> ParseReport {
    let mut report = ParseReport::default();
    let mut first_rejected: Option<String> = None;

    for log in logs {
        let from_content;
        let lines: Vec<&str> = if log.lines.is_empty() {
            from_content = normalize_line(&log.content);
            from_content.split('\n').collect()
        } else {
            log.lines.iter().map(String::as_str).collect()
        };

        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            report.line_count += 1;
            match parse_line(line) {
                Some(entry) => report.entries.push(entry),
                None => {
                    report.rejected += 1;
                    if first_rejected.is_none() {
                        first_rejected = Some(line.to_string());
                    }
                }
            }
        }
    }

    report.entries.sort_by_key(|entry| entry.timestamp);

    if report.all_rejected() {
        let sample = first_rejected.unwrap_or_default();
        let bytes: Vec<u8> = sample.bytes().take(SAMPLE_BYTES).collect();
        warn!(
            lines = report.line_count,
            sample = %sample,
            sample_bytes = ?bytes,
            "no transcription lines could be parsed"
        );
    } else if report.rejected > 0 {
        debug!(
            lines = report.line_count,
            rejected = report.rejected,
            "some transcription lines were dropped"
        );
    }

    report
}

/// Extracts a capture time embedded in a photo filename, if any.
pub fn photo_time_from_filename(filename: &str) -> Option<DateTime<Utc>> {
    if let Some(caps) = DASHED_ISO_IN_NAME.captures(filename) {
        let num = |idx: usize| caps.get(idx).and_then(|m| m.as_str().parse::<u32>().ok());
        let year = caps.get(1).and_then(|m| m.as_str().parse::<i32>().ok())?;
        let parsed = NaiveDate::from_ymd_opt(year, num(2)?, num(3)?)
            .and_then(|date| date.and_hms_milli_opt(num(4)?, num(5)?, num(6)?, num(7)?));
        if let Some(naive) = parsed {
            return Some(naive.and_utc());
        }
    }

    let millis = EPOCH_MS_IN_NAME
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())?;
    DateTime::from_timestamp_millis(millis)
}
