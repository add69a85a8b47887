use std::time::Duration;

use core_types::TranscriptionEntry;

use crate::millis;

/// Partitions entries into runs separated by more than `gap` of silence.
///
/// Entries are sorted by timestamp first (stable, so equal timestamps keep
/// their input order). The gap is measured against the most recent entry of
/// the open group, so a group may span longer than `gap` in total.
pub fn group_entries(
    mut entries: Vec<TranscriptionEntry>,
    gap: Duration,
) -> Vec<Vec<TranscriptionEntry>> {
    entries.sort_by_key(|entry| entry.timestamp);
    let gap_ms = millis(gap);

    let mut groups: Vec<Vec<TranscriptionEntry>> = Vec::new();
    let mut current: Vec<TranscriptionEntry> = Vec::new();

    for entry in entries {
        let joins_current = current
            .last()
            .is_some_and(|last| (entry.timestamp - last.timestamp).num_milliseconds() <= gap_ms);
        if !joins_current && !current.is_empty() {
            groups.push(std::mem::take(&mut current));
        }
        current.push(entry);
    }
    if !current.is_empty() {
        groups.push(current);
    }

    groups
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::{GROUP_GAP, parse_line};

    fn entry_at(base: DateTime<Utc>, offset_secs: i64, text: &str) -> TranscriptionEntry {
        TranscriptionEntry {
            timestamp: base + TimeDelta::seconds(offset_secs),
            text: text.to_string(),
            original_line: text.to_string(),
        }
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap()
    }

    fn texts(groups: &[Vec<TranscriptionEntry>]) -> Vec<Vec<&str>> {
        groups
            .iter()
            .map(|group| group.iter().map(|e| e.text.as_str()).collect())
            .collect()
    }

    #[test]
    fn splits_on_gaps_longer_than_threshold() {
        let entries: Vec<_> = [
            "[2025-01-01T10:00:00.000Z] hello",
            "no brackets here",
            "[2025-01-01T10:03:00.000Z] world",
            "[2025-01-01T10:15:00.000Z] later",
        ]
        .into_iter()
        .filter_map(parse_line)
        .collect();

        let groups = group_entries(entries, GROUP_GAP);
        assert_eq!(texts(&groups), vec![vec!["hello", "world"], vec!["later"]]);
    }

    #[test]
    fn empty_and_single_inputs() {
        assert!(group_entries(Vec::new(), GROUP_GAP).is_empty());
        let groups = group_entries(vec![entry_at(base(), 0, "solo")], GROUP_GAP);
        assert_eq!(texts(&groups), vec![vec!["solo"]]);
    }

    #[test]
    fn exact_threshold_stays_in_group() {
        let groups = group_entries(
            vec![entry_at(base(), 0, "a"), entry_at(base(), 7 * 60, "b")],
            GROUP_GAP,
        );
        assert_eq!(groups.len(), 1);

        let groups = group_entries(
            vec![entry_at(base(), 0, "a"), entry_at(base(), 7 * 60 + 1, "b")],
            GROUP_GAP,
        );
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn gap_is_measured_from_latest_entry_so_groups_can_drift() {
        let entries: Vec<_> = (0..10)
            .map(|i| entry_at(base(), i * 6 * 60, &format!("e{i}")))
            .collect();
        let groups = group_entries(entries, GROUP_GAP);
        assert_eq!(groups.len(), 1);
        let span = groups[0].last().unwrap().timestamp - groups[0][0].timestamp;
        assert_eq!(span, TimeDelta::minutes(54));
    }

    #[test]
    fn sorts_unordered_input_before_grouping() {
        let groups = group_entries(
            vec![
                entry_at(base(), 20 * 60, "late"),
                entry_at(base(), 60, "second"),
                entry_at(base(), 0, "first"),
            ],
            GROUP_GAP,
        );
        assert_eq!(texts(&groups), vec![vec!["first", "second"], vec!["late"]]);
    }

    #[test]
    fn partition_and_gap_properties_hold_for_scattered_input() {
        // Deterministic pseudo-random offsets, up to 20 minutes apart.
        let mut seed: u64 = 0x5eed;
        let mut offset = 0i64;
        let mut entries = Vec::new();
        for i in 0..200 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            offset += ((seed >> 33) % (20 * 60)) as i64;
            entries.push(entry_at(base(), offset, &format!("e{i}")));
        }
        entries.reverse();

        let groups = group_entries(entries.clone(), GROUP_GAP);

        let mut flattened: Vec<_> = groups.iter().flatten().map(|e| e.text.clone()).collect();
        let mut expected: Vec<_> = entries.iter().map(|e| e.text.clone()).collect();
        assert_eq!(flattened.len(), expected.len());
        flattened.sort();
        expected.sort();
        assert_eq!(flattened, expected);

        let limit = TimeDelta::minutes(7);
        for group in &groups {
            assert!(!group.is_empty());
            for pair in group.windows(2) {
                assert!(pair[0].timestamp <= pair[1].timestamp);
                assert!(pair[1].timestamp - pair[0].timestamp <= limit);
            }
        }
        for pair in groups.windows(2) {
            let last = pair[0].last().unwrap().timestamp;
            let first = pair[1][0].timestamp;
            assert!(first - last > limit);
        }
    }
}
