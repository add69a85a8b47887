use std::time::Duration;

use core_types::{DescriptionStore, Photo, PhotoContextPair, TranscriptionEntry};
use futures::future::join_all;
use note_engine::{context_pair, sort_context_pairs};
use tracing::warn;

/// Loads every photo's description concurrently and pairs it with the
/// entries inside `window`. Unreadable descriptions become the placeholder.
pub async fn build_context_pairs(
    photos: &[Photo],
    entries: &[TranscriptionEntry],
    descriptions: &dyn DescriptionStore,
    window: Duration,
) -> Vec<PhotoContextPair> {
    let loaded = join_all(photos.iter().map(|photo| async move {
        match descriptions.description(photo).await {
            Ok(description) => description,
            Err(err) => {
                warn!(photo = %photo.filename, error = %err, "failed to load photo description");
                None
            }
        }
    }))
    .await;

    let mut pairs: Vec<PhotoContextPair> = photos
        .iter()
        .cloned()
        .zip(loaded)
        .map(|(photo, description)| context_pair(photo, description, entries, window))
        .collect();
    sort_context_pairs(&mut pairs);
    pairs
}

#[cfg(test)]
mod tests {
    use core_types::NO_DESCRIPTION;
    use note_engine::CONTEXT_WINDOW;

    use super::*;
    use crate::testing::{MapDescriptions, at, entry, photo};

    #[tokio::test]
    async fn pairs_are_sorted_and_fall_back_on_missing_descriptions() {
        let store = MapDescriptions::new(&[("late.jpg", "A cat on the desk")]);
        let photos = vec![
            photo("late.jpg", at(10, 30)),
            photo("broken.jpg", at(10, 10)),
            photo("missing.jpg", at(10, 0)),
        ];
        let entries = vec![
            entry(at(10, 2), "near the first photo"),
            entry(at(10, 28), "near the last photo"),
        ];

        let pairs = build_context_pairs(&photos, &entries, store.as_ref(), CONTEXT_WINDOW).await;
        let names: Vec<_> = pairs.iter().map(|p| p.photo.filename.as_str()).collect();
        assert_eq!(names, vec!["missing.jpg", "broken.jpg", "late.jpg"]);
        assert_eq!(pairs[0].context, NO_DESCRIPTION);
        assert_eq!(pairs[1].context, NO_DESCRIPTION);
        assert_eq!(pairs[2].context, "A cat on the desk");
        assert_eq!(pairs[0].related_transcriptions.len(), 1);
        assert!(pairs[1].related_transcriptions.is_empty());
        assert_eq!(pairs[2].related_transcriptions[0].text, "near the last photo");
        assert_eq!(store.call_count(), 3);
    }
}
