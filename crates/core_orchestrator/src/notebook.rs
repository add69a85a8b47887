use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use core_types::{ManualNote, ManualNoteStore, NoteId};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Notes written the first time the store is opened.
pub fn starter_notes() -> Vec<ManualNote> {
    vec![
        ManualNote::new(
            "Welcome to Pocket Pen Pal",
            "This is your first note. Click New Note to add more, or edit/delete any note.",
        ),
        ManualNote::new(
            "Tips",
            "Use the search bar to quickly find notes by title or content.",
        ),
        ManualNote::new("Today’s Thoughts", "Write a few lines about your day..."),
    ]
}

/// The editable list of manual notes. Every mutation persists the full list,
/// and the in-memory list only changes once the save succeeds.
///
/// Generated ids are accepted by `update` and `delete` but never change
/// anything: generated notes are views over transcriptions.
pub struct NoteBook {
    store: Arc<dyn ManualNoteStore>,
    notes: Mutex<Vec<ManualNote>>,
}

impl NoteBook {
    pub async fn open(store: Arc<dyn ManualNoteStore>) -> Result<Self> {
        let notes = match store.load().await.context("failed to load manual notes")? {
            Some(notes) => notes,
            None => {
                let seeded = starter_notes();
                store
                    .save(&seeded)
                    .await
                    .context("failed to seed starter notes")?;
                info!(count = seeded.len(), "seeded starter notes");
                seeded
            }
        };
        Ok(Self {
            store,
            notes: Mutex::new(notes),
        })
    }

    pub async fn list(&self) -> Vec<ManualNote> {
        self.notes.lock().await.clone()
    }

    pub async fn get(&self, id: NoteId) -> Option<ManualNote> {
        let NoteId::Manual(uuid) = id else {
            return None;
        };
        self.notes
            .lock()
            .await
            .iter()
            .find(|note| note.id == uuid)
            .cloned()
    }

    pub async fn add(&self, title: &str, content: &str) -> Result<ManualNote> {
        let note = ManualNote::new(title, content);
        let mut notes = self.notes.lock().await;
        let mut next = Vec::with_capacity(notes.len() + 1);
        next.push(note.clone());
        next.extend(notes.iter().cloned());
        self.persist(&next).await?;
        *notes = next;
        info!(note = %note.id, "added manual note");
        Ok(note)
    }

    /// Returns the updated note, or `None` when `id` is generated or unknown.
    pub async fn update(&self, id: NoteId, title: &str, content: &str) -> Result<Option<ManualNote>> {
        let NoteId::Manual(uuid) = id else {
            debug!(note = %id, "ignoring update of generated note");
            return Ok(None);
        };

        let mut notes = self.notes.lock().await;
        let mut next = notes.clone();
        let Some(note) = next.iter_mut().find(|note| note.id == uuid) else {
            return Ok(None);
        };
        note.title = title.to_string();
        note.content = content.to_string();
        note.updated_at = Utc::now();
        let updated = note.clone();

        self.persist(&next).await?;
        *notes = next;
        Ok(Some(updated))
    }

    /// Returns whether a note was removed.
    pub async fn delete(&self, id: NoteId) -> Result<bool> {
        let NoteId::Manual(uuid) = id else {
            debug!(note = %id, "ignoring delete of generated note");
            return Ok(false);
        };

        let mut notes = self.notes.lock().await;
        let next: Vec<ManualNote> = notes.iter().filter(|note| note.id != uuid).cloned().collect();
        if next.len() == notes.len() {
            return Ok(false);
        }
        self.persist(&next).await?;
        *notes = next;
        info!(note = %uuid, "deleted manual note");
        Ok(true)
    }

    async fn persist(&self, notes: &[ManualNote]) -> Result<()> {
        self.store
            .save(notes)
            .await
            .context("failed to save manual notes")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use anyhow::bail;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;

    use super::*;

    #[derive(Default)]
    struct MemoryStore {
        saved: SyncMutex<Option<Vec<ManualNote>>>,
        saves: AtomicUsize,
        read_only: AtomicBool,
    }

    #[async_trait]
    impl ManualNoteStore for MemoryStore {
        async fn load(&self) -> Result<Option<Vec<ManualNote>>> {
            Ok(self.saved.lock().clone())
        }

        async fn save(&self, notes: &[ManualNote]) -> Result<()> {
            if self.read_only.load(Ordering::SeqCst) {
                bail!("disk full");
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.saved.lock() = Some(notes.to_vec());
            Ok(())
        }
    }

    fn generated_id() -> NoteId {
        NoteId::Generated {
            index: 0,
            start_ms: 1_735_725_600_000,
        }
    }

    #[tokio::test]
    async fn first_open_seeds_starter_notes_once() {
        let store = Arc::new(MemoryStore::default());
        let book = NoteBook::open(store.clone()).await.unwrap();
        let titles: Vec<_> = book.list().await.into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["Welcome to Pocket Pen Pal", "Tips", "Today’s Thoughts"]);

        book.delete(NoteId::Manual(book.list().await[0].id)).await.unwrap();
        let reopened = NoteBook::open(store.clone()).await.unwrap();
        assert_eq!(reopened.list().await.len(), 2);
    }

    #[tokio::test]
    async fn empty_saved_list_is_not_reseeded() {
        let store = Arc::new(MemoryStore::default());
        *store.saved.lock() = Some(Vec::new());
        let book = NoteBook::open(store).await.unwrap();
        assert!(book.list().await.is_empty());
    }

    #[tokio::test]
    async fn crud_persists_every_mutation() {
        let store = Arc::new(MemoryStore::default());
        let book = NoteBook::open(store.clone()).await.unwrap();
        let seeded_saves = store.saves.load(Ordering::SeqCst);

        let note = book.add("Groceries", "milk").await.unwrap();
        assert_eq!(book.list().await[0].id, note.id);

        let updated = book
            .update(NoteId::Manual(note.id), "Groceries", "milk, eggs")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.content, "milk, eggs");
        assert!(updated.updated_at >= note.updated_at);

        assert!(book.delete(NoteId::Manual(note.id)).await.unwrap());
        assert!(!book.delete(NoteId::Manual(note.id)).await.unwrap());

        assert_eq!(store.saves.load(Ordering::SeqCst), seeded_saves + 3);
        assert_eq!(store.saved.lock().as_ref().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn generated_ids_are_never_mutated() {
        let store = Arc::new(MemoryStore::default());
        let book = NoteBook::open(store.clone()).await.unwrap();
        let saves = store.saves.load(Ordering::SeqCst);

        assert!(book.update(generated_id(), "x", "y").await.unwrap().is_none());
        assert!(!book.delete(generated_id()).await.unwrap());
        assert!(book.get(generated_id()).await.is_none());
        assert_eq!(book.list().await.len(), 3);
        assert_eq!(store.saves.load(Ordering::SeqCst), saves);
    }

    #[tokio::test]
    async fn failed_save_leaves_list_unchanged() {
        let store = Arc::new(MemoryStore::default());
        *store.saved.lock() = Some(vec![ManualNote::new("Kept", "original")]);
        let book = NoteBook::open(store.clone()).await.unwrap();
        let kept = book.list().await[0].clone();
        store.read_only.store(true, Ordering::SeqCst);

        assert!(book.add("t", "c").await.is_err());
        assert_eq!(book.list().await, vec![kept.clone()]);

        assert!(book.update(NoteId::Manual(kept.id), "Changed", "new").await.is_err());
        assert_eq!(book.get(NoteId::Manual(kept.id)).await, Some(kept.clone()));

        assert!(book.delete(NoteId::Manual(kept.id)).await.is_err());
        assert_eq!(book.list().await, vec![kept.clone()]);

        assert_eq!(store.saved.lock().as_ref().unwrap(), &vec![kept]);
    }
}
