use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use capture_client::BackendClient;
use config::AppConfig;
use core_orchestrator::{FeedSnapshot, NoteBook, NoteChat, NoteFeed, SearchEngine, SummaryCache};
use core_types::{CompletionProvider, CompletionRequest, Note, NoteId};
use note_engine::{NoteSynthesizer, merge_notes};
use provider_llm::HttpCompletionProvider;
use storage_sqlite::SqliteNoteStore;
use tracing::warn;

/// Stand-in used when no provider can be built; every call fails, so
/// summaries fall back to extraction and chat to its apology.
struct UnavailableProvider {
    reason: String,
}

#[async_trait]
impl CompletionProvider for UnavailableProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<String> {
        bail!("AI provider unavailable: {}", self.reason)
    }
}

pub fn build_provider(config: &AppConfig) -> Arc<dyn CompletionProvider> {
    let timeout = config.backend.request_timeout();
    let built = config
        .active_provider_config()
        .ok_or_else(|| anyhow!("provider {:?} is not configured or disabled", config.active_provider))
        .and_then(|provider| HttpCompletionProvider::from_env(provider.clone(), timeout));
    match built {
        Ok(provider) => Arc::new(provider),
        Err(err) => {
            warn!(error = %err, "AI provider unavailable; using local fallbacks");
            Arc::new(UnavailableProvider {
                reason: err.to_string(),
            })
        }
    }
}

pub struct Services {
    pub config: AppConfig,
    pub backend: Arc<BackendClient>,
    pub synthesizer: NoteSynthesizer,
    pub feed: NoteFeed,
    pub notebook: NoteBook,
    pub summaries: SummaryCache,
    pub chat: NoteChat,
    pub search: Arc<SearchEngine>,
}

impl Services {
    pub async fn build(config: AppConfig, data_dir: &Path) -> Result<Self> {
        let timeout = config.backend.request_timeout();
        let backend = Arc::new(
            BackendClient::new(&config.backend.base_url, timeout)?
                .with_user_id(config.backend.user_id.clone())
                .with_photo_endpoints(config.backend.photo_endpoints.clone()),
        );

        let store = SqliteNoteStore::connect(data_dir.join(&config.storage.database_file))
            .await
            .context("failed to open note storage")?;
        let notebook = NoteBook::open(Arc::new(store)).await?;

        let provider = build_provider(&config);
        let synthesizer = NoteSynthesizer::local();
        let summaries = SummaryCache::new(provider.clone(), config.summary.cache_capacity)
            .with_timeout(timeout)
            .with_formatter(synthesizer.clone());
        let chat = NoteChat::new(provider).with_timeout(timeout);

        Ok(Self {
            feed: NoteFeed::new(backend.clone(), synthesizer.clone()),
            search: Arc::new(SearchEngine::new(backend.clone())),
            config,
            backend,
            synthesizer,
            notebook,
            summaries,
            chat,
        })
    }

    /// Refreshes the feed and merges generated notes with manual ones.
    pub async fn all_notes(&self) -> (Arc<FeedSnapshot>, Vec<Note>) {
        let snapshot = self.feed.refresh().await;
        let notes = merge_notes(snapshot.notes.clone(), self.notebook.list().await);
        (snapshot, notes)
    }

    pub async fn find_note(&self, id: &str) -> Result<(Arc<FeedSnapshot>, Note)> {
        let id: NoteId = id.parse()?;
        let (snapshot, notes) = self.all_notes().await;
        let note = notes
            .into_iter()
            .find(|note| note.id() == id)
            .ok_or_else(|| anyhow!("no note with id {id}"))?;
        Ok((snapshot, note))
    }
}
