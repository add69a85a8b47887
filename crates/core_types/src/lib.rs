use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder shown for a photo whose description is missing or unreadable.
pub const NO_DESCRIPTION: &str = "No description available";

const GENERATED_ID_PREFIX: &str = "generated-";

/// One parsed `[<timestamp>] <text>` line of a transcription log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionEntry {
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub original_line: String,
}

/// A raw transcription log as listed by the capture backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TranscriptionLog {
    pub filename: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub filename: String,
    pub path: String,
    pub upload_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl Photo {
    /// Path of the companion description: same base name, `.txt` extension.
    pub fn description_path(&self) -> String {
        let name_start = self.path.rfind('/').map_or(0, |idx| idx + 1);
        match self.path[name_start..].rfind('.') {
            Some(dot) if dot > 0 => format!("{}.txt", &self.path[..name_start + dot]),
            _ => format!("{}.txt", self.path),
        }
    }
}

/// Identity of a note. Generated ids can never collide with manual ones
/// because the two live in different variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum NoteId {
    Manual(Uuid),
    Generated { index: usize, start_ms: i64 },
}

impl NoteId {
    pub fn is_generated(&self) -> bool {
        matches!(self, NoteId::Generated { .. })
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteId::Manual(id) => write!(f, "{id}"),
            NoteId::Generated { index, start_ms } => {
                write!(f, "{GENERATED_ID_PREFIX}{index}-{start_ms}")
            }
        }
    }
}

impl FromStr for NoteId {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        if let Some(rest) = value.strip_prefix(GENERATED_ID_PREFIX) {
            let (index, start_ms) = rest
                .split_once('-')
                .ok_or_else(|| anyhow!("malformed generated note id: {value}"))?;
            return Ok(NoteId::Generated {
                index: index
                    .parse()
                    .with_context(|| format!("invalid group index in {value}"))?,
                start_ms: start_ms
                    .parse()
                    .with_context(|| format!("invalid start time in {value}"))?,
            });
        }
        let id = Uuid::parse_str(value).with_context(|| format!("invalid note id: {value}"))?;
        Ok(NoteId::Manual(id))
    }
}

impl From<NoteId> for String {
    fn from(value: NoteId) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for NoteId {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// A user-authored note, persisted and freely editable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManualNote {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ManualNote {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A read-only note derived from one group of transcription entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedNote {
    pub index: usize,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub transcription_entries: Vec<TranscriptionEntry>,
    pub photos: Vec<Photo>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: f64,
}

impl GeneratedNote {
    pub fn id(&self) -> NoteId {
        NoteId::Generated {
            index: self.index,
            start_ms: self.start_time.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Note {
    Manual(ManualNote),
    Generated(GeneratedNote),
}

impl Note {
    pub fn id(&self) -> NoteId {
        match self {
            Note::Manual(note) => NoteId::Manual(note.id),
            Note::Generated(note) => note.id(),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Note::Manual(note) => &note.title,
            Note::Generated(note) => &note.title,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Note::Manual(note) => &note.content,
            Note::Generated(note) => &note.content,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Note::Manual(note) => note.created_at,
            Note::Generated(note) => note.created_at,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Note::Manual(note) => note.updated_at,
            Note::Generated(note) => note.updated_at,
        }
    }

    pub fn photos(&self) -> &[Photo] {
        match self {
            Note::Manual(_) => &[],
            Note::Generated(note) => &note.photos,
        }
    }

    pub fn entries(&self) -> &[TranscriptionEntry] {
        match self {
            Note::Manual(_) => &[],
            Note::Generated(note) => &note.transcription_entries,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Note::Generated(_))
    }
}

/// A photo paired with its description and the narration around it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhotoContextPair {
    pub photo: Photo,
    pub context: String,
    pub timestamp: DateTime<Utc>,
    pub related_transcriptions: Vec<TranscriptionEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub base_url: String,
    pub api_key_env: String,
    pub default_model: String,
    #[serde(default)]
    pub extra_headers: Vec<(String, String)>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn api_key_from_env(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}

const fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImagePayload {
    pub media_type: String,
    pub data_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImagePayload>,
}

impl CompletionRequest {
    pub fn text(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_tokens,
            image: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_image(mut self, image: ImagePayload) -> Self {
        self.image = Some(image);
        self
    }
}

/// Opaque AI text-completion capability.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// Source of the raw capture collections, polled on an interval.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    async fn fetch_photos(&self) -> Result<Vec<Photo>>;
    async fn fetch_transcriptions(&self) -> Result<Vec<TranscriptionLog>>;
}

/// Lookup of externally produced photo descriptions. `Ok(None)` means the
/// description does not exist, which is not an error.
#[async_trait]
pub trait DescriptionStore: Send + Sync {
    async fn description(&self, photo: &Photo) -> Result<Option<String>>;
}

/// Persistence for the manual note list under a single key.
/// `load` returns `None` when nothing has ever been saved.
#[async_trait]
pub trait ManualNoteStore: Send + Sync {
    async fn load(&self) -> Result<Option<Vec<ManualNote>>>;
    async fn save(&self, notes: &[ManualNote]) -> Result<()>;
}
