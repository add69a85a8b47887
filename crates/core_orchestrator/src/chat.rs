use std::sync::Arc;
use std::time::Duration;

use core_types::{CompletionProvider, CompletionRequest, Note};
use thiserror::Error;
use tracing::{info, warn};

pub const CHAT_FALLBACK: &str =
    "Sorry, I encountered an error processing your question. Please try again.";

const CHAT_MAX_TOKENS: u32 = 1024;
const CHAT_SYSTEM: &str = "You are a helpful assistant. Answer the user's question using the \
                           note they are looking at. If the note does not contain the answer, \
                           say so briefly.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("question must not be empty")]
    EmptyQuestion,
}

/// Text a note contributes to a chat prompt.
pub fn note_context(note: &Note) -> String {
    match note {
        Note::Generated(generated) => generated
            .transcription_entries
            .iter()
            .map(|entry| entry.text.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        Note::Manual(manual) => manual.content.clone(),
    }
}

/// Question answering over a single note.
pub struct NoteChat {
    provider: Arc<dyn CompletionProvider>,
    timeout: Duration,
}

impl NoteChat {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Answers `question` about `note`. Provider failures resolve to
    /// [`CHAT_FALLBACK`]; only an empty question is an error.
    pub async fn ask(&self, note: &Note, question: &str) -> Result<String, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }

        let prompt = format!(
            "Note: {}\n\n{}\n\nQuestion: {question}",
            note.title(),
            note_context(note)
        );
        let request = CompletionRequest::text(prompt, CHAT_MAX_TOKENS).with_system(CHAT_SYSTEM);

        let answer = match tokio::time::timeout(self.timeout, self.provider.complete(request)).await
        {
            Ok(Ok(answer)) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(Ok(_)) => {
                warn!(note = %note.id(), "chat provider returned an empty answer");
                CHAT_FALLBACK.to_string()
            }
            Ok(Err(err)) => {
                warn!(note = %note.id(), error = %err, "chat request failed");
                CHAT_FALLBACK.to_string()
            }
            Err(_) => {
                warn!(note = %note.id(), "chat request timed out");
                CHAT_FALLBACK.to_string()
            }
        };
        info!(note = %note.id(), "answered note question");
        Ok(answer)
    }
}
