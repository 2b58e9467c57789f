// chat.rs — Skin-health Q&A against the same endpoint as the analysis.
//
// The transcript is append-only: every send adds one user entry straight
// away and exactly one assistant entry once the call settles. Failures never
// surface as errors here; they turn into a canned assistant reply, one for an
// empty answer and one for everything else.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::ai::{AiError, InferenceClient, InferenceRequest};
use crate::busy::BusyFlag;

pub const GREETING: &str =
    "Hello! I am your AI skin health assistant. Ask me about skin conditions!";
pub const FALLBACK_REPLY: &str =
    "I am experiencing technical difficulties. Please try again later.";
/// Reply when the model answered without any usable text.
pub const EMPTY_REPLY: &str = "Sorry, I could not process your question.";

pub fn chat_prompt(question: &str) -> String {
    format!(
        "Answer this skin health question: \"{question}\". Provide helpful information but remind users to consult healthcare professionals."
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Ordered chat history for one session. Lives in memory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTranscript {
    messages: Vec<ChatMessage>,
}

impl Default for ChatTranscript {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatTranscript {
    /// A transcript seeded with the assistant greeting.
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage::assistant(GREETING)],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("A message is already being answered")]
    Busy,
}

/// Called with every message appended to the transcript.
pub type MessageObserver = Arc<dyn Fn(&ChatMessage) + Send + Sync>;

pub struct ChatFlow {
    client: Arc<InferenceClient>,
    transcript: Mutex<ChatTranscript>,
    draft: Mutex<String>,
    sending: BusyFlag,
    observer: Option<MessageObserver>,
}

impl ChatFlow {
    pub fn new(client: Arc<InferenceClient>) -> Self {
        Self {
            client,
            transcript: Mutex::new(ChatTranscript::new()),
            draft: Mutex::new(String::new()),
            sending: BusyFlag::default(),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: MessageObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Ask `text`. Whitespace-only input is ignored (`Ok(None)`); otherwise
    /// the assistant reply that was appended is returned.
    pub async fn send_chat_message(&self, text: &str) -> Result<Option<ChatMessage>, ChatError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let Some(_guard) = self.sending.try_acquire() else {
            return Err(ChatError::Busy);
        };

        self.append(ChatMessage::user(text));
        self.lock_draft().clear();

        let request = InferenceRequest::text(chat_prompt(text));
        let reply = match self.client.invoke(&request).await {
            Ok(answer) => answer,
            Err(AiError::EmptyOrMalformedResponse(reason)) => {
                log::warn!("Chat got no answer: {}", reason);
                EMPTY_REPLY.to_string()
            }
            Err(e) => {
                log::error!("Chat error: {}", e);
                FALLBACK_REPLY.to_string()
            }
        };

        let message = ChatMessage::assistant(reply);
        self.append(message.clone());
        Ok(Some(message))
    }

    /// Send whatever is in the draft buffer.
    pub async fn send_draft(&self) -> Result<Option<ChatMessage>, ChatError> {
        let text = self.draft();
        self.send_chat_message(&text).await
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        *self.lock_draft() = text.into();
    }

    pub fn draft(&self) -> String {
        self.lock_draft().clone()
    }

    pub fn transcript(&self) -> ChatTranscript {
        self.lock_transcript().clone()
    }

    pub fn is_sending(&self) -> bool {
        self.sending.is_busy()
    }

    fn append(&self, message: ChatMessage) {
        self.lock_transcript().push(message.clone());
        if let Some(observer) = &self.observer {
            observer(&message);
        }
    }

    fn lock_transcript(&self) -> MutexGuard<'_, ChatTranscript> {
        self.transcript.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_draft(&self) -> MutexGuard<'_, String> {
        self.draft.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
