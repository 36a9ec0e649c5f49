use uuid::Uuid;

use crate::client::api::{ApiClient, ClientError};
use crate::client::session::{ChatSession, SessionError};
use crate::models::internal::Conversation;

pub const SAVE_FAILED_NOTICE: &str = "Error saving conversation";
pub const REPLY_FAILED_NOTICE: &str = "Error generating response";
pub const LOAD_FAILED_NOTICE: &str = "Error loading conversations";

/// Transient user-facing notifications (toasts in a GUI, log lines here).
pub trait Notifier: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("No conversation selected")]
    NoConversation,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// How a call to [`ChatController::send`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Reply streamed and the full transcript was stored.
    Saved(Conversation),
    /// Stream completed without any reply text; nothing to store.
    EmptyReply,
    /// Reply streamed but storing the transcript failed; it stays on screen.
    SaveFailed(String),
    /// Stream failed; the transcript was reverted.
    Failed(String),
}

/// Drives a [`ChatSession`] against the API.
pub struct ChatController<N: Notifier = TracingNotifier> {
    api: ApiClient,
    notifier: N,
    conversations: Vec<Conversation>,
    session: Option<ChatSession>,
}

impl<N: Notifier> ChatController<N> {
    pub fn new(api: ApiClient, notifier: N) -> Self {
        Self {
            api,
            notifier,
            conversations: Vec::new(),
            session: None,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    pub async fn load_conversations(&mut self) -> Result<&[Conversation], ControllerError> {
        match self.api.list_conversations().await {
            Ok(conversations) => {
                self.conversations = conversations;
                Ok(&self.conversations)
            }
            Err(e) => {
                self.notifier.error(LOAD_FAILED_NOTICE);
                Err(e.into())
            }
        }
    }

    /// Create a conversation, put it at the top of the list and select it.
    pub async fn start_new_conversation(&mut self) -> Result<&ChatSession, ControllerError> {
        let conversation = self.api.create_conversation().await?;
        self.conversations.insert(0, conversation.clone());
        self.install(&conversation)
    }

    /// Select a conversation using its stored transcript.
    pub async fn select_conversation(
        &mut self,
        id: Uuid,
    ) -> Result<&ChatSession, ControllerError> {
        let conversation = self.api.get_conversation(id).await?;
        self.remember(&conversation);
        self.install(&conversation)
    }

    fn install(&mut self, conversation: &Conversation) -> Result<&ChatSession, ControllerError> {
        match self.session.as_mut() {
            Some(session) => session.select(conversation)?,
            None => self.session = Some(ChatSession::from_conversation(conversation)),
        }
        self.session.as_ref().ok_or(ControllerError::NoConversation)
    }

    /// Replace the cached list entry and move it to the top.
    fn remember(&mut self, conversation: &Conversation) {
        self.conversations.retain(|c| c.id != conversation.id);
        self.conversations.insert(0, conversation.clone());
    }

    pub fn acknowledge_error(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.acknowledge_error();
        }
    }

    /// Run one chat turn: submit, render chunks through `on_chunk`, then store
    /// the transcript once the reply is complete.
    pub async fn send<F>(
        &mut self,
        content: &str,
        mut on_chunk: F,
    ) -> Result<TurnOutcome, ControllerError>
    where
        F: FnMut(&str) + Send,
    {
        let session = self.session.as_mut().ok_or(ControllerError::NoConversation)?;
        let conversation_id = session.conversation_id();
        let history = session.begin_turn(content)?;

        let streamed = self
            .api
            .stream_chat(conversation_id, &history, |chunk| {
                on_chunk(chunk);
                if let Err(e) = session.push_chunk(chunk) {
                    tracing::warn!("Dropped reply chunk: {}", e);
                }
            })
            .await;

        if let Err(e) = streamed {
            tracing::warn!("Chat turn for {} failed: {}", conversation_id, e);
            session.fail_turn(e.to_string());
            self.notifier.error(REPLY_FAILED_NOTICE);
            return Ok(TurnOutcome::Failed(e.to_string()));
        }

        let Some(transcript) = session.finish_turn()? else {
            return Ok(TurnOutcome::EmptyReply);
        };

        match self.api.save_messages(conversation_id, &transcript).await {
            Ok(saved) => {
                session.confirm_saved(&saved.messages);
                self.remember(&saved);
                Ok(TurnOutcome::Saved(saved))
            }
            Err(e) => {
                tracing::error!("Saving conversation {} failed: {}", conversation_id, e);
                self.notifier.error(SAVE_FAILED_NOTICE);
                Ok(TurnOutcome::SaveFailed(e.to_string()))
            }
        }
    }
}
