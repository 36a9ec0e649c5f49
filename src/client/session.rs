use uuid::Uuid;

use crate::models::internal::{Conversation, Message, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    AwaitingReply,
    /// A turn failed; cleared by `acknowledge_error`.
    Error(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("A reply is already being streamed")]
    Busy,
    #[error("No reply is being streamed")]
    NotAwaitingReply,
    #[error("Previous error not acknowledged: {0}")]
    ErrorPending(String),
    #[error("Message is empty")]
    EmptyMessage,
}

/// Client-side view of one conversation.
///
/// `rendered` is what the user sees, `confirmed` is the transcript last known
/// to be stored. A turn appends to `rendered` first and only becomes
/// confirmed once the server acknowledged the save.
#[derive(Debug, Clone)]
pub struct ChatSession {
    conversation_id: Uuid,
    title: String,
    confirmed: Vec<Message>,
    rendered: Vec<Message>,
    state: ChatState,
    reply_started: bool,
}

impl ChatSession {
    pub fn from_conversation(conversation: &Conversation) -> Self {
        Self {
            conversation_id: conversation.id,
            title: conversation.title.clone(),
            confirmed: conversation.messages.clone(),
            rendered: conversation.messages.clone(),
            state: ChatState::Idle,
            reply_started: false,
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn messages(&self) -> &[Message] {
        &self.rendered
    }

    pub fn confirmed(&self) -> &[Message] {
        &self.confirmed
    }

    /// True while the screen shows turns that are not stored yet.
    pub fn has_unsaved_changes(&self) -> bool {
        self.rendered != self.confirmed
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        match &self.state {
            ChatState::Idle => Ok(()),
            ChatState::AwaitingReply => Err(SessionError::Busy),
            ChatState::Error(reason) => Err(SessionError::ErrorPending(reason.clone())),
        }
    }

    /// Append the user's message and return the history to submit.
    pub fn begin_turn(&mut self, content: &str) -> Result<Vec<Message>, SessionError> {
        self.ensure_idle()?;
        if content.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        self.rendered.push(Message::user(content));
        self.state = ChatState::AwaitingReply;
        self.reply_started = false;

        Ok(self.rendered.clone())
    }

    /// Append a streamed piece of the reply to the pending assistant turn.
    pub fn push_chunk(&mut self, chunk: &str) -> Result<(), SessionError> {
        if self.state != ChatState::AwaitingReply {
            return Err(SessionError::NotAwaitingReply);
        }

        match self.rendered.last_mut() {
            Some(last) if self.reply_started && last.role == Role::Assistant => {
                last.content.push_str(chunk);
            }
            _ => {
                self.rendered.push(Message::assistant(chunk));
                self.reply_started = true;
            }
        }

        Ok(())
    }

    /// The reply stream completed. Returns the transcript to persist when it
    /// ends with an assistant turn, `None` when nothing was produced.
    pub fn finish_turn(&mut self) -> Result<Option<Vec<Message>>, SessionError> {
        if self.state != ChatState::AwaitingReply {
            return Err(SessionError::NotAwaitingReply);
        }
        self.state = ChatState::Idle;
        self.reply_started = false;

        let ends_with_reply = self
            .rendered
            .last()
            .is_some_and(|m| m.role == Role::Assistant);

        Ok(ends_with_reply.then(|| self.rendered.clone()))
    }

    /// The server stored `saved`; it becomes the confirmed transcript.
    pub fn confirm_saved(&mut self, saved: &[Message]) {
        self.confirmed = saved.to_vec();
    }

    /// Drop the unconfirmed turn and enter the error state.
    pub fn fail_turn(&mut self, reason: impl Into<String>) {
        self.rendered = self.confirmed.clone();
        self.state = ChatState::Error(reason.into());
        self.reply_started = false;
    }

    pub fn acknowledge_error(&mut self) {
        if matches!(self.state, ChatState::Error(_)) {
            self.state = ChatState::Idle;
        }
    }

    /// Switch to another conversation; its stored transcript replaces the
    /// current one wholesale.
    pub fn select(&mut self, conversation: &Conversation) -> Result<(), SessionError> {
        if self.state == ChatState::AwaitingReply {
            return Err(SessionError::Busy);
        }
        *self = Self::from_conversation(conversation);
        Ok(())
    }
}
