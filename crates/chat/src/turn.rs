use std::time::SystemTime;

use super::ids::TurnId;

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message in the conversation.
///
/// Turns are created and mutated only through the store; the fields are
/// readable by anyone holding a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub id: TurnId,
    pub role: Role,
    pub content: String,
    pub timestamp: SystemTime,
    pub is_streaming: bool,
    pub error: Option<String>,
}

impl ChatTurn {
    pub(crate) fn new(role: Role, content: impl Into<String>, is_streaming: bool) -> Self {
        Self {
            id: TurnId::new_v7(),
            role,
            content: content.into(),
            timestamp: SystemTime::now(),
            is_streaming,
            error: None,
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub(crate) fn apply(&mut self, patch: TurnPatch) {
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(is_streaming) = patch.is_streaming {
            self.is_streaming = is_streaming;
        }
        if let Some(error) = patch.error {
            self.error = error;
        }
    }
}

/// Partial update for [`ChatTurn`]. `None` leaves the field as it is;
/// `error: Some(None)` clears a recorded error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnPatch {
    pub content: Option<String>,
    pub is_streaming: Option<bool>,
    pub error: Option<Option<String>>,
}

impl TurnPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn with_streaming(mut self, is_streaming: bool) -> Self {
        self.is_streaming = Some(is_streaming);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(Some(error.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.is_streaming.is_none() && self.error.is_none()
    }
}
