use std::sync::Arc;

use ngmentor_chat::{ConversationStatus, ConversationStore, Role, TurnId};
use ngmentor_llm::{
    ChatMessage, CompletionError, CompletionEventStream, CompletionProvider, RequestOverrides,
    Role as WireRole, StreamEvent,
};
use snafu::{ResultExt, Snafu, ensure};
use tokio::task::JoinHandle;

pub const STREAM_CLOSED_MESSAGE: &str = "stream ended before a terminal event";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ControllerError {
    #[snafu(display("message is empty"))]
    EmptyInput { stage: &'static str },
    #[snafu(display("a response is still {}; wait or /stop it", status.label()))]
    Busy {
        stage: &'static str,
        status: ConversationStatus,
    },
    #[snafu(display("{source}"))]
    NotConfigured {
        stage: &'static str,
        source: CompletionError,
    },
    #[snafu(display("{source}"))]
    OpenStream {
        stage: &'static str,
        source: CompletionError,
    },
}

pub type ControllerResult<T> = Result<T, ControllerError>;

struct ActiveStream {
    turn_id: TurnId,
    stream: CompletionEventStream,
    accumulated: String,
    _worker: JoinHandle<()>,
}

/// Drives one conversation: turns user input into store updates and a
/// completion stream, and folds stream events back into the store.
///
/// All state changes happen on the caller's task. Only the provider worker
/// runs elsewhere.
pub struct ChatController {
    store: ConversationStore,
    provider: Arc<dyn CompletionProvider>,
    overrides: RequestOverrides,
    active: Option<ActiveStream>,
}

impl ChatController {
    pub fn new(provider: Arc<dyn CompletionProvider>, overrides: RequestOverrides) -> Self {
        Self {
            store: ConversationStore::new(),
            provider,
            overrides,
            active: None,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    pub fn provider(&self) -> &Arc<dyn CompletionProvider> {
        &self.provider
    }

    /// Model requests are sent with: a non-blank override, else the
    /// provider default.
    pub fn model(&self) -> &str {
        self.overrides
            .model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn has_active_stream(&self) -> bool {
        self.active.is_some()
    }

    /// Starts a new exchange. Returns the id of the assistant turn that will
    /// receive the streamed answer.
    ///
    /// Must be called within a tokio runtime; the provider worker is spawned
    /// onto it.
    pub fn submit(&mut self, text: &str) -> ControllerResult<TurnId> {
        let text = text.trim();
        ensure!(!text.is_empty(), EmptyInputSnafu { stage: "submit" });

        let status = self.store.status();
        ensure!(
            status.accepts_submission() && self.active.is_none(),
            BusySnafu {
                stage: "submit",
                status,
            }
        );

        if !self.provider.has_credential() {
            return Err(CompletionError::MissingCredential { stage: "submit" })
                .context(NotConfiguredSnafu { stage: "submit" });
        }

        self.store.mark_sending();
        self.store.add_turn(Role::User, text);
        let history = self.request_history();
        let placeholder = self.store.add_streaming_turn(Role::Assistant, "");

        tracing::debug!(
            turn_id = %placeholder.id,
            model = self.model(),
            message_count = history.len(),
            "opening completion stream"
        );

        let handle = match self.provider.stream_chat(history, self.overrides.clone()) {
            Ok(handle) => handle,
            Err(error) => {
                self.store.fail_streaming(error.to_string());
                return Err(error).context(OpenStreamSnafu { stage: "submit" });
            }
        };

        self.active = Some(ActiveStream {
            turn_id: placeholder.id,
            stream: handle.stream,
            accumulated: String::new(),
            _worker: tokio::spawn(handle.worker),
        });

        Ok(placeholder.id)
    }

    /// Waits for the next event of the active stream. Returns `None` when no
    /// stream is active. A stream that closes without a terminal event is
    /// reported as an error event.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        let active = self.active.as_mut()?;
        match active.stream.recv().await {
            Some(event) => Some(event),
            None => Some(StreamEvent::Error(STREAM_CLOSED_MESSAGE.to_string())),
        }
    }

    /// Folds one stream event into the store. Events arriving with no active
    /// stream are dropped.
    pub fn apply_event(&mut self, event: StreamEvent) {
        let Some(active) = self.active.as_mut() else {
            tracing::debug!(?event, "dropping event without active stream");
            return;
        };

        match event {
            StreamEvent::Delta(delta) => {
                active.accumulated.push_str(&delta);
                let content = active.accumulated.clone();
                self.store.append_streamed_content(content);
            }
            StreamEvent::Done => {
                tracing::debug!(turn_id = %active.turn_id, "stream completed");
                self.active = None;
                self.store.end_streaming();
            }
            StreamEvent::Error(message) => {
                tracing::warn!(turn_id = %active.turn_id, error = %message, "stream failed");
                self.active = None;
                self.store.fail_streaming(message);
            }
        }
    }

    /// Receives and applies events until the active stream ends.
    pub async fn run_to_completion(&mut self) {
        while let Some(event) = self.next_event().await {
            self.apply_event(event);
        }
    }

    /// Stops the active stream. The assistant turn keeps what arrived so far
    /// and records the cancellation as its error.
    pub fn cancel(&mut self) -> bool {
        let Some(mut active) = self.active.take() else {
            return false;
        };

        active.stream.cancel();
        let message = CompletionError::Cancelled { stage: "cancel" }.to_string();
        tracing::debug!(turn_id = %active.turn_id, "stream cancelled by user");
        self.store.fail_streaming(message);
        true
    }

    pub fn reset(&mut self) {
        self.cancel();
        self.store.reset();
    }

    /// Called before the placeholder is added, so no turn is streaming yet.
    /// Turns left empty by a failed answer are not sent.
    fn request_history(&self) -> Vec<ChatMessage> {
        self.store
            .history()
            .into_iter()
            .filter(|(_, content)| !content.trim().is_empty())
            .map(|(role, content)| ChatMessage::new(wire_role(role), content))
            .collect()
    }
}

fn wire_role(role: Role) -> WireRole {
    match role {
        Role::System => WireRole::System,
        Role::User => WireRole::User,
        Role::Assistant => WireRole::Assistant,
    }
}
