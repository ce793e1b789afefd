use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

use super::model::Model;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4.5";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u64 = 1024;
pub const DEFAULT_REFERER: &str = "http://localhost";
pub const DEFAULT_APP_TITLE: &str = "ngmentor";

/// Process-wide client configuration, read once at startup.
///
/// An empty `api_key` is a valid state: the client can be built, but every
/// request is refused with [`CompletionError::MissingCredential`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
    pub referer: String,
    pub app_title: String,
    pub temperature: f64,
    pub max_tokens: u64,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into().trim().to_string(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim().trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into().trim().to_string();
        self
    }

    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            app_title: DEFAULT_APP_TITLE.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Wire-level speaker role, kept separate from the conversation store's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Optional per-call overrides; unset fields fall back to [`ClientConfig`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOverrides {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

impl RequestOverrides {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// One event of a streamed completion.
///
/// A stream yields any number of `Delta` events followed by exactly one
/// terminal `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    Done,
    Error(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delta(_))
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type StreamWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type CompletionResult<T> = Result<T, CompletionError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompletionError {
    #[snafu(display(
        "API key is required. Set NGMENTOR_API_KEY or add api_key to the settings file."
    ))]
    MissingCredential { stage: &'static str },
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("{source}"))]
    SendRequest {
        stage: &'static str,
        source: reqwest::Error,
    },
    /// Non-success status; `message` is the provider's own error text when the
    /// body carried one.
    #[snafu(display("{message}"))]
    HttpStatus {
        stage: &'static str,
        status: u16,
        message: String,
    },
    #[snafu(display("{message}"))]
    ReadBody {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("failed to parse model list on `{stage}`: {source}"))]
    ModelPayloadParse {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request cancelled"))]
    Cancelled { stage: &'static str },
}

impl CompletionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Receiving half of a streamed completion.
///
/// Dropping it signals cancellation to the worker.
pub struct CompletionEventStream {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

pub struct CompletionStreamHandle {
    pub stream: CompletionEventStream,
    pub worker: StreamWorker,
}

impl CompletionEventStream {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<StreamEvent>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Asks the worker to abort the connection. Returns false if the worker
    /// already finished or cancellation was requested before.
    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for CompletionEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// The seam between the chat front end and a completion backend.
pub trait CompletionProvider: Send + Sync {
    fn id(&self) -> &str;
    fn default_model(&self) -> &str;
    fn has_credential(&self) -> bool;
    fn fetch_models<'a>(&'a self) -> BoxFuture<'a, CompletionResult<Vec<Model>>>;
    fn stream_chat(
        &self,
        history: Vec<ChatMessage>,
        overrides: RequestOverrides,
    ) -> CompletionResult<CompletionStreamHandle>;
}

/// Builds the channel pair behind a [`CompletionEventStream`].
///
/// Public so alternative providers (and tests) can produce handles that behave
/// like the HTTP client's.
pub fn make_event_stream() -> (
    mpsc::UnboundedSender<StreamEvent>,
    CompletionEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        CompletionEventStream::new(event_rx, cancel_tx),
        cancel_rx,
    )
}
