use std::future::Future;

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use super::model::{Model, ModelListResponse};
use super::persona::with_system_prompt;
use super::provider::{
    BoxFuture, BuildHttpClientSnafu, CancelledSnafu, ChatMessage, ClientConfig,
    CompletionError, CompletionProvider, CompletionResult, CompletionStreamHandle,
    MissingCredentialSnafu, ModelPayloadParseSnafu, RequestOverrides, SendRequestSnafu,
    StreamEvent, StreamWorker, make_event_stream,
};
use super::sse::consume_event_stream;

pub const OPENROUTER_PROVIDER_ID: &str = "openrouter";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub temperature: f64,
    pub max_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Maps a non-success response to an error, preferring the provider's own
/// `error.message` over the generic status line.
pub(crate) fn status_error(
    stage: &'static str,
    status: reqwest::StatusCode,
    body: &str,
) -> CompletionError {
    let message = serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|error| error.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown Status")
            )
        });

    CompletionError::HttpStatus {
        stage,
        status: status.as_u16(),
        message,
    }
}

/// Streaming client for an OpenRouter-compatible `/chat/completions` API.
///
/// Concurrent streams on one conversation are the caller's problem: the client
/// itself is stateless and will happily run two requests side by side.
#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl CompletionClient {
    pub fn new(config: ClientConfig) -> CompletionResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context(BuildHttpClientSnafu {
                stage: "build-client",
            })?;

        if !config.has_credential() {
            tracing::warn!(
                base_url = %config.base_url,
                "no API key configured; completion requests will be refused"
            );
        }

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn has_credential(&self) -> bool {
        self.config.has_credential()
    }

    fn build_request(
        &self,
        history: &[ChatMessage],
        overrides: &RequestOverrides,
    ) -> CompletionRequest {
        let model = overrides
            .model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(&self.config.default_model)
            .to_string();

        CompletionRequest {
            model,
            messages: with_system_prompt(history),
            stream: true,
            temperature: overrides.temperature.unwrap_or(self.config.temperature),
            max_tokens: overrides.max_tokens.unwrap_or(self.config.max_tokens),
        }
    }

    /// Streams one completion, reporting through callbacks.
    ///
    /// `on_chunk` receives each new fragment. Exactly one of `on_complete` and
    /// `on_error` runs, once. Without a credential `on_error` runs before any
    /// network activity.
    pub async fn stream_completion<C, D, E>(
        &self,
        history: &[ChatMessage],
        on_chunk: C,
        on_complete: D,
        on_error: E,
        overrides: Option<&RequestOverrides>,
    ) where
        C: FnMut(&str),
        D: FnOnce(),
        E: FnOnce(String),
    {
        self.stream_completion_until(
            history,
            on_chunk,
            on_complete,
            on_error,
            overrides,
            std::future::pending(),
        )
        .await
    }

    /// Like [`Self::stream_completion`], but aborts the connection when
    /// `cancel` resolves first; that ending is reported through `on_error`.
    pub async fn stream_completion_until<C, D, E, X>(
        &self,
        history: &[ChatMessage],
        mut on_chunk: C,
        on_complete: D,
        on_error: E,
        overrides: Option<&RequestOverrides>,
        cancel: X,
    ) where
        C: FnMut(&str),
        D: FnOnce(),
        E: FnOnce(String),
        X: Future<Output = ()>,
    {
        if !self.has_credential() {
            on_error(
                CompletionError::MissingCredential {
                    stage: "stream-completion",
                }
                .to_string(),
            );
            return;
        }

        let overrides = overrides.cloned().unwrap_or_default();
        let request = self.build_request(history, &overrides);
        let mut forward = |text: String| on_chunk(&text);

        match Self::run_until_cancelled(&self.http, &self.config, &request, &mut forward, cancel)
            .await
        {
            Ok(()) => on_complete(),
            Err(error) => on_error(error.to_string()),
        }
    }

    async fn send(
        http: &reqwest::Client,
        config: &ClientConfig,
        request: &CompletionRequest,
    ) -> CompletionResult<reqwest::Response> {
        let url = format!("{}/chat/completions", config.base_url);
        tracing::debug!(
            model = %request.model,
            message_count = request.messages.len(),
            "sending completion request"
        );

        let response = http
            .post(&url)
            .bearer_auth(&config.api_key)
            .header("HTTP-Referer", &config.referer)
            .header("X-Title", &config.app_title)
            .json(request)
            .send()
            .await
            .context(SendRequestSnafu {
                stage: "send-completion-request",
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                model = %request.model,
                "completion request rejected"
            );
            return Err(status_error("completion-http-status", status, &body));
        }

        Ok(response)
    }

    async fn run_until_cancelled<F, X>(
        http: &reqwest::Client,
        config: &ClientConfig,
        request: &CompletionRequest,
        on_delta: &mut F,
        cancel: X,
    ) -> CompletionResult<()>
    where
        F: FnMut(String),
        X: Future<Output = ()>,
    {
        let drive = async {
            let response = Self::send(http, config, request).await?;
            consume_event_stream(response.bytes_stream(), on_delta).await
        };

        tokio::select! {
            biased;
            _ = cancel => CancelledSnafu { stage: "await-stream" }.fail(),
            result = drive => result,
        }
    }

    async fn run_stream_worker(
        http: reqwest::Client,
        config: ClientConfig,
        request: CompletionRequest,
        event_tx: mpsc::UnboundedSender<StreamEvent>,
        cancel_rx: oneshot::Receiver<()>,
    ) {
        let mut forward = |text: String| {
            let _ = event_tx.send(StreamEvent::Delta(text));
        };
        // The sender side fires on explicit cancel and on drop of the stream.
        let cancelled = async {
            let _ = cancel_rx.await;
        };

        let result =
            Self::run_until_cancelled(&http, &config, &request, &mut forward, cancelled).await;

        let terminal = match result {
            Ok(()) => {
                tracing::debug!(model = %request.model, "completion stream finished");
                StreamEvent::Done
            }
            Err(error) => {
                if error.is_cancelled() {
                    tracing::debug!(model = %request.model, "completion stream cancelled");
                } else {
                    tracing::warn!(model = %request.model, error = %error, "completion stream failed");
                }
                StreamEvent::Error(error.to_string())
            }
        };

        let _ = event_tx.send(terminal);
    }

    async fn fetch_models_from_provider(&self) -> CompletionResult<Vec<Model>> {
        ensure!(
            self.has_credential(),
            MissingCredentialSnafu {
                stage: "fetch-models",
            }
        );

        let response = self
            .http
            .get(format!("{}/models", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .context(SendRequestSnafu {
                stage: "send-model-request",
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("model-http-status", status, &body));
        }

        let payload: ModelListResponse = response.json().await.context(ModelPayloadParseSnafu {
            stage: "parse-model-response",
        })?;

        Ok(payload.data)
    }
}

impl CompletionProvider for CompletionClient {
    fn id(&self) -> &str {
        OPENROUTER_PROVIDER_ID
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    fn has_credential(&self) -> bool {
        self.config.has_credential()
    }

    fn fetch_models<'a>(&'a self) -> BoxFuture<'a, CompletionResult<Vec<Model>>> {
        Box::pin(self.fetch_models_from_provider())
    }

    fn stream_chat(
        &self,
        history: Vec<ChatMessage>,
        overrides: RequestOverrides,
    ) -> CompletionResult<CompletionStreamHandle> {
        ensure!(
            self.has_credential(),
            MissingCredentialSnafu {
                stage: "stream-chat",
            }
        );

        let request = self.build_request(&history, &overrides);
        let (event_tx, stream, cancel_rx) = make_event_stream();
        let worker: StreamWorker = Box::pin(Self::run_stream_worker(
            self.http.clone(),
            self.config.clone(),
            request,
            event_tx,
            cancel_rx,
        ));

        Ok(CompletionStreamHandle { stream, worker })
    }
}
