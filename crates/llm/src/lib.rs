use std::sync::Arc;

mod model;
mod openrouter;
mod persona;
mod provider;
mod sse;

pub use model::{Model, ModelCatalog, ModelCatalogSource, ModelPricing, default_models};
pub use openrouter::{CompletionClient, OPENROUTER_PROVIDER_ID};
pub use persona::{SYSTEM_PROMPT, system_message, with_system_prompt};
pub use provider::{
    BoxFuture, ChatMessage, ClientConfig, CompletionError, CompletionEventStream,
    CompletionProvider, CompletionResult, CompletionStreamHandle, DEFAULT_APP_TITLE,
    DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_REFERER, DEFAULT_TEMPERATURE,
    RequestOverrides, Role, StreamEvent, StreamWorker, make_event_stream,
};
pub use sse::{EventLineDecoder, SseEvent, consume_event_stream, parse_event_line};

pub fn create_provider(config: ClientConfig) -> CompletionResult<Arc<dyn CompletionProvider>> {
    Ok(Arc::new(CompletionClient::new(config)?))
}

/// Lists the provider's models, falling back to a built-in list when the
/// provider cannot be reached or returns nothing.
pub async fn fetch_model_catalog(provider: &dyn CompletionProvider) -> ModelCatalog {
    match provider.fetch_models().await {
        Ok(models) if !models.is_empty() => ModelCatalog::from_provider_api(models),
        Ok(_) => ModelCatalog::from_static_fallback(
            default_models(),
            "provider returned an empty model list".to_string(),
        ),
        Err(error) => {
            tracing::warn!(provider = provider.id(), error = %error, "model list unavailable");
            ModelCatalog::from_static_fallback(default_models(), error.to_string())
        }
    }
}
