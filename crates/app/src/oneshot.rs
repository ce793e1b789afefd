use std::future::Future;
use std::io::Write;

use ngmentor_llm::{ChatMessage, CompletionClient, RequestOverrides};
use snafu::ResultExt;

use crate::error::{AppResult, CompletionSnafu, WriteOutputSnafu};

/// Streams the answer to a single question straight to `out`.
///
/// Resolving `cancel` aborts the request; that, like any other failure, is
/// returned as [`crate::error::AppError::Completion`].
pub async fn ask_once(
    client: &CompletionClient,
    question: &str,
    overrides: &RequestOverrides,
    out: &mut impl Write,
    cancel: impl Future<Output = ()>,
) -> AppResult<()> {
    let history = [ChatMessage::user(question)];
    let mut failure = None;
    let mut write_error = None;
    let mut received = 0_usize;

    client
        .stream_completion_until(
            &history,
            |chunk| {
                received += chunk.len();
                if write_error.is_some() {
                    return;
                }
                if let Err(error) = write!(out, "{chunk}").and_then(|_| out.flush()) {
                    write_error = Some(error);
                }
            },
            || tracing::debug!("one-shot answer complete"),
            |message| failure = Some(message),
            Some(overrides),
            cancel,
        )
        .await;

    if let Some(error) = write_error {
        return Err(error).context(WriteOutputSnafu {
            stage: "write-answer",
        });
    }
    if received > 0 {
        writeln!(out).context(WriteOutputSnafu {
            stage: "finish-answer",
        })?;
    }

    match failure {
        Some(message) => CompletionSnafu {
            stage: "ask-once",
            message,
        }
        .fail(),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use ngmentor_llm::ClientConfig;

    use super::*;
    use crate::error::AppError;

    #[tokio::test]
    async fn missing_key_fails_without_output() {
        let client = CompletionClient::new(ClientConfig::default()).unwrap();
        let mut out = Vec::new();

        let error = ask_once(
            &client,
            "what is a signal?",
            &RequestOverrides::default(),
            &mut out,
            std::future::pending(),
        )
        .await
        .unwrap_err();

        assert!(matches!(error, AppError::Completion { .. }));
        assert!(error.to_string().starts_with("API key is required"));
        assert!(out.is_empty());
    }
}
