#![deny(unsafe_code)]

//! Terminal front end for the Angular mentor chat.

use std::io::{IsTerminal, Write};
use std::sync::Arc;

use ngmentor_llm::CompletionClient;
use snafu::ResultExt;
use tokio::io::{AsyncBufReadExt, BufReader};

pub mod chat;
pub mod cli;
pub mod error;
pub mod oneshot;
pub mod repl;
pub mod signal;
/// Layered startup configuration.
pub mod settings;

use chat::ChatController;
use cli::Cli;
use error::{AppResult, CreateClientSnafu, LoadSettingsSnafu, WriteOutputSnafu};
use repl::Repl;
use settings::Settings;

pub async fn run(cli: Cli) -> AppResult<()> {
    let color = !cli.no_color && std::io::stdout().is_terminal();
    if !color {
        colored::control::set_override(false);
    }

    let settings = Settings::load(cli.config.as_deref()).context(LoadSettingsSnafu {
        stage: "load-settings",
    })?;

    if cli.show_settings {
        let json = settings.to_redacted_json().context(LoadSettingsSnafu {
            stage: "show-settings",
        })?;
        println!("{json}");
        return Ok(());
    }

    if !settings.has_credential() {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(Settings::default_config_path);
        tracing::warn!(
            path = %path.display(),
            "no API key configured; set NGMENTOR_API_KEY or add api_key to the settings file"
        );
    }

    let overrides = cli.overrides();
    let client = CompletionClient::new(settings.to_client_config()).context(CreateClientSnafu {
        stage: "create-client",
    })?;

    if let Some(question) = cli.one_shot_prompt() {
        let mut stdout = std::io::stdout();
        return oneshot::ask_once(
            &client,
            &question,
            &overrides,
            &mut stdout,
            signal::interrupted(),
        )
        .await;
    }

    let controller = ChatController::new(Arc::new(client), overrides);
    let mut repl = Repl::new(controller, color, std::io::stdout());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    repl.run(&mut lines).await?;

    std::io::stdout()
        .flush()
        .context(WriteOutputSnafu { stage: "flush-stdout" })
}
