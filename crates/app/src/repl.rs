use std::io::Write;
use std::sync::Arc;

use colored::Colorize;
use ngmentor_llm::{ModelCatalogSource, fetch_model_catalog};
use snafu::ResultExt;
use tokio::io::{AsyncBufRead, Lines};

use crate::chat::{ChatController, HELP_TEXT, InputCommand, MessageInput, TranscriptView};
use crate::error::{AppResult, ReadInputSnafu, WriteOutputSnafu};
use crate::signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Interactive line loop around a [`ChatController`].
///
/// Input, stream events and Ctrl-C are multiplexed on one task, so `/stop`
/// works while an answer is still streaming. When input ends, the answer in
/// flight is shown to completion before the loop exits.
pub struct Repl<W> {
    controller: ChatController,
    view: TranscriptView,
    input: MessageInput,
    out: W,
}

impl<W: Write> Repl<W> {
    pub fn new(mut controller: ChatController, color: bool, out: W) -> Self {
        let view = TranscriptView::attach(controller.store_mut(), color);
        Self {
            controller,
            view,
            input: MessageInput::new(),
            out,
        }
    }

    pub fn controller(&self) -> &ChatController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ChatController {
        &mut self.controller
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub async fn run<R>(&mut self, lines: &mut Lines<R>) -> AppResult<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.banner()?;
        // Cleared at end of input; a running answer is still drained.
        let mut input_open = true;

        loop {
            self.render()?;
            let streaming = self.controller.has_active_stream();
            if !input_open && !streaming {
                break;
            }
            if input_open && !streaming {
                self.prompt()?;
            }

            tokio::select! {
                biased;
                _ = signal::interrupted() => {
                    if self.handle_interrupt()? == Flow::Quit {
                        break;
                    }
                }
                event = self.controller.next_event(), if streaming => {
                    if let Some(event) = event {
                        self.controller.apply_event(event);
                    }
                }
                line = lines.next_line(), if input_open => {
                    match line.context(ReadInputSnafu { stage: "read-line" })? {
                        Some(line) => {
                            if self.handle_line(&line).await? == Flow::Quit {
                                break;
                            }
                        }
                        None => input_open = false,
                    }
                }
            }
        }

        self.controller.cancel();
        self.render()?;
        Ok(())
    }

    /// Handles one line of input.
    pub async fn handle_line(&mut self, line: &str) -> AppResult<Flow> {
        let Some(command) = self.input.push_line(line) else {
            return Ok(Flow::Continue);
        };

        if self.controller.has_active_stream() && !command.allowed_while_streaming() {
            self.notice("still answering; /stop cancels the current response")?;
            return Ok(Flow::Continue);
        }

        match command {
            InputCommand::Submit(text) => {
                if let Err(error) = self.controller.submit(&text) {
                    self.failure(&error.to_string())?;
                }
            }
            InputCommand::Clear => self.controller.reset(),
            InputCommand::Stop => {
                if !self.controller.cancel() {
                    self.notice("nothing to stop")?;
                }
            }
            InputCommand::Models => self.show_models().await?,
            InputCommand::Status => self.show_status()?,
            InputCommand::Help => self.line(HELP_TEXT)?,
            InputCommand::Quit => return Ok(Flow::Quit),
            InputCommand::Unknown(name) => {
                self.failure(&format!("unknown command {name}; /help lists commands"))?;
            }
        }

        self.render()?;
        Ok(Flow::Continue)
    }

    /// Ctrl-C stops a running answer, otherwise ends the session.
    pub fn handle_interrupt(&mut self) -> AppResult<Flow> {
        self.input.clear();
        if self.controller.cancel() {
            return Ok(Flow::Continue);
        }
        self.line("")?;
        Ok(Flow::Quit)
    }

    pub fn render(&mut self) -> AppResult<()> {
        self.view
            .render(self.controller.store(), &mut self.out)
            .context(WriteOutputSnafu { stage: "render-transcript" })
    }

    fn banner(&mut self) -> AppResult<()> {
        let title = self.view.paint("ngmentor", |text| text.bright_magenta().bold());
        let model = self.controller.model().to_string();
        self.line(&format!("{title} · {model}"))?;
        self.notice("type a question, /help for commands")?;
        if !self.controller.provider().has_credential() {
            self.failure(
                "no API key configured; set NGMENTOR_API_KEY or add api_key to the settings file",
            )?;
        }
        self.line("")
    }

    fn prompt(&mut self) -> AppResult<()> {
        let marker = if self.input.is_continuing() { "… " } else { "› " };
        let marker = self.view.paint(marker, |text| text.green());
        write!(self.out, "{marker}")
            .and_then(|_| self.out.flush())
            .context(WriteOutputSnafu { stage: "write-prompt" })
    }

    async fn show_models(&mut self) -> AppResult<()> {
        let provider = Arc::clone(self.controller.provider());
        let catalog = fetch_model_catalog(provider.as_ref()).await;
        let current = self.controller.model().to_string();

        if catalog.source == ModelCatalogSource::StaticFallback {
            let warning = catalog.warning.as_deref().unwrap_or("model list unavailable");
            self.failure(&format!("{warning}; showing built-in models"))?;
        }

        for model in &catalog.models {
            let marker = if model.id == current { "*" } else { " " };
            let context = model
                .context_length
                .map(|length| format!(" ({length} tokens)"))
                .unwrap_or_default();
            let entry = if model.display_name() == model.id {
                format!("{marker} {}{context}", model.id)
            } else {
                format!("{marker} {}  {}{context}", model.id, model.display_name())
            };
            self.line(&entry)?;
        }
        Ok(())
    }

    fn show_status(&mut self) -> AppResult<()> {
        let store = self.controller.store();
        let status = format!(
            "status: {} · turns: {} · model: {} · provider: {} · key: {}",
            store.status().label(),
            store.turn_count(),
            self.controller.model(),
            self.controller.provider().id(),
            if self.controller.provider().has_credential() {
                "set"
            } else {
                "missing"
            },
        );
        self.notice(&status)
    }

    fn line(&mut self, text: &str) -> AppResult<()> {
        writeln!(self.out, "{text}").context(WriteOutputSnafu { stage: "write-line" })
    }

    fn notice(&mut self, text: &str) -> AppResult<()> {
        let text = self.view.paint(text, |text| text.bright_black());
        self.line(&text)
    }

    fn failure(&mut self, text: &str) -> AppResult<()> {
        let text = self.view.paint(text, |text| text.red());
        self.line(&text)
    }
}
