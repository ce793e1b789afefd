use std::path::PathBuf;

use clap::Parser;
use ngmentor_llm::RequestOverrides;

/// Terminal chat with an Angular mentor backed by an OpenRouter model.
#[derive(Debug, Parser)]
#[command(name = "ngmentor", version)]
#[command(about = "Chat with an Angular mentor over the OpenRouter API", long_about = None)]
pub struct Cli {
    /// Ask a single question, stream the answer and exit.
    pub prompt: Vec<String>,

    /// Settings file to use instead of the default location.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Model id for this session, e.g. `openai/gpt-4o-mini`.
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub temperature: Option<f64>,

    #[arg(long, value_name = "N")]
    pub max_tokens: Option<u64>,

    /// Disable colored output.
    #[arg(long)]
    pub no_color: bool,

    /// Print the effective settings (key masked) and exit.
    #[arg(long)]
    pub show_settings: bool,
}

impl Cli {
    /// The one-shot question, if any words were given.
    pub fn one_shot_prompt(&self) -> Option<String> {
        let prompt = self.prompt.join(" ");
        let prompt = prompt.trim();
        (!prompt.is_empty()).then(|| prompt.to_string())
    }

    pub fn overrides(&self) -> RequestOverrides {
        RequestOverrides {
            model: self
                .model
                .as_deref()
                .map(str::trim)
                .filter(|model| !model.is_empty())
                .map(str::to_string),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}
