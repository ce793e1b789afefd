use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use ngmentor_llm::{
    ClientConfig, DEFAULT_APP_TITLE, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    DEFAULT_REFERER, DEFAULT_TEMPERATURE,
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};

pub const SETTINGS_DIRECTORY_NAME: &str = "ngmentor";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "NGMENTOR_";

/// Startup configuration, layered from built-in defaults, the settings file
/// and `NGMENTOR_*` environment variables, in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default = "default_app_title")]
    pub app_title: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_endpoint(),
            model: default_model(),
            referer: default_referer(),
            app_title: default_app_title(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Settings {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".ngmentor"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Loads settings from `explicit_path`, or from the default location when
    /// none is given.
    ///
    /// A missing default file is fine; a missing explicit file is an error. A
    /// file that fails to parse is skipped with a warning and the remaining
    /// layers still apply.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, SettingsError> {
        let path = match explicit_path {
            Some(path) => {
                ensure!(
                    path.exists(),
                    ConfigNotFoundSnafu {
                        stage: "locate-settings-file",
                        path: path.to_path_buf(),
                    }
                );
                path.to_path_buf()
            }
            None => Self::default_config_path(),
        };

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "settings file not found, using defaults");
            return Self::extract(Self::base_figment()).map(Self::normalized);
        }

        let layered = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX));

        match Self::extract(layered) {
            Ok(settings) => Ok(settings.normalized()),
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "failed to parse settings file, ignoring it"
                );
                Self::extract(Self::base_figment()).map(Self::normalized)
            }
        }
    }

    fn base_figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default())).merge(Env::prefixed(ENV_PREFIX))
    }

    fn extract(figment: Figment) -> Result<Self, SettingsError> {
        figment.extract::<Settings>().context(ExtractSnafu {
            stage: "extract-settings",
        })
    }

    pub fn normalized(mut self) -> Self {
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = non_blank_or(self.endpoint, default_endpoint);
        self.model = non_blank_or(self.model, default_model);
        self.referer = non_blank_or(self.referer, default_referer);
        self.app_title = non_blank_or(self.app_title, default_app_title);
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            self.temperature = default_temperature();
        }
        if self.max_tokens == 0 {
            self.max_tokens = default_max_tokens();
        }
        self
    }

    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn to_client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(&self.api_key)
            .with_base_url(&self.endpoint)
            .with_default_model(&self.model);
        config.referer = self.referer.clone();
        config.app_title = self.app_title.clone();
        config.temperature = self.temperature;
        config.max_tokens = self.max_tokens;
        config
    }

    /// Pretty JSON of the effective settings with the key masked.
    pub fn to_redacted_json(&self) -> Result<String, SettingsError> {
        let mut redacted = self.clone();
        if redacted.has_credential() {
            redacted.api_key = mask_key(&redacted.api_key);
        }
        serde_json::to_string_pretty(&redacted).context(SerializeSnafu {
            stage: "serialize-settings-json",
        })
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("settings file {path:?} does not exist"))]
    ConfigNotFound { stage: &'static str, path: PathBuf },
    #[snafu(display("invalid settings on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        #[snafu(source(from(figment::Error, Box::new)))]
        source: Box<figment::Error>,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    Serialize {
        stage: &'static str,
        source: serde_json::Error,
    },
}

fn mask_key(key: &str) -> String {
    let visible = key.chars().rev().take(4).collect::<Vec<_>>();
    let tail = visible.into_iter().rev().collect::<String>();
    format!("****{tail}")
}

fn non_blank_or(value: String, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_endpoint() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_referer() -> String {
    DEFAULT_REFERER.to_string()
}

fn default_app_title() -> String {
    DEFAULT_APP_TITLE.to_string()
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u64 {
    DEFAULT_MAX_TOKENS
}
