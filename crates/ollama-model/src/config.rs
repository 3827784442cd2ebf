use std::fmt::{self, Display};

use reqwest::Url;

/// The address a stock Ollama installation listens on.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Builder for [`OllamaConfig`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OllamaConfigBuilder {
    model: String,
    base_url: Option<String>,
}

impl OllamaConfigBuilder {
    /// Creates a builder for the given model, e.g. `llama3.2`.
    #[inline]
    pub fn with_model<S: Into<String>>(model: S) -> Self {
        Self {
            model: model.into(),
            base_url: None,
        }
    }

    /// Sets a custom server address.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<OllamaConfig, ConfigError> {
        let model = self.model.trim();
        if model.is_empty() {
            return Err(ConfigError::EmptyModelName);
        }

        let base_url = self
            .base_url
            .as_deref()
            .map(str::trim)
            .unwrap_or(DEFAULT_BASE_URL);
        // `OLLAMA_HOST` is usually written as `host:port`.
        let base_url = if base_url.contains("://") {
            base_url.to_owned()
        } else {
            format!("http://{base_url}")
        };
        let url = Url::parse(&base_url).map_err(|err| {
            ConfigError::InvalidBaseUrl(format!("{base_url}: {err}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl(format!(
                "{base_url}: unsupported scheme `{}`",
                url.scheme()
            )));
        }

        Ok(OllamaConfig {
            model: model.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }
}

/// Configuration for the Ollama provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OllamaConfig {
    pub(crate) model: String,
    pub(crate) base_url: String,
}

impl OllamaConfig {
    /// Returns the model name.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the server address, without a trailing slash.
    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Error returned by [`OllamaConfigBuilder::build`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The model name is empty or only whitespace.
    EmptyModelName,
    /// The server address is not an http(s) URL.
    InvalidBaseUrl(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyModelName => {
                write!(f, "Invalid model name provided.")
            }
            ConfigError::InvalidBaseUrl(reason) => {
                write!(f, "Invalid server address: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
