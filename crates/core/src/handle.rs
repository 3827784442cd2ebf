use std::fmt::Display;

use tickerbot_model::{
    ModelMessage, ModelProvider, ModelRequest, ResponseFormat,
};

use crate::model_client::ModelClient;

/// Returned by [`ModelHandle::ask`] when the backend could not be set up.
pub const INIT_FAILED_MESSAGE: &str = "Error: Model initialization failed.";

const DEFAULT_SYSTEM_PROMPT: &str =
    "Analyze the text and provide a clear summary in valid JSON format.";

/// How the model is addressed and what its answers should look like.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSettings {
    /// Name of the model on the backend, e.g. `llama3.2`.
    pub model: String,
    /// The requested answer format.
    pub format: ResponseFormat,
    /// Reject answers that do not match `format`.
    pub strict: bool,
    /// Instructions sent ahead of every prompt.
    pub system_prompt: Option<String>,
}

impl ModelSettings {
    /// Settings for the given model: strict JSON answers and the default
    /// summarizing system prompt.
    pub fn new<S: Into<String>>(model: S) -> Self {
        Self {
            model: model.into(),
            format: ResponseFormat::Json,
            strict: true,
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_owned()),
        }
    }
}

/// A prompt-level handle on the language model.
///
/// Setting up the handle never fails. If the backend cannot be
/// constructed the failure is logged and the handle stays disabled, every
/// [`ask`](ModelHandle::ask) then answers with [`INIT_FAILED_MESSAGE`].
pub struct ModelHandle {
    settings: ModelSettings,
    client: Option<ModelClient>,
}

impl ModelHandle {
    /// Validates the settings and builds the backend with `connect`.
    pub fn initialize<P, E, F>(settings: ModelSettings, connect: F) -> Self
    where
        P: ModelProvider + 'static,
        E: Display,
        F: FnOnce(&ModelSettings) -> Result<P, E>,
    {
        if settings.model.trim().is_empty() {
            error!("Error initializing the model: Invalid model name provided.");
            return Self::disabled(settings);
        }

        match connect(&settings) {
            Ok(provider) => {
                debug!("model backend ready for `{}`", settings.model);
                Self {
                    settings,
                    client: Some(ModelClient::new(provider)),
                }
            }
            Err(err) => {
                error!("Error initializing the model: {err}");
                Self::disabled(settings)
            }
        }
    }

    /// Creates a handle without a backend.
    #[inline]
    pub fn disabled(settings: ModelSettings) -> Self {
        Self {
            settings,
            client: None,
        }
    }

    /// Returns `true` if a backend is available.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    /// Returns the underlying client, for building an agent on the same
    /// backend.
    #[inline]
    pub fn client(&self) -> Option<&ModelClient> {
        self.client.as_ref()
    }

    /// Sends one prompt and returns the answer text.
    ///
    /// Failures never escape: they are logged and described in the
    /// returned text instead.
    pub async fn ask(&self, prompt: &str) -> String {
        let Some(client) = &self.client else {
            return INIT_FAILED_MESSAGE.to_owned();
        };

        let mut messages = Vec::with_capacity(2);
        if let Some(system_prompt) = &self.settings.system_prompt {
            messages.push(ModelMessage::System(system_prompt.clone()));
        }
        messages.push(ModelMessage::User(prompt.to_owned()));
        let request = ModelRequest {
            messages,
            tools: vec![],
            format: self.settings.format,
        };

        let resp = match client.send_request(request).await {
            Ok(resp) => resp,
            Err(err) => {
                error!("Error invoking the model: {err}");
                return format!("Error retrieving response: {err}");
            }
        };

        if self.settings.strict && self.settings.format == ResponseFormat::Json
        {
            if let Err(err) =
                serde_json::from_str::<serde_json::Value>(&resp.transcript)
            {
                error!("Error invoking the model: invalid JSON answer: {err}");
                return format!(
                    "Error retrieving response: model returned invalid JSON: {err}"
                );
            }
        }
        resp.transcript
    }
}

#[cfg(test)]
mod tests {
    use tickerbot_model::ErrorKind;
    use tickerbot_test_model::{PresetResponse, TestModelProvider};

    use super::*;

    fn handle_with(provider: &TestModelProvider) -> ModelHandle {
        let provider = provider.clone();
        ModelHandle::initialize(ModelSettings::new("llama3.2"), move |_| {
            Ok::<_, String>(provider)
        })
    }

    #[tokio::test]
    async fn test_ask() {
        let provider = TestModelProvider::default();
        provider.add_response(PresetResponse::text("{\"summary\": \"ok\"}"));

        let handle = handle_with(&provider);
        assert!(handle.is_ready());
        let answer = handle.ask("Summarize this").await;
        assert_eq!(answer, "{\"summary\": \"ok\"}");

        let requests = provider.requests();
        assert_eq!(requests[0].format, ResponseFormat::Json);
        assert_eq!(
            requests[0].messages,
            vec![
                ModelMessage::System(DEFAULT_SYSTEM_PROMPT.to_owned()),
                ModelMessage::User("Summarize this".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_initialization() {
        let handle = ModelHandle::initialize(
            ModelSettings::new("llama3.2"),
            |_| -> Result<TestModelProvider, _> { Err("no route to host") },
        );
        assert!(!handle.is_ready());
        assert_eq!(handle.ask("Hi").await, INIT_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn test_empty_model_name() {
        // The backend would answer if it were ever reached.
        let provider = TestModelProvider::default();
        provider.add_response(PresetResponse::text("{}"));

        let backend = provider.clone();
        let handle = ModelHandle::initialize(ModelSettings::new("  "), |_| {
            Ok::<_, String>(backend)
        });
        assert!(!handle.is_ready());
        assert!(handle.client().is_none());
        assert_eq!(handle.ask("Hi").await, INIT_FAILED_MESSAGE);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_backend_error() {
        let provider = TestModelProvider::default();
        provider.add_failure("connection refused", ErrorKind::Unreachable);

        let handle = handle_with(&provider);
        let answer = handle.ask("Hi").await;
        assert!(answer.starts_with("Error retrieving response: "));
        assert!(answer.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_strict_json() {
        let provider = TestModelProvider::default();
        provider.add_response(PresetResponse::text("not json"));
        provider.add_response(PresetResponse::text("not json"));

        let handle = handle_with(&provider);
        let answer = handle.ask("Hi").await;
        assert!(answer.contains("model returned invalid JSON"));

        let mut settings = ModelSettings::new("llama3.2");
        settings.strict = false;
        let lenient = provider.clone();
        let handle = ModelHandle::initialize(settings, move |_| {
            Ok::<_, String>(lenient)
        });
        assert_eq!(handle.ask("Hi").await, "not json");
    }
}
