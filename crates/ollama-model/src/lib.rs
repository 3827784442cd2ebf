//! A model provider for a local [Ollama](https://ollama.com) server.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use reqwest::{Client, StatusCode, header};
use tickerbot_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};

pub use config::{
    ConfigError, DEFAULT_BASE_URL, OllamaConfig, OllamaConfigBuilder,
};
use io::{Chunks, JsonLines};
use proto::ErrorBody;
pub use response::OllamaResponse;

/// Error type for [`OllamaProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::new(format!("{err}"), ErrorKind::Other)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_connect() {
            ErrorKind::Unreachable
        } else if err.is_decode() {
            ErrorKind::InvalidResponse
        } else {
            ErrorKind::Other
        };
        Error::new(format!("{err}"), kind)
    }
}

/// Ollama chat model provider.
#[derive(Clone, Debug)]
pub struct OllamaProvider {
    client: Client,
    config: Arc<OllamaConfig>,
}

impl OllamaProvider {
    /// Creates a new `OllamaProvider` with the given configuration.
    ///
    /// No request is made to the server here, an unreachable server only
    /// shows up when the first request is sent.
    pub fn new(config: OllamaConfig) -> Result<Self, Error> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }
}

impl ModelProvider for OllamaProvider {
    type Error = Error;
    type Response = OllamaResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let chat_req = proto::create_request(req, &self.config);
        let model = self.config.model.clone();
        let resp_fut = self
            .client
            .post(format!("{}{}", self.config.base_url, "/api/chat"))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&chat_req)
            .send();

        async move {
            let resp = resp_fut.await?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ErrorBody>(&body)
                    .map(|body| body.error)
                    .unwrap_or(body);
                let kind = if status == StatusCode::NOT_FOUND {
                    ErrorKind::ModelNotFound
                } else {
                    ErrorKind::Other
                };
                warn!("chat request for `{model}` failed with {status}");
                return Err(Error::new(format!("{status}: {message}"), kind));
            }

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_valid_content_type = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| {
                    matches!(m.subtype().as_str(), "x-ndjson" | "json")
                })
                .unwrap_or(false);
            if !is_valid_content_type {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::InvalidResponse,
                ));
            }

            let lines = JsonLines::new(Chunks::from_response(resp));
            Ok(OllamaResponse::from_lines(lines))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use tickerbot_model::{
        ModelFinishReason, ModelMessage, ModelResponse, ModelResponseEvent,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    /// Serves the same canned answer to every connection.
    async fn serve(
        status: &'static str,
        content_type: &'static str,
        body: &'static str,
    ) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                read_request(&mut socket).await;
                let resp = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(resp.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        format!("http://{addr}")
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buf: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let count = socket.read(&mut chunk).await.unwrap();
            if count == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..count]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n")
            else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return;
            }
        }
    }

    fn provider(base_url: &str) -> OllamaProvider {
        let config = OllamaConfigBuilder::with_model("llama3.2")
            .with_base_url(base_url)
            .build()
            .unwrap();
        OllamaProvider::new(config).unwrap()
    }

    fn request() -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User("AAPL?".to_owned())],
            ..Default::default()
        }
    }

    async fn expect_error(base_url: &str) -> Error {
        let Err(err) = provider(base_url).send_request(&request()).await
        else {
            panic!("request should fail");
        };
        err
    }

    #[tokio::test]
    async fn test_streamed_answer() {
        let base_url = serve(
            "200 OK",
            "application/x-ndjson",
            include_str!("../fixtures/chat_text.ndjson"),
        )
        .await;
        let Ok(resp) = provider(&base_url).send_request(&request()).await
        else {
            panic!("request should succeed");
        };

        let mut resp = pin!(resp);
        let mut transcript = String::new();
        let mut finish_reason = None;
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await.unwrap()
        {
            match event {
                ModelResponseEvent::MessageDelta(delta) => {
                    transcript.push_str(&delta)
                }
                ModelResponseEvent::Completed(reason) => {
                    finish_reason = Some(reason)
                }
                ModelResponseEvent::ToolCall(call) => {
                    panic!("unexpected tool call: {call:?}")
                }
            }
        }
        assert_eq!(transcript, "{\"ticker\": \"AAPL\"}");
        assert_eq!(finish_reason, Some(ModelFinishReason::Stop));
    }

    #[tokio::test]
    async fn test_model_not_found() {
        let base_url = serve(
            "404 Not Found",
            "application/json",
            r#"{"error":"model \"llama3.2\" not found, try pulling it first"}"#,
        )
        .await;
        let err = expect_error(&base_url).await;
        assert_eq!(err.kind(), ErrorKind::ModelNotFound);
        assert_eq!(
            err.message(),
            "404 Not Found: model \"llama3.2\" not found, try pulling it first"
        );
    }

    #[tokio::test]
    async fn test_server_error() {
        let base_url = serve(
            "500 Internal Server Error",
            "application/json",
            r#"{"error":"out of memory"}"#,
        )
        .await;
        let err = expect_error(&base_url).await;
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(err.message(), "500 Internal Server Error: out of memory");

        // A body that is not an error document is passed through.
        let base_url =
            serve("502 Bad Gateway", "text/plain", "upstream down").await;
        let err = expect_error(&base_url).await;
        assert_eq!(err.message(), "502 Bad Gateway: upstream down");
    }

    #[tokio::test]
    async fn test_unexpected_content_type() {
        let base_url =
            serve("200 OK", "text/html", "<html>Ollama is running</html>")
                .await;
        let err = expect_error(&base_url).await;
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }

    #[tokio::test]
    async fn test_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = expect_error(&format!("http://{addr}")).await;
        assert_eq!(err.kind(), ErrorKind::Unreachable);
    }
}
