//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tickerbot_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: VecDeque<ModelResponseEvent>,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if this.events.is_empty() {
            return Poll::Ready(Ok(None));
        }

        let delay = this.delay;
        let sleep = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        Poll::Ready(Ok(this.events.pop_front()))
    }
}

#[derive(Clone)]
enum ScriptStep {
    Respond(PresetResponse),
    Fail(String, ErrorKind),
}

#[derive(Default)]
struct Script {
    steps: VecDeque<ScriptStep>,
    requests: Vec<ModelRequest>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to set up the script, which is how the
/// model should respond to each request, in order. Every request consumes
/// one step. If the script has run out of steps, an error is returned.
///
/// Clones share the same script, so a test can keep one clone around to
/// inspect the recorded requests after handing the provider out.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_response(&self, preset: PresetResponse) {
        self.lock().steps.push_back(ScriptStep::Respond(preset));
    }

    #[inline]
    pub fn add_failure<S: Into<String>>(&self, message: S, kind: ErrorKind) {
        self.lock()
            .steps
            .push_back(ScriptStep::Fail(message.into(), kind));
    }

    /// Makes every response wait this long before each of its events.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far.
    #[inline]
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().expect("test script lock poisoned")
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let mut script = self.lock();
        script.requests.push(req.clone());
        let result = match script.steps.pop_front() {
            None => Err(Error {
                message: "no enough steps".to_owned(),
                kind: ErrorKind::Other,
            }),
            Some(ScriptStep::Fail(message, kind)) => Err(Error { message, kind }),
            Some(ScriptStep::Respond(preset)) => {
                let has_tool_call = preset
                    .events
                    .iter()
                    .any(|event| matches!(event, PresetEvent::ToolCall(_)));
                let mut events: VecDeque<_> = preset
                    .events
                    .into_iter()
                    .map(|event| match event {
                        PresetEvent::MessageDelta(msg) => {
                            ModelResponseEvent::MessageDelta(msg)
                        }
                        PresetEvent::ToolCall(req) => {
                            ModelResponseEvent::ToolCall(req)
                        }
                    })
                    .collect();
                events.push_back(ModelResponseEvent::Completed(
                    if has_tool_call {
                        ModelFinishReason::ToolCalls
                    } else {
                        ModelFinishReason::Stop
                    },
                ));
                Ok(TestModelResponse {
                    events,
                    delay: self.delay.unwrap_or(Duration::from_millis(1)),
                    sleep: None,
                })
            }
        };
        ready(result)
    }
}
