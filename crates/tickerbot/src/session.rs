use tickerbot_core::ModelHandle;

use crate::dispatch::{DispatchError, Dispatcher};

/// Everything a running program needs: the prompt-level model handle and
/// the dispatcher for price requests.
///
/// A session is built once at startup and lent to the loops in
/// [`repl`](crate::repl).
pub struct Session {
    model: ModelHandle,
    dispatcher: Dispatcher,
}

impl Session {
    /// Creates a session.
    #[inline]
    pub fn new(model: ModelHandle, dispatcher: Dispatcher) -> Self {
        Self { model, dispatcher }
    }

    /// Returns the model handle.
    #[inline]
    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Answers one price request.
    #[inline]
    pub async fn handle_request(
        &self,
        line: &str,
    ) -> Result<String, DispatchError> {
        self.dispatcher.handle_request(line).await
    }
}
