mod builder;

use tickerbot_model::{
    ModelMessage, ModelProviderError, ModelRequest, ResponseFormat,
    ToolCallResult,
};

use crate::model_client::ModelClient;
use crate::tool::Executor as ToolExecutor;
pub use builder::AgentBuilder;

/// Errors that end an agent run without an answer.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The model backend failed.
    #[error("model request failed: {0}")]
    Model(Box<dyn ModelProviderError>),
    /// The model neither called a tool nor produced any text.
    #[error("the model produced an empty answer")]
    EmptyAnswer,
    /// The model kept calling tools without reaching an answer.
    #[error("no answer after {0} model turns")]
    IterationLimit(usize),
}

/// A tool-calling agent.
///
/// Each [`run`](Agent::run) is independent: the conversation starts from
/// the system prompt and the given input, and is dropped when the run
/// returns.
pub struct Agent {
    model_client: ModelClient,
    tool_executor: ToolExecutor,
    system_prompt: Option<String>,
    return_direct: bool,
    max_iterations: usize,
}

impl Agent {
    /// Runs the agent loop on one input and returns the final answer.
    ///
    /// With the return-direct policy (the default), the first successful
    /// tool output is returned unmodified. Tool failures are reported back
    /// to the model so it gets a chance to correct the call.
    pub async fn run(&self, input: &str) -> Result<String, AgentError> {
        let mut messages = Vec::with_capacity(4);
        if let Some(system_prompt) = &self.system_prompt {
            messages.push(ModelMessage::System(system_prompt.clone()));
        }
        messages.push(ModelMessage::User(input.to_owned()));

        for turn in 1..=self.max_iterations {
            let request = ModelRequest {
                messages: messages.clone(),
                tools: self.tool_executor.definitions(),
                format: ResponseFormat::Text,
            };
            debug!("model turn {turn}/{}", self.max_iterations);
            let resp = self
                .model_client
                .send_request(request)
                .await
                .map_err(AgentError::Model)?;

            if resp.tool_calls.is_empty() {
                let answer = resp.transcript.trim();
                if answer.is_empty() {
                    return Err(AgentError::EmptyAnswer);
                }
                return Ok(answer.to_owned());
            }

            messages.push(ModelMessage::ToolCalls {
                content: resp.transcript,
                calls: resp.tool_calls.clone(),
            });
            for call in resp.tool_calls {
                let content = match self.tool_executor.execute(&call).await {
                    Ok(output) if self.return_direct => {
                        debug!("returning output of `{}` directly", call.name);
                        return Ok(output);
                    }
                    Ok(output) => output,
                    Err(err) => {
                        info!("tool call `{}` failed: {err}", call.name);
                        format!("Error: {}", err.reason())
                    }
                };
                messages.push(ModelMessage::Tool(ToolCallResult {
                    id: call.id,
                    name: call.name,
                    content,
                }));
            }
        }

        Err(AgentError::IterationLimit(self.max_iterations))
    }
}
