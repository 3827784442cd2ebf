use std::collections::HashSet;

use tickerbot_model::ModelProvider;

use super::Agent;
use crate::model_client::ModelClient;
use crate::tool::{AnyTool, Executor as ToolExecutor, Tool, ToolObject};

const DEFAULT_MAX_ITERATIONS: usize = 5;

/// [`Agent`] builder.
pub struct AgentBuilder {
    model_client: ModelClient,
    system_prompt: Option<String>,
    tools: Vec<Box<dyn ToolObject>>,
    allowed_tools: Option<HashSet<String>>,
    return_direct: bool,
    max_iterations: usize,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self::with_model_client(ModelClient::new(provider))
    }

    /// Creates a new builder sharing an existing model client.
    #[inline]
    pub fn with_model_client(model_client: ModelClient) -> Self {
        Self {
            model_client,
            system_prompt: None,
            tools: vec![],
            allowed_tools: None,
            return_direct: true,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools.push(Box::new(AnyTool(tool)));
        self
    }

    /// Restricts the tools the model may call. Without an allow-list every
    /// registered tool is available.
    pub fn allowed_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Sets whether a successful tool output ends the run as the answer.
    #[inline]
    pub fn return_direct(mut self, return_direct: bool) -> Self {
        self.return_direct = return_direct;
        self
    }

    /// Sets how many model turns a run may take. Clamped to at least one.
    #[inline]
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Builds the agent.
    pub fn build(self) -> Agent {
        let AgentBuilder {
            model_client,
            system_prompt,
            tools,
            allowed_tools,
            return_direct,
            max_iterations,
        } = self;

        Agent {
            model_client,
            tool_executor: ToolExecutor::with_tools(tools, allowed_tools),
            system_prompt,
            return_direct,
            max_iterations,
        }
    }
}
