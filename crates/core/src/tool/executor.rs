use std::collections::{HashMap, HashSet};

use tickerbot_model::{ModelTool, ToolCallRequest};
use tracing::Instrument;

use crate::tool::{Error, ToolObject, ToolResult};

/// An executor that handles tool call requests from the model.
pub struct Executor {
    tools: HashMap<String, Box<dyn ToolObject>>,
    // `None` allows every registered tool.
    allowed: Option<HashSet<String>>,
}

impl Executor {
    pub fn with_tools(
        tools: Vec<Box<dyn ToolObject>>,
        allowed: Option<HashSet<String>>,
    ) -> Self {
        let mut tool_map = HashMap::with_capacity(tools.len());
        for tool in tools {
            let name = tool.name();
            tool_map.insert(name.to_owned(), tool);
        }
        Self {
            tools: tool_map,
            allowed,
        }
    }

    #[inline]
    fn is_allowed(&self, name: &str) -> bool {
        self.allowed
            .as_ref()
            .is_none_or(|allowed| allowed.contains(name))
    }

    /// Returns the definitions of the tools the model may call.
    pub fn definitions(&self) -> Vec<ModelTool> {
        let mut definitions: Vec<_> = self
            .tools
            .values()
            .filter(|tool| self.is_allowed(tool.name()))
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameter_schema().clone(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub async fn execute(&self, req: &ToolCallRequest) -> ToolResult {
        let Some(tool) = self.tools.get(&req.name) else {
            warn!("tool not found: {}", req.name);
            return Err(Error::not_found().with_reason(format!(
                "`{}` is not a valid tool, try one of [{}]",
                req.name,
                self.allowed_names().join(", ")
            )));
        };
        if !self.is_allowed(&req.name) {
            warn!("tool not allowed: {}", req.name);
            return Err(Error::not_allowed()
                .with_reason(format!("`{}` may not be called", req.name)));
        }

        trace!("running tool ({}) with args: {:?}", req.id, req.arguments);
        tool.execute(req.arguments.clone())
            .instrument(debug_span!("tool execute", name = %req.name))
            .await
    }

    fn allowed_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self
            .tools
            .keys()
            .map(String::as_str)
            .filter(|name| self.is_allowed(name))
            .collect();
        names.sort_unstable();
        names
    }
}
