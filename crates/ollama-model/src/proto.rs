use serde::{Deserialize, Serialize};
use serde_json::Value;
use tickerbot_model::{
    ModelMessage, ModelRequest, ModelTool, ResponseFormat, ToolCallRequest,
};

use crate::OllamaConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: FunctionCall,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ChunkMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

/// One line of a streamed `/api/chat` response.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of a non-2xx answer.
#[derive(Clone, Debug, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Tool {
    r#type: &'static str,
    function: FunctionTool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        content: String,
        tool_name: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    stream: bool,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(req: &ModelRequest, config: &OllamaConfig) -> ChatRequest {
    ChatRequest {
        model: config.model.clone(),
        messages: req.messages.iter().map(create_message).collect(),
        tools: req.tools.iter().map(create_tool).collect(),
        format: match req.format {
            ResponseFormat::Text => None,
            ResponseFormat::Json => Some("json"),
        },
        stream: true,
    }
}

#[inline]
fn create_message(msg: &ModelMessage) -> Message {
    match msg {
        ModelMessage::System(content) => Message::System {
            content: content.clone(),
        },
        ModelMessage::User(content) => Message::User {
            content: content.clone(),
        },
        ModelMessage::ToolCalls { content, calls } => Message::Assistant {
            content: content.clone(),
            tool_calls: calls.iter().map(create_tool_call).collect(),
        },
        ModelMessage::Tool(result) => Message::Tool {
            content: result.content.clone(),
            tool_name: result.name.clone(),
        },
    }
}

#[inline]
fn create_tool_call(call: &ToolCallRequest) -> ToolCall {
    ToolCall {
        function: FunctionCall {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        },
    }
}

#[inline]
fn create_tool(tool: &ModelTool) -> Tool {
    Tool {
        r#type: "function",
        function: FunctionTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tickerbot_model::ToolCallResult;

    use super::*;
    use crate::OllamaConfigBuilder;

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::System("Use the tools.".to_owned()),
                ModelMessage::User("Price of AAPL?".to_owned()),
            ],
            tools: vec![ModelTool {
                name: "StockPrice".to_owned(),
                description: "Fetches the current stock price.".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": { "ticker": { "type": "string" } }
                }),
            }],
            format: ResponseFormat::Text,
        };
        let config = OllamaConfigBuilder::with_model("llama3.2")
            .build()
            .unwrap();

        let body = serde_json::to_value(create_request(&request, &config))
            .unwrap();
        assert_eq!(
            body,
            json!({
                "model": "llama3.2",
                "messages": [
                    { "role": "system", "content": "Use the tools." },
                    { "role": "user", "content": "Price of AAPL?" }
                ],
                "tools": [{
                    "type": "function",
                    "function": {
                        "name": "StockPrice",
                        "description": "Fetches the current stock price.",
                        "parameters": {
                            "type": "object",
                            "properties": { "ticker": { "type": "string" } }
                        }
                    }
                }],
                "stream": true
            })
        );
    }

    #[test]
    fn test_json_format_and_tool_history() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::ToolCalls {
                    content: String::new(),
                    calls: vec![ToolCallRequest {
                        id: "call_0".to_owned(),
                        name: "StockPrice".to_owned(),
                        arguments: json!({ "ticker": "MSFT" }),
                    }],
                },
                ModelMessage::Tool(ToolCallResult {
                    id: "call_0".to_owned(),
                    name: "StockPrice".to_owned(),
                    content: "The current price of MSFT is 410.00 USD."
                        .to_owned(),
                }),
            ],
            tools: vec![],
            format: ResponseFormat::Json,
        };
        let config = OllamaConfigBuilder::with_model("llama3.2")
            .build()
            .unwrap();

        let body = serde_json::to_value(create_request(&request, &config))
            .unwrap();
        assert_eq!(body["format"], "json");
        assert!(body.get("tools").is_none());
        assert_eq!(
            body["messages"][0],
            json!({
                "role": "assistant",
                "content": "",
                "tool_calls": [{
                    "function": {
                        "name": "StockPrice",
                        "arguments": { "ticker": "MSFT" }
                    }
                }]
            })
        );
        assert_eq!(body["messages"][1]["role"], "tool");
        assert_eq!(body["messages"][1]["tool_name"], "StockPrice");
    }

    #[test]
    fn test_decode_chunk() {
        let chunk: ChatChunk = serde_json::from_str(
            r#"{"model":"llama3.2","created_at":"2026-10-19T08:00:00Z",
                "message":{"role":"assistant","content":"Hi"},"done":false}"#,
        )
        .unwrap();
        assert_eq!(chunk.message.unwrap().content, "Hi");
        assert!(!chunk.done);

        let chunk: ChatChunk =
            serde_json::from_str(r#"{"error":"model is loading"}"#).unwrap();
        assert_eq!(chunk.error.as_deref(), Some("model is loading"));
    }
}
