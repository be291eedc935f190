use serde::{Deserialize, Serialize};
use serde_json::Value;
use travel_agent_model::{ModelMessage, ModelRequest, ModelTool};

// ------------------------------
// Types shared in both directions
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

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ChatChunk {
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub done: bool,
    pub done_reason: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ChunkMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

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
        tool_name: String,
        content: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Options {
    temperature: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<Options>,
    stream: bool,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(req: &ModelRequest, model: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_owned(),
        messages: req.messages.iter().map(create_message).collect(),
        tools: req.tools.iter().map(create_tool).collect(),
        options: req.temperature.map(|temperature| Options { temperature }),
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
        ModelMessage::Assistant(msg) => Message::Assistant {
            content: msg.content.clone(),
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|call| ToolCall {
                    function: FunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
        },
        ModelMessage::Tool(result) => Message::Tool {
            tool_name: result.name.clone(),
            content: result.content.clone(),
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
    use travel_agent_model::{AssistantMessage, ToolCallRequest, ToolCallResult};

    use super::*;

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::System("You are a travel planner.".to_owned()),
                ModelMessage::User("Plan Goa".to_owned()),
                ModelMessage::Assistant(AssistantMessage {
                    content: String::new(),
                    tool_calls: vec![ToolCallRequest {
                        id: "call_0".to_owned(),
                        name: "build_itinerary".to_owned(),
                        arguments: json!({ "params": { "days": 3 } }),
                    }],
                }),
                ModelMessage::Tool(ToolCallResult {
                    id: "call_0".to_owned(),
                    name: "build_itinerary".to_owned(),
                    content: "# Day 1".to_owned(),
                }),
            ],
            tools: vec![ModelTool {
                name: "build_itinerary".to_owned(),
                description: "Build an itinerary".to_owned(),
                parameters: json!({ "type": "object" }),
            }],
            temperature: Some(0.25),
        };

        let value =
            serde_json::to_value(create_request(&request, "llama3.1")).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "llama3.1",
                "messages": [
                    { "role": "system", "content": "You are a travel planner." },
                    { "role": "user", "content": "Plan Goa" },
                    {
                        "role": "assistant",
                        "content": "",
                        "tool_calls": [{
                            "function": {
                                "name": "build_itinerary",
                                "arguments": { "params": { "days": 3 } }
                            }
                        }]
                    },
                    {
                        "role": "tool",
                        "tool_name": "build_itinerary",
                        "content": "# Day 1"
                    }
                ],
                "tools": [{
                    "type": "function",
                    "function": {
                        "name": "build_itinerary",
                        "description": "Build an itinerary",
                        "parameters": { "type": "object" }
                    }
                }],
                "options": { "temperature": 0.25 },
                "stream": true
            })
        );
    }
}
