use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use travel_agent_model::{ModelMessage, ModelRequest, ModelTool};

// ------------------------------
// Types shared in both directions
// ------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
    // Thought summaries are never echoed to the user.
    #[serde(default, skip_serializing)]
    pub thought: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListModelsResponse {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    pub next_page_token: Option<String>,
}

/// A model entry returned by the `models.list` endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Resource name, like `models/gemini-2.5-flash`.
    pub name: String,
    /// Human readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Methods like `generateContent` the model accepts.
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters_json_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

// -----------
// Conversions
// -----------

pub fn create_request(req: &ModelRequest) -> GenerateContentRequest {
    let mut system_texts = vec![];
    let mut contents: Vec<Content> = vec![];

    for msg in &req.messages {
        match msg {
            ModelMessage::System(text) => system_texts.push(text.as_str()),
            ModelMessage::User(text) => {
                contents.push(Content {
                    role: Some("user".to_owned()),
                    parts: vec![text_part(text)],
                });
            }
            ModelMessage::Assistant(msg) => {
                let mut parts = vec![];
                if !msg.content.is_empty() {
                    parts.push(text_part(&msg.content));
                }
                for call in &msg.tool_calls {
                    parts.push(Part {
                        function_call: Some(FunctionCall {
                            id: None,
                            name: call.name.clone(),
                            args: call.arguments.clone(),
                        }),
                        ..Default::default()
                    });
                }
                if parts.is_empty() {
                    // Gemini rejects turns without parts.
                    continue;
                }
                contents.push(Content {
                    role: Some("model".to_owned()),
                    parts,
                });
            }
            ModelMessage::Tool(result) => {
                let part = Part {
                    function_response: Some(FunctionResponse {
                        name: result.name.clone(),
                        response: response_object(&result.content),
                    }),
                    ..Default::default()
                };
                // All responses to one model turn go into one user turn.
                match contents.last_mut() {
                    Some(last) if is_function_response_turn(last) => {
                        last.parts.push(part);
                    }
                    _ => contents.push(Content {
                        role: Some("user".to_owned()),
                        parts: vec![part],
                    }),
                }
            }
        }
    }

    let system_instruction = if system_texts.is_empty() {
        None
    } else {
        Some(Content {
            role: None,
            parts: vec![text_part(&system_texts.join("\n\n"))],
        })
    };
    let tools = if req.tools.is_empty() {
        vec![]
    } else {
        vec![Tool {
            function_declarations: req.tools.iter().map(create_tool).collect(),
        }]
    };

    GenerateContentRequest {
        system_instruction,
        contents,
        tools,
        generation_config: req
            .temperature
            .map(|temperature| GenerationConfig { temperature }),
    }
}

#[inline]
fn text_part(text: &str) -> Part {
    Part {
        text: Some(text.to_owned()),
        ..Default::default()
    }
}

fn is_function_response_turn(content: &Content) -> bool {
    content.role.as_deref() == Some("user")
        && !content.parts.is_empty()
        && content.parts.iter().all(|p| p.function_response.is_some())
}

/// `functionResponse.response` must be a JSON object. Tool outputs that are
/// objects are passed through, anything else is wrapped in `output`.
fn response_object(content: &str) -> Value {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(other) => json!({ "output": other }),
        Err(_) => {
            let mut map = Map::new();
            map.insert("output".to_owned(), Value::String(content.to_owned()));
            Value::Object(map)
        }
    }
}

#[inline]
fn create_tool(tool: &ModelTool) -> FunctionDeclaration {
    FunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters_json_schema: tool.parameters.clone(),
    }
}

#[cfg(test)]
mod tests {
    use travel_agent_model::{AssistantMessage, ToolCallRequest, ToolCallResult};

    use super::*;

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::System("You are a travel planner.".to_owned()),
                ModelMessage::User("Hotels in Paris".to_owned()),
                ModelMessage::Assistant(AssistantMessage {
                    content: String::new(),
                    tool_calls: vec![
                        ToolCallRequest {
                            id: "call_0".to_owned(),
                            name: "hotels_finder".to_owned(),
                            arguments: json!({ "params": { "q": "Paris" } }),
                        },
                        ToolCallRequest {
                            id: "call_1".to_owned(),
                            name: "flights_finder".to_owned(),
                            arguments: json!({}),
                        },
                    ],
                }),
                ModelMessage::Tool(ToolCallResult {
                    id: "call_0".to_owned(),
                    name: "hotels_finder".to_owned(),
                    content: r#"[{"name":"Hilton"}]"#.to_owned(),
                }),
                ModelMessage::Tool(ToolCallResult {
                    id: "call_1".to_owned(),
                    name: "flights_finder".to_owned(),
                    content: r#"{"error":"Missing required parameters"}"#
                        .to_owned(),
                }),
            ],
            tools: vec![ModelTool {
                name: "hotels_finder".to_owned(),
                description: "Find hotels".to_owned(),
                parameters: json!({ "type": "object" }),
            }],
            temperature: Some(0.5),
        };

        let value = serde_json::to_value(create_request(&request)).unwrap();
        assert_eq!(
            value,
            json!({
                "systemInstruction": {
                    "parts": [{ "text": "You are a travel planner." }]
                },
                "contents": [
                    {
                        "role": "user",
                        "parts": [{ "text": "Hotels in Paris" }]
                    },
                    {
                        "role": "model",
                        "parts": [
                            {
                                "functionCall": {
                                    "name": "hotels_finder",
                                    "args": { "params": { "q": "Paris" } }
                                }
                            },
                            {
                                "functionCall": {
                                    "name": "flights_finder",
                                    "args": {}
                                }
                            }
                        ]
                    },
                    {
                        "role": "user",
                        "parts": [
                            {
                                "functionResponse": {
                                    "name": "hotels_finder",
                                    "response": {
                                        "output": [{ "name": "Hilton" }]
                                    }
                                }
                            },
                            {
                                "functionResponse": {
                                    "name": "flights_finder",
                                    "response": {
                                        "error": "Missing required parameters"
                                    }
                                }
                            }
                        ]
                    }
                ],
                "tools": [{
                    "functionDeclarations": [{
                        "name": "hotels_finder",
                        "description": "Find hotels",
                        "parametersJsonSchema": { "type": "object" }
                    }]
                }],
                "generationConfig": { "temperature": 0.5 }
            })
        );
    }

    #[test]
    fn test_plain_text_tool_output() {
        let request = ModelRequest {
            messages: vec![ModelMessage::Tool(ToolCallResult {
                id: "call_0".to_owned(),
                name: "build_itinerary".to_owned(),
                content: "# Day 1".to_owned(),
            })],
            ..Default::default()
        };
        let value = serde_json::to_value(create_request(&request)).unwrap();
        assert_eq!(
            value["contents"][0]["parts"][0]["functionResponse"]["response"],
            json!({ "output": "# Day 1" })
        );
        assert!(value.get("tools").is_none());
        assert!(value.get("generationConfig").is_none());
    }
}
