use std::collections::BTreeMap;

use futures_util::future::join_all;
use serde_json::{Value, json};
use travel_agent_model::{ModelTool, ToolCallRequest, ToolCallResult};

use super::object::{ToolObject, ToolObjectImpl};
use super::schema;
use crate::tool::Tool;

/// Content returned to the model when it calls a tool that doesn't exist.
pub const INVALID_TOOL_MESSAGE: &str = "Invalid tool name. Please retry.";

struct Entry {
    tool: Box<dyn ToolObject>,
    parameters: Value,
}

/// An object that holds the toolset and executes requests from the model.
#[derive(Default)]
pub struct Registry {
    tools: BTreeMap<String, Entry>,
}

impl Registry {
    /// Registers a tool, replacing any tool with the same name.
    pub fn add_tool<T: Tool>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        let parameters = schema::normalize(tool.parameter_schema());
        let entry = Entry {
            tool: Box::new(ToolObjectImpl(tool)),
            parameters,
        };
        if self.tools.insert(name.clone(), entry).is_some() {
            warn!("tool `{name}` was registered twice");
        }
    }

    /// Returns `true` if no tools are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns the tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.tools
            .iter()
            .map(|(name, entry)| ModelTool {
                name: name.clone(),
                description: entry.tool.description().to_owned(),
                parameters: entry.parameters.clone(),
            })
            .collect()
    }

    /// Executes all calls concurrently, returning one result per call in
    /// the order of `calls`.
    ///
    /// Failures never abort the batch: unknown tools and tool errors are
    /// reported to the model as the content of their result.
    pub async fn execute_all(
        &self,
        calls: &[ToolCallRequest],
    ) -> Vec<ToolCallResult> {
        let futures = calls.iter().map(|call| {
            let fut = self
                .tools
                .get(&call.name)
                .map(|entry| {
                    entry.tool.execute(&call.id, call.arguments.clone())
                });
            async move {
                let content = match fut {
                    None => {
                        warn!("tool not found: {}", call.name);
                        INVALID_TOOL_MESSAGE.to_owned()
                    }
                    Some(fut) => {
                        trace!("running tool ({}): {}", call.id, call.name);
                        match fut.await {
                            Ok(content) => content,
                            Err(err) => {
                                debug!("tool {} failed: {err}", call.name);
                                json!({ "error": err.reason() }).to_string()
                            }
                        }
                    }
                };
                ToolCallResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    content,
                }
            }
        });
        join_all(futures).await
    }
}
