//! The fixed orchestration graph the agent walks.

use std::fmt::{self, Display, Write};

use serde::{Deserialize, Serialize};
use travel_agent_model::ModelMessage;

/// A node of the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    /// Asks the model what to do next, offering the tools.
    CallToolsLlm,
    /// Runs the tool calls of the last assistant message.
    InvokeTools,
    /// Turns the last answer into an email and sends it.
    EmailSender,
    /// The terminal node.
    #[serde(rename = "__end__")]
    End,
}

impl Node {
    /// The node every turn starts at.
    pub const ENTRY: Node = Node::CallToolsLlm;

    /// Returns the name of the node.
    pub fn name(&self) -> &'static str {
        match self {
            Node::CallToolsLlm => "call_tools_llm",
            Node::InvokeTools => "invoke_tools",
            Node::EmailSender => "email_sender",
            Node::End => "__end__",
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The topology of the agent.
///
/// ```text
/// call_tools_llm --(tool calls)--> invoke_tools --> call_tools_llm
/// call_tools_llm --(answer)--> email_sender --> __end__
/// ```
///
/// Without an email step, answers go straight to `__end__`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Graph {
    email_enabled: bool,
}

impl Graph {
    /// Creates the graph, with or without the email step.
    #[inline]
    pub fn new(email_enabled: bool) -> Self {
        Self { email_enabled }
    }

    /// Returns the node that follows `from`, given the messages after
    /// `from` has run.
    pub fn route(&self, from: Node, messages: &[ModelMessage]) -> Node {
        match from {
            Node::CallToolsLlm => {
                let has_tool_calls = messages
                    .last()
                    .is_some_and(|msg| !msg.tool_calls().is_empty());
                if has_tool_calls {
                    Node::InvokeTools
                } else if self.email_enabled {
                    Node::EmailSender
                } else {
                    Node::End
                }
            }
            Node::InvokeTools => Node::CallToolsLlm,
            Node::EmailSender | Node::End => Node::End,
        }
    }

    /// Returns `true` if a run pauses before entering `node`.
    #[inline]
    pub fn interrupts_before(&self, node: Node) -> bool {
        node == Node::EmailSender
    }

    /// Renders the graph as a Mermaid flowchart.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD;\n");
        let mut edge = |from: &str, to: &str, label: Option<&str>| {
            let arrow = match label {
                Some(label) => format!("-. {label} .->"),
                None => "-->".to_owned(),
            };
            // Writing to a `String` never fails.
            let _ = writeln!(out, "    {from} {arrow} {to};");
        };
        edge("__start__", Node::ENTRY.name(), None);
        edge(
            Node::CallToolsLlm.name(),
            Node::InvokeTools.name(),
            Some("more_tools"),
        );
        if self.email_enabled {
            edge(
                Node::CallToolsLlm.name(),
                Node::EmailSender.name(),
                Some("email_sender"),
            );
            edge(Node::EmailSender.name(), Node::End.name(), None);
        } else {
            edge(Node::CallToolsLlm.name(), Node::End.name(), Some("done"));
        }
        edge(Node::InvokeTools.name(), Node::CallToolsLlm.name(), None);
        out
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use travel_agent_model::{AssistantMessage, ToolCallRequest};

    use super::*;

    fn answer() -> ModelMessage {
        ModelMessage::Assistant(AssistantMessage::text("Here is your trip."))
    }

    fn tool_request() -> ModelMessage {
        ModelMessage::Assistant(AssistantMessage {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: "call_0".to_owned(),
                name: "flights_finder".to_owned(),
                arguments: json!({}),
            }],
        })
    }

    #[test]
    fn test_route() {
        let graph = Graph::new(true);
        assert_eq!(
            graph.route(Node::CallToolsLlm, &[tool_request()]),
            Node::InvokeTools
        );
        assert_eq!(
            graph.route(Node::CallToolsLlm, &[answer()]),
            Node::EmailSender
        );
        assert_eq!(graph.route(Node::InvokeTools, &[]), Node::CallToolsLlm);
        assert_eq!(graph.route(Node::EmailSender, &[]), Node::End);
        assert!(graph.interrupts_before(Node::EmailSender));
        assert!(!graph.interrupts_before(Node::InvokeTools));

        let graph = Graph::new(false);
        assert_eq!(graph.route(Node::CallToolsLlm, &[answer()]), Node::End);
    }

    #[test]
    fn test_node_names() {
        assert_eq!(
            serde_json::to_value(Node::CallToolsLlm).unwrap(),
            json!("call_tools_llm")
        );
        assert_eq!(serde_json::to_value(Node::End).unwrap(), json!("__end__"));
        assert_eq!(Node::EmailSender.to_string(), "email_sender");
    }

    #[test]
    fn test_to_mermaid() {
        let mermaid = Graph::new(true).to_mermaid();
        assert!(mermaid.starts_with("graph TD;\n"));
        assert!(mermaid.contains("__start__ --> call_tools_llm;"));
        assert!(mermaid.contains("call_tools_llm -. more_tools .-> invoke_tools;"));
        assert!(mermaid.contains("email_sender --> __end__;"));

        let mermaid = Graph::new(false).to_mermaid();
        assert!(!mermaid.contains("email_sender"));
    }
}
