//! JSON Schema normalization for tool parameters.
//!
//! Schema generators put nested types under `$defs` and point at them with
//! `$ref`. Not every provider resolves references, so definitions are
//! inlined and keys that providers reject are stripped.

use serde_json::{Map, Value};

const DROPPED_KEYS: [&str; 4] = ["$schema", "$defs", "definitions", "title"];

/// Returns a self-contained copy of `schema`.
pub fn normalize(schema: &Value) -> Value {
    let mut defs = Map::new();
    for key in ["definitions", "$defs"] {
        if let Some(Value::Object(map)) = schema.get(key) {
            defs.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
    let mut expanding = vec![];
    normalize_schema(schema, &defs, &mut expanding)
}

fn normalize_schema(
    schema: &Value,
    defs: &Map<String, Value>,
    expanding: &mut Vec<String>,
) -> Value {
    let Value::Object(map) = schema else {
        return schema.clone();
    };

    if let Some(name) = map.get("$ref").and_then(Value::as_str).and_then(ref_name)
    {
        let Some(def) = defs.get(name) else {
            warn!("unresolved schema reference: {name}");
            return Value::Object(Map::new());
        };
        if expanding.iter().any(|n| n == name) {
            // Recursive types can't be inlined, leave them open.
            return serde_json::json!({ "type": "object" });
        }
        expanding.push(name.to_owned());
        let mut resolved = match normalize_schema(def, defs, expanding) {
            Value::Object(resolved) => resolved,
            _ => Map::new(),
        };
        expanding.pop();
        // Keys next to `$ref` (like `description`) take precedence.
        for (key, value) in map {
            if key != "$ref" && !DROPPED_KEYS.contains(&key.as_str()) {
                resolved.insert(key.clone(), normalize_keyword(key, value, defs, expanding));
            }
        }
        return Value::Object(resolved);
    }

    let mut out = Map::new();
    for (key, value) in map {
        if DROPPED_KEYS.contains(&key.as_str()) {
            continue;
        }
        out.insert(key.clone(), normalize_keyword(key, value, defs, expanding));
    }
    Value::Object(out)
}

fn normalize_keyword(
    key: &str,
    value: &Value,
    defs: &Map<String, Value>,
    expanding: &mut Vec<String>,
) -> Value {
    match (key, value) {
        ("properties", Value::Object(props)) => Value::Object(
            props
                .iter()
                .map(|(name, prop)| {
                    (name.clone(), normalize_schema(prop, defs, expanding))
                })
                .collect(),
        ),
        ("items" | "additionalProperties" | "not", _) => {
            normalize_schema(value, defs, expanding)
        }
        ("anyOf" | "oneOf" | "allOf" | "prefixItems", Value::Array(items)) => {
            Value::Array(
                items
                    .iter()
                    .map(|item| normalize_schema(item, defs, expanding))
                    .collect(),
            )
        }
        _ => value.clone(),
    }
}

fn ref_name(reference: &str) -> Option<&str> {
    reference
        .strip_prefix("#/$defs/")
        .or_else(|| reference.strip_prefix("#/definitions/"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_inline_refs() {
        let schema = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "title": "HotelsInput",
            "type": "object",
            "properties": {
                "params": {
                    "$ref": "#/$defs/HotelsParams",
                    "description": "Search parameters"
                }
            },
            "required": ["params"],
            "$defs": {
                "HotelsParams": {
                    "title": "HotelsParams",
                    "type": "object",
                    "properties": {
                        "q": { "type": "string" },
                        "title": { "type": "string" },
                        "rooms": {
                            "anyOf": [{ "$ref": "#/$defs/Count" }, { "type": "null" }]
                        }
                    }
                },
                "Count": { "type": "integer", "minimum": 1 }
            }
        });

        assert_eq!(
            normalize(&schema),
            json!({
                "type": "object",
                "properties": {
                    "params": {
                        "type": "object",
                        "description": "Search parameters",
                        "properties": {
                            "q": { "type": "string" },
                            "title": { "type": "string" },
                            "rooms": {
                                "anyOf": [
                                    { "type": "integer", "minimum": 1 },
                                    { "type": "null" }
                                ]
                            }
                        }
                    }
                },
                "required": ["params"]
            })
        );
    }

    #[test]
    fn test_recursive_ref() {
        let schema = json!({
            "type": "object",
            "properties": { "node": { "$ref": "#/definitions/Node" } },
            "definitions": {
                "Node": {
                    "type": "object",
                    "properties": { "next": { "$ref": "#/definitions/Node" } }
                }
            }
        });
        let normalized = normalize(&schema);
        assert_eq!(
            normalized["properties"]["node"]["properties"]["next"],
            json!({ "type": "object" })
        );
    }
}
