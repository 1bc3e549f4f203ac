//! Inbound request body and upstream payload assembly

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /stream`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRequest {
    /// The new user message
    pub chat: String,
    /// Prior turns, oldest first as the client sends them
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
    /// Model to run; falls back to the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_code: Option<String>,
    #[serde(default = "default_input_type")]
    pub input_type: String,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default = "default_format")]
    pub format: String,
    /// Extra top-level payload fields, merged over everything else
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_params: Option<Map<String, Value>>,
}

fn default_input_type() -> String {
    "text".to_string()
}

fn default_output_format() -> String {
    "code".to_string()
}

fn default_priority() -> i64 {
    2
}

fn default_format() -> String {
    "simple".to_string()
}

/// One history turn. Unknown fields are carried through to upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    #[serde(default)]
    pub parts: Vec<HistoryPart>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPart {
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HistoryMessage {
    /// Text of the first part; turns are single-part in practice
    pub fn text(&self) -> &str {
        self.parts.first().map(|p| p.text.as_str()).unwrap_or("")
    }
}

/// Render history most-recent-first as `role: text` lines
pub fn flatten_history(history: &[HistoryMessage]) -> String {
    history
        .iter()
        .rev()
        .map(|msg| format!("{}: {}\n", msg.role, msg.text()))
        .collect()
}

impl StreamRequest {
    /// A request for `chat` with no history and every other field at the
    /// same default an omitted JSON field gets
    pub fn new(chat: impl Into<String>) -> Self {
        Self {
            chat: chat.into(),
            history: Vec::new(),
            model_code: None,
            input_type: default_input_type(),
            output_format: default_output_format(),
            priority: default_priority(),
            format: default_format(),
            additional_params: None,
        }
    }

    /// Build the JSON body sent to the upstream stream endpoint.
    ///
    /// `chat` is replaced by `content` (flattened history plus the new
    /// message) and `additional_params` entries are lifted to the top level.
    pub fn into_payload(mut self, default_model: &str) -> serde_json::Result<Value> {
        let content = format!("{}user: {}", flatten_history(&self.history), self.chat);
        let model_code = self
            .model_code
            .take()
            .unwrap_or_else(|| default_model.to_string());
        let additional = self.additional_params.take();

        let mut payload = match serde_json::to_value(&self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        payload.remove("chat");
        payload.insert("content".to_string(), Value::String(content));
        payload.insert("model_code".to_string(), Value::String(model_code));

        if let Some(extra) = additional {
            payload.extend(extra);
        }

        Ok(Value::Object(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> StreamRequest {
        serde_json::from_value(body).expect("valid request")
    }

    #[test]
    fn test_defaults_applied() {
        let req = request(json!({"chat": "hi"}));
        assert!(req.history.is_empty());
        assert!(req.model_code.is_none());
        assert_eq!(req.input_type, "text");
        assert_eq!(req.output_format, "code");
        assert_eq!(req.priority, 2);
        assert_eq!(req.format, "simple");
        assert!(req.additional_params.is_none());
    }

    #[test]
    fn test_new_matches_deserialized_defaults() {
        let built = StreamRequest::new("hi").into_payload("m").unwrap();
        let parsed = request(json!({"chat": "hi"})).into_payload("m").unwrap();
        assert_eq!(built, parsed);
    }

    #[test]
    fn test_missing_chat_rejected() {
        let result: serde_json::Result<StreamRequest> =
            serde_json::from_value(json!({"history": []}));
        assert!(result.is_err());
    }

    #[test]
    fn test_history_flattened_most_recent_first() {
        let req = request(json!({
            "chat": "and now?",
            "history": [
                {"role": "user", "parts": [{"text": "first"}]},
                {"role": "model", "parts": [{"text": "second"}]}
            ]
        }));

        let payload = req.into_payload("default-model").unwrap();

        assert_eq!(
            payload["content"],
            "model: second\nuser: first\nuser: and now?"
        );
        assert!(payload.get("chat").is_none());
        assert_eq!(payload["history"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_default_model_filled_in() {
        let payload = request(json!({"chat": "hi"}))
            .into_payload("default-model")
            .unwrap();
        assert_eq!(payload["model_code"], "default-model");
        assert_eq!(payload["content"], "user: hi");
        assert_eq!(payload["priority"], 2);
    }

    #[test]
    fn test_explicit_model_kept() {
        let payload = request(json!({"chat": "hi", "model_code": "custom"}))
            .into_payload("default-model")
            .unwrap();
        assert_eq!(payload["model_code"], "custom");
    }

    #[test]
    fn test_additional_params_lifted_and_override() {
        let payload = request(json!({
            "chat": "hi",
            "priority": 1,
            "additional_params": {"temperature": 0.2, "priority": 5}
        }))
        .into_payload("m")
        .unwrap();

        assert_eq!(payload["temperature"], 0.2);
        assert_eq!(payload["priority"], 5);
        assert!(payload.get("additional_params").is_none());
    }

    #[test]
    fn test_null_additional_params_dropped() {
        let payload = request(json!({"chat": "hi", "additional_params": null}))
            .into_payload("m")
            .unwrap();
        assert!(payload.get("additional_params").is_none());
    }

    #[test]
    fn test_history_extra_fields_preserved() {
        let payload = request(json!({
            "chat": "hi",
            "history": [{"role": "user", "parts": [], "ts": 12}]
        }))
        .into_payload("m")
        .unwrap();

        assert_eq!(payload["history"][0]["ts"], 12);
        assert_eq!(payload["content"], "user: \nuser: hi");
    }
}
