//! Prompt requests sent to a session runtime.

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A file attached to a prompt, carried inline as a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "file")]
pub struct Attachment {
    pub filename: String,
    pub mime: String,
    pub url: String,
}

impl Attachment {
    /// Create an attachment from raw bytes.
    #[must_use]
    pub fn from_bytes(filename: impl Into<String>, mime: impl Into<String>, data: &[u8]) -> Self {
        let mime = mime.into();
        let url = format!("data:{mime};base64,{}", BASE64.encode(data));
        Self {
            filename: filename.into(),
            mime,
            url,
        }
    }

    /// Decode the inline data, if the URL is a base64 `data:` URL.
    #[must_use]
    pub fn decode_data(&self) -> Option<Vec<u8>> {
        let rest = self.url.strip_prefix("data:")?;
        let (_, encoded) = rest.split_once(";base64,")?;
        BASE64.decode(encoded).ok()
    }
}

/// A user turn: text content, attachments and app-specific metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptRequest {
    /// Prompt text.
    pub content: String,

    /// Attached files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// Arbitrary metadata forwarded to the runtime (model, agent, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl PromptRequest {
    /// Create a request with just text.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Create a request with attachments.
    #[must_use]
    pub fn with_attachments(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            content: content.into(),
            attachments,
            metadata: HashMap::new(),
        }
    }

    /// Get a metadata value by key.
    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Set a metadata value.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_roundtrip() {
        let original = b"fn main() {}";
        let attachment = Attachment::from_bytes("main.rs", "text/x-rust", original);
        assert!(attachment.url.starts_with("data:text/x-rust;base64,"));
        assert_eq!(attachment.decode_data().unwrap(), original);
    }

    #[test]
    fn attachment_serializes_as_file_part() {
        let attachment = Attachment::from_bytes("a.txt", "text/plain", b"a");
        let json = serde_json::to_value(&attachment).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["filename"], "a.txt");
    }

    #[test]
    fn remote_url_has_no_inline_data() {
        let attachment = Attachment {
            filename: "a.png".to_string(),
            mime: "image/png".to_string(),
            url: "https://example.com/a.png".to_string(),
        };
        assert!(attachment.decode_data().is_none());
    }

    #[test]
    fn request_omits_empty_collections() {
        let mut request = PromptRequest::new("hello");
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"content":"hello"}"#);

        request.set_metadata("model", Value::String("m".to_string()));
        assert_eq!(request.get_metadata("model"), Some(&Value::String("m".to_string())));
    }
}
