//! Content parts carried by messages and artifacts.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A discriminated union of message/artifact content, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    /// Plain text.
    Text(TextPart),
    /// A file, inline or by reference.
    File(FilePart),
    /// Structured JSON data.
    Data(DataPart),
}

impl Part {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextPart {
            text: text.into(),
            metadata: None,
        })
    }

    /// Creates a file part referencing a URI.
    pub fn file_uri(uri: impl Into<String>, mime_type: Option<String>) -> Self {
        Self::File(FilePart {
            file: FileContent {
                name: None,
                mime_type,
                bytes: None,
                uri: Some(uri.into()),
            },
            metadata: None,
        })
    }

    /// Creates a data part from a JSON object.
    ///
    /// Non-object values are wrapped as `{"value": ...}`.
    #[must_use]
    pub fn data(value: Value) -> Self {
        let data = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self::Data(DataPart {
            data,
            metadata: None,
        })
    }

    /// Returns the text if this is a text part.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(p) => Some(&p.text),
            _ => None,
        }
    }

    /// Returns the JSON object if this is a data part.
    #[must_use]
    pub fn as_data(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Data(p) => Some(&p.data),
            _ => None,
        }
    }
}

/// A text segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextPart {
    /// The text content.
    pub text: String,
    /// Optional part metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<super::Metadata>,
}

/// A file segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilePart {
    /// The file payload.
    pub file: FileContent,
    /// Optional part metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<super::Metadata>,
}

/// File payload: exactly one of `bytes` (base64) or `uri` is expected.
///
/// The payload is carried opaquely; base64 validation belongs to the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    /// Optional file name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional MIME type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Base64-encoded content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<String>,
    /// Location of the content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// A structured data segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataPart {
    /// The JSON object.
    pub data: Map<String, Value>,
    /// Optional part metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<super::Metadata>,
}
