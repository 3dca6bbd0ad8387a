//! Response formats and the serialization seam.

use crate::{QuickError, QuickResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire format a server renders its responses in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// `application/json`
    #[default]
    Json,
    /// `text/csv`
    Csv,
    /// `application/xml`
    Xml,
    /// `text/html`
    Html,
    /// `application/x-yaml`
    Yaml,
}

impl ResponseFormat {
    /// Returns the `Content-Type` header value for this format.
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
            Self::Xml => "application/xml",
            Self::Html => "text/html",
            Self::Yaml => "application/x-yaml",
        }
    }

    /// Returns the lowercase format name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Xml => "xml",
            Self::Html => "html",
            Self::Yaml => "yaml",
        }
    }
}

/// Renders response data into wire bytes.
pub trait Serializer: Send + Sync + 'static {
    /// Serializes `data` in the requested format.
    fn serialize(&self, format: ResponseFormat, data: &Value) -> QuickResult<Bytes>;
}

/// Serializer for the formats that ship with QuickServe: JSON and YAML.
///
/// CSV, XML and HTML need a custom [`Serializer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinSerializer;

impl Serializer for BuiltinSerializer {
    fn serialize(&self, format: ResponseFormat, data: &Value) -> QuickResult<Bytes> {
        match format {
            ResponseFormat::Json => Ok(Bytes::from(serde_json::to_vec(data)?)),
            ResponseFormat::Yaml => serde_yaml::to_string(data)
                .map(Bytes::from)
                .map_err(|e| QuickError::internal_with_source("YAML serialization failed", e)),
            other => Err(QuickError::internal(format!(
                "No serializer registered for format '{}'",
                other.as_str()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_and_yaml() {
        let data = json!({"name": "Ada"});
        let json = BuiltinSerializer.serialize(ResponseFormat::Json, &data).unwrap();
        assert_eq!(&json[..], br#"{"name":"Ada"}"#);

        let yaml = BuiltinSerializer.serialize(ResponseFormat::Yaml, &data).unwrap();
        assert_eq!(std::str::from_utf8(&yaml).unwrap().trim(), "name: Ada");
    }

    #[test]
    fn test_unsupported_format_is_internal_error() {
        let err = BuiltinSerializer
            .serialize(ResponseFormat::Csv, &json!([]))
            .unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Internal);
    }

    #[test]
    fn test_format_names_round_trip_through_serde() {
        let format: ResponseFormat = serde_json::from_str("\"yaml\"").unwrap();
        assert_eq!(format, ResponseFormat::Yaml);
        assert_eq!(format.content_type(), "application/x-yaml");
    }
}
