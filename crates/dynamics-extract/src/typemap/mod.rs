//! Type mapping between OData Edm types and JSON schema types.

use serde::{Deserialize, Serialize};

/// JSON schema primitive type of an output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Integer,
    Number,
    Boolean,
}

impl JsonType {
    /// Name used in the JSON schema `type` keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Integer => "integer",
            JsonType::Number => "number",
            JsonType::Boolean => "boolean",
        }
    }
}

/// JSON schema string format annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JsonFormat {
    #[serde(rename = "date-time")]
    DateTime,
}

impl JsonFormat {
    /// Name used in the JSON schema `format` keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonFormat::DateTime => "date-time",
        }
    }
}

/// Map an OData Edm type to a JSON schema type and optional format.
///
/// Unknown types fall back to a plain string.
pub fn map_type(edm_type: &str) -> (JsonType, Option<JsonFormat>) {
    match edm_type {
        // Date/time types
        "Edm.Date" | "Edm.DateTime" | "Edm.DateTimeOffset" => {
            (JsonType::String, Some(JsonFormat::DateTime))
        }

        // Integer types
        "Edm.Int16" | "Edm.Int32" | "Edm.Int64" => (JsonType::Integer, None),

        // Floating point / decimal
        "Edm.Double" | "Edm.Decimal" => (JsonType::Number, None),

        // Boolean
        "Edm.Boolean" => (JsonType::Boolean, None),

        // Default fallback
        _ => (JsonType::String, None),
    }
}
