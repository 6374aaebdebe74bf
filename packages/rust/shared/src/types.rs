//! Core domain types for BiomarkerKB queries.

use serde::Serialize;
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// SearchFilter
// ---------------------------------------------------------------------------

/// The filter dimension of one logical query against the knowledge base.
///
/// Each variant maps to exactly one filter key in the search payload. The
/// filter doubles as the payload factory: [`SearchFilter::payload`] builds
/// the request body for a given page-size hint, omitting the `size` field
/// entirely when the hint is absent (server-default sizing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilter {
    /// Look up records for a single biomarker entity name.
    Entity(String),
    /// Scan all records of a given record type.
    RecordType(String),
    /// Scan all records associated with a specimen name.
    Specimen(String),
}

impl SearchFilter {
    /// The payload key this filter populates.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Entity(_) => "biomarker_entity_name",
            Self::RecordType(_) => "record_type",
            Self::Specimen(_) => "specimen_name",
        }
    }

    /// The query term carried by this filter.
    pub fn term(&self) -> &str {
        match self {
            Self::Entity(s) | Self::RecordType(s) | Self::Specimen(s) => s,
        }
    }

    /// Build the search payload for a given page-size hint.
    ///
    /// A `None` hint omits the `size` field so the server applies its
    /// default sizing.
    pub fn payload(&self, size: Option<u64>) -> Value {
        let mut body = json!({ self.field(): self.term() });
        if let Some(size) = size {
            body["size"] = json!(size);
        }
        body
    }

    /// Human-readable description used in logs and error messages.
    pub fn description(&self) -> String {
        match self {
            Self::Entity(s) => format!("biomarker '{s}'"),
            Self::RecordType(s) => format!("record_type '{s}'"),
            Self::Specimen(s) => format!("specimen '{s}'"),
        }
    }
}

// ---------------------------------------------------------------------------
// ListRequest
// ---------------------------------------------------------------------------

/// Parameters that drive creation of a temporary server-side list.
///
/// Constructed fresh per escalation attempt; the payload always contains the
/// caller's filter key and, when escalation is active, a `size` field.
#[derive(Debug, Clone, Serialize)]
pub struct ListRequest {
    /// JSON object sent as the search body.
    pub payload: Value,
    /// Human-readable description of the query, for logs and errors.
    #[serde(skip)]
    pub description: String,
}

impl ListRequest {
    pub fn new(payload: Value, description: impl Into<String>) -> Self {
        Self {
            payload,
            description: description.into(),
        }
    }
}
