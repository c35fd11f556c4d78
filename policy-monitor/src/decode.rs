//! Avro payload decoding and policy-result inspection.
//!
//! Event payloads arrive as single binary-encoded Avro datums; the schema
//! to decode them against is fetched separately by schema id. The decoded
//! record's `PolicyResults` field, when present, is a JSON-encoded array of
//! policy outcome objects that this module parses and scans for violations.

use apache_avro::types::Value as AvroValue;
use apache_avro::{from_avro_datum, Schema};
use serde_json::Value as JsonValue;

/// Name of the event field carrying the policy outcomes.
pub const POLICY_RESULTS_FIELD: &str = "PolicyResults";

/// Errors that can occur while decoding or inspecting an event.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The schema returned by the server is not a valid Avro schema.
    #[error("Failed to parse Avro schema: {source}")]
    ParseSchema {
        #[source]
        source: apache_avro::Error,
    },
    /// The payload does not decode against the schema.
    #[error("Failed to decode event payload: {source}")]
    DecodePayload {
        #[source]
        source: apache_avro::Error,
    },
    /// The `PolicyResults` field is not valid JSON.
    #[error("Failed to parse PolicyResults: {source}")]
    ParsePolicyResults {
        #[source]
        source: serde_json::Error,
    },
    /// The `PolicyResults` field is not a JSON-encoded array.
    #[error("PolicyResults is not a JSON-encoded array")]
    PolicyResultsNotArray,
}

/// Parses an Avro schema from its JSON form.
pub fn parse_schema(schema_json: &str) -> Result<Schema, Error> {
    Schema::parse_str(schema_json).map_err(|source| Error::ParseSchema { source })
}

/// Decodes a single binary-encoded datum against `schema` and renders it
/// as JSON.
pub fn decode_payload(schema: &Schema, payload: &[u8]) -> Result<JsonValue, Error> {
    let mut reader = payload;
    let value = from_avro_datum(schema, &mut reader, None)
        .map_err(|source| Error::DecodePayload { source })?;
    Ok(avro_to_json(&value))
}

/// Renders an Avro value as JSON. Unions are unwrapped, byte values are
/// hex-encoded, logical date/time values keep their underlying numbers.
fn avro_to_json(value: &AvroValue) -> JsonValue {
    match value {
        AvroValue::Null => JsonValue::Null,
        AvroValue::Boolean(b) => JsonValue::from(*b),
        AvroValue::Int(n) => JsonValue::from(*n),
        AvroValue::Long(n) => JsonValue::from(*n),
        AvroValue::Float(n) => JsonValue::from(*n),
        AvroValue::Double(n) => JsonValue::from(*n),
        AvroValue::Bytes(b) | AvroValue::Fixed(_, b) => JsonValue::from(hex::encode(b)),
        AvroValue::String(s) => JsonValue::from(s.clone()),
        AvroValue::Enum(_, symbol) => JsonValue::from(symbol.clone()),
        AvroValue::Union(_, inner) => avro_to_json(inner),
        AvroValue::Array(items) => JsonValue::Array(items.iter().map(avro_to_json).collect()),
        AvroValue::Map(entries) => JsonValue::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), avro_to_json(value)))
                .collect(),
        ),
        AvroValue::Record(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), avro_to_json(value)))
                .collect(),
        ),
        AvroValue::Date(n) | AvroValue::TimeMillis(n) => JsonValue::from(*n),
        AvroValue::TimeMicros(n)
        | AvroValue::TimestampMillis(n)
        | AvroValue::TimestampMicros(n)
        | AvroValue::LocalTimestampMillis(n)
        | AvroValue::LocalTimestampMicros(n) => JsonValue::from(*n),
        AvroValue::Uuid(uuid) => JsonValue::from(uuid.to_string()),
        other => JsonValue::from(format!("{other:?}")),
    }
}

/// Outcome of scanning one decoded event for policy results.
#[derive(Debug, Default)]
pub struct PolicyScan {
    /// All parsed policy entries, in event order.
    pub results: Vec<JsonValue>,
    /// Entries whose `passed` flag indicates a violation.
    pub violations: Vec<JsonValue>,
}

/// Parses the `PolicyResults` field of a decoded event, in place.
///
/// The vendor encodes the field as a JSON string; on success the string is
/// replaced with the parsed array so the rendered event shows structure
/// instead of an escaped string. Returns `Ok(None)` when the event carries
/// no `PolicyResults` field (or a null one).
pub fn scan_policy_results(event: &mut JsonValue) -> Result<Option<PolicyScan>, Error> {
    let raw = match event.get(POLICY_RESULTS_FIELD) {
        None | Some(JsonValue::Null) => return Ok(None),
        Some(JsonValue::String(raw)) => raw.clone(),
        Some(_) => return Err(Error::PolicyResultsNotArray),
    };

    let parsed: JsonValue =
        serde_json::from_str(&raw).map_err(|source| Error::ParsePolicyResults { source })?;
    let JsonValue::Array(results) = parsed else {
        return Err(Error::PolicyResultsNotArray);
    };

    let violations = results
        .iter()
        .filter(|policy| is_violation(policy))
        .cloned()
        .collect();
    event[POLICY_RESULTS_FIELD] = JsonValue::Array(results.clone());

    Ok(Some(PolicyScan {
        results,
        violations,
    }))
}

/// The vendor encodes `passed` as the string "false"; a JSON `false` is
/// accepted as equivalent.
fn is_violation(policy: &JsonValue) -> bool {
    match policy.get("passed") {
        Some(JsonValue::String(s)) => s == "false",
        Some(JsonValue::Bool(b)) => !b,
        _ => false,
    }
}
