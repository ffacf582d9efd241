//! Record decoding, validation, and enrichment.
//!
//! The request body is decoded into an ordered sequence of raw records
//! (a single JSON object, or the `records` array of a batch payload).
//! Validation is eager: every record in a batch is checked before any
//! enrichment or write happens, and the first invalid record aborts the
//! whole request with its 0-based index. A [`ValidatedRecord`] is the
//! proof that the required fields are present and well-typed.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{CollectorError, ValidationSubcode};
use crate::pipeline::auth::Identity;

/// Raw request payload after JSON decoding.
#[derive(Debug)]
pub struct DecodedPayload {
    pub records: Vec<Map<String, Value>>,
    /// Top-level `identity` object, consumed by passthrough auth.
    pub identity: Option<Map<String, Value>>,
}

/// Decode a `/v1/logs` body: either one record object or
/// `{"records": [...]}`.
pub fn decode_payload(body: &[u8]) -> Result<DecodedPayload, CollectorError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| CollectorError::InvalidBody {
        message: format!("invalid JSON: {e}"),
    })?;

    let Value::Object(mut payload) = value else {
        return Err(CollectorError::InvalidBody {
            message: "request body is not a JSON object".into(),
        });
    };

    let identity = match payload.get("identity") {
        Some(Value::Object(fields)) => Some(fields.clone()),
        _ => None,
    };

    let records = match payload.remove("records") {
        None => vec![payload],
        Some(Value::Array(items)) => {
            let mut records = Vec::with_capacity(items.len());
            for (idx, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(record) => records.push(record),
                    _ => return Err(invalid_json(idx, "batch element is not an object".into())),
                }
            }
            records
        }
        Some(_) => {
            return Err(CollectorError::InvalidBody {
                message: "'records' is not an array".into(),
            })
        }
    };

    Ok(DecodedPayload { records, identity })
}

fn invalid_json(record_index: usize, message: String) -> CollectorError {
    CollectorError::Validation {
        subcode: ValidationSubcode::InvalidJson,
        record_index,
        message,
    }
}

/// A record whose required fields have been checked. The inner map is
/// private so the only way to get one is through [`validate_records`].
#[derive(Debug)]
pub struct ValidatedRecord {
    fields: Map<String, Value>,
}

impl ValidatedRecord {
    /// The validated, non-empty `application` field.
    #[must_use]
    pub fn application(&self) -> &str {
        self.fields
            .get("application")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Attach collector-side metadata, producing the document that goes
    /// to the store. `identity` and the enrichment keys overwrite any
    /// caller-supplied values of the same name.
    #[must_use]
    pub fn enrich(self, enrichment: &Enrichment, identity: &Identity) -> Map<String, Value> {
        let mut doc = self.fields;
        doc.insert(
            "collected_ts".into(),
            Value::String(enrichment.collected_ts.clone()),
        );
        doc.insert(
            "client_ip".into(),
            Value::String(enrichment.client_ip.clone()),
        );
        doc.insert("identity".into(), identity.to_value());
        doc
    }
}

/// Collector-side metadata shared by every record of one request.
#[derive(Debug)]
pub struct Enrichment {
    pub collected_ts: String,
    pub client_ip: String,
}

impl Enrichment {
    /// Stamp the enrichment at the moment validation completed.
    #[must_use]
    pub fn now(client_ip: String) -> Self {
        Self {
            collected_ts: format_collected(Utc::now()),
            client_ip,
        }
    }
}

fn format_collected(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Validate a whole batch eagerly, in order.
pub fn validate_records(
    records: Vec<Map<String, Value>>,
) -> Result<Vec<ValidatedRecord>, CollectorError> {
    records
        .into_iter()
        .enumerate()
        .map(|(idx, fields)| {
            validate_record(idx, &fields)?;
            Ok(ValidatedRecord { fields })
        })
        .collect()
}

const OPTIONAL_STRING_FIELDS: [&str; 5] = ["message", "level", "area", "environment", "version"];

fn validate_record(idx: usize, fields: &Map<String, Value>) -> Result<(), CollectorError> {
    require_string(idx, fields, "application")?;
    require_string(idx, fields, "component")?;
    require_timestamp(idx, fields)?;

    for field in OPTIONAL_STRING_FIELDS {
        if let Some(value) = fields.get(field) {
            if !value.is_string() {
                return Err(invalid_type(idx, field, "a string"));
            }
        }
    }
    if let Some(value) = fields.get("fields") {
        if !value.is_object() {
            return Err(invalid_type(idx, "fields", "an object"));
        }
    }

    Ok(())
}

fn require_string(idx: usize, fields: &Map<String, Value>, field: &str) -> Result<(), CollectorError> {
    match fields.get(field) {
        None => Err(CollectorError::Validation {
            subcode: ValidationSubcode::MissingField,
            record_index: idx,
            message: format!("missing field '{field}'"),
        }),
        Some(Value::String(s)) if s.is_empty() => Err(CollectorError::Validation {
            subcode: ValidationSubcode::EmptyField,
            record_index: idx,
            message: format!("field '{field}' is empty"),
        }),
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err(invalid_type(idx, field, "a string")),
    }
}

fn require_timestamp(idx: usize, fields: &Map<String, Value>) -> Result<(), CollectorError> {
    let Some(value) = fields.get("timestamp").or_else(|| fields.get("emitted_ts")) else {
        return Err(CollectorError::Validation {
            subcode: ValidationSubcode::MissingField,
            record_index: idx,
            message: "missing timestamp field ('timestamp' or 'emitted_ts')".into(),
        });
    };
    let Some(raw) = value.as_str() else {
        return Err(invalid_type(idx, "timestamp", "a string"));
    };
    if !parses_as_iso8601(raw) {
        return Err(CollectorError::Validation {
            subcode: ValidationSubcode::InvalidTimestamp,
            record_index: idx,
            message: format!("'{raw}' is not an ISO-8601 timestamp"),
        });
    }
    Ok(())
}

fn invalid_type(idx: usize, field: &str, expected: &str) -> CollectorError {
    CollectorError::Validation {
        subcode: ValidationSubcode::InvalidType,
        record_index: idx,
        message: format!("field '{field}' must be {expected}"),
    }
}

/// Accepts `Z`, `.mmmZ`, `+HH:MM`, and `+HHMM` offset spellings.
/// RFC 3339 parsing covers the first three; the `%z` fallback picks up
/// offsets without a colon.
fn parses_as_iso8601(raw: &str) -> bool {
    DateTime::parse_from_rfc3339(raw).is_ok()
        || DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z").is_ok()
}
