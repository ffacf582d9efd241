//! Document writes to the OpenSearch-compatible store.
//!
//! A single record goes to `POST {base}/{index}/_doc`; a batch becomes
//! one `_bulk` call with per-record `_index` action lines, so records
//! routed to different indexes still travel in one request. Every call
//! is bounded by the configured store timeout and classified into a
//! distinguishable error kind — the caller records any of them against
//! the circuit breaker identically.

use base64::Engine;
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::StatusCode;
use serde_json::{Map, Value};

use crate::config::StoreConfig;
use crate::error::CollectorError;
use crate::server::HttpClient;

/// An enriched record plus its routed target index.
#[derive(Debug)]
pub struct IndexedDocument {
    pub index: String,
    pub doc: Map<String, Value>,
}

/// Write a batch to the store. All-or-nothing from the caller's view:
/// any failure is reported without partial-success details.
pub async fn write_documents(
    client: &HttpClient,
    store: &StoreConfig,
    docs: &[IndexedDocument],
) -> Result<(), CollectorError> {
    let (uri, content_type, body) = if let [single] = docs {
        (
            format!("{}/{}/_doc", store.base_url(), single.index),
            "application/json",
            serde_json::to_string(&single.doc)
                .map_err(|e| CollectorError::Query { message: e.to_string() })?,
        )
    } else {
        (
            format!("{}/_bulk", store.base_url()),
            "application/x-ndjson",
            bulk_body(docs)?,
        )
    };

    let request = hyper::Request::builder()
        .method(hyper::Method::POST)
        .uri(&uri)
        .header("content-type", content_type)
        .header("authorization", basic_auth(&store.user, &store.password))
        .body(Full::new(bytes::Bytes::from(body)))
        .map_err(|e| CollectorError::Connection { message: e.to_string() })?;

    // The timeout covers reading the error body too, so a store that
    // answers headers and then stalls cannot hold the handler
    let call = async {
        let response = client
            .request(request)
            .await
            .map_err(|e| CollectorError::Connection { message: e.to_string() })?;

        let status = response.status();
        if status.is_success() {
            return Ok((status, String::new()));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map(|collected| String::from_utf8_lossy(&collected.to_bytes()).into_owned())
            .unwrap_or_default();
        Ok::<_, CollectorError>((status, body))
    };

    let (status, body) = tokio::time::timeout(store.timeout, call)
        .await
        .map_err(|_| CollectorError::Connection {
            message: format!("store timed out after {}s", store.timeout.as_secs()),
        })??;

    if status.is_success() {
        return Ok(());
    }

    Err(classify_status(status, &body, docs))
}

/// NDJSON `_bulk` payload: an action line naming the target index, then
/// the document, for each record.
fn bulk_body(docs: &[IndexedDocument]) -> Result<String, CollectorError> {
    let mut body = String::new();
    for doc in docs {
        let action = serde_json::json!({"index": {"_index": doc.index}});
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(
            &serde_json::to_string(&doc.doc)
                .map_err(|e| CollectorError::Query { message: e.to_string() })?,
        );
        body.push('\n');
    }
    Ok(body)
}

fn basic_auth(user: &str, password: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
    format!("Basic {encoded}")
}

/// Map a non-2xx store response to an error kind: 401 credentials, 404
/// missing index, 400 rejected payload, everything else a connection
/// failure.
fn classify_status(status: StatusCode, body: &str, docs: &[IndexedDocument]) -> CollectorError {
    match status {
        StatusCode::UNAUTHORIZED => CollectorError::AuthenticationFailure,
        StatusCode::NOT_FOUND => CollectorError::IndexNotFound {
            index: docs.first().map(|d| d.index.clone()).unwrap_or_default(),
        },
        StatusCode::BAD_REQUEST => CollectorError::Query {
            message: truncate(body, 200),
        },
        other => CollectorError::Connection {
            message: format!("store returned {other}"),
        },
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(index: &str, message: &str) -> IndexedDocument {
        let mut fields = Map::new();
        fields.insert("message".into(), Value::String(message.into()));
        IndexedDocument {
            index: index.into(),
            doc: fields,
        }
    }

    #[test]
    fn bulk_body_interleaves_actions_and_documents() {
        let body = bulk_body(&[doc("idx-a", "first"), doc("idx-b", "second")]).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);

        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_index"], "idx-a");
        let record: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(record["message"], "first");

        let action: Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(action["index"]["_index"], "idx-b");
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn basic_auth_encodes_credentials() {
        // "admin:admin" in RFC 4648 standard alphabet
        assert_eq!(basic_auth("admin", "admin"), "Basic YWRtaW46YWRtaW4=");
    }

    #[test]
    fn status_classification() {
        let docs = [doc("idx-a", "x")];

        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "", &docs),
            CollectorError::AuthenticationFailure
        ));
        match classify_status(StatusCode::NOT_FOUND, "", &docs) {
            CollectorError::IndexNotFound { index } => assert_eq!(index, "idx-a"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "mapper_parsing_exception", &docs),
            CollectorError::Query { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, "", &docs),
            CollectorError::Connection { .. }
        ));
    }

    #[test]
    fn error_bodies_are_truncated() {
        let long = "x".repeat(500);
        match classify_status(StatusCode::BAD_REQUEST, &long, &[]) {
            CollectorError::Query { message } => {
                assert!(message.len() < 210);
                assert!(message.ends_with("..."));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
