//! Structural assertions over the captured request
//!
//! Pure comparison of one captured body/header set against the expectation
//! derived from the harness configuration. All checks run independently and
//! every violation lands in the failure list - no short-circuiting, so a
//! single run shows the full diff.

use http::HeaderMap;
use serde_json::Value;

/// Body key under which the forwarder nests the original payload
pub const ENVELOPE_FIELD: &str = "message";
/// Body key the forwarder adds alongside the envelope (presence-only check)
pub const METADATA_FIELD: &str = "request_metadata";
/// Header carrying the workspace URL identifier
pub const ENDPOINT_HEADER: &str = "unity-catalog-endpoint";
/// Header carrying the table name identifier
pub const TABLE_HEADER: &str = "x-databricks-zerobus-table-name";

/// What a correctly forwarded request must look like.
///
/// Constructed once per run from [`crate::HarnessConfig`]; read-only during
/// evaluation.
#[derive(Debug, Clone)]
pub struct Expectation {
    /// The original stimulus payload; every key must reappear, deep-equal,
    /// under the envelope field
    pub payload: Value,
    /// Token the `Authorization: Bearer ...` header must carry
    pub auth_token: String,
    /// Exact value required in the workspace identifier header
    pub workspace_url: String,
    /// Exact value required in the table identifier header
    pub table_name: String,
}

/// Compare a captured body and header set against the expectation.
///
/// The forwarder may batch events into a JSON array; only element 0 is
/// evaluated, and an empty array is itself a failure. An empty return value
/// means the run passed.
pub fn evaluate(expectation: &Expectation, body: &Value, headers: &HeaderMap) -> Vec<String> {
    let mut failures = Vec::new();

    let body = match body {
        Value::Array(items) => match items.first() {
            Some(first) => first,
            None => {
                failures.push("Forwarded body is an empty array".to_string());
                return failures;
            }
        },
        other => other,
    };

    check_envelope(expectation, body, &mut failures);

    if body.get(METADATA_FIELD).is_none() {
        failures.push(format!("Body missing '{METADATA_FIELD}' field"));
    }

    check_headers(expectation, headers, &mut failures);

    failures
}

/// Every key of the original payload must be present under the envelope
/// field with an exactly equal value.
fn check_envelope(expectation: &Expectation, body: &Value, failures: &mut Vec<String>) {
    let Some(envelope) = body.get(ENVELOPE_FIELD) else {
        failures.push(format!("Body missing '{ENVELOPE_FIELD}' field"));
        return;
    };

    let Some(expected_fields) = expectation.payload.as_object() else {
        // Non-object stimulus: the envelope must equal it wholesale
        if envelope != &expectation.payload {
            failures.push(format!(
                "Body '{ENVELOPE_FIELD}': expected {}, got {envelope}",
                expectation.payload
            ));
        }
        return;
    };

    for (key, expected) in expected_fields {
        match envelope.get(key) {
            None => failures.push(format!("Body '{ENVELOPE_FIELD}' missing key '{key}'")),
            Some(actual) if actual != expected => failures.push(format!(
                "Body '{ENVELOPE_FIELD}.{key}': expected {expected}, got {actual}"
            )),
            Some(_) => {}
        }
    }
}

fn check_headers(expectation: &Expectation, headers: &HeaderMap, failures: &mut Vec<String>) {
    let expected_auth = format!("Bearer {}", expectation.auth_token);
    match header_value(headers, "authorization") {
        Some(auth) if auth == expected_auth => {}
        got => failures.push(format!(
            "Authorization: expected '{expected_auth}', got {}",
            render(got)
        )),
    }

    // A missing content-type is not a failure - only a mismatched one
    if let Some(ct) = header_value(headers, "content-type") {
        if !ct.contains("application/json") {
            failures.push(format!(
                "Content-Type: expected 'application/json', got '{ct}'"
            ));
        }
    }

    for (name, expected) in [
        (ENDPOINT_HEADER, expectation.workspace_url.as_str()),
        (TABLE_HEADER, expectation.table_name.as_str()),
    ] {
        match header_value(headers, name) {
            Some(actual) if actual == expected => {}
            got => failures.push(format!(
                "{name}: expected '{expected}', got {}",
                render(got)
            )),
        }
    }
}

/// Case-insensitive header lookup (`HeaderMap` normalizes names on insert,
/// so `Authorization` and `authorization` are the same key).
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn render(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("'{v}'"),
        None => "none".to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expectation() -> Expectation {
        Expectation {
            payload: json!({"event": "test", "number": 42, "nested": {"a": 1}}),
            auth_token: "test-token".to_string(),
            workspace_url: "https://test-workspace.databricks.com".to_string(),
            table_name: "catalog.schema.test_table".to_string(),
        }
    }

    fn good_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer test-token".parse().unwrap());
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert(
            "unity-catalog-endpoint",
            "https://test-workspace.databricks.com".parse().unwrap(),
        );
        headers.insert(
            "x-databricks-zerobus-table-name",
            "catalog.schema.test_table".parse().unwrap(),
        );
        headers
    }

    fn good_body() -> Value {
        json!({
            "message": {"event": "test", "number": 42, "nested": {"a": 1}},
            "request_metadata": {"source": "ingress"},
        })
    }

    #[test]
    fn test_happy_path_has_no_failures() {
        let failures = evaluate(&expectation(), &good_body(), &good_headers());
        assert!(failures.is_empty(), "unexpected failures: {failures:?}");
    }

    #[test]
    fn test_batched_array_evaluates_element_zero() {
        let body = json!([good_body(), {"message": {}, "request_metadata": {}}]);
        let failures = evaluate(&expectation(), &body, &good_headers());
        assert!(failures.is_empty(), "unexpected failures: {failures:?}");
    }

    #[test]
    fn test_empty_array_is_exactly_one_failure() {
        let failures = evaluate(&expectation(), &json!([]), &good_headers());
        assert_eq!(failures, vec!["Forwarded body is an empty array"]);
    }

    #[test]
    fn test_bad_token_is_exactly_one_failure() {
        let mut headers = good_headers();
        headers.insert("authorization", "Bearer wrong-token".parse().unwrap());

        let failures = evaluate(&expectation(), &good_body(), &headers);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].starts_with("Authorization:"));
        assert!(failures[0].contains("'Bearer wrong-token'"));
    }

    #[test]
    fn test_missing_auth_header_reports_none() {
        let mut headers = good_headers();
        headers.remove("authorization");

        let failures = evaluate(&expectation(), &good_body(), &headers);
        assert_eq!(
            failures,
            vec!["Authorization: expected 'Bearer test-token', got none"]
        );
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        // HeaderMap normalizes on insert; a canonical-case insert must be
        // found through the lower-case lookup
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", "Bearer test-token".parse().unwrap());
        headers.insert("Content-Type", "application/json".parse().unwrap());
        headers.insert(
            "Unity-Catalog-Endpoint",
            "https://test-workspace.databricks.com".parse().unwrap(),
        );
        headers.insert(
            "X-Databricks-Zerobus-Table-Name",
            "catalog.schema.test_table".parse().unwrap(),
        );

        let failures = evaluate(&expectation(), &good_body(), &headers);
        assert!(failures.is_empty(), "unexpected failures: {failures:?}");
    }

    #[test]
    fn test_missing_content_type_is_not_a_failure() {
        let mut headers = good_headers();
        headers.remove("content-type");

        let failures = evaluate(&expectation(), &good_body(), &headers);
        assert!(failures.is_empty());
    }

    #[test]
    fn test_wrong_content_type_is_a_failure() {
        let mut headers = good_headers();
        headers.insert("content-type", "text/plain".parse().unwrap());

        let failures = evaluate(&expectation(), &good_body(), &headers);
        assert_eq!(
            failures,
            vec!["Content-Type: expected 'application/json', got 'text/plain'"]
        );
    }

    #[test]
    fn test_deep_value_mismatch_names_the_key() {
        let body = json!({
            "message": {"event": "test", "number": 42, "nested": {"a": 2}},
            "request_metadata": {},
        });
        let failures = evaluate(&expectation(), &body, &good_headers());
        assert_eq!(
            failures,
            vec![r#"Body 'message.nested': expected {"a":1}, got {"a":2}"#]
        );
    }

    #[test]
    fn test_missing_payload_key_is_reported() {
        let body = json!({
            "message": {"event": "test", "number": 42},
            "request_metadata": {},
        });
        let failures = evaluate(&expectation(), &body, &good_headers());
        assert_eq!(failures, vec!["Body 'message' missing key 'nested'"]);
    }

    #[test]
    fn test_all_checks_run_without_short_circuiting() {
        // Violate everything at once: the full diff must come back together
        let body = json!({"unrelated": true});
        let headers = HeaderMap::new();

        let failures = evaluate(&expectation(), &body, &headers);
        let joined = failures.join("\n");
        assert!(joined.contains("Body missing 'message' field"));
        assert!(joined.contains("Body missing 'request_metadata' field"));
        assert!(joined.contains("Authorization:"));
        assert!(joined.contains("unity-catalog-endpoint:"));
        assert!(joined.contains("x-databricks-zerobus-table-name:"));
        assert_eq!(failures.len(), 5);
    }
}
