use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::attributes::{AttributeMap, AttributeValue, first_present};
use super::ids::decode_otel_id;

/// One row destined for the `traces` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceRecord {
    pub trace_id: String,
    pub project_id: String,
    pub trace_start_time: DateTime<Utc>,
    pub name: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub environment: String,
    pub input: Option<String>,
    pub output: Option<String>,
    pub release: Option<String>,
}

/// One row destined for the `spans` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpanRecord {
    pub span_id: String,
    pub trace_id: String,
    pub parent_span_id: Option<String>,
    pub project_id: String,
    pub span_start_time: DateTime<Utc>,
    pub span_end_time: Option<DateTime<Utc>>,
    pub name: String,
    pub span_kind: String,
    pub status: String,
    pub status_message: Option<String>,
    pub model_name: Option<String>,
    pub environment: String,
    pub input: Option<String>,
    pub output: Option<String>,
    pub cost: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("malformed OTLP JSON: {0}")]
    Malformed(String),
}

/// Transforms a decoded OTLP `ExportTraceServiceRequest` (as camelCase
/// JSON) into rows ready for columnar insertion. Pure and synchronous: no
/// network or filesystem access, so the full span of behavior is testable
/// without mocks.
pub fn transform_otel_to_clickhouse(otel_data: &JsonValue, project_id: &str) -> Result<(Vec<TraceRecord>, Vec<SpanRecord>), TransformError> {
    let mut traces: HashMap<String, TraceRecord> = HashMap::new();
    let mut spans: Vec<SpanRecord> = Vec::new();

    let resource_spans = otel_data.get("resourceSpans").and_then(JsonValue::as_array).cloned().unwrap_or_default();

    for resource_span in &resource_spans {
        let resource_attrs = attributes_to_map(
            resource_span.get("resource").and_then(|r| r.get("attributes")).and_then(JsonValue::as_array),
        );

        let environment = first_present(&resource_attrs, &["deployment.environment", "traceroot.environment", "service.environment"])
            .unwrap_or("default")
            .to_string();

        let scope_spans = resource_span.get("scopeSpans").and_then(JsonValue::as_array).cloned().unwrap_or_default();

        for scope_span in &scope_spans {
            let otel_spans = scope_span.get("spans").and_then(JsonValue::as_array).cloned().unwrap_or_default();

            for otel_span in &otel_spans {
                process_span(otel_span, project_id, &environment, &mut traces, &mut spans);
            }
        }
    }

    Ok((traces.into_values().collect(), spans))
}

fn process_span(
    otel_span: &JsonValue,
    project_id: &str,
    environment: &str,
    traces: &mut HashMap<String, TraceRecord>,
    spans: &mut Vec<SpanRecord>,
) {
    let trace_id = otel_span.get("traceId").and_then(JsonValue::as_str).and_then(decode_otel_id);
    let span_id = otel_span.get("spanId").and_then(JsonValue::as_str).and_then(decode_otel_id);
    let (Some(trace_id), Some(span_id)) = (trace_id, span_id) else {
        tracing::warn!("skipping span with missing or undecodable traceId/spanId");
        return;
    };
    let parent_span_id = otel_span.get("parentSpanId").and_then(JsonValue::as_str).and_then(decode_otel_id).filter(|id| !is_all_zero_id(id));

    let Some(start_time) = nanos_field_to_datetime(otel_span.get("startTimeUnixNano")) else {
        tracing::warn!(span_id = %span_id, "skipping span with missing startTimeUnixNano");
        return;
    };
    let end_time = nanos_field_to_datetime(otel_span.get("endTimeUnixNano"));

    let span_attrs = attributes_to_map(otel_span.get("attributes").and_then(JsonValue::as_array));
    let span_kind = resolve_span_kind(&span_attrs);
    let span_name = otel_span.get("name").and_then(JsonValue::as_str).unwrap_or("unknown").to_string();

    let span_input = span_attrs.get("traceroot.span.input").map(AttributeValue::to_input_output_string);
    let span_output = span_attrs.get("traceroot.span.output").map(AttributeValue::to_input_output_string);

    let model_name = if span_kind == "LLM" {
        first_present(&span_attrs, &["traceroot.llm.model", "gen_ai.request.model", "llm.model_name"]).map(str::to_string)
    } else {
        None
    };

    let (status, status_message) = resolve_status(otel_span);

    spans.push(SpanRecord {
        span_id: span_id.clone(),
        trace_id: trace_id.clone(),
        parent_span_id: parent_span_id.clone(),
        project_id: project_id.to_string(),
        span_start_time: start_time,
        span_end_time: end_time,
        name: span_name.clone(),
        span_kind,
        status,
        status_message,
        model_name,
        environment: environment.to_string(),
        input: span_input.clone(),
        output: span_output.clone(),
        cost: None,
    });

    let entry = traces.entry(trace_id.clone()).or_insert_with(|| TraceRecord {
        trace_id: trace_id.clone(),
        project_id: project_id.to_string(),
        trace_start_time: start_time,
        name: span_name.clone(),
        user_id: first_present(&span_attrs, &["traceroot.trace.user_id", "user.id", "session.user_id"]).map(str::to_string),
        session_id: first_present(&span_attrs, &["traceroot.trace.session_id", "session.id"]).map(str::to_string),
        environment: environment.to_string(),
        input: None,
        output: None,
        release: None,
    });

    // Convergence: a root span (no parent) overwrites the provisional
    // fields seeded by whichever span was encountered first for this trace.
    if parent_span_id.is_none() {
        entry.name = span_name;
        entry.trace_start_time = start_time;
        if span_input.is_some() {
            entry.input = span_input;
        }
        if span_output.is_some() {
            entry.output = span_output;
        }
    }
}

/// A parent span id of all zero bytes (hex `"00...00"`) means "no parent",
/// per the OTLP convention for absent/default ID fields — it must not be
/// stored as a literal parent, or a root span carrying one never converges.
fn is_all_zero_id(hex_id: &str) -> bool {
    !hex_id.is_empty() && hex_id.chars().all(|c| c == '0')
}

fn resolve_status(otel_span: &JsonValue) -> (String, Option<String>) {
    let status = otel_span.get("status");
    let code = status.and_then(|s| s.get("code"));
    let is_error = match code {
        Some(JsonValue::Number(n)) => n.as_i64() == Some(2),
        Some(JsonValue::String(s)) => s == "STATUS_CODE_ERROR",
        _ => false,
    };
    if is_error {
        let message = status.and_then(|s| s.get("message")).and_then(JsonValue::as_str).map(str::to_string);
        ("ERROR".to_string(), message)
    } else {
        ("OK".to_string(), None)
    }
}

fn resolve_span_kind(attrs: &AttributeMap) -> String {
    let explicit = attrs.get("traceroot.span.type").and_then(AttributeValue::as_str).map(str::to_uppercase);
    if let Some(explicit) = explicit {
        if matches!(explicit.as_str(), "LLM" | "SPAN" | "AGENT" | "TOOL") {
            return explicit;
        }
    }

    let openinference = attrs.get("openinference.span.kind").and_then(AttributeValue::as_str).map(str::to_uppercase);
    match openinference.as_deref() {
        Some("LLM") => return "LLM".to_string(),
        Some("AGENT") => return "AGENT".to_string(),
        Some("TOOL") => return "TOOL".to_string(),
        Some("CHAIN") => return "SPAN".to_string(),
        _ => {}
    }

    let has_llm_hint = attrs.contains_key("gen_ai.system") || attrs.contains_key("llm.model_name") || attrs.contains_key("traceroot.llm.model");
    if has_llm_hint {
        return "LLM".to_string();
    }

    "SPAN".to_string()
}

fn nanos_field_to_datetime(field: Option<&JsonValue>) -> Option<DateTime<Utc>> {
    let nanos: i64 = match field? {
        JsonValue::String(s) if !s.is_empty() => s.parse().ok()?,
        JsonValue::Number(n) => n.as_i64()?,
        _ => return None,
    };
    DateTime::from_timestamp(nanos / 1_000_000_000, (nanos % 1_000_000_000) as u32)
}

fn attributes_to_map(attributes: Option<&Vec<JsonValue>>) -> AttributeMap {
    let mut result = AttributeMap::new();
    for attr in attributes.into_iter().flatten() {
        let Some(key) = attr.get("key").and_then(JsonValue::as_str) else { continue };
        let value = attr.get("value").map(extract_attribute_value).unwrap_or(AttributeValue::String(String::new()));
        result.insert(key.to_string(), value);
    }
    result
}

fn extract_attribute_value(value: &JsonValue) -> AttributeValue {
    if let Some(s) = value.get("stringValue").and_then(JsonValue::as_str) {
        return AttributeValue::String(s.to_string());
    }
    if let Some(v) = value.get("intValue") {
        let parsed = match v {
            JsonValue::String(s) => s.parse().ok(),
            JsonValue::Number(n) => n.as_i64(),
            _ => None,
        };
        if let Some(i) = parsed {
            return AttributeValue::Int(i);
        }
    }
    if let Some(b) = value.get("boolValue").and_then(JsonValue::as_bool) {
        return AttributeValue::Bool(b);
    }
    if let Some(d) = value.get("doubleValue").and_then(JsonValue::as_f64) {
        return AttributeValue::Double(d);
    }
    if let Some(arr) = value.get("arrayValue").and_then(|a| a.get("values")).and_then(JsonValue::as_array) {
        return AttributeValue::List(arr.iter().map(extract_attribute_value).collect());
    }
    if let Some(kvs) = value.get("kvlistValue").and_then(|k| k.get("values")).and_then(JsonValue::as_array) {
        let mut map = HashMap::new();
        for kv in kvs {
            if let Some(key) = kv.get("key").and_then(JsonValue::as_str) {
                if let Some(v) = kv.get("value") {
                    map.insert(key.to_string(), extract_attribute_value(v));
                }
            }
        }
        return AttributeValue::Map(map);
    }
    AttributeValue::String(String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn b64(bytes: &[u8]) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn skips_span_missing_start_time() {
        let data = json!({
            "resourceSpans": [{
                "resource": {"attributes": []},
                "scopeSpans": [{
                    "spans": [{
                        "traceId": b64(&[1; 16]),
                        "spanId": b64(&[2; 8]),
                        "name": "no-start",
                    }]
                }]
            }]
        });
        let (traces, spans) = transform_otel_to_clickhouse(&data, "proj1").unwrap();
        assert!(traces.is_empty());
        assert!(spans.is_empty());
    }

    #[test]
    fn root_span_overwrites_provisional_trace_fields() {
        let trace_id = b64(&[9; 16]);
        let child_span = b64(&[1; 8]);
        let root_span = b64(&[2; 8]);

        let data = json!({
            "resourceSpans": [{
                "resource": {"attributes": []},
                "scopeSpans": [{
                    "spans": [
                        {
                            "traceId": trace_id,
                            "spanId": child_span,
                            "parentSpanId": root_span,
                            "name": "child",
                            "startTimeUnixNano": "2000000000",
                        },
                        {
                            "traceId": trace_id,
                            "spanId": root_span,
                            "name": "root",
                            "startTimeUnixNano": "1000000000",
                        },
                    ]
                }]
            }]
        });

        let (traces, spans) = transform_otel_to_clickhouse(&data, "proj1").unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].name, "root");
    }

    #[test]
    fn all_zero_parent_span_id_is_treated_as_root() {
        let data = json!({
            "resourceSpans": [{
                "resource": {"attributes": []},
                "scopeSpans": [{
                    "spans": [{
                        "traceId": b64(&[1; 16]),
                        "spanId": b64(&[2; 8]),
                        "parentSpanId": b64(&[0; 8]),
                        "name": "root",
                        "startTimeUnixNano": "1000000000",
                    }]
                }]
            }]
        });

        let (traces, spans) = transform_otel_to_clickhouse(&data, "proj1").unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].parent_span_id, None);
        assert_eq!(traces[0].name, "root");
    }

    #[test]
    fn llm_span_kind_resolves_from_openinference_attribute() {
        let data = json!({
            "resourceSpans": [{
                "resource": {"attributes": []},
                "scopeSpans": [{
                    "spans": [{
                        "traceId": b64(&[1; 16]),
                        "spanId": b64(&[2; 8]),
                        "name": "chat",
                        "startTimeUnixNano": "1000000000",
                        "attributes": [
                            {"key": "openinference.span.kind", "value": {"stringValue": "LLM"}},
                            {"key": "gen_ai.request.model", "value": {"stringValue": "gpt-4"}},
                        ],
                    }]
                }]
            }]
        });
        let (_, spans) = transform_otel_to_clickhouse(&data, "proj1").unwrap();
        assert_eq!(spans[0].span_kind, "LLM");
        assert_eq!(spans[0].model_name.as_deref(), Some("gpt-4"));
    }

    #[test]
    fn error_status_code_maps_to_error_with_message() {
        let data = json!({
            "resourceSpans": [{
                "resource": {"attributes": []},
                "scopeSpans": [{
                    "spans": [{
                        "traceId": b64(&[1; 16]),
                        "spanId": b64(&[2; 8]),
                        "name": "failing",
                        "startTimeUnixNano": "1000000000",
                        "status": {"code": "STATUS_CODE_ERROR", "message": "boom"},
                    }]
                }]
            }]
        });
        let (_, spans) = transform_otel_to_clickhouse(&data, "proj1").unwrap();
        assert_eq!(spans[0].status, "ERROR");
        assert_eq!(spans[0].status_message.as_deref(), Some("boom"));
    }

    #[test]
    fn environment_resolution_precedence() {
        let data = json!({
            "resourceSpans": [{
                "resource": {"attributes": [
                    {"key": "service.environment", "value": {"stringValue": "svc-env"}},
                    {"key": "deployment.environment", "value": {"stringValue": "deploy-env"}},
                ]},
                "scopeSpans": [{
                    "spans": [{
                        "traceId": b64(&[1; 16]),
                        "spanId": b64(&[2; 8]),
                        "name": "s",
                        "startTimeUnixNano": "1000000000",
                    }]
                }]
            }]
        });
        let (_, spans) = transform_otel_to_clickhouse(&data, "proj1").unwrap();
        assert_eq!(spans[0].environment, "deploy-env");
    }
}
