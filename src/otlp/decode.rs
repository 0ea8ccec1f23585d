use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value::Value as OtelValue};
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
use prost::Message;
use serde_json::{Value as JsonValue, json};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid OTLP protobuf body: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

/// Decodes an `ExportTraceServiceRequest` protobuf body and re-serializes
/// it as the camelCase JSON shape the object store persists and the
/// transformer consumes (matching OTLP's canonical JSON mapping: byte
/// fields become base64, 64-bit integers become decimal strings).
pub fn decode_to_json(body: &[u8]) -> Result<JsonValue, DecodeError> {
    let request = ExportTraceServiceRequest::decode(body)?;
    Ok(export_request_to_json(&request))
}

fn export_request_to_json(request: &ExportTraceServiceRequest) -> JsonValue {
    json!({
        "resourceSpans": request.resource_spans.iter().map(resource_spans_to_json).collect::<Vec<_>>(),
    })
}

fn resource_spans_to_json(rs: &ResourceSpans) -> JsonValue {
    let resource_attrs = rs.resource.as_ref().map(|r| r.attributes.iter().map(key_value_to_json).collect::<Vec<_>>()).unwrap_or_default();
    json!({
        "resource": { "attributes": resource_attrs },
        "scopeSpans": rs.scope_spans.iter().map(scope_spans_to_json).collect::<Vec<_>>(),
    })
}

fn scope_spans_to_json(ss: &ScopeSpans) -> JsonValue {
    json!({
        "spans": ss.spans.iter().map(span_to_json).collect::<Vec<_>>(),
    })
}

fn span_to_json(span: &Span) -> JsonValue {
    let mut obj = serde_json::Map::new();
    obj.insert("traceId".to_string(), json!(BASE64.encode(&span.trace_id)));
    obj.insert("spanId".to_string(), json!(BASE64.encode(&span.span_id)));
    if !span.parent_span_id.is_empty() {
        obj.insert("parentSpanId".to_string(), json!(BASE64.encode(&span.parent_span_id)));
    }
    obj.insert("name".to_string(), json!(span.name));
    obj.insert("kind".to_string(), json!(span.kind));
    obj.insert("startTimeUnixNano".to_string(), json!(span.start_time_unix_nano.to_string()));
    obj.insert("endTimeUnixNano".to_string(), json!(span.end_time_unix_nano.to_string()));
    obj.insert("attributes".to_string(), json!(span.attributes.iter().map(key_value_to_json).collect::<Vec<_>>()));
    if let Some(status) = &span.status {
        obj.insert(
            "status".to_string(),
            json!({
                "code": status.code,
                "message": status.message,
            }),
        );
    }
    JsonValue::Object(obj)
}

fn key_value_to_json(kv: &KeyValue) -> JsonValue {
    json!({
        "key": kv.key,
        "value": kv.value.as_ref().map(any_value_to_json).unwrap_or(json!({})),
    })
}

fn any_value_to_json(value: &AnyValue) -> JsonValue {
    match &value.value {
        Some(OtelValue::StringValue(s)) => json!({ "stringValue": s }),
        Some(OtelValue::BoolValue(b)) => json!({ "boolValue": b }),
        Some(OtelValue::IntValue(i)) => json!({ "intValue": i.to_string() }),
        Some(OtelValue::DoubleValue(d)) => json!({ "doubleValue": d }),
        Some(OtelValue::ArrayValue(arr)) => {
            json!({ "arrayValue": { "values": arr.values.iter().map(any_value_to_json).collect::<Vec<_>>() } })
        }
        Some(OtelValue::KvlistValue(kv)) => {
            json!({ "kvlistValue": { "values": kv.values.iter().map(key_value_to_json).collect::<Vec<_>>() } })
        }
        Some(OtelValue::BytesValue(b)) => json!({ "stringValue": BASE64.encode(b) }),
        None => json!({}),
    }
}
