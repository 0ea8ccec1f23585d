pub mod attributes;
pub mod decode;
pub mod ids;
pub mod transform;

pub use decode::{DecodeError, decode_to_json};
pub use transform::{SpanRecord, TraceRecord, TransformError, transform_otel_to_clickhouse};
