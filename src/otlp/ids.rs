use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Decodes an OTLP trace/span ID into its canonical lowercase hex form.
///
/// OTLP JSON emits these IDs base64-encoded; some producers instead send
/// hex directly. The canonical stored form is always hex, so both input
/// encodings are accepted and normalized here rather than leaving the
/// inconsistency to downstream consumers.
pub fn decode_otel_id(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    if is_hex(raw) {
        return Some(raw.to_lowercase());
    }
    if let Ok(bytes) = BASE64.decode(raw) {
        return Some(hex::encode(bytes));
    }
    None
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.len() % 2 == 0 && s.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_base64_to_hex() {
        let id = BASE64.encode([0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(decode_otel_id(&id), Some("deadbeef".to_string()));
    }

    #[test]
    fn passes_through_already_hex_ids_lowercased() {
        assert_eq!(decode_otel_id("DEADBEEF"), Some("deadbeef".to_string()));
    }

    #[test]
    fn rejects_empty_and_undecodable_input() {
        assert_eq!(decode_otel_id(""), None);
        assert_eq!(decode_otel_id("!!!not valid!!!"), None);
    }
}
