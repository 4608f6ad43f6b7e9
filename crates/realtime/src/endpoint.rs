use crate::StreamError;

const REALTIME_PATH: &str = "/realtime";

/// Derives the realtime WebSocket endpoint from the backend's HTTP base URL.
///
/// `https://` maps to `wss://`, `http://` to `ws://`, and `/realtime` is
/// appended to the path.
pub fn derive_endpoint(base_url: &str) -> Result<String, StreamError> {
    let base = base_url.trim().trim_end_matches('/');
    let translated = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(StreamError::InvalidEndpoint(base_url.to_string()));
    };
    Ok(format!("{translated}{REALTIME_PATH}"))
}

/// Builds the URL used to open the stream for one call.
pub fn connect_url(endpoint: &str, call_id: &str) -> Result<String, StreamError> {
    if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
        return Err(StreamError::InvalidEndpoint(endpoint.to_string()));
    }
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    Ok(format!(
        "{endpoint}{separator}callId={}",
        encode_query_value(call_id)
    ))
}

fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
