use crate::error::CommandKind;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Key for one command attempt: `{kind}-{callId}-{unixMillis}-{sequence}`.
///
/// The sequence is process-wide, so two attempts never share a key even when
/// they land in the same millisecond.
pub fn idempotency_key(kind: CommandKind, call_id: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{kind}-{call_id}-{millis}-{sequence}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_are_unique_per_attempt() {
        let keys: HashSet<String> = (0..1000)
            .map(|_| idempotency_key(CommandKind::Answer, "c1"))
            .collect();
        assert_eq!(keys.len(), 1000);
    }

    #[test]
    fn test_key_layout() {
        let key = idempotency_key(CommandKind::Transfer, "call-42");
        assert!(key.starts_with("transfer-call-42-"), "unexpected key {key}");
        assert_eq!(key.rsplit('-').count(), 5);
    }
}
