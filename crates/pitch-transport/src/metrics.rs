//! Transport metrics.
//!
//! All metrics follow Prometheus naming conventions:
//! - `pitch_` prefix
//! - `_total` suffix for counters
//!
//! # Cardinality
//!
//! Labels are bounded by code:
//! - `result`: `message`/`empty` for polls, `accepted`/`invalid` for pushes
//! - `reason`: one value per [`crate::AuthError`] variant
//!
//! Tokens are never used as label values.
//!
//! Nothing here installs a recorder. Without one every call is a no-op.

use metrics::counter;

/// Record a message enqueued for a peer.
///
/// Metric: `pitch_messages_enqueued_total`
pub fn record_enqueued() {
    counter!("pitch_messages_enqueued_total").increment(1);
}

/// Record the oldest queued message being dropped to make room.
///
/// Metric: `pitch_messages_evicted_total`
pub fn record_evicted() {
    counter!("pitch_messages_evicted_total").increment(1);
}

/// Record an authenticated poll.
///
/// Metric: `pitch_polls_total`
/// Labels: `result`
pub fn record_poll(result: &'static str) {
    counter!("pitch_polls_total", "result" => result).increment(1);
}

/// Record an authenticated push.
///
/// Metric: `pitch_pushes_total`
/// Labels: `result`
pub fn record_push(result: &'static str) {
    counter!("pitch_pushes_total", "result" => result).increment(1);
}

/// Record a rejected request.
///
/// Metric: `pitch_auth_failures_total`
/// Labels: `reason`
pub fn record_auth_failure(reason: &'static str) {
    counter!("pitch_auth_failures_total", "reason" => reason).increment(1);
}

/// Record a handler returning an error.
///
/// Metric: `pitch_handler_failures_total`
pub fn record_handler_failure() {
    counter!("pitch_handler_failures_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder these must be harmless no-ops.
    #[test]
    fn test_record_without_recorder() {
        record_enqueued();
        record_evicted();
        record_poll("empty");
        record_push("accepted");
        record_auth_failure("unknown_token");
        record_handler_failure();
    }
}
