// Utility functions

use sha2::{Digest, Sha256};
use std::time::Duration;

/// Short SHA-256 fingerprint of a secret reference, safe to log
pub fn fingerprint(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("sha256:{}", &digest[..12])
}

/// Convert configured seconds into a `Duration`, rejecting values that are
/// not finite, not positive, or above `max_secs`.
pub fn bounded_duration(seconds: f64, max_secs: f64) -> Option<Duration> {
    if !(seconds.is_finite() && seconds > 0.0 && seconds <= max_secs) {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}

/// Truncate evidence text to at most `max_chars` characters
pub fn truncate_evidence(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
