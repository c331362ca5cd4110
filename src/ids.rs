//! Time-sortable identifiers and epoch helpers shared across subsystems.
//!
//! Event ids, evidence entry ids, and tool event ids all use the same
//! `{epoch_millis:012x}-{uuid12}` scheme so that lexicographic order matches
//! creation order within a session.

use chrono::Utc;
use uuid::Uuid;

/// Generate a time-sortable identifier: zero-padded hex millis + 12 random
/// hex chars.
pub fn time_sortable_id() -> String {
    let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(12).collect();
    format!("{millis:012x}-{suffix}")
}

/// Generate a short opaque identifier (12 hex chars) for sessions and teams.
pub fn short_id() -> String {
    Uuid::new_v4().simple().to_string().chars().take(12).collect()
}

/// Current wall-clock time as fractional epoch seconds.
#[allow(clippy::cast_precision_loss)]
pub fn now_epoch() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Current wall-clock time as whole epoch milliseconds.
pub fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_sortable_id_shape() {
        let id = time_sortable_id();
        let (prefix, suffix) = id.split_once('-').expect("id should contain a dash");
        assert_eq!(prefix.len(), 12);
        assert_eq!(suffix.len(), 12);
        assert!(prefix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_time_sortable_ids_are_ordered() {
        let a = time_sortable_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = time_sortable_id();
        assert!(a < b, "{a} should sort before {b}");
    }

    #[test]
    fn test_short_id_length() {
        assert_eq!(short_id().len(), 12);
    }

    #[test]
    fn test_now_epoch_is_recent() {
        let t = now_epoch();
        // Sometime after 2020 and before 2100.
        assert!(t > 1.58e9 && t < 4.1e9);
    }
}
