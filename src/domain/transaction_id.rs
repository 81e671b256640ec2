//! Transaction identifier generation.

use chrono::Utc;
use uuid::Uuid;

const PREFIX: &str = "TR";
const RANDOM_SUFFIX_LEN: usize = 12;

/// Generates an identifier of the form `TR<13-digit unix millis><12 hex>`.
///
/// Identifiers sort by creation time. The suffix is 48 random bits from a
/// v4 UUID. Only `[0-9A-Z]` is emitted, so the value is URL-safe.
pub fn new_transaction_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0);
    let random = Uuid::new_v4().simple().to_string().to_uppercase();
    let suffix: String = random.chars().take(RANDOM_SUFFIX_LEN).collect();

    format!("{PREFIX}{millis:013}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn has_expected_shape() {
        let id = new_transaction_id();
        assert!(id.starts_with(PREFIX));
        assert_eq!(id.len(), PREFIX.len() + 13 + RANDOM_SUFFIX_LEN);
        assert!(id
            .chars()
            .all(|ch| ch.is_ascii_digit() || ch.is_ascii_uppercase()));
    }

    #[test]
    fn is_unique_across_a_burst() {
        let ids: HashSet<String> = (0..10_000).map(|_| new_transaction_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn later_ids_sort_after_earlier_ones() {
        let first = new_transaction_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = new_transaction_id();
        assert!(first[..15] < second[..15]);
    }
}
