//! Short content hashes for target ids and content addressing.

/// First 8 hex chars of a blake3 digest.
///
/// Fixed-width identifier; the truncated collision risk is an accepted
/// trade-off for compact event and catalog keys. Identical content always
/// maps to the same hash, which is what makes catalog/pipeline writes
/// idempotent merges.
pub fn short_hash(value: &str) -> String {
    blake3::hash(value.as_bytes()).to_hex()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hash_is_stable_and_fixed_width() {
        let a = short_hash("{\"catalog\":1}");
        let b = short_hash("{\"catalog\":1}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn different_content_hashes_differently() {
        assert_ne!(short_hash("a"), short_hash("b"));
    }
}
