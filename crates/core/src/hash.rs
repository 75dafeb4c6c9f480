//! Content hashing for cache keys and structural checksums.

use sha2::{Digest, Sha256};

/// SHA-256 of the input, truncated to 16 hex characters.
///
/// Short enough for log lines and file names, long enough that collisions
/// are not a practical concern for cache keys.
pub fn short_sha256(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Hash an ordered sequence of parts with an unambiguous separator.
pub fn short_sha256_parts<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(short_sha256("orders"), short_sha256("orders"));
        assert_ne!(short_sha256("orders"), short_sha256("order"));
    }

    #[test]
    fn hash_is_sixteen_hex_chars() {
        let h = short_sha256("anything");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn parts_separator_prevents_ambiguity() {
        // ["ab", "c"] must not hash like ["a", "bc"]
        let a = short_sha256_parts(["ab", "c"]);
        let b = short_sha256_parts(["a", "bc"]);
        assert_ne!(a, b);
    }
}
