use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Timing-safe equality for secrets. Hashing both sides first normalizes
/// length so the comparison itself never short-circuits on a length
/// mismatch, then `ct_eq` avoids branching on byte content.
pub fn secure_eq(a: &str, b: &str) -> bool {
    let ha = Sha256::digest(a.as_bytes());
    let hb = Sha256::digest(b.as_bytes());
    ha.ct_eq(&hb).into()
}

/// Same idea for raw bytes (used to compare pinned device keys).
pub fn secure_eq_bytes(a: &[u8], b: &[u8]) -> bool {
    let ha = Sha256::digest(a);
    let hb = Sha256::digest(b);
    ha.ct_eq(&hb).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_strings_match() {
        assert!(secure_eq("abc", "abc"));
    }

    #[test]
    fn different_lengths_do_not_match() {
        assert!(!secure_eq("abc", "abcd"));
    }

    #[test]
    fn different_content_same_length_does_not_match() {
        assert!(!secure_eq("abcd", "abce"));
    }

    #[test]
    fn bytes_equal() {
        assert!(secure_eq_bytes(&[1, 2, 3], &[1, 2, 3]));
        assert!(!secure_eq_bytes(&[1, 2, 3], &[1, 2, 4]));
    }
}
