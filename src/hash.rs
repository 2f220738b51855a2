//! Stable, deterministic hashing used for content hashes and symbol
//! fingerprints. Both render as 16 lowercase hex digits (a truncated
//! 64-bit SHA-256 digest), independent of machine, process, or run.

use sha2::{Digest, Sha256};

fn truncated_hex(input: &[u8]) -> String {
    let digest = Sha256::digest(input);
    let mut out = String::with_capacity(16);
    for byte in &digest[..8] {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Content hash of a file's raw bytes, used to detect unchanged files
/// without re-reading mtimes across platforms.
pub fn content_hash(bytes: &[u8]) -> String {
    truncated_hex(bytes)
}

/// Fingerprint of a symbol: stable across moves/renames-of-file as long as
/// name, kind, and signature summary are unchanged. Deliberately excludes
/// file path and range so the move tracker can match symbols across files.
pub fn symbol_fingerprint(qualified_name: &str, kind: &str, signature_summary: &str) -> String {
    let input = format!("{qualified_name}|{kind}|{signature_summary}");
    truncated_hex(input.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_and_sixteen_hex_digits() {
        let a = content_hash(b"hello world");
        let b = content_hash(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn content_hash_differs_on_different_input() {
        assert_ne!(content_hash(b"a"), content_hash(b"b"));
    }

    #[test]
    fn fingerprint_ignores_file_location() {
        let fp1 = symbol_fingerprint("Foo.bar", "method", "params:1|async:0");
        let fp2 = symbol_fingerprint("Foo.bar", "method", "params:1|async:0");
        assert_eq!(fp1, fp2);
    }

    #[test]
    fn fingerprint_changes_with_signature() {
        let fp1 = symbol_fingerprint("Foo.bar", "method", "params:1|async:0");
        let fp2 = symbol_fingerprint("Foo.bar", "method", "params:2|async:0");
        assert_ne!(fp1, fp2);
    }
}
