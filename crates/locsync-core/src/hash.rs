//! Content and identity hashing.
//!
//! Every hash the engine persists is an MD5 hex digest: string identity keys
//! (the `#: ID:` lines in TS files), normalized source content hashes, TS
//! file hashes and job fingerprints. Stability matters more than strength
//! here; existing stores and TS files carry these keys.

use md5::{Digest, Md5};

/// MD5 hex digest of a byte buffer.
pub fn md5_hex_bytes(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// MD5 hex digest of the UTF-8 encoding of `text`.
pub fn md5_hex(text: &str) -> String {
    md5_hex_bytes(text.as_bytes())
}

/// Identity key for a `(text, context)` string pair.
///
/// An empty context hashes the text alone, so keys stay compatible with
/// entries that predate contexts.
pub fn string_key(text: &str, context: &str) -> String {
    if context.is_empty() {
        md5_hex(text)
    } else {
        md5_hex(&format!("{text}:{context}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_hashes_text_alone() {
        assert_eq!(string_key("Hello", ""), md5_hex("Hello"));
    }

    #[test]
    fn context_changes_the_key() {
        assert_ne!(string_key("Save", "toolbar.save"), string_key("Save", "menu.save"));
        assert_ne!(string_key("Save", "toolbar.save"), string_key("Save", ""));
    }

    #[test]
    fn keys_are_lowercase_hex() {
        let k = string_key("Hello", "greeting");
        assert_eq!(k.len(), 32);
        assert!(k.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
