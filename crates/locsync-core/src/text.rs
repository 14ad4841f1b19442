//! Reading and normalizing source text.
//!
//! All byte-order-mark and charset sniffing lives here so the rest of the
//! engine only ever sees normalized UTF-8 text with Unix line endings.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::Result;

static XML_ENCODING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"encoding\s*=\s*["']([A-Za-z0-9._-]+)["']"#).unwrap());

/// Read a file and return `(normalized_text, detected_encoding)`.
///
/// Detection prefers a BOM (UTF-8/16/32), then an XML `encoding="..."`
/// declaration, then plain UTF-8. Line endings are folded to `\n` and the
/// BOM is stripped.
pub fn read_and_normalize(path: &Path) -> Result<(String, &'static str)> {
    let bytes = std::fs::read(path)?;
    Ok(decode_and_normalize(&bytes))
}

/// Decode raw bytes per the detection rules and fold line endings.
pub fn decode_and_normalize(bytes: &[u8]) -> (String, &'static str) {
    let (text, encoding) = decode_bytes(bytes);
    (fold_line_endings(&text), encoding)
}

fn decode_bytes(bytes: &[u8]) -> (String, &'static str) {
    // UTF-32 BOMs must be checked before UTF-16: FF FE 00 00 starts with
    // the UTF-16LE BOM.
    if bytes.len() >= 4 && bytes[..4] == [0xFF, 0xFE, 0x00, 0x00] {
        return (decode_utf32(&bytes[4..], true), "UTF-32LE");
    }
    if bytes.len() >= 4 && bytes[..4] == [0x00, 0x00, 0xFE, 0xFF] {
        return (decode_utf32(&bytes[4..], false), "UTF-32BE");
    }
    if bytes.len() >= 2 && bytes[..2] == [0xFF, 0xFE] {
        let (text, _, _) = encoding_rs::UTF_16LE.decode(&bytes[2..]);
        return (text.into_owned(), "UTF-16LE");
    }
    if bytes.len() >= 2 && bytes[..2] == [0xFE, 0xFF] {
        let (text, _, _) = encoding_rs::UTF_16BE.decode(&bytes[2..]);
        return (text.into_owned(), "UTF-16BE");
    }
    if bytes.len() >= 3 && bytes[..3] == [0xEF, 0xBB, 0xBF] {
        let (text, _, _) = encoding_rs::UTF_8.decode(&bytes[3..]);
        return (text.into_owned(), "UTF-8");
    }

    // No BOM: honor an XML charset declaration in the prologue if present.
    let head = &bytes[..bytes.len().min(256)];
    let head_str = String::from_utf8_lossy(head);
    if let Some(caps) = XML_ENCODING_RE.captures(&head_str) {
        if let Some(enc) = encoding_rs::Encoding::for_label(caps[1].as_bytes()) {
            let (text, _) = enc.decode_without_bom_handling(bytes);
            return (text.into_owned(), enc.name());
        }
    }

    let (text, _, _) = encoding_rs::UTF_8.decode(bytes);
    (text.into_owned(), "UTF-8")
}

fn decode_utf32(bytes: &[u8], little_endian: bool) -> String {
    bytes
        .chunks_exact(4)
        .map(|c| {
            let v = if little_endian {
                u32::from_le_bytes([c[0], c[1], c[2], c[3]])
            } else {
                u32::from_be_bytes([c[0], c[1], c[2], c[3]])
            };
            char::from_u32(v).unwrap_or(char::REPLACEMENT_CHARACTER)
        })
        .collect()
}

fn fold_line_endings(text: &str) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n")
    } else {
        text.to_string()
    }
}

/// Collapse internal whitespace runs to single spaces and trim the ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Apply Unicode NFC. ASCII strings pass through unchanged.
pub fn nfc(s: &str) -> String {
    if s.is_ascii() {
        s.to_string()
    } else {
        s.nfc().collect()
    }
}

/// Strip control characters in `\x00`–`\x1F` except newline.
pub fn strip_control_chars(s: &str) -> String {
    s.chars().filter(|&c| c == '\n' || c >= ' ').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("hello".as_bytes());
        let (text, enc) = decode_and_normalize(&bytes);
        assert_eq!(text, "hello");
        assert_eq!(enc, "UTF-8");
    }

    #[test]
    fn detects_utf16le_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "héllo".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let (text, enc) = decode_and_normalize(&bytes);
        assert_eq!(text, "héllo");
        assert_eq!(enc, "UTF-16LE");
    }

    #[test]
    fn detects_utf32le_bom_before_utf16() {
        let mut bytes = vec![0xFF, 0xFE, 0x00, 0x00];
        for ch in "ok".chars() {
            bytes.extend_from_slice(&(ch as u32).to_le_bytes());
        }
        let (text, enc) = decode_and_normalize(&bytes);
        assert_eq!(text, "ok");
        assert_eq!(enc, "UTF-32LE");
    }

    #[test]
    fn honors_xml_encoding_declaration() {
        let mut bytes = br#"<?xml version="1.0" encoding="windows-1252"?><r>"#.to_vec();
        bytes.push(0xE9); // e-acute in cp1252
        bytes.extend_from_slice(b"</r>");
        let (text, enc) = decode_and_normalize(&bytes);
        assert!(text.contains('é'));
        assert_eq!(enc, "windows-1252");
    }

    #[test]
    fn folds_crlf() {
        let (text, _) = decode_and_normalize(b"a\r\nb\r\nc");
        assert_eq!(text, "a\nb\nc");
    }

    #[test]
    fn whitespace_collapse() {
        assert_eq!(normalize_whitespace("  a \t b\n  c  "), "a b c");
    }

    #[test]
    fn control_chars_are_stripped_except_newline() {
        assert_eq!(strip_control_chars("a\x01b\nc\x1Fd"), "ab\ncd");
    }

    #[test]
    fn nfc_composes() {
        // "e" + combining acute -> precomposed é
        assert_eq!(nfc("e\u{0301}"), "é");
        assert_eq!(nfc("plain"), "plain");
    }
}
