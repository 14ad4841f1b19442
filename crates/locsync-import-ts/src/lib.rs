//! Reader for the TS interchange format (a gettext subset).
//!
//! This crate is purely syntactic: it turns file text into [`TsBlock`]s plus
//! per-block issues. Whether a block's key resolves to a known string or
//! item is the engine's business, not ours.
//!
//! Reading walks in three passes over the line list: join `"..."`
//! continuation lines onto their directive, sanitize each logical line
//! (control characters out, NFC in), then split on blank lines into blocks
//! and match the block grammar.

use locsync_core::text::{nfc, strip_control_chars};
use locsync_core::{join_plurals, PLURAL_SEP};

/// One parsed TS block, plural forms already joined on [`PLURAL_SEP`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TsBlock {
    pub translator_comments: Vec<String>,
    /// `#: File:` reference.
    pub file_ref: Option<String>,
    /// `#: ID:` reference (accepts the split two-line form).
    pub key: Option<String>,
    pub msgctxt: Option<String>,
    pub msgid: Option<String>,
    pub msgstr: Option<String>,
    pub flags: Vec<String>,
    /// 1-based line the block starts on, for diagnostics.
    pub line: usize,
}

impl TsBlock {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }
}

#[derive(Debug, Clone)]
pub struct Issue {
    pub line: usize,
    pub message: String,
}

/// Result of reading one TS file.
#[derive(Debug, Default)]
pub struct ParsedTs {
    pub blocks: Vec<TsBlock>,
    pub issues: Vec<Issue>,
    /// Set when a bare empty-msgid block mid-file stopped the read early.
    pub truncated: bool,
}

/// Parse TS file text into blocks.
pub fn parse_ts(text: &str) -> ParsedTs {
    let logical = join_continuations(text);
    let mut out = ParsedTs::default();

    let mut block_lines: Vec<(usize, String)> = Vec::new();
    let mut first_block = true;
    for (lineno, raw) in logical {
        let line = nfc(&strip_control_chars(&raw));
        if line.trim().is_empty() {
            if !block_lines.is_empty() {
                if !finish_block(&block_lines, first_block, &mut out) {
                    return out;
                }
                first_block = false;
                block_lines.clear();
            }
            continue;
        }
        block_lines.push((lineno, line));
    }
    if !block_lines.is_empty() {
        finish_block(&block_lines, first_block, &mut out);
    }
    out
}

/// Returns false when the rest of the file must be abandoned.
fn finish_block(lines: &[(usize, String)], first_block: bool, out: &mut ParsedTs) -> bool {
    let start = lines.first().map(|(n, _)| *n).unwrap_or(0);
    let block = parse_block(lines, &mut out.issues);

    let empty_id = block.msgid.as_deref().unwrap_or("").is_empty();
    if empty_id {
        if first_block {
            // Header block (Content-Type etc.); expected, not reported.
            return true;
        }
        if block.key.is_some() {
            out.issues.push(Issue {
                line: start,
                message: "empty msgid in a keyed block".to_string(),
            });
            return true;
        }
        out.issues.push(Issue {
            line: start,
            message: "bare empty-msgid block mid-file; rest of file skipped".to_string(),
        });
        out.truncated = true;
        return false;
    }

    out.blocks.push(block);
    true
}

fn parse_block(lines: &[(usize, String)], issues: &mut Vec<Issue>) -> TsBlock {
    let mut block = TsBlock {
        line: lines.first().map(|(n, _)| *n).unwrap_or(0),
        ..Default::default()
    };
    let mut msgid: Option<String> = None;
    let mut msgid_plural: Option<String> = None;
    let mut msgstr_plain: Option<String> = None;
    let mut msgstr_indexed: Vec<(usize, String)> = Vec::new();
    // Set after a bare `#: ID:` line; the next `#:` line carries the key.
    let mut pending_split_id = false;

    for (lineno, line) in lines {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("#,") {
            block
                .flags
                .extend(rest.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from));
        } else if line.starts_with("#.") {
            // Developer comments are emit-only; nothing to ingest.
        } else if let Some(rest) = line.strip_prefix("#:") {
            let content = rest.trim();
            if pending_split_id {
                block.key = Some(content.to_string());
                pending_split_id = false;
            } else if let Some(path) = content.strip_prefix("File:") {
                block.file_ref = Some(path.trim().to_string());
            } else if content == "ID:" {
                pending_split_id = true;
            } else if let Some(key) = content.strip_prefix("ID:") {
                block.key = Some(key.trim().to_string());
            }
        } else if line == "#" {
            block.translator_comments.push(String::new());
        } else if let Some(rest) = line.strip_prefix("# ") {
            block.translator_comments.push(rest.to_string());
        } else if line.starts_with('#') {
            // Unknown comment kind (e.g. obsolete entries); not ours.
        } else if let Some(rest) = line.strip_prefix("msgctxt") {
            block.msgctxt = quoted(rest);
        } else if let Some(rest) = line.strip_prefix("msgid_plural") {
            msgid_plural = quoted(rest);
        } else if let Some(rest) = line.strip_prefix("msgstr[") {
            if let Some((idx, value)) = indexed_msgstr(rest) {
                msgstr_indexed.push((idx, value));
            } else {
                issues.push(Issue {
                    line: *lineno,
                    message: format!("malformed msgstr index: {line}"),
                });
            }
        } else if let Some(rest) = line.strip_prefix("msgstr") {
            msgstr_plain = quoted(rest);
        } else if let Some(rest) = line.strip_prefix("msgid") {
            msgid = quoted(rest);
        } else {
            issues.push(Issue {
                line: *lineno,
                message: format!("unrecognized line: {line}"),
            });
        }
    }

    block.msgid = match (msgid, msgid_plural) {
        (Some(id), Some(plural)) => Some(join_plurals(&[id, plural])),
        (id, None) => id,
        (None, Some(plural)) => Some(format!("{PLURAL_SEP}{plural}")),
    };
    block.msgstr = if msgstr_indexed.is_empty() {
        msgstr_plain
    } else {
        msgstr_indexed.sort_by_key(|(idx, _)| *idx);
        let forms: Vec<String> = msgstr_indexed.into_iter().map(|(_, v)| v).collect();
        Some(join_plurals(&forms))
    };
    block
}

fn indexed_msgstr(rest: &str) -> Option<(usize, String)> {
    let close = rest.find(']')?;
    let idx: usize = rest[..close].trim().parse().ok()?;
    let value = quoted(&rest[close + 1..])?;
    Some((idx, value))
}

/// Extract and unescape the `"..."` payload of a directive line.
fn quoted(rest: &str) -> Option<String> {
    let rest = rest.trim();
    let start = rest.find('"')?;
    let end = rest.rfind('"')?;
    if end <= start {
        return None;
    }
    Some(unescape(&rest[start + 1..end]))
}

/// Unescape `\"`, `\\` and `\n`; unknown escapes pass through verbatim.
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Merge `"..."` continuation lines into the preceding directive line.
/// Returns `(original_line_number, logical_line)` pairs.
fn join_continuations(text: &str) -> Vec<(usize, String)> {
    let mut out: Vec<(usize, String)> = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let lineno = i + 1;
        let trimmed = raw.trim();
        if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
            if let Some((_, prev)) = out.last_mut() {
                let prev_trimmed = prev.trim_end();
                if prev_trimmed.ends_with('"') {
                    // `msgid "a "` + `"b"` -> `msgid "a b"`.
                    let mut merged = prev_trimmed[..prev_trimmed.len() - 1].to_string();
                    merged.push_str(&trimmed[1..]);
                    *prev = merged;
                    continue;
                }
            }
        }
        out.push((lineno, raw.to_string()));
    }
    out
}
