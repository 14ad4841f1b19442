//! Writer for the TS interchange format.
//!
//! Output is deterministic text: same entries in, same bytes out. The
//! engine hashes the rendered buffer to decide whether the file on disk
//! needs rewriting, so nothing here may depend on time or environment.

use locsync_core::split_plurals;

const WRAP_COLUMN: usize = 76;

/// One entry ready for emission. `source`/`translation` may carry plural
/// forms joined on [`locsync_core::PLURAL_SEP`]; an empty translation means
/// "not translated yet".
#[derive(Debug, Clone, Default)]
pub struct TsEntry {
    pub translator_comments: Vec<String>,
    pub dev_comments: Vec<String>,
    pub file_ref: String,
    pub key: String,
    pub context: String,
    pub source: String,
    pub translation: String,
    pub fuzzy: bool,
}

/// Render a complete TS file: fixed header, then entries in the given
/// order, blank-line separated.
pub fn render_ts_file(locale: &str, generator: &str, entries: &[TsEntry]) -> String {
    let mut out = String::new();
    out.push_str("msgid \"\"\n");
    out.push_str("msgstr \"\"\n");
    out.push_str("\"Content-Type: text/plain; charset=UTF-8\\n\"\n");
    out.push_str("\"Content-Transfer-Encoding: 8bit\\n\"\n");
    out.push_str(&format!("\"Language: {locale}\\n\"\n"));
    out.push_str(&format!("\"Generated-By: {generator}\\n\"\n"));

    for entry in entries {
        out.push('\n');
        render_entry(&mut out, entry);
    }
    out
}

fn render_entry(out: &mut String, entry: &TsEntry) {
    for c in &entry.translator_comments {
        if c.is_empty() {
            out.push_str("#\n");
        } else {
            out.push_str(&format!("# {c}\n"));
        }
    }
    for c in &entry.dev_comments {
        out.push_str(&format!("#. {c}\n"));
    }
    out.push_str(&format!("#: File: {}\n", entry.file_ref));
    out.push_str(&format!("#: ID: {}\n", entry.key));
    // A fuzzy mark on an empty translation would be meaningless; never
    // emit one.
    if entry.fuzzy && !entry.translation.is_empty() {
        out.push_str("#, fuzzy\n");
    }
    if !entry.context.is_empty() {
        emit_directive(out, "msgctxt", &entry.context);
    }

    let source_forms = split_plurals(&entry.source);
    if source_forms.len() > 1 {
        emit_directive(out, "msgid", source_forms[0]);
        emit_directive(out, "msgid_plural", source_forms[1]);
        if entry.translation.is_empty() {
            out.push_str("msgstr[0] \"\"\n");
        } else {
            for (i, form) in split_plurals(&entry.translation).iter().enumerate() {
                emit_directive(out, &format!("msgstr[{i}]"), form);
            }
        }
    } else {
        emit_directive(out, "msgid", &entry.source);
        emit_directive(out, "msgstr", &entry.translation);
    }
}

/// Emit `keyword "value"`, wrapped. Multi-line values open with a bare
/// `""` so translation editors re-join the segments.
fn emit_directive(out: &mut String, keyword: &str, value: &str) {
    let segments = wrap_value(value);
    if segments.len() == 1 {
        out.push_str(&format!("{keyword} \"{}\"\n", escape(&segments[0])));
    } else {
        out.push_str(&format!("{keyword} \"\"\n"));
        for seg in &segments {
            out.push_str(&format!("\"{}\"\n", escape(seg)));
        }
    }
}

/// Split a value into emission segments: hard breaks at embedded newlines,
/// soft wraps at whitespace or `-` once a segment passes the wrap column.
fn wrap_value(value: &str) -> Vec<String> {
    let mut hard: Vec<String> = Vec::new();
    let parts: Vec<&str> = value.split('\n').collect();
    for (i, part) in parts.iter().enumerate() {
        let mut seg = part.to_string();
        if i < parts.len() - 1 {
            seg.push('\n');
        }
        if !seg.is_empty() {
            hard.push(seg);
        }
    }
    if hard.is_empty() {
        return vec![String::new()];
    }
    hard.into_iter().flat_map(|seg| soft_wrap(&seg)).collect()
}

fn soft_wrap(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = Vec::new();
    let mut start = 0usize;
    while chars.len() - start > WRAP_COLUMN {
        let window_end = start + WRAP_COLUMN;
        let brk = (start + 1..=window_end)
            .rev()
            .find(|&i| matches!(chars[i - 1], ' ' | '-'));
        match brk {
            Some(b) => {
                out.push(chars[start..b].iter().collect());
                start = b;
            }
            // One unbreakable run; emit it overlong rather than split a word.
            None => break,
        }
    }
    out.push(chars[start..].iter().collect());
    out
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(ch),
        }
    }
    out
}
