//! Parser callback glue: normalization, duplicate-key disambiguation and
//! string/item recording.
//!
//! Extraction runs in two passes. The parser callbacks only collect
//! normalized strings in document order; disambiguation then runs over the
//! complete list so a later duplicate can still push its *first* occurrence
//! onto that occurrence's own source key. Only after contexts are final does
//! anything touch the store; a parser that dies mid-file therefore
//! leaves the store untouched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use locsync_core::hash::{md5_hex, string_key};
use locsync_core::text::{nfc, normalize_whitespace, read_and_normalize};
use locsync_core::{Extracted, ParseMode, Result};
use locsync_domain::JobSummary;
use locsync_store::{FileId, ItemId, PropKey, Store};

use crate::job::Job;

/// A file that survived the source scan phase.
pub struct ParsedFile {
    pub file_id: FileId,
    pub rel: String,
    pub abs: PathBuf,
    /// True when the fast path skipped parsing (content hash unchanged).
    pub skipped: bool,
    /// Item ids in source order.
    pub item_order: Vec<ItemId>,
}

pub enum Outcome {
    Parsed(ParsedFile),
    /// A hook asserted the file is orphaned; demote it.
    AssertOrphaned,
    /// Vetoed or failed; drop from the processing set, store untouched.
    Dropped,
}

/// Apply the job's whitespace policy and NFC to one extraction.
pub fn normalize_extracted(job: &Job, ex: &mut Extracted) {
    let has_flag = |name: &str| ex.flags.iter().any(|f| f == name);
    if (job.normalize_strings && !has_flag("dont-normalize")) || has_flag("normalize") {
        ex.string = normalize_whitespace(&ex.string);
    }
    ex.string = nfc(&ex.string);
    ex.context = nfc(&ex.context);
    ex.hint = nfc(&ex.hint);
    ex.source_key = nfc(&ex.source_key);
}

/// Run the parser in extraction mode and return the normalized extractions
/// with final (disambiguated) contexts, in document order.
///
/// Rendering reuses this so its per-string contexts match what extraction
/// recorded (same text in, same contexts out).
pub fn collect_extractions(
    job: &Job,
    text: &str,
    warnings: &mut Vec<String>,
) -> Result<Vec<Extracted>> {
    let mut collected: Vec<Extracted> = Vec::new();
    job.parser.parse(text, ParseMode::Extract, &mut |mut ex| {
        normalize_extracted(job, &mut ex);
        if !ex.string.is_empty() {
            collected.push(ex);
        }
        None
    })?;
    disambiguate(&mut collected, warnings);
    Ok(collected)
}

/// Assign unique `(string, context)` keys within the file.
///
/// On a collision the first occurrence is retroactively moved onto its own
/// source key when it has one; the current occurrence then tries its source
/// key, its hint, and finally numbered variants of its context base.
fn disambiguate(entries: &mut [Extracted], warnings: &mut Vec<String>) {
    // key -> index of the entry currently owning it
    let mut owners: HashMap<String, usize> = HashMap::new();
    let mut seen_source_keys: HashMap<String, usize> = HashMap::new();

    for i in 0..entries.len() {
        if !entries[i].source_key.is_empty() {
            if let Some(&prev) = seen_source_keys.get(&entries[i].source_key) {
                if prev != i {
                    warnings.push(format!(
                        "duplicate source key '{}' in file",
                        entries[i].source_key
                    ));
                }
            } else {
                seen_source_keys.insert(entries[i].source_key.clone(), i);
            }
        }

        let key = string_key(&entries[i].string, &entries[i].context);
        let Some(&first) = owners.get(&key) else {
            owners.insert(key, i);
            continue;
        };

        // Move the first occurrence onto its own source key if it still
        // sits on the shared context.
        if !entries[first].source_key.is_empty() && entries[first].context != entries[first].source_key {
            let moved_ctx = entries[first].source_key.clone();
            let moved_key = string_key(&entries[first].string, &moved_ctx);
            if !owners.contains_key(&moved_key) {
                entries[first].context = moved_ctx;
                owners.remove(&key);
                owners.insert(moved_key, first);
            }
        }

        let base = entries[i].context.clone();
        let mut candidates: Vec<String> = Vec::new();
        if !entries[i].source_key.is_empty() {
            candidates.push(entries[i].source_key.clone());
        }
        if !entries[i].hint.is_empty() {
            candidates.push(entries[i].hint.clone());
        }
        let mut resolved = None;
        for ctx in candidates {
            let k = string_key(&entries[i].string, &ctx);
            if !owners.contains_key(&k) {
                resolved = Some((ctx, k));
                break;
            }
        }
        let (ctx, key) = match resolved {
            Some(r) => r,
            None => {
                let mut n = 1usize;
                loop {
                    let ctx = if base.is_empty() {
                        n.to_string()
                    } else {
                        format!("{base}.{n}")
                    };
                    let k = string_key(&entries[i].string, &ctx);
                    if !owners.contains_key(&k) {
                        break (ctx, k);
                    }
                    n += 1;
                }
            }
        };
        entries[i].context = ctx;
        owners.insert(key, i);
    }
}

/// Process one scanned source file (§ source scan): read, fast-path gate,
/// parse, record items, flip per-item orphan flags, persist file properties.
pub fn process_source_file(
    store: &Store,
    job: &Job,
    rel: &str,
    abs: &Path,
    optimizations: bool,
    summary: &mut JobSummary,
) -> Result<Outcome> {
    let (mut text, _encoding) = match read_and_normalize(abs) {
        Ok(v) => v,
        Err(e) => {
            warn!(file = %rel, "cannot read source file: {e}");
            summary.warn(Some(rel), None, format!("cannot read source file: {e}"));
            return Ok(Outcome::Dropped);
        }
    };
    job.hooks.apply_after_load(rel, &mut text);
    if job.hooks.asserts_orphaned(rel) {
        return Ok(Outcome::AssertOrphaned);
    }
    if !job.hooks.allows_process(rel, &text) {
        return Ok(Outcome::Dropped);
    }

    let file_id = if job.output_only_mode {
        match store.get_file_id(&job.namespace, &job.id, rel, false)? {
            Some(id) => id,
            None => {
                summary.warn(Some(rel), None, "unknown file in output-only mode");
                return Ok(Outcome::Dropped);
            }
        }
    } else {
        store
            .get_file_id(&job.namespace, &job.id, rel, true)?
            .expect("file row created")
    };

    let current_hash = md5_hex(&text);

    // Fast path: content unchanged since the last parse; restore the item
    // order and skip the parser entirely.
    if optimizations
        && store.get_property(PropKey::Source(file_id)).as_deref() == Some(current_hash.as_str())
    {
        if let Some(order) = store.get_property(PropKey::Items(file_id)) {
            let item_order: Vec<ItemId> = order
                .split(',')
                .filter(|s| !s.is_empty())
                .filter_map(|s| s.parse().ok())
                .collect();
            summary.files_skipped += 1;
            return Ok(Outcome::Parsed(ParsedFile {
                file_id,
                rel: rel.to_string(),
                abs: abs.to_path_buf(),
                skipped: true,
                item_order,
            }));
        }
    }

    let mut warnings = Vec::new();
    let extractions = match collect_extractions(job, &text, &mut warnings) {
        Ok(v) => v,
        Err(e) => {
            warn!(file = %rel, "parse failed: {e}");
            summary.warn(Some(rel), None, format!("parse failed: {e}"));
            return Ok(Outcome::Dropped);
        }
    };
    for w in warnings {
        warn!(file = %rel, "{w}");
        summary.warn(Some(rel), None, w);
    }

    // Snapshot before inserts so the orphan comparison sees the old set.
    let old_items = store.item_ids_for_file(file_id)?;

    let mut item_order: Vec<ItemId> = Vec::new();
    for ex in &extractions {
        if !job.hooks.allows_extract(rel, ex) {
            continue;
        }
        let string_id = store
            .get_string_id(&ex.string, &ex.context, true)?
            .expect("string row created");
        let item_id = store
            .get_item_id(file_id, string_id, true)?
            .expect("item row created");
        item_order.push(item_id);

        let item = store.get_item(item_id)?;
        let hint = (!ex.hint.is_empty()).then_some(ex.hint.as_str());
        if item.hint.as_deref() != hint {
            store.set_item_hint(item_id, hint)?;
        }
    }

    for old in &old_items {
        let rec = store.get_item(*old)?;
        if item_order.contains(old) {
            if rec.orphaned {
                store.set_item_orphaned(*old, false)?;
            }
        } else if !rec.orphaned {
            store.set_item_orphaned(*old, true)?;
        }
    }
    // Items present this parse are live by definition.
    for id in &item_order {
        if store.get_item(*id)?.orphaned {
            store.set_item_orphaned(*id, false)?;
        }
    }

    let size = std::fs::metadata(abs).map(|m| m.len()).unwrap_or(0);
    store.set_property(PropKey::Source(file_id), &current_hash)?;
    store.set_property(PropKey::Hash(file_id), &current_hash)?;
    store.set_property(PropKey::Size(file_id), &size.to_string())?;
    let order_str = item_order
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    store.set_property(PropKey::Items(file_id), &order_str)?;

    summary.files_parsed += 1;
    Ok(Outcome::Parsed(ParsedFile {
        file_id,
        rel: rel.to_string(),
        abs: abs.to_path_buf(),
        skipped: false,
        item_order,
    }))
}
