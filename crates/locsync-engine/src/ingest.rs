//! TS ingestion: read translator-edited TS files back into the store.

use tracing::{debug, warn};

use locsync_core::hash::{md5_hex, string_key};
use locsync_core::Result;
use locsync_domain::JobSummary;
use locsync_import_ts::{parse_ts, TsBlock};
use locsync_store::{FileId, PropKey, Store};

use crate::extract::ParsedFile;
use crate::hooks::TsItemPatch;
use crate::job::Job;

/// Ingest TS files for every modified destination language.
pub fn ingest_ts_files(
    store: &Store,
    job: &Job,
    files: &[ParsedFile],
    modified_langs: &[String],
    optimizations: bool,
    summary: &mut JobSummary,
) -> Result<()> {
    for lang in modified_langs {
        if *lang == job.source_language {
            continue;
        }
        for pf in files {
            if pf.item_order.is_empty() {
                continue;
            }
            ingest_one(store, job, pf, lang, optimizations, summary)?;
        }
    }
    Ok(())
}

fn ingest_one(
    store: &Store,
    job: &Job,
    pf: &ParsedFile,
    lang: &str,
    optimizations: bool,
    summary: &mut JobSummary,
) -> Result<()> {
    let path = job.ts_path_for(lang, &pf.rel);
    let text = match std::fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let hash = md5_hex(&text);
    if optimizations
        && store
            .get_property(PropKey::Ts { file: pf.file_id, lang })
            .as_deref()
            == Some(hash.as_str())
    {
        debug!(file = %pf.rel, lang, "ts file unchanged");
        return Ok(());
    }

    let parsed = parse_ts(&text);
    summary.ts_files_read += 1;
    for issue in &parsed.issues {
        warn!(file = %pf.rel, lang, line = issue.line, "{}", issue.message);
        summary.warn(
            Some(&pf.rel),
            Some(lang),
            format!("line {}: {}", issue.line, issue.message),
        );
    }

    for block in &parsed.blocks {
        apply_block(store, job, pf.file_id, &pf.rel, lang, block, summary)?;
    }

    store.set_property(PropKey::Ts { file: pf.file_id, lang }, &hash)?;
    Ok(())
}

fn apply_block(
    store: &Store,
    job: &Job,
    file_id: FileId,
    rel: &str,
    lang: &str,
    block: &TsBlock,
    summary: &mut JobSummary,
) -> Result<()> {
    let msgid = block.msgid.as_deref().unwrap_or("");
    let context = block.msgctxt.as_deref().unwrap_or("");

    // The ID reference is authoritative: a block whose key does not match
    // the regenerated key was edited beyond recognition and is dropped.
    let Some(key) = block.key.as_deref() else {
        summary.warn(Some(rel), Some(lang), format!("block at line {} has no ID reference", block.line));
        return Ok(());
    };
    if string_key(msgid, context) != key {
        summary.warn(
            Some(rel),
            Some(lang),
            format!("key mismatch at line {}; block dropped", block.line),
        );
        return Ok(());
    }

    let Some(string_id) = store.get_string_id(msgid, context, false)? else {
        summary.warn(
            Some(rel),
            Some(lang),
            format!("unknown string at line {}; block dropped", block.line),
        );
        return Ok(());
    };
    let Some(item_id) = store.get_item_id(file_id, string_id, false)? else {
        summary.warn(
            Some(rel),
            Some(lang),
            format!("string at line {} is not an item of this file; block dropped", block.line),
        );
        return Ok(());
    };

    let existing = store.get_translation(item_id, lang)?;

    let translation = block.msgstr.clone().unwrap_or_default();
    let comment = {
        let joined = block.translator_comments.join("\n");
        (!joined.is_empty()).then_some(joined)
    };
    if translation.is_empty() && comment.is_none() && existing.is_none() {
        return Ok(());
    }

    let mut patch = TsItemPatch {
        translation,
        comment,
        fuzzy: block.has_flag("fuzzy"),
        item_comment: None,
    };
    job.hooks.apply_ts_item_patch(rel, lang, &mut patch);

    if let Some(item_comment) = &patch.item_comment {
        let item = store.get_item(item_id)?;
        if item.comment.as_deref() != Some(item_comment.as_str()) {
            store.set_item_comment(item_id, Some(item_comment))?;
        }
    }

    if store.get_string(string_id)?.skip {
        return Ok(());
    }

    // A fuzzy mark on nothing is meaningless; coerce.
    if patch.translation.is_empty() && patch.fuzzy {
        patch.fuzzy = false;
    }

    // A merge-flagged translation ignores exactly one incoming update.
    if let Some(rec) = &existing {
        if rec.merge {
            store.clear_translation_merge(item_id, lang)?;
            return Ok(());
        }
    }

    if let Some(rec) = &existing {
        let same = rec.text.as_deref().unwrap_or("") == patch.translation
            && rec.comment == patch.comment
            && rec.fuzzy == patch.fuzzy;
        if same {
            return Ok(());
        }
    }

    let text_opt = (!patch.translation.is_empty()).then_some(patch.translation.as_str());
    store.upsert_translation(
        item_id,
        lang,
        text_opt,
        patch.fuzzy,
        patch.comment.as_deref(),
        false,
    )?;
    Ok(())
}
