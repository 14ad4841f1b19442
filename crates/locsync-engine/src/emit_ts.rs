//! TS emission: regenerate per-language TS files from the store.
//!
//! The USN high-water mark is the change oracle: a `(file, lang)` pair is
//! regenerated only when something wrote to its items or translations (or
//! to a similar-language source of `lang`) since the last emission. Even
//! then the file is only rewritten when the rendered bytes actually differ.

use std::collections::HashSet;

use tracing::{debug, warn};

use locsync_core::hash::{md5_hex, string_key};
use locsync_core::{Result, ENGINE_VERSION};
use locsync_domain::JobSummary;
use locsync_export_ts::{render_ts_file, TsEntry};
use locsync_store::{FileId, PropKey, Store};

use crate::extract::ParsedFile;
use crate::job::Job;
use crate::resolve::{resolve_translation, ResolveRequest};

/// `(file, lang)` pairs whose localized output must be rebuilt because the
/// underlying translations moved.
pub type ForceSet = HashSet<(FileId, String)>;

pub fn generate_ts_files(
    store: &Store,
    job: &Job,
    files: &[ParsedFile],
    modified_langs: &[String],
    optimizations: bool,
    summary: &mut JobSummary,
) -> Result<ForceSet> {
    let mut force = ForceSet::new();
    for pf in files {
        let langs: Vec<&String> = if pf.skipped {
            modified_langs.iter().collect()
        } else {
            job.destination_languages.iter().collect()
        };
        for lang in langs {
            if *lang == job.source_language {
                continue;
            }
            emit_one(store, job, pf, lang, optimizations, &mut force, summary)?;
        }
    }
    Ok(force)
}

/// Highest USN relevant to `(file, lang)`: the language itself plus every
/// similar-language source that can feed it.
fn current_usn(store: &Store, job: &Job, file: FileId, lang: &str) -> Result<i64> {
    let mut usn = store.highest_usn_for_file_lang(file, lang)?;
    for rule in job.similar_sources_for(lang) {
        for source in &rule.sources {
            usn = usn.max(store.highest_usn_for_file_lang(file, source)?);
        }
    }
    Ok(usn)
}

fn emit_one(
    store: &Store,
    job: &Job,
    pf: &ParsedFile,
    lang: &str,
    optimizations: bool,
    force: &mut ForceSet,
    summary: &mut JobSummary,
) -> Result<()> {
    let path = job.ts_path_for(lang, &pf.rel);
    let usn = current_usn(store, job, pf.file_id, lang)?;
    let stored_usn = store
        .get_property(PropKey::Usn { file: pf.file_id, lang })
        .and_then(|s| s.parse::<i64>().ok());
    let usn_changed = stored_usn != Some(usn);
    if usn_changed {
        force.insert((pf.file_id, lang.to_string()));
    }

    let regenerate =
        !optimizations || job.rebuild_ts_files || !path.exists() || usn_changed;
    if !regenerate {
        return Ok(());
    }

    let entries = build_entries(store, job, pf, lang, summary)?;
    let text = render_ts_file(lang, &format!("locsync {ENGINE_VERSION}"), &entries);
    let new_hash = md5_hex(&text);
    let stored_hash = store.get_property(PropKey::Ts { file: pf.file_id, lang });

    let write = !optimizations
        || job.rebuild_ts_files
        || !path.exists()
        || stored_hash.as_deref() != Some(new_hash.as_str());
    if write {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, text.as_bytes())?;
        debug!(file = %pf.rel, lang, "ts file written");
        summary.ts_files_written += 1;
    }

    store.set_property(
        PropKey::TsCount { file: pf.file_id, lang },
        &entries.len().to_string(),
    )?;
    store.set_property(PropKey::Ts { file: pf.file_id, lang }, &new_hash)?;
    store.set_property(PropKey::Usn { file: pf.file_id, lang }, &usn.to_string())?;
    Ok(())
}

fn build_entries(
    store: &Store,
    job: &Job,
    pf: &ParsedFile,
    lang: &str,
    summary: &mut JobSummary,
) -> Result<Vec<TsEntry>> {
    let file = store.get_file(pf.file_id)?;
    let mut entries = Vec::new();
    let mut seen: HashSet<i64> = HashSet::new();

    for &item_id in &pf.item_order {
        if !seen.insert(item_id) {
            warn!(file = %pf.rel, lang, item_id, "item repeated in stored order");
            summary.warn(Some(&pf.rel), Some(lang), format!("item {item_id} repeated"));
            continue;
        }
        let item = store.get_item(item_id)?;
        let string = store.get_string(item.string_id)?;
        if string.skip {
            continue;
        }
        if !job.hooks.allows_translate(&pf.rel, lang, &string.text) {
            continue;
        }

        let hint = item.hint.clone().unwrap_or_default();
        let req = ResolveRequest {
            file: &file,
            item_id,
            string: &string,
            hint: &hint,
        };
        let resolved = resolve_translation(store, job, &req, lang, false)?;

        let mut dev_comments = Vec::new();
        if !hint.is_empty() && hint != string.text {
            dev_comments.push(hint.clone());
        }
        dev_comments.extend(job.hooks.collect_dev_comments(&pf.rel, &string.text));
        if let Some(c) = &item.comment {
            dev_comments.push(c.clone());
        }

        let (translation, fuzzy, comment) = match resolved {
            Some(r) => (r.text, r.fuzzy, r.comment),
            None => (String::new(), false, None),
        };
        entries.push(TsEntry {
            translator_comments: comment
                .map(|c| c.lines().map(str::to_string).collect())
                .unwrap_or_default(),
            dev_comments,
            file_ref: pf.rel.clone(),
            key: string_key(&string.text, &string.context),
            context: string.context.clone(),
            source: string.text.clone(),
            translation,
            fuzzy,
        });
    }
    Ok(entries)
}
