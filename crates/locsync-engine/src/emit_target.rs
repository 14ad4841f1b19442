//! Localized file emission: render each source file through the parser
//! with translations spliced in, then write encoded output.

use std::path::Path;
use std::time::UNIX_EPOCH;

use tracing::{debug, warn};

use locsync_core::hash::md5_hex_bytes;
use locsync_core::text::{nfc, read_and_normalize};
use locsync_core::{Error, ParseMode, Result};
use locsync_domain::JobSummary;
use locsync_store::{PropKey, Store};

use crate::emit_ts::ForceSet;
use crate::extract::{collect_extractions, normalize_extracted, ParsedFile};
use crate::hooks::TranslationQuery;
use crate::job::Job;
use crate::resolve::{resolve_translation, ResolveRequest};

pub fn generate_localized_files(
    store: &Store,
    job: &Job,
    files: &[ParsedFile],
    modified_langs: &[String],
    force: &ForceSet,
    optimizations: bool,
    summary: &mut JobSummary,
) -> Result<()> {
    for pf in files {
        let mut langs: Vec<String> = if pf.skipped {
            modified_langs.to_vec()
        } else {
            job.destination_languages.clone()
        };
        if job.output_default_lang_file && !langs.contains(&job.source_language) {
            langs.push(job.source_language.clone());
        }
        for lang in &langs {
            if *lang == job.source_language && !job.output_default_lang_file {
                continue;
            }
            emit_one(store, job, pf, lang, force, optimizations, summary)?;
        }
    }
    Ok(())
}

fn mtime_string(path: &Path) -> Option<String> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let d = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(format!("{}.{:09}", d.as_secs(), d.subsec_nanos()))
}

fn emit_one(
    store: &Store,
    job: &Job,
    pf: &ParsedFile,
    lang: &str,
    force: &ForceSet,
    optimizations: bool,
    summary: &mut JobSummary,
) -> Result<()> {
    let target = job.output_path_for(lang, &pf.rel);
    let file_id = pf.file_id;
    let job_id = job.id.as_str();

    let source_hash = store.get_property(PropKey::Source(file_id)).unwrap_or_default();
    let ts_hash = store
        .get_property(PropKey::Ts { file: file_id, lang })
        .unwrap_or_default();

    if optimizations && !force.contains(&(file_id, lang.to_string())) && target.exists() {
        let stored_mtime = store.get_property(PropKey::TargetMtime { file: file_id, job: job_id, lang });
        let stored_source = store.get_property(PropKey::TargetSource { file: file_id, job: job_id, lang });
        let stored_ts = store.get_property(PropKey::TargetSourceTs { file: file_id, job: job_id, lang });
        let mtime_now = mtime_string(&target);
        if mtime_now.is_some()
            && mtime_now == stored_mtime
            && stored_source.as_deref() == Some(source_hash.as_str())
            && stored_ts.as_deref() == Some(ts_hash.as_str())
        {
            return Ok(());
        }
    }

    let (mut text, _encoding) = match read_and_normalize(&pf.abs) {
        Ok(v) => v,
        Err(e) => {
            warn!(file = %pf.rel, "cannot re-read source file: {e}");
            summary.warn(Some(&pf.rel), Some(lang), format!("cannot re-read source: {e}"));
            return Ok(());
        }
    };
    job.hooks.apply_after_load(&pf.rel, &mut text);

    // Re-derive the disambiguated contexts so lookups here hit the same
    // strings extraction recorded.
    let mut warnings = Vec::new();
    let assignments = match collect_extractions(job, &text, &mut warnings) {
        Ok(v) => v,
        Err(e) => {
            warn!(file = %pf.rel, "render parse failed: {e}");
            summary.warn(Some(&pf.rel), Some(lang), format!("render parse failed: {e}"));
            return Ok(());
        }
    };

    let file_rec = store.get_file(file_id)?;
    let mut index = 0usize;
    let mut callback_error: Option<Error> = None;
    let rendered = job.parser.parse(&text, ParseMode::Render { lang }, &mut |mut ex| {
        if callback_error.is_some() {
            return None;
        }
        normalize_extracted(job, &mut ex);
        if ex.string.is_empty() {
            return None;
        }
        let Some(assigned) = assignments.get(index) else {
            return None;
        };
        index += 1;
        let context = assigned.context.clone();

        match translate_one(store, job, &file_rec, &ex.string, &context, &ex.hint, &ex.flags, lang) {
            Ok(text) => Some(text),
            Err(e) => {
                callback_error = Some(e);
                None
            }
        }
    });
    if let Some(e) = callback_error {
        return Err(e);
    }
    let rendered = match rendered {
        Ok(Some(r)) => r,
        Ok(None) => {
            summary.warn(Some(&pf.rel), Some(lang), "parser returned no rendered output");
            return Ok(());
        }
        Err(e) => {
            warn!(file = %pf.rel, lang, "render failed: {e}");
            summary.warn(Some(&pf.rel), Some(lang), format!("render failed: {e}"));
            return Ok(());
        }
    };

    let bytes = job.output_encoding.encode(&rendered);
    let new_hash = md5_hex_bytes(&bytes);

    let stored_target = store.get_property(PropKey::Target { file: file_id, job: job_id, lang });
    let stored_mtime = store.get_property(PropKey::TargetMtime { file: file_id, job: job_id, lang });
    let mtime_now = mtime_string(&target);
    let unchanged = optimizations
        && stored_target.as_deref() == Some(new_hash.as_str())
        && mtime_now.is_some()
        && mtime_now == stored_mtime;
    if unchanged {
        return Ok(());
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, &bytes)?;
    debug!(file = %pf.rel, lang, "localized file written");
    summary.localized_files_written += 1;

    // Re-read the mtime so the next run can detect external edits.
    let mtime = mtime_string(&target).unwrap_or_default();
    store.set_property(PropKey::Target { file: file_id, job: job_id, lang }, &new_hash)?;
    store.set_property(PropKey::TargetMtime { file: file_id, job: job_id, lang }, &mtime)?;
    store.set_property(PropKey::TargetSource { file: file_id, job: job_id, lang }, &source_hash)?;
    store.set_property(PropKey::TargetSourceTs { file: file_id, job: job_id, lang }, &ts_hash)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn translate_one(
    store: &Store,
    job: &Job,
    file: &locsync_store::FileRec,
    string: &str,
    context: &str,
    hint: &str,
    flags: &[String],
    lang: &str,
) -> Result<String> {
    let resolved = match store.get_string_id(string, context, false)? {
        Some(string_id) => match store.get_item_id(file.id, string_id, false)? {
            Some(item_id) => {
                let string_rec = store.get_string(string_id)?;
                let req = ResolveRequest {
                    file,
                    item_id,
                    string: &string_rec,
                    hint,
                };
                resolve_translation(store, job, &req, lang, false)?
            }
            None => None,
        },
        None => None,
    };

    let mut text = match resolved {
        Some(r) if !r.text.is_empty() => r.text,
        _ => string.to_string(),
    };

    let query = TranslationQuery {
        file: &file.path,
        lang,
        string,
        context,
        hint,
    };
    if job.hooks.apply_rewrite_translation(&query, &mut text) {
        text = nfc(&text);
    }

    if let Some(width) = flags.iter().find_map(|f| {
        f.strip_prefix("pad:").and_then(|w| w.parse::<usize>().ok())
    }) {
        let len = text.chars().count();
        if len < width {
            text.extend(std::iter::repeat(' ').take(width - len));
        }
    }

    Ok(text)
}
