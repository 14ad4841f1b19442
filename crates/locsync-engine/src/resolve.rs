//! Translation resolution: the ordered lookup chain behind both TS
//! emission and localized rendering.
//!
//! Order of attempts, first non-empty wins: pre-store hooks, direct store
//! lookup, cross-file reuse, post-store hooks, similar-language recursion.
//! Reused translations are written back so the next run finds them
//! directly, unless they came in through a similar-language branch.

use locsync_core::Result;
use locsync_store::{FileRec, ItemId, Store, StringRec};

use crate::hooks::{HookBus, TranslationQuery};
use crate::job::Job;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub text: String,
    pub fuzzy: bool,
    pub comment: Option<String>,
}

pub struct ResolveRequest<'a> {
    pub file: &'a FileRec,
    pub item_id: ItemId,
    pub string: &'a StringRec,
    pub hint: &'a str,
}

/// Resolve the translation of one item for `lang`.
///
/// `disallow_similar` guards the similar-language recursion against cycles:
/// a lookup that already descended through a rule never descends again.
pub fn resolve_translation(
    store: &Store,
    job: &Job,
    req: &ResolveRequest<'_>,
    lang: &str,
    disallow_similar: bool,
) -> Result<Option<Resolved>> {
    let query = TranslationQuery {
        file: &req.file.path,
        lang,
        string: &req.string.text,
        context: &req.string.context,
        hint: req.hint,
    };

    if let Some((text, fuzzy)) = HookBus::first_lookup(&job.hooks.get_translation_pre, &query) {
        if !text.is_empty() {
            return Ok(Some(Resolved { text, fuzzy, comment: None }));
        }
    }

    if req.string.skip {
        return Ok(None);
    }

    if let Some(rec) = store.get_translation(req.item_id, lang)? {
        if let Some(text) = rec.text.filter(|t| !t.is_empty()) {
            return Ok(Some(Resolved {
                text,
                fuzzy: rec.fuzzy,
                comment: rec.comment,
            }));
        }
    }

    let mut resolved: Option<Resolved> = None;
    let mut need_save = false;

    if job.reuse_translations {
        // The per-language existence set lets us skip the join query for
        // strings this language has never translated anywhere.
        let worth_querying = store.lang_has_string(lang, &req.string.text).unwrap_or(true);
        if worth_querying {
            if let Some(best) = store.find_best_translation(
                &req.file.namespace,
                &req.file.path,
                &req.string.text,
                &req.string.context,
                lang,
                false,
            )? {
                if !(best.multiple_variants && !job.reuse_uncertain) {
                    let fuzzy = if best.fuzzy {
                        true
                    } else {
                        job.reuse_as_fuzzy.iter().any(|l| l == lang)
                            || (job.reuse_as_fuzzy_default
                                && !job.reuse_as_not_fuzzy.iter().any(|l| l == lang))
                    };
                    resolved = Some(Resolved {
                        text: best.text,
                        fuzzy,
                        comment: best.comment,
                    });
                    need_save = true;
                }
            }
        }
    }

    if resolved.is_none() {
        if let Some((text, fuzzy)) = HookBus::first_lookup(&job.hooks.get_translation, &query) {
            if !text.is_empty() {
                resolved = Some(Resolved { text, fuzzy, comment: None });
            }
        }
    }

    if resolved.is_none() && !disallow_similar {
        'rules: for rule in job.similar_sources_for(lang) {
            let mut sources = rule.sources.clone();
            sources.sort();
            for source_lang in &sources {
                if let Some(mut r) = resolve_translation(store, job, req, source_lang, true)? {
                    if rule.as_fuzzy {
                        r.fuzzy = true;
                    }
                    // Inherited translations are not written back; the
                    // source language owns them.
                    resolved = Some(r);
                    break 'rules;
                }
            }
        }
    }

    if need_save {
        if let Some(r) = &resolved {
            store.upsert_translation(
                req.item_id,
                lang,
                Some(&r.text),
                r.fuzzy,
                r.comment.as_deref(),
                false,
            )?;
        }
    }

    Ok(resolved)
}
