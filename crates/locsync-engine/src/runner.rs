//! The pipeline driver: runs one job end-to-end inside a single store
//! transaction.
//!
//! Stage order: fingerprint gate, source scan + database update, TS
//! ingestion, TS emission, localized emission, fingerprint commit. A fatal
//! error anywhere rolls the transaction back; per-file problems are
//! warnings and the pipeline continues.

use tracing::{debug, info, warn};

use locsync_core::{Error, Result, ENGINE_VERSION};
use locsync_domain::{FileStat, JobSummary};
use locsync_store::{PropKey, Store};

use crate::emit_target::generate_localized_files;
use crate::emit_ts::{generate_ts_files, ForceSet};
use crate::extract::{process_source_file, Outcome, ParsedFile};
use crate::hooks::HookBus;
use crate::job::Job;
use crate::scan::{reconcile_files, scan_source_tree};

/// Environment override: any non-empty value disables optimizations for
/// the run, as if the job fingerprint had changed.
pub const DISABLE_OPTIMIZATIONS_ENV: &str = "LOCSYNC_DISABLE_OPTIMIZATIONS";

/// Run one job. The store transaction is committed only on success.
pub fn run_job(store: &Store, job: &Job) -> Result<JobSummary> {
    validate_job(job)?;
    store.begin()?;
    let mut summary = JobSummary::new(&job.id);
    match run_job_inner(store, job, &mut summary) {
        Ok(()) => {
            store.commit()?;
            Ok(summary)
        }
        Err(e) => {
            let _ = store.rollback();
            Err(e)
        }
    }
}

fn validate_job(job: &Job) -> Result<()> {
    if !job.source_dir.is_dir() {
        return Err(Error::Config(format!(
            "source directory does not exist: {}",
            job.source_dir.display()
        )));
    }
    if job.destination_languages.is_empty() {
        return Err(Error::Config("no destination languages".to_string()));
    }
    Ok(())
}

fn run_job_inner(store: &Store, job: &Job, summary: &mut JobSummary) -> Result<()> {
    let optimizations = decide_optimizations(store, job);
    let modified_langs = job.modified_destinations();
    info!(
        job = %job.id,
        optimizations,
        modified = modified_langs.len(),
        "job started"
    );

    HookBus::fire(&job.hooks.before_job, &job.id);

    // Warm caches once per run.
    let mut preload_langs = job.destination_languages.clone();
    for rule in &job.similar_languages {
        for src in &rule.sources {
            if !preload_langs.contains(src) {
                preload_langs.push(src.clone());
            }
        }
    }
    store.preload_translations_for_job(&job.namespace, &job.id, &preload_langs)?;
    if job.reuse_translations {
        for lang in &preload_langs {
            store.preload_strings_for_lang(lang)?;
        }
    }

    // ── Source scan & database update ───────────────────────────────────
    HookBus::fire(&job.hooks.before_update_database_from_source_files, &job.id);
    let scan = scan_source_tree(job)?;
    summary.files_scanned = scan.files.len();
    let sets = reconcile_files(store, job, &scan, summary)?;

    let mut files: Vec<ParsedFile> = Vec::new();
    let mut asserted_orphans: Vec<String> = Vec::new();
    for rel in &scan.files {
        let abs = scan.abs.get(rel).expect("scanned path has an absolute path");
        match process_source_file(store, job, rel, abs, optimizations, summary)? {
            Outcome::Parsed(pf) => {
                summary.files.push(FileStat {
                    path: rel.clone(),
                    status: if pf.skipped { "skipped" } else { "parsed" }.to_string(),
                    items: pf.item_order.len(),
                });
                files.push(pf);
            }
            Outcome::AssertOrphaned => {
                debug!(file = %rel, "orphan asserted by hook");
                asserted_orphans.push(rel.clone());
            }
            Outcome::Dropped => {
                summary.files.push(FileStat {
                    path: rel.clone(),
                    status: "failed".to_string(),
                    items: 0,
                });
            }
        }
    }

    if !job.output_only_mode {
        flip_orphan_flags(store, job, &sets.unorphaned, &sets.orphan_candidates, &asserted_orphans, summary)?;
    }

    // ── TS ingestion ────────────────────────────────────────────────────
    if !job.output_only_mode && !job.rebuild_ts_files {
        HookBus::fire(&job.hooks.before_update_database_from_ts_file, &job.id);
        crate::ingest::ingest_ts_files(store, job, &files, &modified_langs, optimizations, summary)?;
    }

    // ── TS emission ─────────────────────────────────────────────────────
    let force: ForceSet = if !job.output_only_mode && !job.debug_nosave_ts {
        HookBus::fire(&job.hooks.before_generate_ts_files, &job.id);
        generate_ts_files(store, job, &files, &modified_langs, optimizations, summary)?
    } else {
        ForceSet::new()
    };

    // ── Localized emission ──────────────────────────────────────────────
    if !job.debug_nosave_loc {
        HookBus::fire(&job.hooks.before_generate_localized_files, &job.id);
        generate_localized_files(store, job, &files, &modified_langs, &force, optimizations, summary)?;
    }

    // ── Fingerprint commit ──────────────────────────────────────────────
    store.set_property(
        PropKey::JobHash { namespace: &job.namespace, job: &job.id },
        &job.fingerprint(),
    )?;
    store.set_property(
        PropKey::JobEngine { namespace: &job.namespace, job: &job.id },
        ENGINE_VERSION,
    )?;
    store.set_property(
        PropKey::JobPlugin { namespace: &job.namespace, job: &job.id },
        &plugin_signature(job),
    )?;

    HookBus::fire(&job.hooks.after_job, &job.id);
    info!(
        job = %job.id,
        parsed = summary.files_parsed,
        skipped = summary.files_skipped,
        ts_written = summary.ts_files_written,
        localized_written = summary.localized_files_written,
        warnings = summary.warnings.len(),
        "job finished"
    );
    Ok(())
}

fn plugin_signature(job: &Job) -> String {
    format!("{} {}", job.parser.name(), job.parser.version())
}

/// Optimizations apply only when the job disagrees with nothing: same
/// fingerprint, same engine, same parser, no environment override, and the
/// job itself allows them.
fn decide_optimizations(store: &Store, job: &Job) -> bool {
    if !job.optimizations {
        return false;
    }
    if std::env::var(DISABLE_OPTIMIZATIONS_ENV).map(|v| !v.is_empty()).unwrap_or(false) {
        debug!("optimizations disabled via environment");
        return false;
    }
    let ns = job.namespace.as_str();
    let id = job.id.as_str();
    let same_hash = store.get_property(PropKey::JobHash { namespace: ns, job: id }).as_deref()
        == Some(job.fingerprint().as_str());
    let same_engine = store.get_property(PropKey::JobEngine { namespace: ns, job: id }).as_deref()
        == Some(ENGINE_VERSION);
    let same_plugin = store.get_property(PropKey::JobPlugin { namespace: ns, job: id }).as_deref()
        == Some(plugin_signature(job).as_str());
    if !(same_hash && same_engine && same_plugin) {
        debug!(same_hash, same_engine, same_plugin, "fingerprint mismatch; optimizations off");
        return false;
    }
    true
}

fn flip_orphan_flags(
    store: &Store,
    job: &Job,
    unorphaned: &[locsync_store::FileRec],
    orphan_candidates: &[locsync_store::FileRec],
    asserted: &[String],
    summary: &mut JobSummary,
) -> Result<()> {
    for rec in unorphaned {
        store.set_file_orphaned(rec.id, false)?;
        // The last parsed item list is exactly the set that was live when
        // the file went away; revive it.
        if let Some(order) = store.get_property(PropKey::Items(rec.id)) {
            for item_id in order.split(',').filter_map(|s| s.parse::<i64>().ok()) {
                if store.get_item(item_id)?.orphaned {
                    store.set_item_orphaned(item_id, false)?;
                }
            }
        }
    }

    let mut to_orphan: Vec<locsync_store::FileRec> = orphan_candidates.to_vec();
    for rel in asserted {
        if let Some(id) = store.get_file_id(&job.namespace, &job.id, rel, false)? {
            let rec = store.get_file(id)?;
            if !rec.orphaned {
                to_orphan.push(rec);
            }
        }
    }
    for rec in to_orphan {
        warn!(file = %rec.path, "file orphaned");
        store.set_file_orphaned(rec.id, true)?;
        for item_id in store.item_ids_for_file(rec.id)? {
            if !store.get_item(item_id)?.orphaned {
                store.set_item_orphaned(item_id, true)?;
            }
        }
        summary.files_orphaned += 1;
        summary.files.push(FileStat {
            path: rec.path.clone(),
            status: "orphaned".to_string(),
            items: 0,
        });
    }
    Ok(())
}
