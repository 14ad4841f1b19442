//! Source tree walk and file reconciliation.
//!
//! The walk produces sorted relative paths; reconciliation classifies them
//! against the store's known files and resolves renames by content hash so
//! a moved file keeps its items (and therefore its translations).

use std::collections::HashMap;
use std::path::PathBuf;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use locsync_core::hash::md5_hex;
use locsync_core::text::read_and_normalize;
use locsync_core::{Error, Result};
use locsync_domain::JobSummary;
use locsync_store::{FileId, FileRec, PropKey, Store};

use crate::job::Job;

pub struct SourceScan {
    /// Sorted relative paths (slash-separated, prefix applied).
    pub files: Vec<String>,
    pub abs: HashMap<String, PathBuf>,
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat)
            .map_err(|e| Error::Config(format!("invalid glob pattern '{pat}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("cannot build glob set: {e}")))
}

/// Walk the job's source tree applying the include/exclude filters and the
/// `rewrite_path` hook.
pub fn scan_source_tree(job: &Job) -> Result<SourceScan> {
    let include = build_globset(&job.source_match)?;
    let exclude = build_globset(&job.source_exclude)?;
    let exclude_dirs = build_globset(&job.source_exclude_dirs)?;

    let max_depth = if job.source_process_subdirs {
        usize::MAX
    } else {
        1
    };

    let mut files = Vec::new();
    let mut abs = HashMap::new();
    let walker = WalkDir::new(&job.source_dir)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            let rel = entry
                .path()
                .strip_prefix(&job.source_dir)
                .unwrap_or(entry.path());
            let rel = rel.to_string_lossy().replace('\\', "/");
            rel.is_empty() || !exclude_dirs.is_match(&rel)
        });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel_path = entry
            .path()
            .strip_prefix(&job.source_dir)
            .unwrap_or(entry.path());
        let rel = rel_path.to_string_lossy().replace('\\', "/");
        if !job.source_match.is_empty() && !include.is_match(&rel) {
            continue;
        }
        if exclude.is_match(&rel) {
            continue;
        }
        let mut rel = match &job.source_path_prefix {
            Some(prefix) => format!("{prefix}/{rel}"),
            None => rel,
        };
        job.hooks.apply_rewrite_path(&mut rel);
        abs.insert(rel.clone(), entry.path().to_path_buf());
        files.push(rel);
    }

    files.sort();
    debug!(count = files.len(), "source tree scanned");
    Ok(SourceScan { files, abs })
}

/// Classification of scanned files against the store.
pub struct FileSets {
    /// In scan, not in store.
    pub new_files: Vec<String>,
    /// In scan, in store with `orphaned = true`.
    pub unorphaned: Vec<FileRec>,
    /// In store with `orphaned = false`, not in scan.
    pub orphan_candidates: Vec<FileRec>,
    /// `(file, old_path, new_path)` pairs resolved by content hash.
    pub renames: Vec<(FileId, String, String)>,
}

/// Compare the scan against known files and resolve renames.
///
/// Rename detection only runs when both the new and the
/// orphaned-candidate sets are non-empty: files are grouped by size, new
/// files are content-hashed, and a hash match against a candidate's stored
/// `hash:` property reclassifies the pair as a rename.
pub fn reconcile_files(
    store: &Store,
    job: &Job,
    scan: &SourceScan,
    summary: &mut JobSummary,
) -> Result<FileSets> {
    let known = store.files_for_job(&job.namespace, &job.id)?;
    let known_by_path: HashMap<&str, &FileRec> =
        known.iter().map(|f| (f.path.as_str(), f)).collect();

    let mut sets = FileSets {
        new_files: Vec::new(),
        unorphaned: Vec::new(),
        orphan_candidates: Vec::new(),
        renames: Vec::new(),
    };

    for rel in &scan.files {
        match known_by_path.get(rel.as_str()) {
            Some(rec) if rec.orphaned => sets.unorphaned.push((*rec).clone()),
            Some(_) => {}
            None => sets.new_files.push(rel.clone()),
        }
    }
    for rec in &known {
        if !rec.orphaned && !scan.abs.contains_key(&rec.path) {
            sets.orphan_candidates.push(rec.clone());
        }
    }

    if sets.new_files.is_empty() || sets.orphan_candidates.is_empty() {
        return Ok(sets);
    }

    // Group by size first; hashing is only paid inside matching classes.
    let mut new_by_size: HashMap<u64, Vec<String>> = HashMap::new();
    for rel in &sets.new_files {
        let Some(abs) = scan.abs.get(rel) else { continue };
        match std::fs::metadata(abs) {
            Ok(meta) => new_by_size.entry(meta.len()).or_default().push(rel.clone()),
            Err(e) => warn!(file = %rel, "cannot stat new file: {e}"),
        }
    }
    let mut orphans_by_size: HashMap<u64, Vec<FileRec>> = HashMap::new();
    for rec in &sets.orphan_candidates {
        let Some(size) = store
            .get_property(PropKey::Size(rec.id))
            .and_then(|s| s.parse::<u64>().ok())
        else {
            continue;
        };
        orphans_by_size.entry(size).or_default().push(rec.clone());
    }

    for (size, orphans) in orphans_by_size {
        let Some(candidates) = new_by_size.get(&size) else {
            continue;
        };
        let mut hash_to_new: HashMap<String, String> = HashMap::new();
        for rel in candidates {
            if let Some(abs) = scan.abs.get(rel) {
                let (text, _) = read_and_normalize(abs)?;
                hash_to_new.entry(md5_hex(&text)).or_insert_with(|| rel.clone());
            }
        }
        for rec in orphans {
            let Some(stored_hash) = store.get_property(PropKey::Hash(rec.id)) else {
                continue;
            };
            if let Some(new_rel) = hash_to_new.remove(&stored_hash) {
                debug!(from = %rec.path, to = %new_rel, "rename detected");
                store.set_file_path(rec.id, &new_rel)?;
                sets.new_files.retain(|r| r != &new_rel);
                sets.orphan_candidates.retain(|r| r.id != rec.id);
                sets.renames.push((rec.id, rec.path.clone(), new_rel));
                summary.files_renamed += 1;
            }
        }
    }

    Ok(sets)
}
