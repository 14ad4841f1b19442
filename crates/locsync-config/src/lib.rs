//! `locsync.toml` loading.
//!
//! Search order: explicit path, or `locsync.toml` in the working directory
//! merged over `<config dir>/locsync/locsync.toml`. The merge is
//! option-wise: the working-directory file wins field by field, and jobs
//! with the same id are folded together the same way.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LocsyncConfig {
    /// Path of the sqlite store, relative to the config file's directory.
    pub store: Option<String>,
    #[serde(rename = "job")]
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub id: String,
    pub namespace: Option<String>,
    pub source_dir: String,
    pub ts_dir: String,
    pub output_dir: String,
    /// Parser to use; currently only "keyed-xml".
    pub parser: Option<String>,
    pub source_language: Option<String>,
    pub destination_languages: Vec<String>,
    pub source_match: Option<Vec<String>>,
    pub source_exclude: Option<Vec<String>>,
    pub source_exclude_dirs: Option<Vec<String>>,
    pub source_path_prefix: Option<String>,
    pub source_process_subdirs: Option<bool>,
    pub normalize_strings: Option<bool>,
    pub reuse_translations: Option<bool>,
    pub reuse_uncertain: Option<bool>,
    pub reuse_as_fuzzy: Option<Vec<String>>,
    pub reuse_as_not_fuzzy: Option<Vec<String>>,
    pub reuse_as_fuzzy_default: Option<bool>,
    #[serde(rename = "similar_language")]
    pub similar_languages: Vec<SimilarLanguageConfig>,
    pub output_only_mode: Option<bool>,
    pub rebuild_ts_files: Option<bool>,
    pub output_default_lang_file: Option<bool>,
    pub output_encoding: Option<String>,
    pub optimizations: Option<bool>,
    pub ts_path_template: Option<String>,
    pub output_path_template: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimilarLanguageConfig {
    pub destination: String,
    pub sources: Vec<String>,
    pub as_fuzzy: Option<bool>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("no locsync.toml found")]
    NotFound,
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Load configuration from an explicit path.
pub fn load_config_from(path: &Path) -> Result<LocsyncConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })
}

/// Load configuration from the standard search locations, merging the
/// working-directory file over the user-level one. The returned path is
/// the primary (first found) file; relative paths anchor there.
pub fn load_config() -> Result<(LocsyncConfig, PathBuf), ConfigError> {
    let mut candidates = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("locsync.toml"));
    }
    if let Some(base) = dirs::config_dir() {
        candidates.push(base.join("locsync").join("locsync.toml"));
    }

    let mut merged: Option<LocsyncConfig> = None;
    let mut primary: Option<PathBuf> = None;
    for path in candidates {
        if !path.is_file() {
            continue;
        }
        let cfg = load_config_from(&path)?;
        merged = Some(match merged {
            Some(acc) => merge(acc, cfg),
            None => cfg,
        });
        if primary.is_none() {
            primary = Some(path);
        }
    }
    match (merged, primary) {
        (Some(cfg), Some(path)) => Ok((cfg, path)),
        _ => Err(ConfigError::NotFound),
    }
}

fn merge(mut a: LocsyncConfig, b: LocsyncConfig) -> LocsyncConfig {
    if a.store.is_none() {
        a.store = b.store;
    }
    for job in b.jobs {
        match a.jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => merge_job(existing, job),
            None => a.jobs.push(job),
        }
    }
    a
}

fn merge_job(a: &mut JobConfig, b: JobConfig) {
    if a.source_dir.is_empty() {
        a.source_dir = b.source_dir;
    }
    if a.ts_dir.is_empty() {
        a.ts_dir = b.ts_dir;
    }
    if a.output_dir.is_empty() {
        a.output_dir = b.output_dir;
    }
    if a.destination_languages.is_empty() {
        a.destination_languages = b.destination_languages;
    }
    if a.similar_languages.is_empty() {
        a.similar_languages = b.similar_languages;
    }
    merge_opt(&mut a.namespace, b.namespace);
    merge_opt(&mut a.parser, b.parser);
    merge_opt(&mut a.source_language, b.source_language);
    merge_opt(&mut a.source_match, b.source_match);
    merge_opt(&mut a.source_exclude, b.source_exclude);
    merge_opt(&mut a.source_exclude_dirs, b.source_exclude_dirs);
    merge_opt(&mut a.source_path_prefix, b.source_path_prefix);
    merge_opt(&mut a.source_process_subdirs, b.source_process_subdirs);
    merge_opt(&mut a.normalize_strings, b.normalize_strings);
    merge_opt(&mut a.reuse_translations, b.reuse_translations);
    merge_opt(&mut a.reuse_uncertain, b.reuse_uncertain);
    merge_opt(&mut a.reuse_as_fuzzy, b.reuse_as_fuzzy);
    merge_opt(&mut a.reuse_as_not_fuzzy, b.reuse_as_not_fuzzy);
    merge_opt(&mut a.reuse_as_fuzzy_default, b.reuse_as_fuzzy_default);
    merge_opt(&mut a.output_only_mode, b.output_only_mode);
    merge_opt(&mut a.rebuild_ts_files, b.rebuild_ts_files);
    merge_opt(&mut a.output_default_lang_file, b.output_default_lang_file);
    merge_opt(&mut a.output_encoding, b.output_encoding);
    merge_opt(&mut a.optimizations, b.optimizations);
    merge_opt(&mut a.ts_path_template, b.ts_path_template);
    merge_opt(&mut a.output_path_template, b.output_path_template);
}

fn merge_opt<T>(a: &mut Option<T>, b: Option<T>) {
    if a.is_none() {
        *a = b;
    }
}
