//! The job model: one source tree, one parser, one set of destination
//! languages, plus every switch that changes how the pipeline behaves.

use std::path::{Path, PathBuf};

use locsync_core::hash::md5_hex;
use locsync_core::SourceParser;
use locsync_config::JobConfig;

use crate::hooks::HookBus;

/// A target language that may inherit translations from designated source
/// languages (e.g. Brazilian Portuguese from European Portuguese).
#[derive(Debug, Clone)]
pub struct SimilarLanguageRule {
    pub destination: String,
    pub sources: Vec<String>,
    pub as_fuzzy: bool,
}

/// Encoding of localized output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEncoding {
    Utf8 { bom: bool },
    Utf16Le { bom: bool },
    Utf16Be { bom: bool },
    Utf32Le { bom: bool },
    Utf32Be { bom: bool },
    /// ASCII with `\uXXXX` escapes for everything else, as Java property
    /// files expect.
    Java,
}

impl OutputEncoding {
    pub fn parse(label: &str) -> Option<Self> {
        Some(match label.to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => Self::Utf8 { bom: false },
            "UTF-8-BOM" | "UTF8-BOM" => Self::Utf8 { bom: true },
            "UTF-16LE" => Self::Utf16Le { bom: false },
            "UTF-16LE-BOM" => Self::Utf16Le { bom: true },
            "UTF-16BE" => Self::Utf16Be { bom: false },
            "UTF-16BE-BOM" => Self::Utf16Be { bom: true },
            "UTF-32LE" => Self::Utf32Le { bom: false },
            "UTF-32LE-BOM" => Self::Utf32Le { bom: true },
            "UTF-32BE" => Self::Utf32Be { bom: false },
            "UTF-32BE-BOM" => Self::Utf32Be { bom: true },
            "JAVA" => Self::Java,
            _ => return None,
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Utf8 { bom: false } => "UTF-8",
            Self::Utf8 { bom: true } => "UTF-8-BOM",
            Self::Utf16Le { bom: false } => "UTF-16LE",
            Self::Utf16Le { bom: true } => "UTF-16LE-BOM",
            Self::Utf16Be { bom: false } => "UTF-16BE",
            Self::Utf16Be { bom: true } => "UTF-16BE-BOM",
            Self::Utf32Le { bom: false } => "UTF-32LE",
            Self::Utf32Le { bom: true } => "UTF-32LE-BOM",
            Self::Utf32Be { bom: false } => "UTF-32BE",
            Self::Utf32Be { bom: true } => "UTF-32BE-BOM",
            Self::Java => "JAVA",
        }
    }

    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 { bom } => {
                let mut out = Vec::with_capacity(text.len() + 3);
                if *bom {
                    out.extend_from_slice(&[0xEF, 0xBB, 0xBF]);
                }
                out.extend_from_slice(text.as_bytes());
                out
            }
            Self::Utf16Le { bom } => {
                let mut out = Vec::with_capacity(text.len() * 2 + 2);
                if *bom {
                    out.extend_from_slice(&[0xFF, 0xFE]);
                }
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
                out
            }
            Self::Utf16Be { bom } => {
                let mut out = Vec::with_capacity(text.len() * 2 + 2);
                if *bom {
                    out.extend_from_slice(&[0xFE, 0xFF]);
                }
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_be_bytes());
                }
                out
            }
            Self::Utf32Le { bom } => {
                let mut out = Vec::with_capacity(text.len() * 4 + 4);
                if *bom {
                    out.extend_from_slice(&[0xFF, 0xFE, 0x00, 0x00]);
                }
                for ch in text.chars() {
                    out.extend_from_slice(&(ch as u32).to_le_bytes());
                }
                out
            }
            Self::Utf32Be { bom } => {
                let mut out = Vec::with_capacity(text.len() * 4 + 4);
                if *bom {
                    out.extend_from_slice(&[0x00, 0x00, 0xFE, 0xFF]);
                }
                for ch in text.chars() {
                    out.extend_from_slice(&(ch as u32).to_be_bytes());
                }
                out
            }
            Self::Java => {
                let mut out = Vec::with_capacity(text.len());
                for ch in text.chars() {
                    if ch.is_ascii() {
                        out.push(ch as u8);
                    } else {
                        let mut units = [0u16; 2];
                        for unit in ch.encode_utf16(&mut units) {
                            out.extend_from_slice(format!("\\u{unit:04X}").as_bytes());
                        }
                    }
                }
                out
            }
        }
    }
}

pub const DEFAULT_TS_PATH_TEMPLATE: &str = "%LANG%/%FILE%.po";
pub const DEFAULT_OUTPUT_PATH_TEMPLATE: &str = "%LANG%/%FILE%";

pub struct Job {
    pub id: String,
    pub namespace: String,
    pub source_dir: PathBuf,
    pub ts_dir: PathBuf,
    pub output_dir: PathBuf,
    pub source_language: String,
    pub destination_languages: Vec<String>,
    /// External modified set; `None` means all destinations are modified.
    pub modified_languages: Option<Vec<String>>,
    pub source_match: Vec<String>,
    pub source_exclude: Vec<String>,
    pub source_exclude_dirs: Vec<String>,
    pub source_path_prefix: Option<String>,
    pub source_process_subdirs: bool,
    pub normalize_strings: bool,
    pub reuse_translations: bool,
    pub reuse_uncertain: bool,
    pub reuse_as_fuzzy: Vec<String>,
    pub reuse_as_not_fuzzy: Vec<String>,
    pub reuse_as_fuzzy_default: bool,
    pub similar_languages: Vec<SimilarLanguageRule>,
    pub output_only_mode: bool,
    pub rebuild_ts_files: bool,
    pub output_default_lang_file: bool,
    pub output_encoding: OutputEncoding,
    pub optimizations: bool,
    pub ts_path_template: String,
    pub output_path_template: String,
    pub debug_nosave_ts: bool,
    pub debug_nosave_loc: bool,
    pub parser: Box<dyn SourceParser>,
    pub hooks: HookBus,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        source_dir: impl Into<PathBuf>,
        ts_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        parser: Box<dyn SourceParser>,
    ) -> Self {
        Self {
            id: id.into(),
            namespace: "default".to_string(),
            source_dir: source_dir.into(),
            ts_dir: ts_dir.into(),
            output_dir: output_dir.into(),
            source_language: "en".to_string(),
            destination_languages: Vec::new(),
            modified_languages: None,
            source_match: Vec::new(),
            source_exclude: Vec::new(),
            source_exclude_dirs: Vec::new(),
            source_path_prefix: None,
            source_process_subdirs: true,
            normalize_strings: true,
            reuse_translations: false,
            reuse_uncertain: false,
            reuse_as_fuzzy: Vec::new(),
            reuse_as_not_fuzzy: Vec::new(),
            reuse_as_fuzzy_default: false,
            similar_languages: Vec::new(),
            output_only_mode: false,
            rebuild_ts_files: false,
            output_default_lang_file: false,
            output_encoding: OutputEncoding::Utf8 { bom: false },
            optimizations: true,
            ts_path_template: DEFAULT_TS_PATH_TEMPLATE.to_string(),
            output_path_template: DEFAULT_OUTPUT_PATH_TEMPLATE.to_string(),
            debug_nosave_ts: false,
            debug_nosave_loc: false,
            parser,
            hooks: HookBus::default(),
        }
    }

    /// Build a job from its config table. The base directory anchors the
    /// job's relative paths (normally the config file's directory).
    pub fn from_config(
        cfg: &JobConfig,
        base: &Path,
        parser: Box<dyn SourceParser>,
    ) -> locsync_core::Result<Self> {
        let mut job = Job::new(
            cfg.id.clone(),
            base.join(&cfg.source_dir),
            base.join(&cfg.ts_dir),
            base.join(&cfg.output_dir),
            parser,
        );
        if let Some(ns) = &cfg.namespace {
            job.namespace = ns.clone();
        }
        if let Some(lang) = &cfg.source_language {
            job.source_language = lang.clone();
        }
        job.destination_languages = cfg.destination_languages.clone();
        if let Some(v) = &cfg.source_match {
            job.source_match = v.clone();
        }
        if let Some(v) = &cfg.source_exclude {
            job.source_exclude = v.clone();
        }
        if let Some(v) = &cfg.source_exclude_dirs {
            job.source_exclude_dirs = v.clone();
        }
        job.source_path_prefix = cfg.source_path_prefix.clone();
        if let Some(v) = cfg.source_process_subdirs {
            job.source_process_subdirs = v;
        }
        if let Some(v) = cfg.normalize_strings {
            job.normalize_strings = v;
        }
        if let Some(v) = cfg.reuse_translations {
            job.reuse_translations = v;
        }
        if let Some(v) = cfg.reuse_uncertain {
            job.reuse_uncertain = v;
        }
        if let Some(v) = &cfg.reuse_as_fuzzy {
            job.reuse_as_fuzzy = v.clone();
        }
        if let Some(v) = &cfg.reuse_as_not_fuzzy {
            job.reuse_as_not_fuzzy = v.clone();
        }
        if let Some(v) = cfg.reuse_as_fuzzy_default {
            job.reuse_as_fuzzy_default = v;
        }
        job.similar_languages = cfg
            .similar_languages
            .iter()
            .map(|s| SimilarLanguageRule {
                destination: s.destination.clone(),
                sources: s.sources.clone(),
                as_fuzzy: s.as_fuzzy.unwrap_or(false),
            })
            .collect();
        if let Some(v) = cfg.output_only_mode {
            job.output_only_mode = v;
        }
        if let Some(v) = cfg.rebuild_ts_files {
            job.rebuild_ts_files = v;
        }
        if let Some(v) = cfg.output_default_lang_file {
            job.output_default_lang_file = v;
        }
        if let Some(label) = &cfg.output_encoding {
            job.output_encoding = OutputEncoding::parse(label).ok_or_else(|| {
                locsync_core::Error::Config(format!("unknown output encoding: {label}"))
            })?;
        }
        if let Some(v) = cfg.optimizations {
            job.optimizations = v;
        }
        if let Some(v) = &cfg.ts_path_template {
            job.ts_path_template = v.clone();
        }
        if let Some(v) = &cfg.output_path_template {
            job.output_path_template = v.clone();
        }
        Ok(job)
    }

    pub fn ts_path_for(&self, lang: &str, rel: &str) -> PathBuf {
        self.ts_dir.join(resolve_template(&self.ts_path_template, lang, rel))
    }

    pub fn output_path_for(&self, lang: &str, rel: &str) -> PathBuf {
        self.output_dir
            .join(resolve_template(&self.output_path_template, lang, rel))
    }

    /// Stable hash of the configuration fields that invalidate stored state
    /// when they change. Compared against the stored `job-hash` property to
    /// decide whether optimizations may apply.
    pub fn fingerprint(&self) -> String {
        let mut parts: Vec<String> = vec![
            self.namespace.clone(),
            self.id.clone(),
            self.source_dir.to_string_lossy().into_owned(),
            self.ts_dir.to_string_lossy().into_owned(),
            self.output_dir.to_string_lossy().into_owned(),
            self.source_language.clone(),
            self.destination_languages.join(","),
            self.source_match.join(","),
            self.source_exclude.join(","),
            self.source_exclude_dirs.join(","),
            self.source_path_prefix.clone().unwrap_or_default(),
            self.source_process_subdirs.to_string(),
            self.normalize_strings.to_string(),
            self.reuse_translations.to_string(),
            self.reuse_uncertain.to_string(),
            self.reuse_as_fuzzy.join(","),
            self.reuse_as_not_fuzzy.join(","),
            self.reuse_as_fuzzy_default.to_string(),
            self.output_only_mode.to_string(),
            self.output_default_lang_file.to_string(),
            self.output_encoding.label().to_string(),
            self.ts_path_template.clone(),
            self.output_path_template.clone(),
        ];
        for rule in &self.similar_languages {
            parts.push(format!(
                "similar:{}<{}:{}",
                rule.destination,
                rule.sources.join("+"),
                rule.as_fuzzy
            ));
        }
        md5_hex(&parts.join("\n"))
    }

    /// Destination languages intersected with the external modified set.
    pub fn modified_destinations(&self) -> Vec<String> {
        match &self.modified_languages {
            Some(set) => self
                .destination_languages
                .iter()
                .filter(|l| set.contains(l))
                .cloned()
                .collect(),
            None => self.destination_languages.clone(),
        }
    }

    /// Similar-language source languages feeding `lang`, sorted.
    pub fn similar_sources_for(&self, lang: &str) -> Vec<&SimilarLanguageRule> {
        self.similar_languages
            .iter()
            .filter(|r| r.destination == lang)
            .collect()
    }
}

fn resolve_template(template: &str, lang: &str, rel: &str) -> PathBuf {
    let path = Path::new(rel);
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = path
        .parent()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();
    let resolved = template
        .replace("%LANG%", lang)
        .replace("%FILE%", rel)
        .replace("%NAME%", &name)
        .replace("%EXT%", &ext)
        .replace("%PATH%", &parent);
    PathBuf::from(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use locsync_core::{Extracted, ParseMode, Result, SourceParser};

    struct NullParser;
    impl SourceParser for NullParser {
        fn name(&self) -> &'static str {
            "null"
        }
        fn parse(
            &self,
            _buffer: &str,
            _mode: ParseMode<'_>,
            _callback: &mut dyn FnMut(Extracted) -> Option<String>,
        ) -> Result<Option<String>> {
            Ok(None)
        }
    }

    fn job() -> Job {
        let mut j = Job::new("app", "/src", "/po", "/out", Box::new(NullParser));
        j.destination_languages = vec!["fr".to_string(), "de".to_string()];
        j
    }

    #[test]
    fn templates_resolve_tokens() {
        let j = job();
        assert_eq!(
            j.ts_path_for("fr", "ui/main.xml"),
            PathBuf::from("/po/fr/ui/main.xml.po")
        );
        assert_eq!(
            j.output_path_for("fr", "ui/main.xml"),
            PathBuf::from("/out/fr/ui/main.xml")
        );
    }

    #[test]
    fn name_and_ext_tokens() {
        let mut j = job();
        j.output_path_template = "%PATH%/%NAME%.%LANG%.%EXT%".to_string();
        assert_eq!(
            j.output_path_for("fr", "ui/main.xml"),
            PathBuf::from("/out/ui/main.fr.xml")
        );
    }

    #[test]
    fn fingerprint_changes_with_config() {
        let a = job().fingerprint();
        let mut j = job();
        j.destination_languages.push("ja".to_string());
        assert_ne!(a, j.fingerprint());
        let mut j2 = job();
        j2.normalize_strings = false;
        assert_ne!(a, j2.fingerprint());
        assert_eq!(a, job().fingerprint());
    }

    #[test]
    fn modified_destinations_intersect() {
        let mut j = job();
        j.modified_languages = Some(vec!["de".to_string(), "ja".to_string()]);
        assert_eq!(j.modified_destinations(), vec!["de".to_string()]);
        j.modified_languages = None;
        assert_eq!(j.modified_destinations().len(), 2);
    }

    #[test]
    fn java_encoding_escapes_non_ascii() {
        let bytes = OutputEncoding::Java.encode("héllo");
        assert_eq!(bytes, b"h\\u00E9llo".to_vec());
    }

    #[test]
    fn utf16le_bom_round_trips_through_detection() {
        let bytes = OutputEncoding::Utf16Le { bom: true }.encode("héllo");
        let (text, enc) = locsync_core::text::decode_and_normalize(&bytes);
        assert_eq!(text, "héllo");
        assert_eq!(enc, "UTF-16LE");
    }
}
