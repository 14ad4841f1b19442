//! Typed accessors for the property bag.
//!
//! The properties table is a key/value cache of hashes, fingerprints and
//! ordering data. Every key family the engine reads or writes has a variant
//! here; nothing else constructs property keys, so a typo'd key string
//! cannot silently miss the cache.

use std::fmt;

use crate::store::FileId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKey<'a> {
    /// Normalized content hash of a source file at last successful parse.
    Source(FileId),
    /// Content hash used for rename detection.
    Hash(FileId),
    /// Size in bytes of a source file at last successful parse.
    Size(FileId),
    /// Ordered, comma-separated item ids of a file's last parse.
    Items(FileId),
    /// Hash of the TS file last read or written for `(file, lang)`.
    Ts { file: FileId, lang: &'a str },
    /// Item count of the TS file last written for `(file, lang)`.
    TsCount { file: FileId, lang: &'a str },
    /// USN high-water mark at the last TS emission for `(file, lang)`.
    Usn { file: FileId, lang: &'a str },
    /// Content hash of the localized output file.
    Target { file: FileId, job: &'a str, lang: &'a str },
    /// Modification time recorded after writing the localized output file.
    TargetMtime { file: FileId, job: &'a str, lang: &'a str },
    /// Source hash the localized output was rendered from.
    TargetSource { file: FileId, job: &'a str, lang: &'a str },
    /// TS hash the localized output was rendered from.
    TargetSourceTs { file: FileId, job: &'a str, lang: &'a str },
    /// Job configuration fingerprint.
    JobHash { namespace: &'a str, job: &'a str },
    /// Engine version at the last successful run.
    JobEngine { namespace: &'a str, job: &'a str },
    /// Parser name/version at the last successful run.
    JobPlugin { namespace: &'a str, job: &'a str },
}

impl fmt::Display for PropKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Source(id) => write!(f, "source:{id}"),
            PropKey::Hash(id) => write!(f, "hash:{id}"),
            PropKey::Size(id) => write!(f, "size:{id}"),
            PropKey::Items(id) => write!(f, "items:{id}"),
            PropKey::Ts { file, lang } => write!(f, "ts:{file}:{lang}"),
            PropKey::TsCount { file, lang } => write!(f, "ts:{file}:{lang}:count"),
            PropKey::Usn { file, lang } => write!(f, "usn:{file}:{lang}"),
            PropKey::Target { file, job, lang } => write!(f, "target:{file}:{job}:{lang}"),
            PropKey::TargetMtime { file, job, lang } => {
                write!(f, "target:mtime:{file}:{job}:{lang}")
            }
            PropKey::TargetSource { file, job, lang } => write!(f, "source:{file}:{job}:{lang}"),
            PropKey::TargetSourceTs { file, job, lang } => {
                write!(f, "source:ts:{file}:{job}:{lang}")
            }
            PropKey::JobHash { namespace, job } => write!(f, "job-hash:{namespace}:{job}"),
            PropKey::JobEngine { namespace, job } => write!(f, "job-engine:{namespace}:{job}"),
            PropKey::JobPlugin { namespace, job } => write!(f, "job-plugin:{namespace}:{job}"),
        }
    }
}
