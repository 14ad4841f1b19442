pub mod hash;
pub mod parser;
pub mod text;

pub use parser::{Extracted, ParseMode, SourceParser};

/// Engine version, recorded in TS file headers and the per-job fingerprint.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Plural forms are stored as a single string joined on this separator.
pub const PLURAL_SEP: char = '\u{1F}';

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Join plural forms into the single stored representation.
pub fn join_plurals<S: AsRef<str>>(forms: &[S]) -> String {
    let mut out = String::new();
    for (i, f) in forms.iter().enumerate() {
        if i > 0 {
            out.push(PLURAL_SEP);
        }
        out.push_str(f.as_ref());
    }
    out
}

/// Split a stored string back into its plural forms. A string with no
/// separator yields a single form.
pub fn split_plurals(s: &str) -> Vec<&str> {
    s.split(PLURAL_SEP).collect()
}

pub fn has_plurals(s: &str) -> bool {
    s.contains(PLURAL_SEP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plural_join_and_split_round_trip() {
        let joined = join_plurals(&["cat", "cats"]);
        assert!(has_plurals(&joined));
        assert_eq!(split_plurals(&joined), vec!["cat", "cats"]);
    }

    #[test]
    fn singular_has_no_plural_forms() {
        assert!(!has_plurals("cat"));
        assert_eq!(split_plurals("cat"), vec!["cat"]);
    }
}
