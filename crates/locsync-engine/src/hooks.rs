//! The hook bus: named extension points fired at well-defined phases.
//!
//! Each phase owns an ordered handler list with a typed signature. `can_*`
//! phases combine with AND (every handler must allow), `is_file_orphaned`
//! combines with OR (any handler may assert). Handlers receive `&mut`
//! parameters where the phase contract says the field is in/out.

use locsync_core::Extracted;

/// Mutable view of one parsed TS block handed to
/// `rewrite_parsed_ts_file_item` handlers.
#[derive(Debug, Clone, Default)]
pub struct TsItemPatch {
    pub translation: String,
    pub comment: Option<String>,
    pub fuzzy: bool,
    /// When set, replaces the stored item-level comment.
    pub item_comment: Option<String>,
}

/// Read-only context for translation-lookup hooks.
#[derive(Debug, Clone, Copy)]
pub struct TranslationQuery<'a> {
    pub file: &'a str,
    pub lang: &'a str,
    pub string: &'a str,
    pub context: &'a str,
    pub hint: &'a str,
}

pub type PhaseHandler = Box<dyn Fn(&str)>;
pub type LookupHandler = Box<dyn Fn(&TranslationQuery<'_>) -> Option<(String, bool)>>;

#[derive(Default)]
pub struct HookBus {
    pub before_job: Vec<PhaseHandler>,
    pub after_job: Vec<PhaseHandler>,
    pub before_update_database_from_source_files: Vec<PhaseHandler>,
    pub before_update_database_from_ts_file: Vec<PhaseHandler>,
    pub before_generate_ts_files: Vec<PhaseHandler>,
    pub before_generate_localized_files: Vec<PhaseHandler>,
    /// May remap a scanned relative path (in/out).
    pub rewrite_path: Vec<Box<dyn Fn(&mut String)>>,
    /// `(rel_path, content)`; content is in/out.
    pub after_load_source_file_for_processing: Vec<Box<dyn Fn(&str, &mut String)>>,
    /// OR-combined: any handler may demote the file to orphaned.
    pub is_file_orphaned: Vec<Box<dyn Fn(&str) -> bool>>,
    /// AND-combined: `(rel_path, content)`.
    pub can_process_source_file: Vec<Box<dyn Fn(&str, &str) -> bool>>,
    /// AND-combined: `(rel_path, extracted)`.
    pub can_extract: Vec<Box<dyn Fn(&str, &Extracted) -> bool>>,
    /// AND-combined: `(rel_path, lang, string)`.
    pub can_translate: Vec<Box<dyn Fn(&str, &str, &str) -> bool>>,
    /// `(rel_path, lang, patch)`; patch fields are in/out.
    pub rewrite_parsed_ts_file_item: Vec<Box<dyn Fn(&str, &str, &mut TsItemPatch)>>,
    /// Consulted before the store; first `Some` wins.
    pub get_translation_pre: Vec<LookupHandler>,
    /// Consulted after the store; first `Some` wins.
    pub get_translation: Vec<LookupHandler>,
    /// Returns true when the handler mutated the text.
    pub rewrite_translation: Vec<Box<dyn Fn(&TranslationQuery<'_>, &mut String) -> bool>>,
    /// `(rel_path, string, comments)`; handlers append.
    pub add_dev_comment: Vec<Box<dyn Fn(&str, &str, &mut Vec<String>)>>,
}

impl HookBus {
    pub fn fire(handlers: &[PhaseHandler], job_id: &str) {
        for h in handlers {
            h(job_id);
        }
    }

    pub fn apply_rewrite_path(&self, rel: &mut String) {
        for h in &self.rewrite_path {
            h(rel);
        }
    }

    pub fn apply_after_load(&self, rel: &str, content: &mut String) {
        for h in &self.after_load_source_file_for_processing {
            h(rel, content);
        }
    }

    pub fn asserts_orphaned(&self, rel: &str) -> bool {
        self.is_file_orphaned.iter().any(|h| h(rel))
    }

    pub fn allows_process(&self, rel: &str, content: &str) -> bool {
        self.can_process_source_file.iter().all(|h| h(rel, content))
    }

    pub fn allows_extract(&self, rel: &str, extracted: &Extracted) -> bool {
        self.can_extract.iter().all(|h| h(rel, extracted))
    }

    pub fn allows_translate(&self, rel: &str, lang: &str, string: &str) -> bool {
        self.can_translate.iter().all(|h| h(rel, lang, string))
    }

    pub fn apply_ts_item_patch(&self, rel: &str, lang: &str, patch: &mut TsItemPatch) {
        for h in &self.rewrite_parsed_ts_file_item {
            h(rel, lang, patch);
        }
    }

    pub fn first_lookup(
        handlers: &[LookupHandler],
        query: &TranslationQuery<'_>,
    ) -> Option<(String, bool)> {
        handlers.iter().find_map(|h| h(query))
    }

    /// Returns true when any handler mutated `text`.
    pub fn apply_rewrite_translation(
        &self,
        query: &TranslationQuery<'_>,
        text: &mut String,
    ) -> bool {
        let mut mutated = false;
        for h in &self.rewrite_translation {
            mutated |= h(query, text);
        }
        mutated
    }

    pub fn collect_dev_comments(&self, rel: &str, string: &str) -> Vec<String> {
        let mut comments = Vec::new();
        for h in &self.add_dev_comment {
            h(rel, string, &mut comments);
        }
        comments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_phases_combine_with_and() {
        let mut bus = HookBus::default();
        bus.can_extract.push(Box::new(|_, _| true));
        assert!(bus.allows_extract("a.xml", &Extracted::default()));
        bus.can_extract.push(Box::new(|_, ex| ex.string != "drop me"));
        let mut ex = Extracted::default();
        ex.string = "drop me".to_string();
        assert!(!bus.allows_extract("a.xml", &ex));
    }

    #[test]
    fn orphan_phase_combines_with_or() {
        let mut bus = HookBus::default();
        bus.is_file_orphaned.push(Box::new(|_| false));
        assert!(!bus.asserts_orphaned("a.xml"));
        bus.is_file_orphaned.push(Box::new(|rel| rel.ends_with(".old")));
        assert!(bus.asserts_orphaned("a.old"));
        assert!(!bus.asserts_orphaned("a.xml"));
    }

    #[test]
    fn lookup_chain_returns_first_some() {
        let mut bus = HookBus::default();
        bus.get_translation.push(Box::new(|_| None));
        bus.get_translation
            .push(Box::new(|_| Some(("first".to_string(), false))));
        bus.get_translation
            .push(Box::new(|_| Some(("second".to_string(), true))));
        let q = TranslationQuery {
            file: "a.xml",
            lang: "fr",
            string: "Hello",
            context: "",
            hint: "",
        };
        assert_eq!(
            HookBus::first_lookup(&bus.get_translation, &q),
            Some(("first".to_string(), false))
        );
    }
}
