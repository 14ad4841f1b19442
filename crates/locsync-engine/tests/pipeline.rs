//! End-to-end pipeline tests: real temp directories, an on-disk store, the
//! keyed-XML reference parser.

use std::fs;
use std::path::PathBuf;

use locsync_engine::{run_job, Job, JobSummary};
use locsync_parsers_xml::KeyedXmlParser;
use locsync_store::Store;
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    store: Store,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        let store = Store::open(dir.path().join("l10n.db")).unwrap();
        Self { dir, store }
    }

    fn job(&self) -> Job {
        let mut job = Job::new(
            "app",
            self.dir.path().join("src"),
            self.dir.path().join("po"),
            self.dir.path().join("out"),
            Box::new(KeyedXmlParser),
        );
        job.destination_languages = vec!["fr".to_string()];
        job
    }

    fn write_source(&self, name: &str, body: &str) {
        let path = self.dir.path().join("src").join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn remove_source(&self, name: &str) {
        fs::remove_file(self.dir.path().join("src").join(name)).unwrap();
    }

    fn run(&self, job: &Job) -> JobSummary {
        run_job(&self.store, job).unwrap()
    }

    fn ts_path(&self, lang: &str, rel: &str) -> PathBuf {
        self.dir.path().join("po").join(lang).join(format!("{rel}.po"))
    }

    fn out_path(&self, lang: &str, rel: &str) -> PathBuf {
        self.dir.path().join("out").join(lang).join(rel)
    }

    fn read_ts(&self, lang: &str, rel: &str) -> String {
        fs::read_to_string(self.ts_path(lang, rel)).unwrap()
    }

    fn edit_ts(&self, lang: &str, rel: &str, from: &str, to: &str) {
        let path = self.ts_path(lang, rel);
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains(from), "expected {from:?} in {text}");
        fs::write(&path, text.replace(from, to)).unwrap();
    }
}

const SIMPLE: &str = "<strings>\n  <greeting>Hello</greeting>\n</strings>\n";

#[test]
fn first_run_emits_ts_and_localized_files() {
    let h = Harness::new();
    h.write_source(
        "a.xml",
        "<strings>\n  <greeting>Hello</greeting>\n  <farewell>Goodbye</farewell>\n</strings>\n",
    );
    let summary = h.run(&h.job());

    assert_eq!(summary.files_scanned, 1);
    assert_eq!(summary.files_parsed, 1);
    assert_eq!(summary.ts_files_written, 1);
    assert_eq!(summary.localized_files_written, 1);

    let ts = h.read_ts("fr", "a.xml");
    assert!(ts.contains("\"Language: fr\\n\""));
    assert!(ts.contains("#: File: a.xml"));
    assert!(ts.contains("msgid \"Hello\""));
    assert!(ts.contains("msgid \"Goodbye\""));
    assert!(ts.contains("msgstr \"\""));

    let out = fs::read_to_string(h.out_path("fr", "a.xml")).unwrap();
    assert!(out.contains(">Hello</greeting>"));
}

#[test]
fn unchanged_second_run_writes_nothing() {
    let h = Harness::new();
    h.write_source("a.xml", SIMPLE);
    h.run(&h.job());

    let second = h.run(&h.job());
    assert_eq!(second.files_parsed, 0);
    assert_eq!(second.files_skipped, 1);
    assert_eq!(second.ts_files_read, 0);
    assert_eq!(second.ts_files_written, 0);
    assert_eq!(second.localized_files_written, 0);
}

#[test]
fn forced_rerun_is_byte_identical() {
    let h = Harness::new();
    h.write_source("a.xml", SIMPLE);
    h.run(&h.job());
    let before = h.read_ts("fr", "a.xml");

    let mut forced = h.job();
    forced.optimizations = false;
    h.run(&forced);
    assert_eq!(h.read_ts("fr", "a.xml"), before);
}

#[test]
fn edited_ts_file_round_trips_into_localized_output() {
    let h = Harness::new();
    h.write_source("a.xml", SIMPLE);
    h.run(&h.job());

    h.edit_ts("fr", "a.xml", "msgid \"Hello\"\nmsgstr \"\"", "msgid \"Hello\"\nmsgstr \"Bonjour\"");
    let second = h.run(&h.job());
    assert_eq!(second.ts_files_read, 1);
    assert_eq!(second.localized_files_written, 1);

    let out = fs::read_to_string(h.out_path("fr", "a.xml")).unwrap();
    assert!(out.contains(">Bonjour</greeting>"));

    // Third run: everything settled again.
    let third = h.run(&h.job());
    assert_eq!(third.ts_files_written, 0);
    assert_eq!(third.localized_files_written, 0);
}

#[test]
fn reingesting_emitted_ts_leaves_the_store_unchanged() {
    let h = Harness::new();
    h.write_source("a.xml", SIMPLE);
    h.run(&h.job());
    h.edit_ts("fr", "a.xml", "#: File: a.xml", "# note\n#: File: a.xml");
    h.edit_ts("fr", "a.xml", "msgid \"Hello\"\nmsgstr \"\"", "msgid \"Hello\"\nmsgstr \"Bonjour\"");
    h.run(&h.job());

    let file_id = h
        .store
        .get_file_id("default", "app", "a.xml", false)
        .unwrap()
        .unwrap();
    let usn_before = h.store.highest_usn_for_file_lang(file_id, "fr").unwrap();

    // Force a full re-parse and re-ingest of the emitter's own output.
    let mut forced = h.job();
    forced.optimizations = false;
    h.run(&forced);

    assert_eq!(
        h.store.highest_usn_for_file_lang(file_id, "fr").unwrap(),
        usn_before
    );
}

#[test]
fn rename_preserves_translations() {
    let h = Harness::new();
    h.write_source("a.xml", SIMPLE);
    h.run(&h.job());
    h.edit_ts("fr", "a.xml", "msgid \"Hello\"\nmsgstr \"\"", "msgid \"Hello\"\nmsgstr \"Bonjour\"");
    h.run(&h.job());

    fs::rename(
        h.dir.path().join("src/a.xml"),
        h.dir.path().join("src/b.xml"),
    )
    .unwrap();
    let summary = h.run(&h.job());
    assert_eq!(summary.files_renamed, 1);
    assert_eq!(summary.files_orphaned, 0);

    assert!(h
        .store
        .get_file_id("default", "app", "a.xml", false)
        .unwrap()
        .is_none());
    assert!(h
        .store
        .get_file_id("default", "app", "b.xml", false)
        .unwrap()
        .is_some());

    let ts = h.read_ts("fr", "b.xml");
    assert!(ts.contains("msgid \"Hello\"\nmsgstr \"Bonjour\""));
    let out = fs::read_to_string(h.out_path("fr", "b.xml")).unwrap();
    assert!(out.contains(">Bonjour<"));
}

#[test]
fn orphaning_is_symmetric_and_never_deletes() {
    let h = Harness::new();
    h.write_source("a.xml", SIMPLE);
    h.run(&h.job());

    let file_id = h
        .store
        .get_file_id("default", "app", "a.xml", false)
        .unwrap()
        .unwrap();
    let items = h.store.item_ids_for_file(file_id).unwrap();
    assert_eq!(items.len(), 1);

    h.remove_source("a.xml");
    let gone = h.run(&h.job());
    assert_eq!(gone.files_orphaned, 1);
    assert!(h.store.get_file(file_id).unwrap().orphaned);
    assert!(h.store.get_item(items[0]).unwrap().orphaned);

    h.write_source("a.xml", SIMPLE);
    let back = h.run(&h.job());
    assert_eq!(back.files_orphaned, 0);
    assert!(!h.store.get_file(file_id).unwrap().orphaned);
    assert!(!h.store.get_item(items[0]).unwrap().orphaned);
    assert_eq!(h.store.item_ids_for_file(file_id).unwrap(), items);
}

#[test]
fn duplicate_strings_disambiguate_onto_source_keys() {
    let h = Harness::new();
    h.write_source(
        "a.xml",
        "<strings>\n  <toolbar.save>Save</toolbar.save>\n  <menu.save>Save</menu.save>\n</strings>\n",
    );
    h.run(&h.job());

    assert!(h
        .store
        .get_string_id("Save", "toolbar.save", false)
        .unwrap()
        .is_some());
    assert!(h
        .store
        .get_string_id("Save", "menu.save", false)
        .unwrap()
        .is_some());

    let ts = h.read_ts("fr", "a.xml");
    assert!(ts.contains("msgctxt \"toolbar.save\""));
    assert!(ts.contains("msgctxt \"menu.save\""));
}

#[test]
fn reuse_marks_cross_file_translations_fuzzy() {
    let h = Harness::new();
    let reuse_job = || {
        let mut job = h.job();
        job.reuse_translations = true;
        job.reuse_as_fuzzy_default = true;
        job
    };

    h.write_source("a.xml", SIMPLE);
    h.run(&reuse_job());
    h.edit_ts("fr", "a.xml", "msgid \"Hello\"\nmsgstr \"\"", "msgid \"Hello\"\nmsgstr \"Bonjour\"");
    h.run(&reuse_job());

    h.write_source("b.xml", "<strings>\n  <hi>Hello</hi>\n</strings>\n");
    h.run(&reuse_job());

    let ts = h.read_ts("fr", "b.xml");
    assert!(ts.contains("msgstr \"Bonjour\""));
    assert!(ts.contains("#, fuzzy"));
}

#[test]
fn uncertain_reuse_is_skipped() {
    let h = Harness::new();
    let reuse_job = || {
        let mut job = h.job();
        job.reuse_translations = true;
        job.reuse_uncertain = false;
        job.reuse_as_fuzzy_default = true;
        job
    };

    h.write_source("a.xml", "<strings>\n  <k1>Open</k1>\n</strings>\n");
    h.write_source("b.xml", "<strings>\n  <k2>Open</k2>\n</strings>\n");
    h.run(&reuse_job());
    h.edit_ts("fr", "a.xml", "msgid \"Open\"\nmsgstr \"\"", "msgid \"Open\"\nmsgstr \"Ouvrir\"");
    h.edit_ts("fr", "b.xml", "msgid \"Open\"\nmsgstr \"\"", "msgid \"Open\"\nmsgstr \"Déplier\"");
    h.run(&reuse_job());

    h.write_source("c.xml", "<strings>\n  <k3>Open</k3>\n</strings>\n");
    h.run(&reuse_job());

    let ts = h.read_ts("fr", "c.xml");
    assert!(ts.contains("msgid \"Open\"\nmsgstr \"\""));
    assert!(!ts.contains("#, fuzzy"));
}

#[test]
fn plural_forms_round_trip() {
    let h = Harness::new();
    h.write_source("a.xml", "<strings>\n  <cats plural=\"cats\">cat</cats>\n</strings>\n");
    h.run(&h.job());

    let ts = h.read_ts("fr", "a.xml");
    assert!(ts.contains("msgid \"cat\"\nmsgid_plural \"cats\"\nmsgstr[0] \"\""));

    h.edit_ts(
        "fr",
        "a.xml",
        "msgstr[0] \"\"",
        "msgstr[0] \"chat\"\nmsgstr[1] \"chats\"",
    );
    h.run(&h.job());

    let ts = h.read_ts("fr", "a.xml");
    assert!(ts.contains("msgstr[0] \"chat\"\nmsgstr[1] \"chats\""));

    let out = fs::read_to_string(h.out_path("fr", "a.xml")).unwrap();
    assert!(out.contains("plural=\"chats\""));
    assert!(out.contains(">chat</cats>"));
}

#[test]
fn similar_language_inherits_without_write_back() {
    let h = Harness::new();
    let make_job = || {
        let mut job = h.job();
        job.destination_languages = vec!["pt".to_string(), "pt-br".to_string()];
        job.similar_languages = vec![locsync_engine::SimilarLanguageRule {
            destination: "pt-br".to_string(),
            sources: vec!["pt".to_string()],
            as_fuzzy: true,
        }];
        job
    };

    h.write_source("a.xml", SIMPLE);
    h.run(&make_job());
    h.edit_ts("pt", "a.xml", "msgid \"Hello\"\nmsgstr \"\"", "msgid \"Hello\"\nmsgstr \"Olá\"");
    h.run(&make_job());

    let ts = h.read_ts("pt-br", "a.xml");
    assert!(ts.contains("msgstr \"Olá\""));
    assert!(ts.contains("#, fuzzy"));

    // Inherited, not persisted: the pt-br row stays absent.
    let file_id = h
        .store
        .get_file_id("default", "app", "a.xml", false)
        .unwrap()
        .unwrap();
    let items = h.store.item_ids_for_file(file_id).unwrap();
    assert!(h.store.get_translation(items[0], "pt-br").unwrap().is_none());
}

#[test]
fn skipped_files_only_visit_modified_languages() {
    let h = Harness::new();
    let make_job = |modified: Option<Vec<String>>| {
        let mut job = h.job();
        job.destination_languages = vec!["fr".to_string(), "de".to_string()];
        job.modified_languages = modified;
        job
    };

    h.write_source("a.xml", SIMPLE);
    h.run(&make_job(None));
    assert!(h.ts_path("de", "a.xml").exists());

    // Remove the de TS file; with only fr modified and the source
    // unchanged, de is not revisited.
    fs::remove_file(h.ts_path("de", "a.xml")).unwrap();
    h.run(&make_job(Some(vec!["fr".to_string()])));
    assert!(!h.ts_path("de", "a.xml").exists());

    // With the full modified set the missing file is regenerated.
    h.run(&make_job(None));
    assert!(h.ts_path("de", "a.xml").exists());
}

#[test]
fn get_translation_hook_feeds_rendering() {
    let h = Harness::new();
    let mut job = h.job();
    job.hooks.get_translation.push(Box::new(|q| {
        (q.string == "Hello").then(|| ("Bonjour-du-hook".to_string(), false))
    }));
    h.write_source("a.xml", SIMPLE);
    h.run(&job);

    let ts = h.read_ts("fr", "a.xml");
    assert!(ts.contains("msgstr \"Bonjour-du-hook\""));
    let out = fs::read_to_string(h.out_path("fr", "a.xml")).unwrap();
    assert!(out.contains(">Bonjour-du-hook<"));
}

#[test]
fn output_encoding_applies_to_localized_files() {
    let h = Harness::new();
    let mut job = h.job();
    job.output_encoding = locsync_engine::OutputEncoding::Utf16Le { bom: true };
    h.write_source("a.xml", SIMPLE);
    h.run(&job);

    let bytes = fs::read(h.out_path("fr", "a.xml")).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xFE]);
}

#[test]
fn skip_flagged_strings_are_hidden_from_emission() {
    let h = Harness::new();
    h.write_source(
        "a.xml",
        "<strings>\n  <greeting>Hello</greeting>\n  <farewell>Goodbye</farewell>\n</strings>\n",
    );
    h.run(&h.job());
    h.edit_ts("fr", "a.xml", "msgid \"Hello\"\nmsgstr \"\"", "msgid \"Hello\"\nmsgstr \"Bonjour\"");
    h.run(&h.job());

    let string_id = h
        .store
        .get_string_id("Hello", "", false)
        .unwrap()
        .unwrap();
    h.store.set_string_skip(string_id, true).unwrap();

    let mut forced = h.job();
    forced.optimizations = false;
    h.run(&forced);

    let ts = h.read_ts("fr", "a.xml");
    assert!(!ts.contains("msgid \"Hello\""));
    assert!(ts.contains("msgid \"Goodbye\""));

    // Rendering falls back to the source text; the stored translation is
    // no longer served.
    let out = fs::read_to_string(h.out_path("fr", "a.xml")).unwrap();
    assert!(out.contains(">Hello</greeting>"));

    h.store.set_string_skip(string_id, false).unwrap();
    h.run(&forced);
    let ts = h.read_ts("fr", "a.xml");
    assert!(ts.contains("msgid \"Hello\"\nmsgstr \"Bonjour\""));
}

#[test]
fn merge_flag_ignores_one_incoming_update() {
    let h = Harness::new();
    h.write_source("a.xml", SIMPLE);
    h.run(&h.job());
    h.edit_ts("fr", "a.xml", "msgid \"Hello\"\nmsgstr \"\"", "msgid \"Hello\"\nmsgstr \"Bonjour\"");
    h.run(&h.job());

    let file_id = h
        .store
        .get_file_id("default", "app", "a.xml", false)
        .unwrap()
        .unwrap();
    let items = h.store.item_ids_for_file(file_id).unwrap();
    h.store
        .upsert_translation(items[0], "fr", Some("Bonjour"), false, None, true)
        .unwrap();

    // The translator's conflicting edit is ignored exactly once.
    h.edit_ts("fr", "a.xml", "msgstr \"Bonjour\"", "msgstr \"Salut\"");
    h.run(&h.job());
    let rec = h.store.get_translation(items[0], "fr").unwrap().unwrap();
    assert_eq!(rec.text.as_deref(), Some("Bonjour"));
    assert!(!rec.merge);

    // The next edit lands normally.
    h.edit_ts("fr", "a.xml", "msgstr \"Bonjour\"", "msgstr \"Salut\"");
    h.run(&h.job());
    let rec = h.store.get_translation(items[0], "fr").unwrap().unwrap();
    assert_eq!(rec.text.as_deref(), Some("Salut"));
}
