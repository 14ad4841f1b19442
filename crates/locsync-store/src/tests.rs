use crate::{PropKey, Store};

fn store() -> Store {
    Store::open_in_memory().unwrap()
}

#[test]
fn string_identity_is_text_plus_context() {
    let s = store();
    let a = s.get_string_id("Save", "", true).unwrap().unwrap();
    let b = s.get_string_id("Save", "menu", true).unwrap().unwrap();
    let a2 = s.get_string_id("Save", "", true).unwrap().unwrap();
    assert_ne!(a, b);
    assert_eq!(a, a2);
    assert!(s.get_string_id("Open", "", false).unwrap().is_none());
}

#[test]
fn item_identity_is_file_plus_string() {
    let s = store();
    let f = s.get_file_id("ns", "job", "a.xml", true).unwrap().unwrap();
    let str_id = s.get_string_id("Hello", "", true).unwrap().unwrap();
    let i1 = s.get_item_id(f, str_id, true).unwrap().unwrap();
    let i2 = s.get_item_id(f, str_id, true).unwrap().unwrap();
    assert_eq!(i1, i2);
    assert!(s.get_item_id(f, str_id + 1, false).unwrap().is_none());
}

#[test]
fn file_rename_keeps_items_attached() {
    let s = store();
    let f = s.get_file_id("ns", "job", "a.xml", true).unwrap().unwrap();
    let str_id = s.get_string_id("Hello", "", true).unwrap().unwrap();
    let item = s.get_item_id(f, str_id, true).unwrap().unwrap();

    s.set_file_path(f, "b.xml").unwrap();
    assert!(s.get_file_id("ns", "job", "a.xml", false).unwrap().is_none());
    assert_eq!(s.get_file_id("ns", "job", "b.xml", false).unwrap(), Some(f));
    assert_eq!(s.get_item_id(f, str_id, false).unwrap(), Some(item));
}

#[test]
fn usn_strictly_increases_on_translation_writes() {
    let s = store();
    let f = s.get_file_id("ns", "job", "a.xml", true).unwrap().unwrap();
    let str_id = s.get_string_id("Hello", "", true).unwrap().unwrap();
    let item = s.get_item_id(f, str_id, true).unwrap().unwrap();

    let before = s.highest_usn_for_file_lang(f, "fr").unwrap();
    s.upsert_translation(item, "fr", Some("Bonjour"), false, None, false)
        .unwrap();
    let after = s.highest_usn_for_file_lang(f, "fr").unwrap();
    assert!(after > before);

    s.upsert_translation(item, "fr", Some("Salut"), false, None, false)
        .unwrap();
    assert!(s.highest_usn_for_file_lang(f, "fr").unwrap() > after);
}

#[test]
fn usn_is_language_scoped_for_translations() {
    let s = store();
    let f = s.get_file_id("ns", "job", "a.xml", true).unwrap().unwrap();
    let str_id = s.get_string_id("Hello", "", true).unwrap().unwrap();
    let item = s.get_item_id(f, str_id, true).unwrap().unwrap();
    let base = s.highest_usn_for_file_lang(f, "de").unwrap();

    s.upsert_translation(item, "fr", Some("Bonjour"), false, None, false)
        .unwrap();
    // The item's own USN did not move, so "de" sees no change.
    assert_eq!(s.highest_usn_for_file_lang(f, "de").unwrap(), base);
}

#[test]
fn properties_round_trip_through_cache() {
    let s = store();
    assert!(s.get_property(PropKey::Source(1)).is_none());
    s.set_property(PropKey::Source(1), "abc").unwrap();
    s.set_property(PropKey::Source(1), "def").unwrap();
    assert_eq!(s.get_property(PropKey::Source(1)).as_deref(), Some("def"));
}

#[test]
fn find_best_translation_excludes_own_file_and_detects_variants() {
    let s = store();
    let fa = s.get_file_id("ns", "job", "a.xml", true).unwrap().unwrap();
    let fb = s.get_file_id("ns", "job", "b.xml", true).unwrap().unwrap();
    let str_id = s.get_string_id("Open", "", true).unwrap().unwrap();
    let ia = s.get_item_id(fa, str_id, true).unwrap().unwrap();
    let ib = s.get_item_id(fb, str_id, true).unwrap().unwrap();
    s.upsert_translation(ia, "fr", Some("Ouvrir"), false, None, false)
        .unwrap();

    // From c.xml both candidates agree; one variant.
    let best = s
        .find_best_translation("ns", "c.xml", "Open", "", "fr", false)
        .unwrap()
        .unwrap();
    assert_eq!(best.text, "Ouvrir");
    assert!(!best.multiple_variants);

    s.upsert_translation(ib, "fr", Some("Déplier"), false, None, false)
        .unwrap();
    let best = s
        .find_best_translation("ns", "c.xml", "Open", "", "fr", false)
        .unwrap()
        .unwrap();
    assert!(best.multiple_variants);

    // Looking up from a.xml only sees b.xml's candidate.
    let best = s
        .find_best_translation("ns", "a.xml", "Open", "", "fr", false)
        .unwrap()
        .unwrap();
    assert_eq!(best.text, "Déplier");
    assert!(!best.multiple_variants);
}

#[test]
fn find_best_translation_skips_orphaned_unless_allowed() {
    let s = store();
    let fa = s.get_file_id("ns", "job", "a.xml", true).unwrap().unwrap();
    let str_id = s.get_string_id("Hello", "", true).unwrap().unwrap();
    let ia = s.get_item_id(fa, str_id, true).unwrap().unwrap();
    s.upsert_translation(ia, "fr", Some("Bonjour"), false, None, false)
        .unwrap();
    s.set_item_orphaned(ia, true).unwrap();

    assert!(s
        .find_best_translation("ns", "c.xml", "Hello", "", "fr", false)
        .unwrap()
        .is_none());
    assert!(s
        .find_best_translation("ns", "c.xml", "Hello", "", "fr", true)
        .unwrap()
        .is_some());
}

#[test]
fn lang_existence_set_short_circuits() {
    let s = store();
    let f = s.get_file_id("ns", "job", "a.xml", true).unwrap().unwrap();
    let str_id = s.get_string_id("Hello", "", true).unwrap().unwrap();
    let item = s.get_item_id(f, str_id, true).unwrap().unwrap();
    s.upsert_translation(item, "fr", Some("Bonjour"), false, None, false)
        .unwrap();

    assert!(s.lang_has_string("fr", "Hello").is_none());
    s.preload_strings_for_lang("fr").unwrap();
    assert_eq!(s.lang_has_string("fr", "Hello"), Some(true));
    assert_eq!(s.lang_has_string("fr", "Goodbye"), Some(false));

    // Writes after preload keep the set current.
    let str2 = s.get_string_id("Goodbye", "", true).unwrap().unwrap();
    let item2 = s.get_item_id(f, str2, true).unwrap().unwrap();
    s.upsert_translation(item2, "fr", Some("Au revoir"), false, None, false)
        .unwrap();
    assert_eq!(s.lang_has_string("fr", "Goodbye"), Some(true));
}

#[test]
fn merge_flag_clears_without_touching_content() {
    let s = store();
    let f = s.get_file_id("ns", "job", "a.xml", true).unwrap().unwrap();
    let str_id = s.get_string_id("Hello", "", true).unwrap().unwrap();
    let item = s.get_item_id(f, str_id, true).unwrap().unwrap();
    s.upsert_translation(item, "fr", Some("Bonjour"), false, None, true)
        .unwrap();

    s.clear_translation_merge(item, "fr").unwrap();
    let rec = s.get_translation(item, "fr").unwrap().unwrap();
    assert!(!rec.merge);
    assert_eq!(rec.text.as_deref(), Some("Bonjour"));
}

#[test]
fn uncommitted_changes_are_discarded_on_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let s = Store::open(&path).unwrap();
    s.begin().unwrap();
    s.get_file_id("ns", "job", "a.xml", true).unwrap();
    s.rollback().unwrap();
    assert!(s.get_file_id("ns", "job", "a.xml", false).unwrap().is_none());

    s.begin().unwrap();
    let f = s.get_file_id("ns", "job", "a.xml", true).unwrap().unwrap();
    s.commit().unwrap();
    drop(s);

    let s2 = Store::open(&path).unwrap();
    assert_eq!(s2.get_file_id("ns", "job", "a.xml", false).unwrap(), Some(f));
}
