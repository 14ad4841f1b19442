//! Schema initialisation, run on every open.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS strings (
    id      INTEGER PRIMARY KEY,
    text    TEXT NOT NULL,
    context TEXT NOT NULL DEFAULT '',
    skip    INTEGER NOT NULL DEFAULT 0,
    UNIQUE (text, context)
);

CREATE TABLE IF NOT EXISTS files (
    id        INTEGER PRIMARY KEY,
    namespace TEXT NOT NULL,
    job       TEXT NOT NULL,
    path      TEXT NOT NULL,
    orphaned  INTEGER NOT NULL DEFAULT 0,
    UNIQUE (namespace, job, path)
);

CREATE TABLE IF NOT EXISTS items (
    id        INTEGER PRIMARY KEY,
    file_id   INTEGER NOT NULL REFERENCES files(id),
    string_id INTEGER NOT NULL REFERENCES strings(id),
    hint      TEXT,
    comment   TEXT,
    orphaned  INTEGER NOT NULL DEFAULT 0,
    usn       INTEGER NOT NULL DEFAULT 0,
    UNIQUE (file_id, string_id)
);

CREATE TABLE IF NOT EXISTS translations (
    id      INTEGER PRIMARY KEY,
    item_id INTEGER NOT NULL REFERENCES items(id),
    lang    TEXT NOT NULL,
    string  TEXT,
    fuzzy   INTEGER NOT NULL DEFAULT 0,
    comment TEXT,
    merge   INTEGER NOT NULL DEFAULT 0,
    usn     INTEGER NOT NULL DEFAULT 0,
    UNIQUE (item_id, lang)
);

CREATE TABLE IF NOT EXISTS properties (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_file         ON items(file_id);
CREATE INDEX IF NOT EXISTS idx_items_string       ON items(string_id);
CREATE INDEX IF NOT EXISTS idx_translations_item  ON translations(item_id);
CREATE INDEX IF NOT EXISTS idx_translations_lang  ON translations(lang);
CREATE INDEX IF NOT EXISTS idx_files_ns_job       ON files(namespace, job);
"#;
