//! [`Store`]: the cached sqlite store.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use locsync_core::hash::{md5_hex, string_key};

use crate::props::PropKey;
use crate::schema::SCHEMA;
use crate::{Error, Result};

pub type StringId = i64;
pub type FileId = i64;
pub type ItemId = i64;
pub type TranslationId = i64;

#[derive(Debug, Clone)]
pub struct StringRec {
    pub id: StringId,
    pub text: String,
    pub context: String,
    pub skip: bool,
}

#[derive(Debug, Clone)]
pub struct FileRec {
    pub id: FileId,
    pub namespace: String,
    pub job: String,
    pub path: String,
    pub orphaned: bool,
}

#[derive(Debug, Clone)]
pub struct ItemRec {
    pub id: ItemId,
    pub file_id: FileId,
    pub string_id: StringId,
    pub hint: Option<String>,
    pub comment: Option<String>,
    pub orphaned: bool,
}

#[derive(Debug, Clone)]
pub struct TranslationRec {
    pub id: TranslationId,
    pub item_id: ItemId,
    pub lang: String,
    pub text: Option<String>,
    pub fuzzy: bool,
    pub comment: Option<String>,
    pub merge: bool,
}

/// Result of a cross-file translation lookup for fuzzy reuse.
#[derive(Debug, Clone)]
pub struct BestTranslation {
    pub text: String,
    pub fuzzy: bool,
    pub comment: Option<String>,
    /// True when distinct candidate translations disagree.
    pub multiple_variants: bool,
}

#[derive(Default)]
struct Caches {
    string_ids: HashMap<(String, String), Option<StringId>>,
    strings: HashMap<StringId, StringRec>,
    file_ids: HashMap<(String, String, String), Option<FileId>>,
    files: HashMap<FileId, FileRec>,
    all_files: HashMap<(String, String), Vec<FileId>>,
    item_ids: HashMap<(FileId, StringId), Option<ItemId>>,
    items: HashMap<ItemId, ItemRec>,
    all_items: HashMap<FileId, Vec<ItemId>>,
    translations: HashMap<(ItemId, String), Option<TranslationRec>>,
    properties: HashMap<String, String>,
    /// Per-language existence sets keyed by `md5(text)` and
    /// `md5(text:context)`, used to short-circuit reuse lookups.
    lang_strings: HashMap<String, HashSet<String>>,
}

/// A translation store bound to one sqlite connection.
///
/// The engine runs one job at a time and holds the store for the whole
/// run. Interior mutability covers the caches and the USN counter so
/// lookups take `&self`.
pub struct Store {
    conn: Connection,
    caches: RefCell<Caches>,
    next_usn: Cell<i64>,
}

impl Store {
    /// Open (or create) a store at `path`, run schema initialisation and
    /// preload the property cache.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        let usn: i64 = conn
            .query_row("SELECT value FROM meta WHERE key = 'usn'", [], |r| r.get(0))
            .optional()?
            .unwrap_or(0);
        let store = Self {
            conn,
            caches: RefCell::new(Caches::default()),
            next_usn: Cell::new(usn),
        };
        store.preload_properties()?;
        Ok(store)
    }

    // ── Transactions ────────────────────────────────────────────────────

    pub fn begin(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    /// Commit the run's transaction. A run that fails instead drops the
    /// transaction uncommitted, discarding its writes.
    pub fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        // Cached rows may now refer to discarded writes.
        *self.caches.borrow_mut() = Caches::default();
        self.preload_properties()?;
        let usn: i64 = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = 'usn'", [], |r| r.get(0))
            .optional()?
            .unwrap_or(0);
        self.next_usn.set(usn);
        Ok(())
    }

    fn alloc_usn(&self) -> Result<i64> {
        let usn = self.next_usn.get() + 1;
        self.next_usn.set(usn);
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES ('usn', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![usn],
        )?;
        Ok(usn)
    }

    // ── Strings ─────────────────────────────────────────────────────────

    pub fn get_string_id(&self, text: &str, context: &str, create: bool) -> Result<Option<StringId>> {
        let key = (text.to_string(), context.to_string());
        if let Some(cached) = self.caches.borrow().string_ids.get(&key) {
            if cached.is_some() || !create {
                return Ok(*cached);
            }
        }
        let found: Option<StringId> = self
            .conn
            .query_row(
                "SELECT id FROM strings WHERE text = ?1 AND context = ?2",
                params![text, context],
                |r| r.get(0),
            )
            .optional()?;
        let id = match found {
            Some(id) => Some(id),
            None if create => {
                self.conn.execute(
                    "INSERT INTO strings (text, context) VALUES (?1, ?2)",
                    params![text, context],
                )?;
                let id = self.conn.last_insert_rowid();
                self.caches.borrow_mut().strings.insert(
                    id,
                    StringRec {
                        id,
                        text: text.to_string(),
                        context: context.to_string(),
                        skip: false,
                    },
                );
                Some(id)
            }
            None => None,
        };
        self.caches.borrow_mut().string_ids.insert(key, id);
        Ok(id)
    }

    pub fn get_string(&self, id: StringId) -> Result<StringRec> {
        if let Some(rec) = self.caches.borrow().strings.get(&id) {
            return Ok(rec.clone());
        }
        let rec = self
            .conn
            .query_row(
                "SELECT id, text, context, skip FROM strings WHERE id = ?1",
                params![id],
                |r| {
                    Ok(StringRec {
                        id: r.get(0)?,
                        text: r.get(1)?,
                        context: r.get(2)?,
                        skip: r.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .optional()?
            .ok_or(Error::MissingRow { kind: "string", id })?;
        self.caches.borrow_mut().strings.insert(id, rec.clone());
        Ok(rec)
    }

    pub fn set_string_skip(&self, id: StringId, skip: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE strings SET skip = ?2 WHERE id = ?1",
            params![id, skip as i64],
        )?;
        if let Some(rec) = self.caches.borrow_mut().strings.get_mut(&id) {
            rec.skip = skip;
        }
        Ok(())
    }

    // ── Files ───────────────────────────────────────────────────────────

    pub fn get_file_id(
        &self,
        namespace: &str,
        job: &str,
        path: &str,
        create: bool,
    ) -> Result<Option<FileId>> {
        let key = (namespace.to_string(), job.to_string(), path.to_string());
        if let Some(cached) = self.caches.borrow().file_ids.get(&key) {
            if cached.is_some() || !create {
                return Ok(*cached);
            }
        }
        let found: Option<FileId> = self
            .conn
            .query_row(
                "SELECT id FROM files WHERE namespace = ?1 AND job = ?2 AND path = ?3",
                params![namespace, job, path],
                |r| r.get(0),
            )
            .optional()?;
        let id = match found {
            Some(id) => Some(id),
            None if create => {
                self.conn.execute(
                    "INSERT INTO files (namespace, job, path) VALUES (?1, ?2, ?3)",
                    params![namespace, job, path],
                )?;
                let id = self.conn.last_insert_rowid();
                let mut caches = self.caches.borrow_mut();
                caches.files.insert(
                    id,
                    FileRec {
                        id,
                        namespace: namespace.to_string(),
                        job: job.to_string(),
                        path: path.to_string(),
                        orphaned: false,
                    },
                );
                caches
                    .all_files
                    .remove(&(namespace.to_string(), job.to_string()));
                Some(id)
            }
            None => None,
        };
        self.caches.borrow_mut().file_ids.insert(key, id);
        Ok(id)
    }

    pub fn get_file(&self, id: FileId) -> Result<FileRec> {
        if let Some(rec) = self.caches.borrow().files.get(&id) {
            return Ok(rec.clone());
        }
        let rec = self
            .conn
            .query_row(
                "SELECT id, namespace, job, path, orphaned FROM files WHERE id = ?1",
                params![id],
                |r| {
                    Ok(FileRec {
                        id: r.get(0)?,
                        namespace: r.get(1)?,
                        job: r.get(2)?,
                        path: r.get(3)?,
                        orphaned: r.get::<_, i64>(4)? != 0,
                    })
                },
            )
            .optional()?
            .ok_or(Error::MissingRow { kind: "file", id })?;
        self.caches.borrow_mut().files.insert(id, rec.clone());
        Ok(rec)
    }

    pub fn files_for_job(&self, namespace: &str, job: &str) -> Result<Vec<FileRec>> {
        let key = (namespace.to_string(), job.to_string());
        let cached_ids = self.caches.borrow().all_files.get(&key).cloned();
        let ids = match cached_ids {
            Some(ids) => ids,
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, namespace, job, path, orphaned FROM files
                     WHERE namespace = ?1 AND job = ?2 ORDER BY path",
                )?;
                let recs = stmt
                    .query_map(params![namespace, job], |r| {
                        Ok(FileRec {
                            id: r.get(0)?,
                            namespace: r.get(1)?,
                            job: r.get(2)?,
                            path: r.get(3)?,
                            orphaned: r.get::<_, i64>(4)? != 0,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                let mut caches = self.caches.borrow_mut();
                let ids: Vec<FileId> = recs.iter().map(|f| f.id).collect();
                for rec in recs {
                    caches.files.insert(rec.id, rec);
                }
                caches.all_files.insert(key, ids.clone());
                ids
            }
        };
        ids.into_iter().map(|id| self.get_file(id)).collect()
    }

    /// Update a file's relative path in place (rename reconciliation).
    /// Items and translations stay attached to the file id.
    pub fn set_file_path(&self, id: FileId, path: &str) -> Result<()> {
        let old = self.get_file(id)?;
        self.conn
            .execute("UPDATE files SET path = ?2 WHERE id = ?1", params![id, path])?;
        let mut caches = self.caches.borrow_mut();
        caches
            .file_ids
            .insert((old.namespace.clone(), old.job.clone(), old.path), None);
        caches.file_ids.insert(
            (old.namespace.clone(), old.job.clone(), path.to_string()),
            Some(id),
        );
        if let Some(rec) = caches.files.get_mut(&id) {
            rec.path = path.to_string();
        }
        Ok(())
    }

    pub fn set_file_orphaned(&self, id: FileId, orphaned: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE files SET orphaned = ?2 WHERE id = ?1",
            params![id, orphaned as i64],
        )?;
        if let Some(rec) = self.caches.borrow_mut().files.get_mut(&id) {
            rec.orphaned = orphaned;
        }
        Ok(())
    }

    // ── Items ───────────────────────────────────────────────────────────

    pub fn get_item_id(
        &self,
        file_id: FileId,
        string_id: StringId,
        create: bool,
    ) -> Result<Option<ItemId>> {
        let key = (file_id, string_id);
        if let Some(cached) = self.caches.borrow().item_ids.get(&key) {
            if cached.is_some() || !create {
                return Ok(*cached);
            }
        }
        let found: Option<ItemId> = self
            .conn
            .query_row(
                "SELECT id FROM items WHERE file_id = ?1 AND string_id = ?2",
                params![file_id, string_id],
                |r| r.get(0),
            )
            .optional()?;
        let id = match found {
            Some(id) => Some(id),
            None if create => {
                let usn = self.alloc_usn()?;
                self.conn.execute(
                    "INSERT INTO items (file_id, string_id, usn) VALUES (?1, ?2, ?3)",
                    params![file_id, string_id, usn],
                )?;
                let id = self.conn.last_insert_rowid();
                let mut caches = self.caches.borrow_mut();
                caches.items.insert(
                    id,
                    ItemRec {
                        id,
                        file_id,
                        string_id,
                        hint: None,
                        comment: None,
                        orphaned: false,
                    },
                );
                caches.all_items.remove(&file_id);
                Some(id)
            }
            None => None,
        };
        self.caches.borrow_mut().item_ids.insert(key, id);
        Ok(id)
    }

    pub fn get_item(&self, id: ItemId) -> Result<ItemRec> {
        if let Some(rec) = self.caches.borrow().items.get(&id) {
            return Ok(rec.clone());
        }
        let rec = self
            .conn
            .query_row(
                "SELECT id, file_id, string_id, hint, comment, orphaned FROM items WHERE id = ?1",
                params![id],
                |r| {
                    Ok(ItemRec {
                        id: r.get(0)?,
                        file_id: r.get(1)?,
                        string_id: r.get(2)?,
                        hint: r.get(3)?,
                        comment: r.get(4)?,
                        orphaned: r.get::<_, i64>(5)? != 0,
                    })
                },
            )
            .optional()?
            .ok_or(Error::MissingRow { kind: "item", id })?;
        self.caches.borrow_mut().items.insert(id, rec.clone());
        Ok(rec)
    }

    pub fn item_ids_for_file(&self, file_id: FileId) -> Result<Vec<ItemId>> {
        if let Some(ids) = self.caches.borrow().all_items.get(&file_id) {
            return Ok(ids.clone());
        }
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM items WHERE file_id = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![file_id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<ItemId>>>()?;
        self.caches
            .borrow_mut()
            .all_items
            .insert(file_id, ids.clone());
        Ok(ids)
    }

    pub fn set_item_orphaned(&self, id: ItemId, orphaned: bool) -> Result<()> {
        let usn = self.alloc_usn()?;
        self.conn.execute(
            "UPDATE items SET orphaned = ?2, usn = ?3 WHERE id = ?1",
            params![id, orphaned as i64, usn],
        )?;
        if let Some(rec) = self.caches.borrow_mut().items.get_mut(&id) {
            rec.orphaned = orphaned;
        }
        Ok(())
    }

    pub fn set_item_hint(&self, id: ItemId, hint: Option<&str>) -> Result<()> {
        let usn = self.alloc_usn()?;
        self.conn.execute(
            "UPDATE items SET hint = ?2, usn = ?3 WHERE id = ?1",
            params![id, hint, usn],
        )?;
        if let Some(rec) = self.caches.borrow_mut().items.get_mut(&id) {
            rec.hint = hint.map(str::to_string);
        }
        Ok(())
    }

    pub fn set_item_comment(&self, id: ItemId, comment: Option<&str>) -> Result<()> {
        let usn = self.alloc_usn()?;
        self.conn.execute(
            "UPDATE items SET comment = ?2, usn = ?3 WHERE id = ?1",
            params![id, comment, usn],
        )?;
        if let Some(rec) = self.caches.borrow_mut().items.get_mut(&id) {
            rec.comment = comment.map(str::to_string);
        }
        Ok(())
    }

    // ── Translations ────────────────────────────────────────────────────

    pub fn get_translation(&self, item_id: ItemId, lang: &str) -> Result<Option<TranslationRec>> {
        let key = (item_id, lang.to_string());
        if let Some(cached) = self.caches.borrow().translations.get(&key) {
            return Ok(cached.clone());
        }
        let rec = self
            .conn
            .query_row(
                "SELECT id, item_id, lang, string, fuzzy, comment, merge
                 FROM translations WHERE item_id = ?1 AND lang = ?2",
                params![item_id, lang],
                Self::map_translation,
            )
            .optional()?;
        self.caches
            .borrow_mut()
            .translations
            .insert(key, rec.clone());
        Ok(rec)
    }

    fn map_translation(r: &rusqlite::Row<'_>) -> rusqlite::Result<TranslationRec> {
        Ok(TranslationRec {
            id: r.get(0)?,
            item_id: r.get(1)?,
            lang: r.get(2)?,
            text: r.get(3)?,
            fuzzy: r.get::<_, i64>(4)? != 0,
            comment: r.get(5)?,
            merge: r.get::<_, i64>(6)? != 0,
        })
    }

    /// Insert or update the translation row for `(item, lang)`, stamping a
    /// fresh USN either way.
    pub fn upsert_translation(
        &self,
        item_id: ItemId,
        lang: &str,
        text: Option<&str>,
        fuzzy: bool,
        comment: Option<&str>,
        merge: bool,
    ) -> Result<TranslationId> {
        let usn = self.alloc_usn()?;
        let existing = self.get_translation(item_id, lang)?;
        let id = match existing {
            Some(rec) => {
                self.conn.execute(
                    "UPDATE translations
                     SET string = ?2, fuzzy = ?3, comment = ?4, merge = ?5, usn = ?6
                     WHERE id = ?1",
                    params![rec.id, text, fuzzy as i64, comment, merge as i64, usn],
                )?;
                rec.id
            }
            None => {
                self.conn.execute(
                    "INSERT INTO translations (item_id, lang, string, fuzzy, comment, merge, usn)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![item_id, lang, text, fuzzy as i64, comment, merge as i64, usn],
                )?;
                self.conn.last_insert_rowid()
            }
        };
        let rec = TranslationRec {
            id,
            item_id,
            lang: lang.to_string(),
            text: text.map(str::to_string),
            fuzzy,
            comment: comment.map(str::to_string),
            merge,
        };
        let mut caches = self.caches.borrow_mut();
        let caches = &mut *caches;
        caches
            .translations
            .insert((item_id, lang.to_string()), Some(rec));
        // A new non-empty translation extends the language existence set.
        if text.is_some_and(|t| !t.is_empty()) {
            if let Some(set) = caches.lang_strings.get_mut(lang) {
                if let Some(s) = caches
                    .items
                    .get(&item_id)
                    .and_then(|item| caches.strings.get(&item.string_id))
                {
                    set.insert(md5_hex(&s.text));
                    set.insert(string_key(&s.text, &s.context));
                }
            }
        }
        Ok(id)
    }

    /// One-shot merge-flag clear without touching the translation content.
    pub fn clear_translation_merge(&self, item_id: ItemId, lang: &str) -> Result<()> {
        let usn = self.alloc_usn()?;
        self.conn.execute(
            "UPDATE translations SET merge = 0, usn = ?3 WHERE item_id = ?1 AND lang = ?2",
            params![item_id, lang, usn],
        )?;
        let mut caches = self.caches.borrow_mut();
        if let Some(Some(rec)) = caches.translations.get_mut(&(item_id, lang.to_string())) {
            rec.merge = false;
        }
        Ok(())
    }

    // ── Properties ──────────────────────────────────────────────────────

    fn preload_properties(&self) -> Result<()> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM properties")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut caches = self.caches.borrow_mut();
        caches.properties = rows.into_iter().collect();
        debug!(count = caches.properties.len(), "property cache preloaded");
        Ok(())
    }

    /// Cached read; the whole property table is preloaded at open.
    pub fn get_property(&self, key: PropKey<'_>) -> Option<String> {
        self.caches.borrow().properties.get(&key.to_string()).cloned()
    }

    pub fn set_property(&self, key: PropKey<'_>, value: &str) -> Result<()> {
        let key = key.to_string();
        self.conn.execute(
            "INSERT INTO properties (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        self.caches.borrow_mut().properties.insert(key, value.to_string());
        Ok(())
    }

    // ── Preloads ────────────────────────────────────────────────────────

    /// Warm the item, string and translation caches for every file of
    /// `(namespace, job)` across `langs` with one join query.
    pub fn preload_translations_for_job(
        &self,
        namespace: &str,
        job: &str,
        langs: &[String],
    ) -> Result<()> {
        if langs.is_empty() {
            return Ok(());
        }
        let mut stmt = self.conn.prepare(
            "SELECT i.id, i.file_id, i.string_id, i.hint, i.comment, i.orphaned,
                    s.text, s.context, s.skip,
                    t.id, t.lang, t.string, t.fuzzy, t.comment, t.merge
             FROM items i
             JOIN files f ON f.id = i.file_id
             JOIN strings s ON s.id = i.string_id
             LEFT JOIN translations t ON t.item_id = i.id
             WHERE f.namespace = ?1 AND f.job = ?2",
        )?;
        struct Row {
            item: ItemRec,
            string: StringRec,
            translation: Option<TranslationRec>,
        }
        let rows = stmt
            .query_map(params![namespace, job], |r| {
                let item = ItemRec {
                    id: r.get(0)?,
                    file_id: r.get(1)?,
                    string_id: r.get(2)?,
                    hint: r.get(3)?,
                    comment: r.get(4)?,
                    orphaned: r.get::<_, i64>(5)? != 0,
                };
                let string = StringRec {
                    id: item.string_id,
                    text: r.get(6)?,
                    context: r.get(7)?,
                    skip: r.get::<_, i64>(8)? != 0,
                };
                let translation = match r.get::<_, Option<TranslationId>>(9)? {
                    Some(tid) => Some(TranslationRec {
                        id: tid,
                        item_id: item.id,
                        lang: r.get(10)?,
                        text: r.get(11)?,
                        fuzzy: r.get::<_, i64>(12)? != 0,
                        comment: r.get(13)?,
                        merge: r.get::<_, i64>(14)? != 0,
                    }),
                    None => None,
                };
                Ok(Row { item, string, translation })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut caches = self.caches.borrow_mut();
        let mut count = 0usize;
        for row in rows {
            caches
                .item_ids
                .insert((row.item.file_id, row.item.string_id), Some(row.item.id));
            caches
                .string_ids
                .insert((row.string.text.clone(), row.string.context.clone()), Some(row.string.id));
            caches.strings.insert(row.string.id, row.string);
            let item_id = row.item.id;
            caches.items.insert(item_id, row.item);
            if let Some(t) = row.translation {
                if langs.contains(&t.lang) {
                    caches
                        .translations
                        .insert((item_id, t.lang.clone()), Some(t));
                    count += 1;
                }
            }
        }
        debug!(namespace, job, count, "translations preloaded");
        Ok(())
    }

    /// Build the existence set of string keys that have at least one
    /// non-empty translation in `lang`.
    pub fn preload_strings_for_lang(&self, lang: &str) -> Result<()> {
        if self.caches.borrow().lang_strings.contains_key(lang) {
            return Ok(());
        }
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT s.text, s.context
             FROM strings s
             JOIN items i ON i.string_id = s.id
             JOIN translations t ON t.item_id = i.id
             WHERE t.lang = ?1 AND t.string IS NOT NULL AND t.string <> ''",
        )?;
        let pairs = stmt
            .query_map(params![lang], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut set = HashSet::with_capacity(pairs.len() * 2);
        for (text, context) in pairs {
            set.insert(md5_hex(&text));
            set.insert(string_key(&text, &context));
        }
        debug!(lang, keys = set.len(), "language existence set preloaded");
        self.caches
            .borrow_mut()
            .lang_strings
            .insert(lang.to_string(), set);
        Ok(())
    }

    /// `Some(false)` means the language set is loaded and definitely has no
    /// translation for this text; `None` means the set was never preloaded.
    pub fn lang_has_string(&self, lang: &str, text: &str) -> Option<bool> {
        self.caches
            .borrow()
            .lang_strings
            .get(lang)
            .map(|set| set.contains(&md5_hex(text)))
    }

    // ── Change oracle ───────────────────────────────────────────────────

    /// Highest USN over the file's items and their translations in `lang`.
    pub fn highest_usn_for_file_lang(&self, file_id: FileId, lang: &str) -> Result<i64> {
        let usn: i64 = self.conn.query_row(
            "SELECT MAX(u) FROM (
                 SELECT COALESCE(MAX(usn), 0) AS u FROM items WHERE file_id = ?1
                 UNION ALL
                 SELECT COALESCE(MAX(t.usn), 0) AS u
                 FROM translations t
                 JOIN items i ON i.id = t.item_id
                 WHERE i.file_id = ?1 AND t.lang = ?2
             )",
            params![file_id, lang],
            |r| r.get(0),
        )?;
        Ok(usn)
    }

    // ── Cross-file reuse ────────────────────────────────────────────────

    /// Best translation of `(text, context)` in `lang` from any other file.
    ///
    /// Candidates never include the calling file, skip-flagged strings or
    /// empty translations. Non-fuzzy beats fuzzy, newer beats older;
    /// `multiple_variants` reports disagreement among the candidates.
    pub fn find_best_translation(
        &self,
        namespace: &str,
        path: &str,
        text: &str,
        context: &str,
        lang: &str,
        allow_orphaned: bool,
    ) -> Result<Option<BestTranslation>> {
        let mut sql = String::from(
            "SELECT t.string, t.fuzzy, t.comment
             FROM translations t
             JOIN items i ON i.id = t.item_id
             JOIN files f ON f.id = i.file_id
             JOIN strings s ON s.id = i.string_id
             WHERE s.text = ?1 AND s.context = ?2 AND t.lang = ?3
               AND t.string IS NOT NULL AND t.string <> ''
               AND s.skip = 0
               AND NOT (f.namespace = ?4 AND f.path = ?5)",
        );
        if !allow_orphaned {
            sql.push_str(" AND i.orphaned = 0 AND f.orphaned = 0");
        }
        sql.push_str(" ORDER BY t.fuzzy ASC, t.usn DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![text, context, lang, namespace, path], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, i64>(1)? != 0,
                    r.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let Some((best_text, fuzzy, comment)) = rows.first().cloned() else {
            return Ok(None);
        };
        let distinct: HashSet<&str> = rows.iter().map(|(t, _, _)| t.as_str()).collect();
        Ok(Some(BestTranslation {
            text: best_text,
            fuzzy,
            comment,
            multiple_variants: distinct.len() > 1,
        }))
    }
}
