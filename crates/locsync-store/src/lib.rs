//! The cached translation store.
//!
//! One sqlite file holds five entity tables (strings, files, items,
//! translations, properties) plus a tiny meta table for the USN counter.
//! The [`Store`] wraps a single connection with per-connection identity-map
//! caches; every upsert writes through the cache so repeated lookups within
//! a run never touch sqlite twice for the same row.
//!
//! The engine holds the store for a whole run inside one transaction,
//! committed once at job end.

mod error;
mod props;
mod schema;
mod store;

#[cfg(test)]
mod tests;

pub use error::{Error, Result};
pub use props::PropKey;
pub use store::{
    BestTranslation, FileId, FileRec, ItemId, ItemRec, Store, StringId, StringRec, TranslationId,
    TranslationRec,
};
