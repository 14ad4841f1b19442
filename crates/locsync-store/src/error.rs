pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("missing {kind} row with id {id}")]
    MissingRow { kind: &'static str, id: i64 },
}

impl From<Error> for locsync_core::Error {
    fn from(e: Error) -> Self {
        locsync_core::Error::Store(e.to_string())
    }
}
