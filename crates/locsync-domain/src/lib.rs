use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 1;

/// One non-fatal problem encountered during a run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Warning {
    pub file: Option<String>,
    pub lang: Option<String>,
    pub message: String,
}

/// Per-file outcome of the source scan phase.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FileStat {
    pub path: String,
    /// "parsed" | "skipped" | "renamed" | "orphaned" | "failed"
    pub status: String,
    pub items: usize,
}

/// Counts and warnings for one completed job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct JobSummary {
    pub job: String,
    pub files_scanned: usize,
    pub files_parsed: usize,
    pub files_skipped: usize,
    pub files_renamed: usize,
    pub files_orphaned: usize,
    pub ts_files_read: usize,
    pub ts_files_written: usize,
    pub localized_files_written: usize,
    #[serde(default)]
    pub files: Vec<FileStat>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

impl JobSummary {
    pub fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
            ..Default::default()
        }
    }

    pub fn warn(&mut self, file: Option<&str>, lang: Option<&str>, message: impl Into<String>) {
        self.warnings.push(Warning {
            file: file.map(str::to_string),
            lang: lang.map(str::to_string),
            message: message.into(),
        });
    }
}
