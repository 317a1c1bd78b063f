use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchivalError {
    #[error("spec directory not found: {0}")]
    SpecNotFound(PathBuf),
    #[error("spec {spec} is missing required documents: {missing}")]
    MissingDocuments { spec: String, missing: String },
    #[error("spec is already inside the archive tree: {0}")]
    AlreadyArchived(PathBuf),
    #[error("spec {spec} is not complete ({completed}/{total} tasks done)")]
    Incomplete {
        spec: String,
        completed: usize,
        total: usize,
    },
    #[error("copy into {path} failed: {source}")]
    CopyFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("archived copy {path} does not match its source")]
    VerificationFailed { path: PathBuf },
    #[error("configuration error at {path}: {message}")]
    Configuration { path: PathBuf, message: String },
    #[error("archive index {path} is not valid JSON and needs manual attention: {source}")]
    IndexCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("another archival run holds the lock at {0}")]
    Locked(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ArchivalError {
    pub fn configuration(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Configuration {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn code(&self) -> ArchivalErrorCode {
        match self {
            Self::SpecNotFound(_) => ArchivalErrorCode::E001SpecNotFound,
            Self::MissingDocuments { .. } => ArchivalErrorCode::E002MissingDocuments,
            Self::AlreadyArchived(_) => ArchivalErrorCode::E003AlreadyArchived,
            Self::Incomplete { .. } => ArchivalErrorCode::E004Incomplete,
            Self::CopyFailed { .. } => ArchivalErrorCode::E005CopyFailed,
            Self::VerificationFailed { .. } => ArchivalErrorCode::E006VerifyFailed,
            Self::Configuration { .. } => ArchivalErrorCode::E007Configuration,
            Self::IndexCorrupt { .. } => ArchivalErrorCode::E008IndexCorrupt,
            Self::Locked(_) => ArchivalErrorCode::E009Locked,
            Self::Io(_) => ArchivalErrorCode::E010Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, ArchivalError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchivalErrorCode {
    E001SpecNotFound,
    E002MissingDocuments,
    E003AlreadyArchived,
    E004Incomplete,
    E005CopyFailed,
    E006VerifyFailed,
    E007Configuration,
    E008IndexCorrupt,
    E009Locked,
    E010Io,
}

impl ArchivalErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001SpecNotFound => "E001_SPEC_NOT_FOUND",
            Self::E002MissingDocuments => "E002_MISSING_DOCUMENTS",
            Self::E003AlreadyArchived => "E003_ALREADY_ARCHIVED",
            Self::E004Incomplete => "E004_INCOMPLETE",
            Self::E005CopyFailed => "E005_COPY_FAILED",
            Self::E006VerifyFailed => "E006_VERIFY_FAILED",
            Self::E007Configuration => "E007_CONFIGURATION",
            Self::E008IndexCorrupt => "E008_INDEX_CORRUPT",
            Self::E009Locked => "E009_LOCKED",
            Self::E010Io => "E010_IO",
        }
    }
}
