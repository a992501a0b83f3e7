use thiserror::Error;

/// Failure kinds surfaced by the pipeline.
///
/// None of these are fatal: every one is reported through the notification
/// collaborator and the session stays usable afterwards.
#[derive(Debug, Error)]
pub enum SheetError {
    /// Uploaded bytes could not be decoded into a table.
    #[error("failed to parse file: {0}")]
    Parse(String),

    /// A dataset (or a row within one) that is not in the store.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation was refused before touching any state.
    #[error("{0}")]
    Validation(String),

    /// The persistent collaborator rejected a read or write.
    #[error("storage failure: {0}")]
    Persistence(String),

    /// Writing spreadsheet bytes failed.
    #[error("export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used for notifications and HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    NotFound,
    Validation,
    Persistence,
    Export,
}

impl SheetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SheetError::Parse(_) => ErrorKind::Parse,
            SheetError::NotFound(_) => ErrorKind::NotFound,
            SheetError::Validation(_) => ErrorKind::Validation,
            SheetError::Persistence(_) | SheetError::Io(_) | SheetError::Json(_) => {
                ErrorKind::Persistence
            }
            SheetError::Export(_) => ErrorKind::Export,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        SheetError::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        SheetError::Validation(msg.into())
    }
}

impl From<calamine::Error> for SheetError {
    fn from(err: calamine::Error) -> Self {
        SheetError::Parse(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for SheetError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        SheetError::Export(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SheetError>;
