#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        ApiError::Status {
            status,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::NotFound(_) => Some(404),
            ApiError::Other(_) => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RowEditError {
    #[error("row {0} does not exist")]
    IndexOutOfRange(usize),

    #[error("the {attribute} of schema field '{key}' cannot be changed")]
    SchemaFieldLocked { key: String, attribute: &'static str },

    #[error("row '{0}' is deleted")]
    RowDeleted(String),
}

#[derive(thiserror::Error, Debug)]
pub enum EditorError {
    #[error("metadata has {} validation error(s)", .0.len())]
    Validation(Vec<String>),

    #[error("a request for {0} is already in flight")]
    Busy(String),

    #[error("replace-all is limited to {limit} records, got {count}")]
    ReplaceAllLimit { count: usize, limit: usize },

    #[error("CSV import rejected with {} error(s)", .0.len())]
    CsvRejected(Vec<String>),

    #[error("editor has no entity to talk to in offline mode")]
    Offline,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Row(#[from] RowEditError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Dismissible message surfaced to the user after a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBanner {
    pub status: Option<u16>,
    pub message: String,
}

impl ErrorBanner {
    pub fn from_api(err: &ApiError) -> Self {
        Self {
            status: err.status_code(),
            message: err.message(),
        }
    }
}
