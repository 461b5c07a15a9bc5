use thiserror::Error;

/// A dataset could not be retrieved or its payload was not a row array.
/// Fetch failures are isolated per dataset: the caller keeps the previous
/// views for that dataset and may retry the single fetch independently.
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("request for dataset {dataset} failed: {source}")]
    Transport {
        dataset: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("dataset {dataset} returned HTTP {status}")]
    Status {
        dataset: String,
        status: reqwest::StatusCode,
    },
    #[error("dataset {dataset} payload is not a JSON array of records")]
    MalformedPayload { dataset: String },
}

/// A single row violated the dataset's schema contract. Offending rows are
/// dropped and counted; aggregation continues with the valid remainder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    #[error("required column {0} is absent")]
    MissingColumn(&'static str),
    #[error("column {column} holds unusable value {value:?}")]
    BadValue { column: &'static str, value: String },
    #[error("unrecognized balance type {0:?}")]
    UnknownBalanceType(String),
    #[error("duplicate record for key {0}")]
    DuplicateRecord(String),
}

/// A derived ratio had a zero denominator. Reported as "unavailable",
/// never as a zero and never as a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("denominator is zero; metric undefined")]
pub struct DivisionUndefined;

/// Coarse fetch-error kind used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    Connect,
    Status,
    Decode,
    Other,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Status => "status",
            Self::Decode => "decode",
            Self::Other => "other",
        }
    }
}

pub fn classify_fetch_failure(err: &FetchFailure) -> FetchErrorKind {
    match err {
        FetchFailure::Transport { source, .. } => {
            if source.is_timeout() {
                FetchErrorKind::Timeout
            } else if source.is_connect() {
                FetchErrorKind::Connect
            } else if source.is_decode() {
                FetchErrorKind::Decode
            } else {
                FetchErrorKind::Other
            }
        }
        FetchFailure::Status { .. } => FetchErrorKind::Status,
        FetchFailure::MalformedPayload { .. } => FetchErrorKind::Decode,
    }
}
