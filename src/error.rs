// src/error.rs

use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

use crate::sources::SourceId;
use crate::vocab::Dimension;

/// Everything that can go wrong while turning one upstream into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("fetch {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("cannot parse {what} from {text:?}")]
    Parse { what: &'static str, text: String },

    #[error("format drift: {0}")]
    FormatDrift(#[from] Drift),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("dates not strictly increasing: {current} follows {previous}")]
    Ordering {
        previous: NaiveDate,
        current: NaiveDate,
    },

    #[error("no usable update timestamp for {0}")]
    MissingMetadata(String),

    #[error("config: {0}")]
    Config(String),
}

/// The upstream no longer looks the way we know it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Drift {
    #[error("unrecognized {dimension} label {label:?}")]
    UnknownLabel { dimension: Dimension, label: String },

    #[error("{0}")]
    Layout(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Fetch,
    Parse,
    FormatDrift,
    NotFound,
    Ordering,
    MissingMetadata,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Fetch { .. } => ErrorKind::Fetch,
            Error::Parse { .. } => ErrorKind::Parse,
            Error::FormatDrift(_) => ErrorKind::FormatDrift,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Ordering { .. } => ErrorKind::Ordering,
            Error::MissingMetadata(_) => ErrorKind::MissingMetadata,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    pub fn parse(what: &'static str, text: impl Into<String>) -> Self {
        Error::Parse {
            what,
            text: text.into(),
        }
    }

    pub fn layout(msg: impl Into<String>) -> Self {
        Error::FormatDrift(Drift::Layout(msg.into()))
    }

    pub fn unknown_label(dimension: Dimension, label: impl Into<String>) -> Self {
        Error::FormatDrift(Drift::UnknownLabel {
            dimension,
            label: label.into(),
        })
    }
}

/// Pipeline step an adapter was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Locate,
    Extract,
    Map,
    Reconstruct,
    Assemble,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Locate => "locate",
            Stage::Extract => "extract",
            Stage::Map => "map",
            Stage::Reconstruct => "reconstruct",
            Stage::Assemble => "assemble",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An [`Error`] tagged with the upstream and stage it came from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source_id} failed at {stage}: {error}")]
pub struct SourceError {
    pub source_id: SourceId,
    pub stage: Stage,
    #[source]
    pub error: Error,
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// `anyhow::Context`-style tagging for adapter code.
pub trait StageExt<T> {
    fn at(self, source_id: SourceId, stage: Stage) -> Result<T, SourceError>;
}

impl<T> StageExt<T> for Result<T, Error> {
    fn at(self, source_id: SourceId, stage: Stage) -> Result<T, SourceError> {
        self.map_err(|error| SourceError {
            source_id,
            stage,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_names_the_offending_label() {
        let err = Error::unknown_label(Dimension::AgeGroup, "100+");
        assert_eq!(err.kind(), ErrorKind::FormatDrift);
        assert_eq!(
            err.to_string(),
            "format drift: unrecognized age_group label \"100+\""
        );
    }

    #[test]
    fn tagging_keeps_source_stage_and_kind() {
        let res: Result<(), Error> = Err(Error::parse("count", "12a"));
        let err = res.at(SourceId::Sonoma, Stage::Extract).unwrap_err();
        assert_eq!(err.source_id, SourceId::Sonoma);
        assert_eq!(err.stage, Stage::Extract);
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().starts_with("sonoma failed at extract:"));
    }
}
