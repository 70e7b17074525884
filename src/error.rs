use std::path::PathBuf;

use thiserror::Error;

/// Failure to read or write the XML layer.
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("XML error at position {position}: {source}")]
    Syntax {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Unknown entity reference '&{0};'")]
    UnknownEntity(String),

    #[error("Document has no root element")]
    NoRoot,

    #[error("Unexpected content outside the root element")]
    OutsideRoot,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The schema file could not be loaded or uses constructs we cannot compile.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Cannot read schema {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse schema: {0}")]
    Xml(#[from] XmlError),

    #[error("Invalid schema: {0}")]
    Invalid(String),
}

/// A document does not conform to the schema. The message is meant for users.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{path}: {reason}")]
pub struct ValidationError {
    pub path: String,
    pub reason: String,
}

/// A single track point could not be read.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PointParseError {
    #[error("Missing attribute '{0}' on <trkpt>")]
    MissingAttribute(&'static str),

    #[error("Invalid value '{value}' for '{field}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid timestamp '{0}'")]
    InvalidTime(String),
}

/// A track has no point carrying a usable timestamp.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Track has no timestamped points")]
pub struct NoTimestampData;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimezoneError {
    #[error("Unknown timezone '{0}'")]
    UnknownZone(String),

    #[error("Timestamp {0} cannot be represented in the timezone database")]
    OutOfRange(String),

    #[error("Offset of {0} seconds is out of range")]
    InvalidOffset(i32),
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Schema validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Timezone(#[from] TimezoneError),
}

#[derive(Error, Debug)]
pub enum BookmarkError {
    #[error("Cannot write bookmarks to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: XmlError,
    },
}
