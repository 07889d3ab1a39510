//! Error types for xml2graph

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the parse, export and load steps.
#[derive(Error, Debug)]
pub enum Error {
    /// The input is not well-formed XML, or a relationship element lacks an endpoint.
    #[error("parse error at byte {position}: {message}")]
    Parse { position: u64, message: String },

    /// An entity element is missing its designated identifier attribute.
    #[error("schema error at byte {position}: <{element}> has no `{attribute}` attribute")]
    Schema {
        position: u64,
        element: String,
        attribute: String,
    },

    /// Reading or writing a file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The database is unreachable or rejected the credentials.
    #[error("connection error: {0}")]
    Connection(String),

    /// The database refused a record or an edge endpoint was not found.
    #[error("load error: {0}")]
    Load(String),

    /// A schema, pipeline or connection configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A graph file could not be rendered or read back.
    #[error("format error: {0}")]
    Format(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
