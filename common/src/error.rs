//! Typed error hierarchy for the wire codec and topology configuration.
//!
//! Kept separate from the `anyhow::Error` used at task boundaries, mirroring how the rest of
//! the corpus reserves `thiserror` for library-internal error enums and reaches for `anyhow`
//! only where errors cross into `main`/CLI handling.

/// Errors raised while parsing or serializing a wire frame.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed frame: expected {expected} fields, got {actual}: {frame:?}")]
    MalformedFrame {
        expected: usize,
        actual: usize,
        frame: String,
    },

    #[error("unknown protocol verb: {0:?}")]
    UnknownVerb(String),

    #[error("invalid address: {0:?}")]
    BadAddress(String),

    #[error("invalid integer field: {0:?}")]
    BadInteger(String),

    #[error("empty frame")]
    EmptyFrame,
}

/// Errors raised while loading the topology config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read topology file {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed topology line {line_no}: {line:?}")]
    MalformedLine { line_no: usize, line: String },

    #[error("invalid address on line {line_no}: {source}")]
    Address {
        line_no: usize,
        #[source]
        source: CodecError,
    },

    #[error("invalid TTR value on line {line_no}: {value:?}")]
    BadTtr { line_no: usize, value: String },

    #[error("this node's address {0} does not appear in the topology file")]
    NodeNotInTopology(String),
}
