//! Error taxonomy for probing, ingest and delivery

use std::path::PathBuf;

use thiserror::Error;

/// Reason a single frame header was rejected
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    #[error("header truncated ({0} bytes)")]
    Truncated(usize),
    #[error("bad syncword")]
    BadSync,
    #[error("reserved AAC profile 3")]
    ReservedProfile,
    #[error("bad sampling_frequency_index {0}")]
    BadSamplingIndex(u8),
    #[error("bad channel configuration {0}")]
    BadChannelConfig(u8),
    #[error("AAC frame length {0} out of range")]
    BadFrameLength(u16),
    #[error("reserved MPEG version")]
    ReservedVersion,
    #[error("reserved MPEG layer")]
    ReservedLayer,
    #[error("free or bad bitrate index {0}")]
    BadBitrateIndex(u8),
    #[error("reserved sample rate index")]
    BadSampleRateIndex,
}

/// Unusable or unparseable source file
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("file doesn't exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("cannot open file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("couldn't find {format} frame in the first {window} bytes")]
    NoFrameFound { format: &'static str, window: usize },
    #[error("invalid first frame at offset {offset}: {source}")]
    InvalidFirstFrame {
        offset: u64,
        #[source]
        source: HeaderError,
    },
    #[error("no complete frames in stream")]
    NoFrames,
}

/// Handshake, authentication or socket failure against the ingest server
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("cannot connect to {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("handshake I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("server closed the connection during handshake")]
    Closed,
    #[error("timed out waiting for the server response")]
    Timeout,
    #[error("Shoutcast password rejected: {0}")]
    Rejected(String),
    #[error("invalid Icecast response: {0}")]
    BadStatus(String),
}

/// Top-level error returned by the delivery loops
#[derive(Error, Debug)]
pub enum CastError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("aborted by user")]
    Aborted,
    #[error("encoder stalled, no data for {silent_ms} ms")]
    StalledEncoder { silent_ms: u64 },
}

impl CastError {
    /// Whether the caller should give up on the current track and move on
    pub fn is_format(&self) -> bool {
        matches!(self, CastError::Format(_))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, CastError::Aborted)
    }
}

pub type Result<T, E = CastError> = std::result::Result<T, E>;
