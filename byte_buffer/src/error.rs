//! Error types shared by every buffer flavor in this crate.

use std::io;

/// Result type alias for buffer operations
pub type Result<T> = std::result::Result<T, BufferError>;

/// Failure classification for buffer operations. Buffer state problems are always reported
/// through this type, never through a panic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// More bytes were requested than the buffer holds, and no more can be waited for
    #[error("Buffer overflow: requested {requested} bytes, available {available}")]
    Overflow { requested: usize, available: usize },

    /// The buffer has been marked as failed by its producer
    #[error("Buffer not ready: the producer reported an error")]
    NotReady,

    /// The buffer has been closed for writing
    #[error("Buffer is read-only: the producer already finished")]
    ReadOnly,

    /// The producer or consumer view of a channel has already been handed out
    #[error("The {role} of this channel has already been taken")]
    AlreadyTaken { role: &'static str },

    /// Invalid arguments, these are programmer errors
    #[error("Invalid argument: {parameter} - {message}")]
    InvalidArgument { parameter: String, message: String },

    /// A pipeline stage thread couldn't be started
    #[error("Failed to spawn a stage thread: {message}")]
    Spawn { message: String },
}

impl BufferError {
    pub fn overflow(requested: usize, available: usize) -> Self {
        Self::Overflow {
            requested,
            available,
        }
    }

    pub fn invalid_argument(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// True for the errors that mean "no more data will ever come", i.e. a reader shall stop.
    pub fn is_terminal(&self) -> bool {
        match self {
            BufferError::Overflow { .. } | BufferError::NotReady => true,
            _ => false,
        }
    }
}

impl From<BufferError> for io::Error {
    fn from(err: BufferError) -> Self {
        let kind = match err {
            BufferError::Overflow { .. } => io::ErrorKind::UnexpectedEof,
            BufferError::NotReady => io::ErrorKind::BrokenPipe,
            BufferError::ReadOnly => io::ErrorKind::WriteZero,
            BufferError::AlreadyTaken { .. } => io::ErrorKind::AddrInUse,
            BufferError::InvalidArgument { .. } => io::ErrorKind::InvalidInput,
            BufferError::Spawn { .. } => io::ErrorKind::Other,
        };

        io::Error::new(kind, err)
    }
}
