//! Error types for redstream.

use std::time::Duration;

/// Result type alias for redstream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a stream broker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred during communication.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The broker returned a RESP error reply.
    #[error("server error: {0}")]
    Server(String),

    /// The RESP protocol data was malformed or unexpected.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The reply type did not match what the command produces.
    #[error("unexpected response type: expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// The expected type description.
        expected: &'static str,
        /// The actual type description.
        actual: String,
    },

    /// The connection to the broker was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// No pooled connection could be checked out.
    #[error("connection pool exhausted (max size: {max_size})")]
    PoolExhausted {
        /// The maximum pool size.
        max_size: usize,
    },

    /// A timeout occurred while connecting.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// An invalid argument was provided to a command.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The reader gave up after too many consecutive failures.
    #[error("giving up after {attempts} consecutive failures: {last}")]
    RetriesExhausted {
        /// Number of consecutive failed attempts.
        attempts: u32,
        /// The last error observed.
        last: Box<Error>,
    },

    /// The reader task panicked or was aborted.
    #[error("reader task failed: {0}")]
    Task(String),
}

impl Error {
    /// `BUSYGROUP`: the consumer group already exists.
    pub fn is_busy_group(&self) -> bool {
        self.server_code() == Some("BUSYGROUP")
    }

    /// `NOGROUP`: the stream or consumer group does not exist.
    pub fn is_no_group(&self) -> bool {
        self.server_code() == Some("NOGROUP")
    }

    /// Errors after which the connection state is unknown and must not be reused.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Protocol(_) | Error::ConnectionClosed | Error::Timeout(_)
        )
    }

    /// Errors that retrying the same command cannot fix.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Auth(_) | Error::InvalidArgument(_) | Error::Config(_) => true,
            Error::RetriesExhausted { .. } => true,
            Error::Server(_) => matches!(
                self.server_code(),
                Some("WRONGTYPE" | "NOAUTH" | "WRONGPASS")
            ),
            _ => false,
        }
    }

    /// Leading upper-case token of a server error, e.g. `NOGROUP`.
    fn server_code(&self) -> Option<&str> {
        match self {
            Error::Server(msg) => msg.split_whitespace().next(),
            _ => None,
        }
    }
}
