use std::{fmt, io, net::SocketAddr};

use tokio::task::JoinError;

use super::wire::Command;

/// Every way a session can fail. All variants are fatal to the session.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// The remote end closed the stream before `expected` bytes arrived.
    PeerClosed {
        expected: usize,
        received: usize,
    },
    /// Transient failures (would-block, interrupted, chunk timeout) kept
    /// recurring without progress.
    RetriesExhausted {
        attempts: u32,
        last: io::ErrorKind,
    },
    /// An array header declared a length of zero or less.
    InvalidLength(i32),
    /// An array too long for the 4-byte length header.
    LengthOverflow(usize),
    /// The configured dataset cannot be split into two equal, non-empty
    /// partitions.
    InvalidTotalLen(usize),
    UnknownCommand(i32),
    UnexpectedCommand(Command),
    /// I/O attempted on a link that was already closed.
    ConnectionClosed,
    DialFailed {
        addr: SocketAddr,
        attempts: u32,
    },
    ThreadPool(rayon::ThreadPoolBuildError),
    Join(JoinError),
}

impl Error {
    /// True when the remote end hung up cleanly between two messages.
    pub fn is_orderly_close(&self) -> bool {
        matches!(self, Error::PeerClosed { received: 0, .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "i/o error: {e}"),
            Error::PeerClosed { expected, received } => write!(
                f,
                "connection closed by remote after {received} of {expected} bytes"
            ),
            Error::RetriesExhausted { attempts, last } => write!(
                f,
                "gave up after {attempts} transient failures (last: {last:?})"
            ),
            Error::InvalidLength(len) => {
                write!(f, "array header declared invalid length {len}")
            }
            Error::LengthOverflow(len) => {
                write!(f, "array of {len} values does not fit a length header")
            }
            Error::InvalidTotalLen(len) => {
                write!(f, "dataset length {len} must be even and at least 2")
            }
            Error::UnknownCommand(code) => write!(f, "unknown command code {code}"),
            Error::UnexpectedCommand(cmd) => write!(f, "unexpected command {cmd:?}"),
            Error::ConnectionClosed => write!(f, "connection already closed"),
            Error::DialFailed { addr, attempts } => {
                write!(f, "could not reach {addr} after {attempts} attempts")
            }
            Error::ThreadPool(e) => write!(f, "thread pool: {e}"),
            Error::Join(e) => write!(f, "compute task failed: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::ThreadPool(e) => Some(e),
            Error::Join(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool(e)
    }
}

impl From<JoinError> for Error {
    fn from(e: JoinError) -> Self {
        Self::Join(e)
    }
}
