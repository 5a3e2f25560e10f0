use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParameter,
    CapacityExceeded,
    CryptoFailure,
    Serialization,
    StorageUnavailable,
    NotFound,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error {
            kind,
            context: context.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Crypto and serialization failures abort the current operation and
    /// leave the tree in a failed state; everything else is reported to the
    /// caller and the tree stays usable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::CryptoFailure | ErrorKind::Serialization
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::StorageUnavailable,
            context: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
