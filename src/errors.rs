use std::error::Error;

use http::StatusCode;

use crate::davpath::ParseError;
use crate::fs::FsError;
use crate::ls::DavLock;

/// Errors returned by the distributor.
#[derive(Debug)]
pub enum DavError {
    /// malformed or traversal-attempting path
    InvalidPath,
    /// no mount matches the path
    NoSuchMount,
    /// lock token unknown or expired
    NoSuchLock,
    /// lock request conflicts with an existing lock
    Conflict(Box<DavLock>),
    /// write refused, resource is locked
    Locked(Box<DavLock>),
    /// permission resolution failed
    Denied,
    /// mutating method on a read-only mount
    ReadOnly,
    /// COPY/MOVE between two different mounts
    CrossProviderUnsupported,
    UnknownDavMethod,
    InvalidConfig(String),
    Status(StatusCode),
    FsError(FsError),
}

/// Result type for distributor operations.
pub type DavResult<T> = Result<T, DavError>;

impl Error for DavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DavError::FsError(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for DavError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DavError::Conflict(lock) => write!(f, "conflicting lock {} on {}", lock.token, lock.path),
            DavError::Locked(lock) => write!(f, "locked by {} on {}", lock.token, lock.path),
            DavError::InvalidConfig(s) => write!(f, "invalid configuration: {}", s),
            DavError::FsError(e) => write!(f, "provider error: {}", e),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl From<FsError> for DavError {
    fn from(e: FsError) -> Self {
        DavError::FsError(e)
    }
}

impl From<ParseError> for DavError {
    fn from(_: ParseError) -> Self {
        DavError::InvalidPath
    }
}

impl From<StatusCode> for DavError {
    fn from(e: StatusCode) -> Self {
        DavError::Status(e)
    }
}

pub(crate) fn fserror_to_status(e: FsError) -> StatusCode {
    match e {
        FsError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        FsError::GeneralFailure => StatusCode::INTERNAL_SERVER_ERROR,
        FsError::Exists => StatusCode::METHOD_NOT_ALLOWED,
        FsError::NotFound => StatusCode::NOT_FOUND,
        FsError::Forbidden => StatusCode::FORBIDDEN,
        FsError::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
        FsError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
    }
}

impl DavError {
    /// The HTTP status a caller should answer with.
    pub fn statuscode(&self) -> StatusCode {
        match self {
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::NoSuchMount => StatusCode::NOT_FOUND,
            DavError::NoSuchLock => StatusCode::CONFLICT,
            DavError::Conflict(_) => StatusCode::LOCKED,
            DavError::Locked(_) => StatusCode::LOCKED,
            DavError::Denied => StatusCode::FORBIDDEN,
            DavError::ReadOnly => StatusCode::METHOD_NOT_ALLOWED,
            DavError::CrossProviderUnsupported => StatusCode::BAD_GATEWAY,
            DavError::UnknownDavMethod => StatusCode::NOT_IMPLEMENTED,
            DavError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DavError::Status(e) => *e,
            DavError::FsError(e) => fserror_to_status(*e),
        }
    }
}
