use std::string::FromUtf8Error;
use std::{io, net};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("mDNS: invalid host name")]
    ErrInvalidHostName,
    #[error("mDNS: invalid service name")]
    ErrInvalidServiceName,
    #[error("mDNS: invalid instance name")]
    ErrInvalidInstanceName,
    #[error("mDNS: invalid subtype name")]
    ErrInvalidSubtypeName,
    #[error("mDNS: instance is already published locally")]
    ErrDuplicatePublication,
    #[error("mDNS: instance is not published locally")]
    ErrNotPublished,
    #[error("mDNS: no subscription exists for this service")]
    ErrNotSubscribed,
    #[error("mDNS: engine is not started")]
    ErrNotStarted,
    #[error("mDNS: engine is not ready")]
    ErrNotReady,
    #[error("mDNS: engine is already started")]
    ErrAlreadyStarted,
    #[error("mDNS: failed to join multicast group")]
    ErrJoiningMulticastGroup,
    #[error("address placeholder records cannot be packed")]
    ErrAddressPlaceholder,
    #[error("insufficient data for base length type")]
    ErrBaseLen,
    #[error("insufficient data for calculated length type")]
    ErrCalcLen,
    #[error("segment prefix is reserved")]
    ErrReserved,
    #[error("too many pointers (>10)")]
    ErrTooManyPtr,
    #[error("invalid pointer")]
    ErrInvalidPtr,
    #[error("insufficient data for resource body length")]
    ErrResourceLen,
    #[error("segment length too long")]
    ErrSegTooLong,
    #[error("zero length segment")]
    ErrZeroSegLen,
    #[error("resource length too long")]
    ErrResTooLong,
    #[error("too many Questions to pack (>65535)")]
    ErrTooManyQuestions,
    #[error("too many Answers to pack (>65535)")]
    ErrTooManyAnswers,
    #[error("too many Authorities to pack (>65535)")]
    ErrTooManyAuthorities,
    #[error("too many Additionals to pack (>65535)")]
    ErrTooManyAdditionals,
    #[error("name is not in canonical format (it must end with a .)")]
    ErrNonCanonicalName,
    #[error("character string exceeds maximum length (255)")]
    ErrStringTooLong,
    #[error("{0}")]
    Io(#[source] IoError),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] FromUtf8Error),
    #[error("parse addr: {0}")]
    ParseIp(#[from] net::AddrParseError),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}
