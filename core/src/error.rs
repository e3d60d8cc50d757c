//! Error types for the comic client, cache and image store.
//!
//! # Design
//! `NotFound` covers every non-200 answer to a metadata request and keeps the
//! upstream status so the front-end can echo it. Transport failures get their
//! own variant instead of being swallowed, so callers can surface them as a
//! gateway error rather than an empty record.

use std::fmt;
use std::io;

/// Message carried by `NotFound` for every non-200 metadata response.
pub const NOT_FOUND_MESSAGE: &str = "Item not found";

/// Errors returned by `ComicClient`, `ComicCache` and `ImageStore`.
#[derive(Debug)]
pub enum ApiError {
    /// The upstream answered a metadata request with something other than 200.
    NotFound { status: u16, message: String },

    /// The request never produced a response (DNS, connect, timeout, ...).
    FetchFailed(String),

    /// The metadata body was not the expected JSON document.
    DeserializationError(String),

    /// The image URL answered with something other than 200.
    ImageUnavailable { status: u16, url: String },

    /// Reading the image directory or writing an image failed.
    Storage(io::Error),
}

impl ApiError {
    pub(crate) fn not_found(status: u16) -> Self {
        ApiError::NotFound {
            status,
            message: NOT_FOUND_MESSAGE.to_string(),
        }
    }

    /// Whether the upstream reported the item as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound { message, .. } => write!(f, "{message}"),
            ApiError::FetchFailed(msg) => write!(f, "upstream fetch failed: {msg}"),
            ApiError::DeserializationError(msg) => {
                write!(f, "unexpected upstream response: {msg}")
            }
            ApiError::ImageUnavailable { status, url } => {
                write!(f, "image {url} unavailable (HTTP {status})")
            }
            ApiError::Storage(err) => write!(f, "image storage failed: {err}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ApiError {
    fn from(err: io::Error) -> Self {
        ApiError::Storage(err)
    }
}
