//! Synchronous core of the comic front-end.
//!
//! # Overview
//! Fetches comic metadata from an upstream host, memoizes it per
//! `(id, host, info path)`, and downloads comic images into a directory,
//! skipping the ones already there.
//!
//! # Design
//! - `ComicClient` builds `HttpRequest` values and parses `HttpResponse`
//!   values; a `Transport` performs the blocking round-trip. Tests swap in
//!   stub transports.
//! - `ComicCache` and `ImageStore` are plain values owned by whoever hosts
//!   them; there is no global state.
//! - Errors are a single `ApiError` enum; transport failures are reported,
//!   never swallowed.

pub mod cache;
pub mod client;
pub mod error;
pub mod http;
pub mod images;
pub mod transport;
pub mod types;

pub use cache::{CachePolicy, CacheStats, ComicCache};
pub use client::ComicClient;
pub use error::{ApiError, NOT_FOUND_MESSAGE};
pub use http::{HttpRequest, HttpResponse};
pub use images::{image_extension, BatchError, DownloadReport, ImageStore};
pub use transport::{Transport, UreqTransport};
pub use types::{ComicRecord, UpstreamComic};
