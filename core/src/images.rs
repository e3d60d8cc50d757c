//! Comic image downloads into a local directory.
//!
//! The directory itself is the record of what has been downloaded: a file
//! named `{id}.{ext}` means comic `id` is present. Files whose stem is not an
//! integer are ignored.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use serde::Serialize;

use crate::cache::ComicCache;
use crate::client::ComicClient;
use crate::error::ApiError;
use crate::http::HttpRequest;
use crate::transport::Transport;

/// Extension used when the image URL has none.
const FALLBACK_EXTENSION: &str = "bin";

/// Outcome of a successful batch. Both lists are ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub downloaded: Vec<u32>,
    pub skipped: Vec<u32>,
}

/// A batch aborted on `id`. Images written before it stay on disk.
#[derive(Debug)]
pub struct BatchError {
    /// `None` when the directory could not be scanned at all.
    pub id: Option<u32>,
    pub source: ApiError,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "comic {id}: {}", self.source),
            None => write!(f, "{}", self.source),
        }
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug)]
pub struct ImageStore {
    dir: PathBuf,
    // One lock per comic id so concurrent batches never write the same file.
    locks: DashMap<u32, Arc<Mutex<()>>>,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: DashMap::new(),
        }
    }

    /// IDs with an image in the directory. A missing directory is empty.
    pub fn downloaded_ids(&self) -> Result<BTreeSet<u32>, ApiError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = BTreeSet::new();
        for entry in entries {
            let path = entry?.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match stem.parse::<u32>() {
                Ok(id) => {
                    ids.insert(id);
                }
                // In-progress downloads are dotfiles.
                Err(_) if stem.starts_with('.') => {}
                Err(_) => log::warn!("ignoring non-comic file {}", path.display()),
            }
        }
        Ok(ids)
    }

    /// Download every requested image not already in the directory.
    ///
    /// IDs are processed in ascending order and the first failure aborts the
    /// rest of the batch.
    pub fn download_missing(
        &self,
        transport: &dyn Transport,
        cache: &ComicCache,
        client: &ComicClient,
        ids: &BTreeSet<u32>,
    ) -> Result<DownloadReport, BatchError> {
        let present = self
            .downloaded_ids()
            .map_err(|source| BatchError { id: None, source })?;

        let mut report = DownloadReport {
            skipped: ids.intersection(&present).copied().collect(),
            ..DownloadReport::default()
        };

        for &id in ids.difference(&present) {
            let lock = self.locks.entry(id).or_default().clone();
            let fetched = {
                let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
                self.fetch_one(transport, cache, client, id)
            };
            // Nobody else is waiting on this id: forget its lock.
            self.locks
                .remove_if(&id, |_, stored| Arc::ptr_eq(stored, &lock) && Arc::strong_count(stored) == 2);

            match fetched {
                Ok(Some(path)) => {
                    log::info!("downloaded comic {id} to {}", path.display());
                    report.downloaded.push(id);
                }
                Ok(None) => report.skipped.push(id),
                Err(source) => {
                    return Err(BatchError {
                        id: Some(id),
                        source,
                    })
                }
            }
        }

        report.skipped.sort_unstable();
        Ok(report)
    }

    // Caller holds the lock for `id`. `None` if another batch wrote the
    // image while we waited; its record is then already cached.
    fn fetch_one(
        &self,
        transport: &dyn Transport,
        cache: &ComicCache,
        client: &ComicClient,
        id: u32,
    ) -> Result<Option<PathBuf>, ApiError> {
        let record = cache.get_comic(transport, client, id)?;
        let file_name = format!("{id}.{}", image_extension(&record.image_url));
        let target = self.dir.join(&file_name);
        if target.exists() {
            return Ok(None);
        }
        self.store(transport, &record.image_url, &file_name, &target)?;
        Ok(Some(target))
    }

    fn store(
        &self,
        transport: &dyn Transport,
        url: &str,
        file_name: &str,
        target: &Path,
    ) -> Result<(), ApiError> {
        let response = transport.execute(&HttpRequest::get(url))?;
        if response.status != 200 {
            return Err(ApiError::ImageUnavailable {
                status: response.status,
                url: url.to_string(),
            });
        }

        fs::create_dir_all(&self.dir)?;
        let partial = self.dir.join(format!(".{file_name}.part"));

        let written = fs::write(&partial, &response.body).and_then(|()| fs::rename(&partial, target));
        if let Err(e) = written {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }
        Ok(())
    }
}

/// The text after the last `.` of `url`, or `bin` if that would span a path segment.
pub fn image_extension(url: &str) -> &str {
    match url.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && !ext.contains('/') => ext,
        _ => FALLBACK_EXTENSION,
    }
}
