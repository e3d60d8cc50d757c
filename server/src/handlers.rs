//! Route handlers. Core calls block on network and disk I/O, so each one
//! runs on the blocking thread pool.

use std::collections::BTreeSet;

use axum::{
    extract::{rejection::PathRejection, Path, RawQuery, State},
    http::StatusCode,
    Json,
};
use comic_core::ComicRecord;
use serde_json::json;

use crate::error::{AppError, FieldError};
use crate::query;
use crate::state::AppState;

/// Narrow a requested id to the range the host assigns. Anything outside
/// it cannot exist upstream and is answered as not found.
fn comic_id(id: i64) -> Result<u32, AppError> {
    u32::try_from(id).map_err(|_| AppError::no_such_comic(id))
}

pub async fn comic_by_id(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<ComicRecord>, AppError> {
    let Path(id) = path.map_err(|_| {
        AppError::Validation(vec![FieldError::not_an_integer(vec![
            json!("path"),
            json!("comic_id"),
        ])])
    })?;
    let id = comic_id(id)?;

    let record = tokio::task::spawn_blocking(move || {
        state.cache.get_comic(&*state.transport, &state.client, id)
    })
    .await?
    .map_err(|e| AppError::comic(id, e))?;

    log::info!("served comic {id}");
    Ok(Json(record))
}

pub async fn current_comic(State(state): State<AppState>) -> Result<Json<ComicRecord>, AppError> {
    let record = tokio::task::spawn_blocking(move || state.client.fetch_current(&*state.transport))
        .await?
        .map_err(AppError::current)?;

    log::info!("served current comic {}", record.id);
    Ok(Json(record))
}

/// Records for the distinct requested ids, ascending. The first failure
/// fails the whole request.
pub async fn many_comics(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Json<Vec<ComicRecord>>, AppError> {
    let ids: BTreeSet<i64> = query::comic_ids(raw.as_deref())?.into_iter().collect();
    let count = ids.len();

    let records = tokio::task::spawn_blocking(move || {
        ids.into_iter()
            .map(|id| {
                let id = comic_id(id)?;
                state
                    .cache
                    .get_comic(&*state.transport, &state.client, id)
                    .map_err(|e| AppError::comic(id, e))
            })
            .collect::<Result<Vec<_>, _>>()
    })
    .await??;

    log::info!("served {count} comics");
    Ok(Json(records))
}

/// Download images for the requested ids into the image directory.
pub async fn download_comics(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<StatusCode, AppError> {
    let requested: BTreeSet<i64> = query::comic_ids(raw.as_deref())?.into_iter().collect();

    // Ascending order: a negative id fails before anything is fetched, one
    // past the id range fails after every valid id is on disk.
    let mut ids = BTreeSet::new();
    let mut past_range = None;
    for id in requested {
        match u32::try_from(id) {
            Ok(id) => {
                ids.insert(id);
            }
            Err(_) if id < 0 => return Err(AppError::no_such_comic(id)),
            Err(_) => {
                past_range.get_or_insert(id);
            }
        }
    }
    let cache = state.cache.clone();

    let report = tokio::task::spawn_blocking(move || {
        state
            .images
            .download_missing(&*state.transport, &state.cache, &state.client, &ids)
    })
    .await??;

    log::info!(
        "downloaded comics {:?}, already present {:?}",
        report.downloaded,
        report.skipped
    );
    log::debug!("cache stats: {:?}", cache.stats());
    match past_range {
        Some(id) => Err(AppError::no_such_comic(id)),
        None => Ok(StatusCode::OK),
    }
}
