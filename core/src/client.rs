//! Request builder and response parser for the upstream comic host.
//!
//! # Design
//! `ComicClient` holds only the host address and the info path. Each lookup
//! is split into a `build_*` method that produces an `HttpRequest` and
//! `parse_comic`, which consumes the `HttpResponse`. `fetch_*` glue the two
//! together over a caller-supplied `Transport`.

use chrono::NaiveDate;

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;
use crate::types::{ComicRecord, Scalar, UpstreamComic};

/// Client for one upstream host and info path.
///
/// URLs are plain concatenations: `{host_address}{id}/{info_path}` and
/// `{host_address}{info_path}`, so `host_address` normally ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComicClient {
    host_address: String,
    info_path: String,
}

impl ComicClient {
    pub fn new(host_address: &str, info_path: &str) -> Self {
        Self {
            host_address: host_address.to_string(),
            info_path: info_path.to_string(),
        }
    }

    pub fn host_address(&self) -> &str {
        &self.host_address
    }

    pub fn info_path(&self) -> &str {
        &self.info_path
    }

    pub fn build_get_comic(&self, id: u32) -> HttpRequest {
        HttpRequest {
            url: format!("{}{id}/{}", self.host_address, self.info_path),
            headers: vec![("accept".to_string(), "application/json".to_string())],
        }
    }

    pub fn build_get_current(&self) -> HttpRequest {
        HttpRequest {
            url: format!("{}{}", self.host_address, self.info_path),
            headers: vec![("accept".to_string(), "application/json".to_string())],
        }
    }

    /// Turn a metadata response into a record, or `NotFound` for any non-200.
    pub fn parse_comic(&self, response: HttpResponse) -> Result<ComicRecord, ApiError> {
        if response.status != 200 {
            return Err(ApiError::not_found(response.status));
        }
        let upstream: UpstreamComic = serde_json::from_slice(&response.body)
            .map_err(|e| ApiError::DeserializationError(e.to_string()))?;
        normalize(upstream)
    }

    pub fn fetch_by_id(&self, transport: &dyn Transport, id: u32) -> Result<ComicRecord, ApiError> {
        let request = self.build_get_comic(id);
        log::debug!("fetching comic {id} from {}", request.url);
        self.parse_comic(transport.execute(&request)?)
    }

    pub fn fetch_current(&self, transport: &dyn Transport) -> Result<ComicRecord, ApiError> {
        let request = self.build_get_current();
        log::debug!("fetching current comic from {}", request.url);
        self.parse_comic(transport.execute(&request)?)
    }
}

fn normalize(upstream: UpstreamComic) -> Result<ComicRecord, ApiError> {
    let date = format_date(&upstream.year, &upstream.month, &upstream.day)?;
    Ok(ComicRecord {
        id: upstream.num.to_text(),
        description: upstream.alt,
        date,
        title: upstream.title.to_lowercase(),
        image_url: upstream.img,
    })
}

/// Two-digit-year `YY-MM-DD`; rejects dates that do not exist.
fn format_date(year: &Scalar, month: &Scalar, day: &Scalar) -> Result<String, ApiError> {
    let invalid = || {
        ApiError::DeserializationError(format!(
            "invalid date {}-{}-{}",
            year.to_text(),
            month.to_text(),
            day.to_text()
        ))
    };
    let y = year.as_i64().and_then(|v| i32::try_from(v).ok()).ok_or_else(invalid)?;
    let m = month.as_i64().and_then(|v| u32::try_from(v).ok()).ok_or_else(invalid)?;
    let d = day.as_i64().and_then(|v| u32::try_from(v).ok()).ok_or_else(invalid)?;
    let date = NaiveDate::from_ymd_opt(y, m, d).ok_or_else(invalid)?;
    Ok(date.format("%y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    const COMIC_1000: &str = r#"{"month":"1","num":1000,"link":"","year":"2012","news":"","safe_title":"1000 Comics","alt":"Thank you for making me feel less alone.","img":"https://imgs.xkcd.com/comics/1000_comics.png","title":"1000 Comics","day":"6"}"#;

    /// Replays one canned response and remembers the URLs it was asked for.
    struct Canned {
        response: HttpResponse,
        urls: Mutex<Vec<String>>,
    }

    impl Canned {
        fn new(status: u16, body: &str) -> Self {
            Self {
                response: HttpResponse::new(status, body),
                urls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for Canned {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
            self.urls.lock().unwrap().push(request.url.clone());
            Ok(self.response.clone())
        }
    }

    struct Offline;

    impl Transport for Offline {
        fn execute(&self, _request: &HttpRequest) -> Result<HttpResponse, ApiError> {
            Err(ApiError::FetchFailed("connection refused".to_string()))
        }
    }

    fn client() -> ComicClient {
        ComicClient::new("https://xkcd.com/", "info.0.json")
    }

    #[test]
    fn build_get_comic_produces_correct_url() {
        let req = client().build_get_comic(1000);
        assert_eq!(req.url, "https://xkcd.com/1000/info.0.json");
        assert_eq!(
            req.headers,
            vec![("accept".to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn build_get_current_produces_correct_url() {
        let req = client().build_get_current();
        assert_eq!(req.url, "https://xkcd.com/info.0.json");
    }

    #[test]
    fn host_address_is_used_verbatim() {
        let client = ComicClient::new("http://localhost:3000/api/", "meta.json");
        assert_eq!(
            client.build_get_comic(7).url,
            "http://localhost:3000/api/7/meta.json"
        );
    }

    #[test]
    fn parse_comic_normalizes_fields() {
        let record = client()
            .parse_comic(HttpResponse::new(200, COMIC_1000))
            .unwrap();
        assert_eq!(
            record,
            ComicRecord {
                id: "1000".to_string(),
                description: "Thank you for making me feel less alone.".to_string(),
                date: "12-01-06".to_string(),
                title: "1000 comics".to_string(),
                image_url: "https://imgs.xkcd.com/comics/1000_comics.png".to_string(),
            }
        );
    }

    #[test]
    fn parse_comic_non_200_is_not_found_with_status() {
        for status in [404, 500, 301] {
            let err = client()
                .parse_comic(HttpResponse::new(status, "<html>"))
                .unwrap_err();
            match err {
                ApiError::NotFound { status: s, message } => {
                    assert_eq!(s, status);
                    assert_eq!(message, "Item not found");
                }
                other => panic!("expected NotFound, got {other:?}"),
            }
        }
    }

    #[test]
    fn parse_comic_bad_json() {
        let err = client()
            .parse_comic(HttpResponse::new(200, "not json"))
            .unwrap_err();
        assert!(matches!(err, ApiError::DeserializationError(_)));
    }

    #[test]
    fn parse_comic_impossible_date() {
        let body = r#"{"num":1,"alt":"","year":"2006","month":"2","day":"30","title":"x","img":"x.png"}"#;
        let err = client().parse_comic(HttpResponse::new(200, body)).unwrap_err();
        assert!(matches!(err, ApiError::DeserializationError(_)));
    }

    #[test]
    fn fetch_by_id_requests_the_id_url() {
        let transport = Canned::new(200, COMIC_1000);
        let record = client().fetch_by_id(&transport, 1000).unwrap();
        assert_eq!(record.id, "1000");
        assert_eq!(
            *transport.urls.lock().unwrap(),
            vec!["https://xkcd.com/1000/info.0.json".to_string()]
        );
    }

    #[test]
    fn fetch_current_requests_the_info_url() {
        let transport = Canned::new(200, COMIC_1000);
        client().fetch_current(&transport).unwrap();
        assert_eq!(
            *transport.urls.lock().unwrap(),
            vec!["https://xkcd.com/info.0.json".to_string()]
        );
    }

    #[test]
    fn transport_failure_propagates_as_fetch_failed() {
        let err = client().fetch_by_id(&Offline, 1).unwrap_err();
        assert!(matches!(err, ApiError::FetchFailed(_)));
        let err = client().fetch_current(&Offline).unwrap_err();
        assert!(matches!(err, ApiError::FetchFailed(_)));
    }
}
