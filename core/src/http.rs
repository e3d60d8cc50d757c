//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data.
//! `ComicClient` builds `HttpRequest` values and parses `HttpResponse` values
//! without touching the network; a `Transport` executes the round-trip.
//! Every upstream call is a GET, so requests carry no method or body.
//!
//! Response bodies are raw bytes because the same transport downloads images.

/// An HTTP GET request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// A bare GET for `url` with no extra headers.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Convenience constructor for canned responses.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canned_response_has_no_headers() {
        let response = HttpResponse::new(404, "");
        assert_eq!(response.status, 404);
        assert!(response.headers.is_empty());
        assert!(response.body.is_empty());
    }

    #[test]
    fn get_has_no_headers() {
        let request = HttpRequest::get("http://localhost/1/info.0.json");
        assert_eq!(request.url, "http://localhost/1/info.0.json");
        assert!(request.headers.is_empty());
    }
}
