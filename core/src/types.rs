//! Domain DTOs: the upstream metadata document and the normalized record.
//!
//! # Design
//! `UpstreamComic` mirrors what the comic host publishes and tolerates the
//! date parts and number arriving as either strings or numbers. `ComicRecord`
//! is the shape served to clients; it is built in one step from a successful
//! fetch and never mutated afterwards.

use serde::{Deserialize, Serialize};

/// One comic as served to clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ComicRecord {
    pub id: String,
    pub description: String,
    /// `YY-MM-DD`.
    pub date: String,
    /// Lowercased.
    pub title: String,
    #[serde(rename = "url")]
    pub image_url: String,
}

/// A JSON scalar that may be a number or its string form.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Scalar {
    Number(i64),
    Text(String),
}

impl Scalar {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }
}

/// Metadata document published by the comic host. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamComic {
    pub num: Scalar,
    pub alt: String,
    pub year: Scalar,
    pub month: Scalar,
    pub day: Scalar,
    pub title: String,
    pub img: String,
}
