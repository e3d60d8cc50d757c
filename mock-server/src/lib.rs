use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// Suffix the stub serves metadata documents under.
pub const INFO_PATH: &str = "info.0.json";

/// Comic number returned by the "current comic" endpoint.
pub const CURRENT_ID: u32 = 2137;

/// Metadata document in the shape the real comic host publishes: `num` is a
/// number, the date parts are strings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComicFixture {
    pub num: u32,
    pub alt: String,
    pub year: String,
    pub month: String,
    pub day: String,
    pub title: String,
    pub safe_title: String,
    pub img: String,
}

/// Request counters keyed by request path.
pub type Hits = Arc<Mutex<HashMap<String, usize>>>;

struct Upstream {
    comics: HashMap<u32, ComicFixture>,
    hits: Hits,
}

type Shared = Arc<Upstream>;

// (num, alt, year, month, day, title, image file)
const FIXTURES: &[(u32, &str, &str, &str, &str, &str, &str)] = &[
    (1, "Don't we all.", "2006", "1", "1", "Barrel - Part 1", "barrel_cropped_(1).jpg"),
    (
        2,
        "'Petit' being a reference to Le Petit Prince, which I only thought about halfway through the sketch",
        "2006",
        "1",
        "1",
        "Petit Trees (sketch)",
        "tree_cropped_(1).jpg",
    ),
    (3, "Hello, island", "2006", "1", "1", "Island (sketch)", "island_color.jpg"),
    (
        4,
        "There's a river flowing through the ocean",
        "2006",
        "1",
        "1",
        "Landscape (sketch)",
        "landscape_cropped_(1).jpg",
    ),
    (5, "Blown into prime factors", "2006", "1", "1", "Blown apart", "blownapart_color.jpg"),
    (
        10,
        "My most famous drawing, and one of the first I did for the site",
        "2006",
        "1",
        "1",
        "Pi Equals",
        "pi.jpg",
    ),
    (11, "More barrel", "2006", "1", "1", "Barrel - Part 2", "barrel_mommies.jpg"),
    (
        1000,
        "Thank you for making me feel less alone.",
        "2012",
        "1",
        "6",
        "1000 Comics",
        "1000_comics.png",
    ),
    (
        2137,
        "Autocorrect can't save you from every typo.",
        "2019",
        "4",
        "10",
        "Text Entry",
        "text_entry.png",
    ),
];

/// Build the fixture table with image URLs rooted at `image_base`.
pub fn fixtures(image_base: &str) -> HashMap<u32, ComicFixture> {
    let image_base = image_base.trim_end_matches('/');
    FIXTURES
        .iter()
        .map(|&(num, alt, year, month, day, title, file)| {
            let fixture = ComicFixture {
                num,
                alt: alt.to_string(),
                year: year.to_string(),
                month: month.to_string(),
                day: day.to_string(),
                title: title.to_string(),
                safe_title: title.to_string(),
                img: format!("{image_base}/comics/{file}"),
            };
            (num, fixture)
        })
        .collect()
}

/// Bytes served for an image file. Deterministic so tests can compare them.
pub fn image_bytes(file: &str) -> Vec<u8> {
    format!("image:{file}").into_bytes()
}

pub fn app(image_base: &str, hits: Hits) -> Router {
    let upstream: Shared = Arc::new(Upstream {
        comics: fixtures(image_base),
        hits,
    });
    Router::new()
        .route(&format!("/{INFO_PATH}"), get(current_comic))
        .route(&format!("/{{id}}/{INFO_PATH}"), get(comic_by_id))
        .route("/comics/{file}", get(image))
        .with_state(upstream)
}

pub async fn run(listener: TcpListener, hits: Hits) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    axum::serve(listener, app(&format!("http://{addr}"), hits)).await
}

/// A stub upstream running on a background thread.
pub struct MockUpstream {
    addr: SocketAddr,
    hits: Hits,
}

impl MockUpstream {
    /// Start the stub on a random local port.
    pub fn spawn() -> Self {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();

        let hits = Hits::default();
        let server_hits = hits.clone();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let listener = TcpListener::from_std(std_listener).unwrap();
                run(listener, server_hits).await
            })
            .unwrap();
        });

        Self { addr, hits }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Host address with a trailing slash, ready to prefix `{id}/{info}`.
    pub fn host_address(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Number of requests the stub has answered for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

fn record_hit(upstream: &Upstream, path: String) {
    let mut hits = upstream.hits.lock().unwrap_or_else(|e| e.into_inner());
    *hits.entry(path).or_insert(0) += 1;
}

async fn current_comic(State(upstream): State<Shared>) -> Result<Json<ComicFixture>, StatusCode> {
    record_hit(&upstream, format!("/{INFO_PATH}"));
    upstream
        .comics
        .get(&CURRENT_ID)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

// The real host answers unknown and malformed ids alike with 404.
async fn comic_by_id(
    State(upstream): State<Shared>,
    Path(id): Path<String>,
) -> Result<Json<ComicFixture>, StatusCode> {
    record_hit(&upstream, format!("/{id}/{INFO_PATH}"));
    let id: u32 = id.parse().map_err(|_| StatusCode::NOT_FOUND)?;
    upstream
        .comics
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn image(
    State(upstream): State<Shared>,
    Path(file): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    record_hit(&upstream, format!("/comics/{file}"));
    let known = upstream
        .comics
        .values()
        .any(|comic| comic.img.ends_with(&format!("/comics/{file}")));
    if !known {
        return Err(StatusCode::NOT_FOUND);
    }
    let content_type = if file.ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    };
    Ok(([(header::CONTENT_TYPE, content_type)], image_bytes(&file)))
}
