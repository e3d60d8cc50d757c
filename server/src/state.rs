use std::sync::Arc;

use comic_core::{ComicCache, ComicClient, ImageStore, Transport, UreqTransport};

use crate::config::{ConfigError, Settings};
use crate::rate_limit::RateLimiter;

/// Everything the handlers share. Built once at startup; clones are cheap.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub client: Arc<ComicClient>,
    pub cache: Arc<ComicCache>,
    pub images: Arc<ImageStore>,
    pub transport: Arc<dyn Transport>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    /// State talking to the configured upstream over HTTP.
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        let transport = Arc::new(UreqTransport::new(settings.request_timeout()));
        Self::with_transport(settings, transport)
    }

    pub fn with_transport(
        settings: Settings,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let limit = settings.parsed_rate_limit()?;
        Ok(Self {
            client: Arc::new(ComicClient::new(&settings.host_address, &settings.info)),
            cache: Arc::new(ComicCache::new(settings.cache_policy())),
            images: Arc::new(ImageStore::new(settings.images.clone())),
            limiter: Arc::new(RateLimiter::new(limit)),
            transport,
            settings: Arc::new(settings),
        })
    }
}
