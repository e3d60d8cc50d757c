use comic_server::{AppState, Settings};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load()?;
    let addr = settings.bind.clone();
    log::info!(
        "upstream {}{{id}}/{}, images in {}, rate limit {}",
        settings.host_address,
        settings.info,
        settings.images.display(),
        settings.rate_limit
    );

    let state = AppState::new(settings)?;
    let listener = TcpListener::bind(&addr).await?;
    log::info!("listening on http://{addr}");
    comic_server::run(listener, state).await?;
    Ok(())
}
