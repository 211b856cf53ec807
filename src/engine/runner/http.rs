use std::{net::SocketAddr, thread};

use axum::Router;
use axum::http::header::CONTENT_TYPE;
use axum::routing::get;
use camino::Utf8PathBuf;
use console::style;
use tower_http::services::ServeDir;
use tracing::info;

/// URL of the live-reload client script.
pub const RELOAD_SCRIPT: &str = "/__shikake/reload.js";

pub fn start(
    root: Utf8PathBuf,
    port: u16,
    reload_port: u16,
) -> thread::JoinHandle<Result<(), anyhow::Error>> {
    info!(url = %style(format!("http://localhost:{port}/")).yellow(), "starting a HTTP server");
    info!(
        "add {} to the theme to enable live reload",
        style(format!(
            r#"<script src="http://localhost:{port}{RELOAD_SCRIPT}"></script>"#
        ))
        .cyan()
    );

    thread::spawn(move || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(serve(root, port, reload_port))
    })
}

async fn serve(root: Utf8PathBuf, port: u16, reload_port: u16) -> Result<(), anyhow::Error> {
    let address = SocketAddr::from(([127, 0, 0, 1], port));
    let address = tokio::net::TcpListener::bind(address).await?;

    let script = crate::reload::script(reload_port);

    let router = Router::new()
        .route(
            RELOAD_SCRIPT,
            get(move || {
                let script = script.clone();
                async move { ([(CONTENT_TYPE, "text/javascript")], script) }
            }),
        )
        // the generated theme itself
        .fallback_service(ServeDir::new(root));

    axum::serve(address, router).await?;

    Ok(())
}
