use std::{sync::Arc, time::Duration};

use mcp_dispatch::{
    build_app,
    config::Config,
    logging,
    mcp::{server::McpEngine, session::SessionStore},
    AppState,
};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let bind_socket = config.bind_socket()?;

    let engine = Arc::new(McpEngine::new(config.server_info()));
    let sessions = Arc::new(SessionStore::new());

    if let Some(max_idle) = config.session_idle_timeout {
        let sessions = Arc::clone(&sessions);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(max_idle.min(Duration::from_secs(60)));
            loop {
                interval.tick().await;
                let evicted = sessions.evict_idle(max_idle);
                if evicted > 0 {
                    info!(evicted, "idle mcp sessions evicted");
                } else {
                    debug!("no idle mcp sessions");
                }
            }
        });
    }

    let state = AppState::new(engine, sessions);
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        server_name = %config.server_name,
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
