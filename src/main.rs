use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tracing::{error, info};

use purchase_request_core as prq;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = prq::config::load_config().context("failed to load configuration")?;
    prq::config::init_tracing(cfg.log_level(), cfg.log_json);
    prq::handlers::health::init_start_time();

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = prq::events::EventSender::new(event_tx);
    tokio::spawn(prq::events::process_events(event_rx, Vec::new()));

    // Drafts live as JSON files under the configured directory
    tokio::fs::create_dir_all(&cfg.drafts.store_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create draft directory {}",
                cfg.drafts.store_dir.display()
            )
        })?;
    let store: Arc<dyn prq::services::DraftStore> =
        Arc::new(prq::services::FileDraftStore::new(cfg.drafts.store_dir.clone()));
    info!(dir = %cfg.drafts.store_dir.display(), "Draft store ready");

    let access_log = Arc::new(prq::logging::LoggingState::new(prq::logging::setup_logger(
        prq::logging::LoggerConfig {
            use_color: !cfg.is_production(),
            ..Default::default()
        },
    )));

    let host: std::net::IpAddr = cfg
        .host
        .parse()
        .with_context(|| format!("invalid host address {}", cfg.host))?;
    let addr = SocketAddr::new(host, cfg.port);

    let app_state = prq::AppState::new(cfg, store, event_sender);
    let app = prq::app_router(app_state, access_log);

    info!("purchase-request-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
