mod conf;
mod error;
mod handler;

use std::sync::Arc;

pub use conf::Config;
pub use error::GatewayError;
pub use handler::build_router;
use rsg_engine::{Engine, EngineConfig};
use tokio::net::TcpListener;
use tracing::info;

pub fn init_log(json_format: bool) {
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::{
        EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt,
    };
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let fmt_layer = if json_format {
        fmt_layer.json().boxed()
    } else {
        fmt_layer.boxed()
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

pub async fn start_server(
    config: Config,
    engine_config: EngineConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let engine = Arc::new(Engine::from_config(&engine_config).await?);
    let poller = engine.start();

    let router = build_router(engine.clone());
    let listener =
        TcpListener::bind(format!("0.0.0.0:{}", config.http_port)).await?;
    info!("start server on port {:?}", config.http_port);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown();
    poller.await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
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
    info!("shutdown signal received");
}
