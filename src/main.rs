// src/main.rs
use anyhow::Result;
use hyper::{Body, Request, Response, Server, StatusCode};
use rust_chaos_service::{
    api::AppState,
    config::Settings,
    logformat,
    metrics::MetricsRegistry,
    server::{self, response::text_response, ServerBuilder},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rust_chaos_service=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    if let Some(path) = &config_path {
        info!("Loading configuration from: {}", path.display());
    }
    let settings = Settings::load(config_path.as_deref())?;

    let log_format = logformat::select(&settings.log_format(), &mut rand::thread_rng());
    println!("Global Log Format: {}", log_format);
    info!("Global Log Format: {}", log_format);

    let delay = settings.startup_delay_or_zero();
    if !delay.is_zero() {
        info!("Delaying startup by {:?}", delay);
        tokio::time::sleep(delay).await;
    }

    let metrics_settings = settings.metrics()?;
    let metrics = if metrics_settings.enabled {
        let registry = MetricsRegistry::new()?;
        let collector = registry.collector();
        let metrics_addr: SocketAddr = ([0, 0, 0, 0], metrics_settings.port).into();
        start_metrics_server(metrics_addr, registry, metrics_settings.path).await?;
        Some(collector)
    } else {
        None
    };

    let addr: SocketAddr = ([0, 0, 0, 0], settings.port()?).into();
    let state = Arc::new(AppState::new(settings, log_format, metrics)?);
    info!("Starting chaos service on {}", addr);

    ServerBuilder::new(addr)
        .with_handler(server::service(state))
        .serve_with_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn start_metrics_server(
    addr: SocketAddr,
    registry: MetricsRegistry,
    path: String,
) -> Result<()> {
    let registry = Arc::new(registry);
    let metrics_path = Arc::new(path);
    let service_path = metrics_path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    let response: Response<Body> = if req.uri().path() == path.as_str() {
                        text_response(StatusCode::OK, registry.gather(), "text/plain; version=0.0.4")
                    } else {
                        text_response(StatusCode::NOT_FOUND, "Not Found", "text/plain")
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_service);

    info!(
        "Metrics server listening on http://{}{}",
        addr,
        metrics_path.as_str()
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
