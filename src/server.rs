use crate::config::Config;
use crate::error::ThrottlerResult;
use crate::handlers::{health_check, ping, report};
use crate::middleware::{throttle_middleware, HttpThrottle};
use crate::store::Storage;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Cooldown for `/api/report`, independent of the configured default.
pub const REPORT_DURATION_SECS: u64 = 30;

/// Build the demo router. Every throttled route shares `storage`.
pub fn create_app(config: &Config, storage: Arc<Storage>) -> ThrottlerResult<Router> {
    let http = HttpThrottle::new(config.throttle_options(storage.clone()), config.deny_policy()?);

    let api = Router::new()
        .route("/api/ping", get(ping))
        .route_layer(middleware::from_fn_with_state(
            http.route(None),
            throttle_middleware,
        ))
        .merge(
            Router::new()
                .route("/api/report", post(report))
                .route_layer(middleware::from_fn_with_state(
                    http.route(Some(REPORT_DURATION_SECS)),
                    throttle_middleware,
                )),
        );

    let app = Router::new()
        .route("/health", get(health_check))
        .with_state(storage)
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    Ok(app)
}

pub struct Server {
    app: Router,
    bind_address: SocketAddr,
    storage: Arc<Storage>,
}

impl Server {
    pub fn new(config: Config) -> ThrottlerResult<Self> {
        let storage = Storage::memory();
        let app = create_app(&config, storage.clone())?;

        Ok(Self {
            app,
            bind_address: config.bind_address,
            storage,
        })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(self.bind_address).await?;

        tracing::info!("Throttle server starting on {}", self.bind_address);
        tracing::info!("Health check available at /health");

        let result = axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        self.storage.shutdown();
        tracing::info!("Throttle record sweep stopped");

        result?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
