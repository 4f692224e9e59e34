use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slipway_client::dispatch::DispatchForwarder;
use slipway_edge::config::Config;
use slipway_edge::{EdgeState, create_router};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slipway_edge=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Slipway Edge...");

    let config = Config::from_env();
    config.validate().expect("Invalid configuration");

    let resolver = config
        .resolver()
        .expect("Failed to load reserved hostnames");

    tracing::info!(
        "Dispatching *.{} into namespaces {}/{}/{}",
        resolver.apps_domain(),
        config.namespaces.production,
        config.namespaces.staging,
        config.namespaces.preview
    );

    let forwarder = Arc::new(DispatchForwarder::new(config.dispatch_url.clone()));
    let app = create_router(EdgeState::new(resolver, forwarder, config.max_body_bytes));

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
