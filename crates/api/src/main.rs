//! API server entry point.

use api::backends::Backends;
use api::config::{Config, LogFormat};
use lifecycle::PublishMode;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Connect backends and build the engine
    let backends = match Backends::from_config(&config).await {
        Ok(backends) => backends,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize backends");
            std::process::exit(1);
        }
    };
    let state = api::create_state(backends, config.lifecycle_config());

    // 4. Start the outbox relay when events go through the outbox
    let (relay_shutdown, relay_signal) = watch::channel(false);
    let relay = (config.publish_mode == PublishMode::Outbox)
        .then(|| tokio::spawn(state.lifecycle.outbox_relay().run(relay_signal)));

    // 5. Build the application
    let app = api::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(
        %addr,
        cache_policy = ?config.cache_policy,
        publish_mode = ?config.publish_mode,
        "starting API server"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Stop the relay after in-flight requests have drained
    let _ = relay_shutdown.send(true);
    if let Some(handle) = relay
        && let Err(e) = handle.await
    {
        tracing::error!(error = %e, "outbox relay task failed");
    }

    tracing::info!("server shut down gracefully");
}
