//! GeoLens
//!
//! Identifies geopark landmarks from photos, with a trained model when one
//! is available and rule-based heuristics otherwise.

use anyhow::Result;
use clap::Parser;
use geolens_engine::{Engine, ImageSource};
use geolens_server::cli::{Cli, Commands};
use geolens_server::{create_router, AppState};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let config = cli.engine_config()?;

    match cli.command {
        Commands::Serve {
            listen,
            port,
            body_limit,
        } => {
            info!("Starting GeoLens server");

            let metrics_handle = init_metrics()?;
            let engine = Engine::new(config);
            engine.load_model().await;
            let status = engine.status();
            info!(format = %status.format, backend = %status.backend, "{}", status.message);

            let state = AppState::new(engine, Some(metrics_handle));
            let app = create_router(state, body_limit);

            let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("Listening on http://{}", addr);

            let shutdown = async {
                shutdown_signal().await;
                warn!("Shutdown signal received, stopping server...");
            };

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await?;

            info!("Server shutdown complete");
        }

        Commands::Identify { images, detailed } => {
            let engine = Engine::new(config);
            let mut failed = 0usize;

            for input in &images {
                match engine.identify_detailed(ImageSource::parse(input)).await {
                    Ok(id) if detailed => {
                        let value = serde_json::json!({
                            "input": input,
                            "result": id.result,
                            "path": id.path,
                            "fallback_reason": id.fallback_reason,
                            "low_confidence": id.low_confidence,
                            "elapsed_ms": id.elapsed.as_millis() as u64,
                        });
                        println!("{}", serde_json::to_string_pretty(&value)?);
                    }
                    Ok(id) => println!("{}", serde_json::to_string_pretty(&id.result)?),
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}: {}", input, e);
                    }
                }
            }

            if failed > 0 {
                anyhow::bail!("{} of {} images could not be identified", failed, images.len());
            }
        }

        Commands::Status => {
            let engine = Engine::new(config);
            engine.load_model().await;
            println!("{}", serde_json::to_string_pretty(&engine.status())?);
        }
    }

    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("geolens=debug,geolens_engine=debug,geolens_server=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("geolens=info,geolens_engine=info,geolens_server=info")
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "geolens_identify_total",
        "Identifications served, by inference path"
    );
    metrics::describe_counter!(
        "geolens_inference_fallbacks_total",
        "Model-path failures answered by the heuristic classifier"
    );
    metrics::describe_counter!(
        "geolens_low_confidence_total",
        "Results below the low-confidence threshold"
    );
    metrics::describe_counter!("geolens_decode_errors_total", "Images that failed to decode");
    metrics::describe_counter!(
        "geolens_model_loads_total",
        "Model load attempts, by outcome"
    );
    metrics::describe_histogram!(
        "geolens_identify_latency_us",
        metrics::Unit::Microseconds,
        "Identification latency in microseconds"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
