use lingo_progress::config::Config;
use lingo_progress::logging;
use lingo_progress::workers::WorkerManager;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config.log_level);

    let engine = match lingo_progress::create_engine().await {
        Ok(engine) => engine,
        Err(err) => {
            tracing::error!(error = %err, "engine initialization failed");
            return;
        }
    };

    let worker_manager = match WorkerManager::new(engine).await {
        Ok(manager) => {
            if let Err(e) = manager.start().await {
                tracing::error!(error = %e, "failed to start workers");
            }
            Some(manager)
        }
        Err(e) => {
            tracing::warn!(error = %e, "worker manager not initialized");
            None
        }
    };

    tracing::info!("progress engine running");

    shutdown_signal().await;

    tracing::info!("shutdown signal received");

    if let Some(ref manager) = worker_manager {
        manager.stop().await;
    }

    tracing::info!("Graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
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
