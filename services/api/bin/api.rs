//! Main Entrypoint for the VoiceNet API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the command client, tool registry and session orchestrator.
//! 3. Registering the inbound dispatch subscription, when configured.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and tearing sessions down on shutdown.

use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use voicenet_api::{
    config::Config,
    router::create_router,
    state::AppState,
    subscriptions::{self, SubscriptionStore},
    worker::run_output_worker,
};
use voicenet_core::{CommandClient, HttpCommandClient, ToolRegistry, TransferCallTool};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C, shutting down");
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let commands: Arc<dyn CommandClient> = Arc::new(
        HttpCommandClient::new(&config.base_url, config.api_key.clone(), config.command_timeout)
            .context("Failed to build command client")?,
    );
    let mut tools = ToolRegistry::new();
    tools.register_tool(Arc::new(TransferCallTool::new(commands.clone())));

    let (app_state, outputs) = AppState::new(config.clone(), commands.clone(), tools);
    let app_state = Arc::new(app_state);
    let worker = tokio::spawn(run_output_worker(
        Arc::downgrade(&app_state.orchestrator),
        outputs,
    ));

    // --- 4. Register Inbound Dispatch ---
    let dispatch = match &config.dispatch {
        Some(dispatch) => {
            let store = SubscriptionStore::open(&config.subscriptions_path)
                .await
                .context("Failed to open subscription store")?;
            subscriptions::ensure_registered(commands.as_ref(), &store, dispatch)
                .await
                .context("Failed to register dispatch subscription")?;
            Some((dispatch.clone(), store))
        }
        None => {
            info!("PUBLIC_URL not set, skipping dispatch registration.");
            None
        }
    };

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state.clone()).layer(cors);

    // --- 6. Start Server ---
    info!(
        base_url = %config.base_url,
        auto_answer = config.auto_answer,
        signed_webhooks = config.signing_secret.is_some(),
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // --- 7. Tear Down ---
    app_state.orchestrator.shutdown().await;
    if let Some((dispatch, store)) = dispatch {
        if let Err(e) = subscriptions::unregister(commands.as_ref(), &store, &dispatch).await {
            warn!(error = %e, "Dispatch subscription left registered");
        }
    }
    drop(app_state);
    if let Err(e) = worker.await {
        error!(error = %e, "Session output worker panicked");
    }

    info!("Server has shut down.");
    Ok(())
}
