use chrono::Local;
use dotenvy::dotenv;
use petro_ledger::{
    api::{self, AppState},
    config::{self, database},
    errors::Result,
    scheduler::Scheduler,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load the application configuration
    let app_config = config::load_app_configuration()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;

    // 4. Connect and make sure every table exists
    let db = database::create_connection(&app_config.database)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database schema ready"))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Start the in-process cron scheduler
    let scheduler_task = if app_config.scheduler.enabled {
        let scheduler = Scheduler::from_config(&app_config.scheduler, Local::now())?;
        Some(tokio::spawn(scheduler.run(db.clone())))
    } else {
        info!("In-process scheduler disabled; use /api/cron/* to run jobs");
        None
    };

    // 6. Serve the HTTP API until Ctrl-C
    let listener = TcpListener::bind(app_config.server.bind_addr.as_str()).await?;
    info!("Listening on {}", app_config.server.bind_addr);
    let state = AppState {
        db,
        config: Arc::new(app_config),
    };
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = scheduler_task {
        task.abort();
    }
    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
