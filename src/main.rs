use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::prelude::*;

use donation_core::adapters::{Argon2Hasher, LogNotifier, MailRelayNotifier, PostgresStore};
use donation_core::cli::{self, Cli, Commands, DbCommands, OutboxCommands, TxCommands};
use donation_core::config::{Config, LogFormat};
use donation_core::gateway::SslCommerzClient;
use donation_core::ports::Notifier;
use donation_core::services::{run_dispatcher, NoticeRenderer, OutboxDispatcher};
use donation_core::{create_app, db, startup, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Setup logging
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config),
        Commands::Check => {
            let pool = db::create_pool(&config).await?;
            let report = startup::validate_environment(&config, &pool).await?;
            report.print();
            if !report.is_valid() {
                anyhow::bail!("Startup validation failed");
            }
            Ok(())
        }
        Commands::Tx(TxCommands::Show { tx_id }) => {
            let pool = db::create_pool(&config).await?;
            cli::handle_tx_show(&PostgresStore::new(pool), &tx_id).await
        }
        Commands::Outbox(OutboxCommands::Drain) => {
            let pool = db::create_pool(&config).await?;
            let dispatcher = build_dispatcher(&config, Arc::new(PostgresStore::new(pool)));
            cli::handle_outbox_drain(&dispatcher).await
        }
    }
}

fn build_dispatcher(config: &Config, store: Arc<PostgresStore>) -> OutboxDispatcher {
    let notifier: Arc<dyn Notifier> = match &config.mail_relay {
        Some(relay) => {
            tracing::info!(relay = %relay.url, "Delivering notices through mail relay");
            Arc::new(MailRelayNotifier::new(relay))
        }
        None => {
            tracing::warn!("MAIL_RELAY_URL not set, notices will only be logged");
            Arc::new(LogNotifier)
        }
    };

    OutboxDispatcher::new(
        store,
        notifier,
        NoticeRenderer::new(config.mail_from_name.clone(), config.admin_email.clone()),
    )
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let store = Arc::new(PostgresStore::new(pool));
    let gateway = Arc::new(SslCommerzClient::new(config.gateway.clone()));
    tracing::info!(
        gateway = %config.gateway.base_url,
        live = config.gateway.is_live,
        "SSLCommerz client initialized"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = Arc::new(build_dispatcher(&config, store.clone()));
    let dispatcher_task = tokio::spawn(run_dispatcher(
        dispatcher,
        Duration::from_secs(config.outbox_poll_secs),
        shutdown_rx,
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let state = AppState::new(
        config,
        store.clone(),
        store,
        gateway,
        Arc::new(Argon2Hasher::new()),
    );
    let app = create_app(state);

    tracing::info!("listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = dispatcher_task.await {
        tracing::error!(error = %e, "outbox dispatcher task panicked");
    }
    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, shutting down"),
        Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
    }
}
