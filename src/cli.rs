use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::ports::DonationRepository;
use crate::services::OutboxDispatcher;

#[derive(Parser)]
#[command(name = "donation-core")]
#[command(about = "Donation platform backend with SSLCommerz payment reconciliation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Transaction inspection commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Notification outbox commands
    #[command(subcommand)]
    Outbox(OutboxCommands),

    /// Print the effective configuration with secrets masked
    Config,

    /// Validate environment, database and gateway reachability
    Check,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Show a donation transaction by its gateway transaction id
    Show {
        #[arg(value_name = "TX_ID")]
        tx_id: String,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum OutboxCommands {
    /// Deliver one batch of pending notices and exit
    Drain,
}

pub async fn handle_tx_show(repository: &dyn DonationRepository, tx_id: &str) -> anyhow::Result<()> {
    match repository.find_transaction(tx_id).await? {
        Some(tx) => {
            println!("Transaction {}", tx.transaction_id);
            println!("  Status:     {}", tx.status);
            println!("  Amount:     {} {}", tx.amount, tx.currency);
            println!("  Created:    {}", tx.created_at);
            if let Some(at) = tx.completed_at {
                println!("  Completed:  {}", at);
            }
            if let Some(at) = tx.failed_at {
                println!(
                    "  Failed:     {} ({})",
                    at,
                    tx.fail_reason.as_deref().unwrap_or("no reason given")
                );
            }
            if let Some(at) = tx.cancelled_at {
                println!("  Cancelled:  {}", at);
            }
            if let Some(method) = tx.payment_method {
                println!("  Method:     {}", method);
            }
            if let Some(bank_tx) = tx.bank_transaction_id {
                println!("  Bank tx:    {}", bank_tx);
            }
            Ok(())
        }
        None => {
            tracing::warn!(transaction_id = %tx_id, "transaction not found");
            anyhow::bail!("Transaction {} not found", tx_id)
        }
    }
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");
    Ok(())
}

pub async fn handle_outbox_drain(dispatcher: &OutboxDispatcher) -> anyhow::Result<()> {
    let report = dispatcher.dispatch_batch().await?;
    println!(
        "✓ Outbox batch processed: {} sent, {} retried, {} abandoned",
        report.sent, report.retried, report.abandoned
    );
    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port:       {}", config.server_port);
    println!("  Database URL:      {}", mask_password(&config.database_url));
    println!("  Gateway:           {}", config.gateway.base_url);
    println!("  Gateway Mode:      {}", if config.gateway.is_live { "live" } else { "sandbox" });
    println!("  Store ID:          {}", config.gateway.store_id);
    println!("  Store Password:    ****");
    println!("  Backend URL:       {}", config.backend_url);
    println!("  Frontend URL:      {}", config.frontend_url);
    println!("  IPN Callback:      {}", config.callbacks.ipn);
    println!("  IPN Allow-list:    {:?}", config.ipn_allowed_ips);
    println!("  Admin Email:       {}", config.admin_email);
    println!(
        "  Mail Relay:        {}",
        config
            .mail_relay
            .as_ref()
            .map_or("none (notices are logged)", |relay| relay.url.as_str())
    );

    println!("✓ Configuration is valid");
    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
