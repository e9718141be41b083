use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ipam_dns_sync::{
    AppState, SharedState, api,
    config::{OwnershipPolicy, SyncConfig, DEFAULT_OWNERSHIP_COMMENT, DEFAULT_TTL},
    db,
    inventory::snapshot::SnapshotInventory,
    jobs::JobStatus,
};
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, rename_all = "kebab-case")]
struct Cli {
    /// Path to the SQLite database file
    #[arg(long, value_name = "PATH", global = true, default_value = "ipam-dns-sync.sqlite3")]
    db_path: PathBuf,
    /// JSON export of the IPAM inventory, re-read on every sync
    #[arg(long, value_name = "PATH", global = true, default_value = "inventory.json")]
    inventory_snapshot: PathBuf,
    /// Comment marking records as managed by this tool
    #[arg(long, value_name = "TEXT", global = true, default_value = DEFAULT_OWNERSHIP_COMMENT)]
    ownership_comment: String,
    /// Treat every A/AAAA/PTR record in synced zones as managed, deleting
    /// any that the inventory does not produce
    #[arg(long, global = true)]
    manage_all_records_dangerously: bool,
    /// IP address custom field holding a TTL override
    #[arg(long, value_name = "FIELD", global = true)]
    ttl_custom_field: Option<String>,
    /// IP address custom field holding a custom domain
    #[arg(long, value_name = "FIELD", global = true)]
    custom_domain_field: Option<String>,
    /// TTL for zones without their own default
    #[arg(long, value_name = "SECONDS", global = true, default_value_t = DEFAULT_TTL)]
    default_ttl: u32,
    /// PTR target for addresses without a generated name
    #[arg(long, value_name = "FQDN", global = true)]
    default_rdns: Option<String>,
    /// Upper bound for a single sync run
    #[arg(long, value_name = "SECONDS", global = true, default_value_t = 900)]
    job_timeout_secs: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and the job scheduler
    Serve {
        /// Listen address for the HTTP server
        #[arg(long, value_name = "ADDR", default_value = "0.0.0.0:8080")]
        listen: SocketAddr,
        /// Sync a zone right after it is created or updated
        #[arg(long)]
        sync_on_save: bool,
    },
    /// Sync one zone and print the job result
    Sync {
        /// Zone id
        #[arg(long)]
        zone: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = build_sync_config(&cli)?;
    if config.ownership.is_dangerous() {
        warn!("ownership check disabled: records not created by this tool may be deleted");
    }

    match &cli.command {
        Command::Serve { listen, .. } => serve(&cli, config, *listen).await,
        Command::Sync { zone } => sync_once(&cli, config, *zone).await,
    }
}

async fn serve(cli: &Cli, config: SyncConfig, listen: SocketAddr) -> Result<()> {
    let state = init_shared_state(cli, config).await?;

    let dispatched = state.scheduler.resume().await.context("failed to resume jobs")?;
    info!("resumed {dispatched} sync jobs");

    let app = api::create_router(state);
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind to {listen}"))?;

    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    Ok(())
}

async fn sync_once(cli: &Cli, config: SyncConfig, zone: i64) -> Result<()> {
    let state = init_shared_state(cli, config).await?;
    let job = state
        .scheduler
        .run_now(zone)
        .await
        .with_context(|| format!("failed to sync zone {zone}"))?;
    println!("{}", serde_json::to_string_pretty(&job)?);
    if job.status == JobStatus::Failed {
        bail!("sync job {} failed", job.id);
    }
    Ok(())
}

async fn init_shared_state(cli: &Cli, config: SyncConfig) -> Result<SharedState> {
    if let Some(parent) = cli.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create db directory {}", parent.display()))?;
    }

    let db = db::init_db(&cli.db_path).await?;
    let inventory = Arc::new(SnapshotInventory::new(&cli.inventory_snapshot));

    Ok(Arc::new(AppState::new(config, db, inventory)))
}

fn build_sync_config(cli: &Cli) -> Result<SyncConfig> {
    let ownership = if cli.manage_all_records_dangerously {
        OwnershipPolicy::ManageAllRecords
    } else {
        OwnershipPolicy::Comment(cli.ownership_comment.trim().to_string())
    };
    let sync_on_save = matches!(cli.command, Command::Serve { sync_on_save: true, .. });

    let config = SyncConfig {
        ownership,
        ttl_custom_field: cli.ttl_custom_field.clone(),
        custom_domain_field: cli.custom_domain_field.clone(),
        default_ttl: cli.default_ttl,
        default_rdns: cli.default_rdns.as_deref().map(normalize_fqdn).transpose()?,
        sync_on_save,
        job_timeout: Duration::from_secs(cli.job_timeout_secs),
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn normalize_fqdn(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        bail!("FQDN cannot be empty");
    }
    Ok(format!("{}.", trimmed))
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!("failed to install CTRL+C handler: {err}");
    }
    info!("shutdown signal received");
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
