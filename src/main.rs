//! Handoff - cross-device sign-in for limited-input devices
//!
//! A TV registers a pairing or QR session, a signed-in phone approves it, and
//! the TV receives a mobile session token without anyone typing a password on
//! a remote control.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use handoff_auth::{FileStorage, FileUserDirectory, TokenIssuer, User, UserDirectory};
use handoff_core::Config;
use handoff_server::{create_router, AppState};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Handoff - approve TV sign-ins from your phone
#[derive(Parser, Debug)]
#[command(name = "handoff")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short, long, env = "HANDOFF_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Server port
    #[arg(short, long, env = "HANDOFF_PORT", default_value = "8787")]
    port: u16,

    /// Pairing session lifetime in seconds
    #[arg(long, env = "HANDOFF_PAIRING_TTL", default_value = "300")]
    pairing_ttl: u64,

    /// QR session lifetime in seconds
    #[arg(long, env = "HANDOFF_QR_TTL", default_value = "300")]
    qr_ttl: u64,

    /// Identity providers a QR session may be routed through
    #[arg(
        long,
        env = "HANDOFF_PROVIDERS",
        value_delimiter = ',',
        default_value = "google,discord,github"
    )]
    providers: Vec<String>,

    /// Externally reachable base URL (used for provider redirects)
    #[arg(long, env = "HANDOFF_PUBLIC_URL")]
    public_url: Option<String>,

    /// Directory for sessions.json and users.json
    #[arg(long, env = "HANDOFF_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Keep all state in memory (nothing survives a restart)
    #[arg(long, env = "HANDOFF_IN_MEMORY")]
    in_memory: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Add or update a user in the directory
    AddUser {
        /// User id
        #[arg(long)]
        id: String,
        /// Email address
        #[arg(long)]
        email: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Grant admin rights
        #[arg(long)]
        admin: bool,
    },
    /// Mint an approver token for an existing user
    IssueToken {
        /// User id
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let config = build_config(&args);
    config.validate().context("Invalid configuration")?;

    let (storage, users) = open_backends(&config)?;

    match args.command {
        None | Some(Command::Serve) => serve(config, storage, users).await,
        Some(Command::AddUser {
            id,
            email,
            name,
            admin,
        }) => {
            let mut user = User::new(id, email).with_admin(admin);
            user.name = name;
            users.upsert(user.clone()).await?;
            println!("Saved user {} <{}>", user.id, user.email);
            Ok(())
        }
        Some(Command::IssueToken { user }) => {
            let issuer = TokenIssuer::new(storage, users.clone());
            if users.get_user(&user).await?.is_none() {
                anyhow::bail!("User {} not found; add it with `handoff add-user`", user);
            }
            let minted = issuer.mint(&user, "console").await?;
            println!("{}", minted.token);
            Ok(())
        }
    }
}

fn build_config(args: &Args) -> Config {
    let public_url = args
        .public_url
        .clone()
        .unwrap_or_else(|| format!("http://localhost:{}", args.port));

    let mut config = Config::new()
        .with_bind(args.bind)
        .with_port(args.port)
        .with_pairing_ttl_secs(args.pairing_ttl)
        .with_qr_ttl_secs(args.qr_ttl)
        .with_providers(args.providers.clone())
        .with_public_url(public_url)
        .with_in_memory(args.in_memory);
    if let Some(dir) = &args.data_dir {
        config = config.with_data_dir(dir.clone());
    }
    config
}

fn open_backends(config: &Config) -> Result<(Arc<FileStorage>, Arc<FileUserDirectory>)> {
    if config.in_memory {
        warn!("In-memory mode: sessions, tokens and users are lost on restart");
        return Ok((
            Arc::new(FileStorage::in_memory()),
            Arc::new(FileUserDirectory::in_memory()),
        ));
    }

    let data_dir = config.resolve_data_dir()?;
    info!("Data directory: {}", data_dir.display());

    let storage = FileStorage::with_path(data_dir.join("sessions.json"))
        .context("Failed to open session storage")?;
    let users = FileUserDirectory::with_path(data_dir.join("users.json"))
        .context("Failed to open user directory")?;
    Ok((Arc::new(storage), Arc::new(users)))
}

async fn serve(
    config: Config,
    storage: Arc<FileStorage>,
    users: Arc<FileUserDirectory>,
) -> Result<()> {
    info!("Handoff v{}", env!("CARGO_PKG_VERSION"));

    let user_count = users.list().await.len();
    if user_count == 0 {
        warn!("User directory is empty; add approvers with `handoff add-user`");
    } else {
        info!("User directory: {} users", user_count);
    }

    info!(
        "Session lifetime: pairing {}s, QR {}s",
        config.pairing_ttl_secs, config.qr_ttl_secs
    );
    info!("Identity providers: {}", config.providers.join(", "));

    let addr = SocketAddr::new(config.bind, config.port);
    let public_url = config.public_url.clone();
    let state = Arc::new(AppState::with_storage(config, storage, users));
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on {}", addr);
    info!("  Public URL: {}", public_url);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down...");
}
