//! `agrokit`: drives the wallet session controller from a terminal.
//!
//! Login flows run against an in-process development backend; balances are
//! fetched from the configured chain's JSON-RPC endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use agrokit_core::{SessionConfig, SessionController, SessionObserver, SessionSnapshot};
use clap::{Parser, Subcommand};
use eyre::Context as _;
use serde_json::json;

mod dev_backend;

use dev_backend::{DevBackend, DEV_CODE};

#[derive(Parser, Debug)]
#[command(name = "agrokit", version)]
struct Cli {
    /// JSON session configuration. Missing fields take their defaults.
    #[arg(long, global = true, env = "AGROKIT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the chain's JSON-RPC endpoint.
    #[arg(long, global = true, env = "AGROKIT_RPC_URL")]
    rpc_url: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the resolved session configuration.
    Config,

    /// Fetch the native balance of an address on the configured chain.
    Balance {
        /// EVM address, `0x`-prefixed.
        address: String,
    },

    /// Run the email one-time-code login, then log out.
    Login {
        /// Address to send the code to.
        #[arg(long)]
        email: String,

        /// Code to confirm with. Defaults to the one the dev backend sends.
        #[arg(long)]
        code: Option<String>,
    },

    /// Run the passkey login, then log out.
    Passkey {
        /// Pretend the device already stores a passkey (sign-in instead of sign-up).
        #[arg(long, default_value_t = false)]
        stored: bool,
    },
}

/// Prints every published snapshot as one JSON line.
struct PrintObserver;

impl SessionObserver for PrintObserver {
    fn on_snapshot(&self, snapshot: SessionSnapshot) {
        match serde_json::to_string(&snapshot) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!("could not serialize snapshot: {e}"),
        }
    }
}

fn load_config(cli: &Cli) -> eyre::Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("reading {}", path.display()))?;
            SessionConfig::from_json(&json)
                .wrap_err_with(|| format!("parsing {}", path.display()))?
        }
        None => SessionConfig::default(),
    };
    if let Some(rpc_url) = &cli.rpc_url {
        config.chain.rpc_url.clone_from(rpc_url);
    }
    Ok(config)
}

async fn balance(config: SessionConfig, address: String) -> eyre::Result<()> {
    let backend = Arc::new(DevBackend::signed_in("dev:restored"));
    let controller = SessionController::with_chain_rpc(backend, config);
    controller.restore_session().await?;

    let outcome = controller.refresh_balance(address).await?;
    let report = json!({
        "outcome": outcome,
        "snapshot": controller.snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn login(
    config: SessionConfig,
    email: String,
    code: Option<String>,
) -> eyre::Result<()> {
    let controller = SessionController::with_chain_rpc(Arc::new(DevBackend::default()), config);
    controller.add_observer(Arc::new(PrintObserver));

    controller
        .request_email_code(email.clone())
        .await
        .wrap_err("requesting verification code")?;
    controller
        .confirm_email_code(email, code.unwrap_or_else(|| DEV_CODE.to_string()))
        .await
        .wrap_err("confirming verification code")?;
    tracing::info!("signed in, logging out");
    controller.logout().await?;
    Ok(())
}

async fn passkey(config: SessionConfig, stored: bool) -> eyre::Result<()> {
    let backend = if stored {
        DevBackend::with_stored_passkey()
    } else {
        DevBackend::default()
    };
    let controller = SessionController::with_chain_rpc(Arc::new(backend), config);
    controller.add_observer(Arc::new(PrintObserver));

    controller
        .login_with_passkey()
        .await
        .wrap_err("passkey login")?;
    tracing::info!("signed in, logging out");
    controller.logout().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.cmd {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Balance { address } => balance(config, address).await,
        Command::Login { email, code } => login(config, email, code).await,
        Command::Passkey { stored } => passkey(config, stored).await,
    }
}
