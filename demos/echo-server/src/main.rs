use clap::{Parser, Subcommand};
use gatehouse::prelude::*;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Token-gated WebSocket echo server.
///
/// Configuration comes from the environment (`GATEHOUSE_TOKEN_SECRET` is
/// required); see the `gatehouse` crate for the full list.
#[derive(Parser)]
#[command(name = "echo-server", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Accept connections and echo every message back to its sender
    Serve {
        /// Listen address (overrides GATEHOUSE_BIND_ADDR)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Print a token for SUBJECT, as the login service would after a
    /// successful password check
    Mint {
        /// Identity the token vouches for
        subject: String,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so `mint` output can be piped.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Serve { bind } => serve(bind).await?,
        Command::Mint { subject } => println!("{}", mint(&subject)?),
    }
    Ok(())
}

async fn serve(bind: Option<String>) -> Result<(), GatehouseError> {
    let mut config = ServerConfig::from_env()?;
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }

    let server = GatehouseServer::builder(config)
        .handler(EchoHandler)
        .build()
        .await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                // Without a signal handler, run until killed.
                tracing::error!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}

fn mint(subject: &str) -> Result<String, GatehouseError> {
    let config = TokenConfig::from_env()?;
    Ok(TokenCodec::new(&config).issue(subject)?)
}
