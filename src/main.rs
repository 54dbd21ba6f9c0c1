use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use enclave_ack::config::Config;
use enclave_ack::transport::CID_ANY;

#[derive(Parser)]
#[command(name = "enclave-ack")]
#[command(about = "Acknowledge host requests over virtio-vsock")]
#[command(version)]
struct Cli {
    /// Path to enclave-ack.toml config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Context ID to listen on (overrides config)
    #[arg(long, conflicts_with = "any_cid")]
    cid: Option<u32>,
    /// Listen on any context ID
    #[arg(long)]
    any_cid: bool,
    /// Vsock port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u32>,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(cid) = self.cid {
            config.listener.cid = cid;
        }
        if self.any_cid {
            config.listener.cid = CID_ANY;
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    enclave_ack::logging::init(&config.logging)?;

    run(config).await
}

#[cfg(unix)]
async fn run(config: Config) -> Result<()> {
    use anyhow::Context;
    use enclave_ack::server::{Server, ServerError};
    use enclave_ack::vsock::VsockTransport;

    let address = config.address();
    tracing::info!(%address, "Starting enclave-ack");

    let transport = VsockTransport::bind(address)
        .map_err(ServerError::Bind)
        .with_context(|| format!("Failed to create vsock listener on {}", address))?;

    Server::new(transport, config.server_options())
        .run(enclave_ack::shutdown::os_signal())
        .await?;
    Ok(())
}

#[cfg(not(unix))]
async fn run(_config: Config) -> Result<()> {
    anyhow::bail!("Vsock is only supported on Unix platforms");
}
