//! Board server command: `teamboard serve` and `teamboard init`.

use anyhow::Result;
use std::path::Path;

use teamboard::board::server::{self, ServerConfig};
use teamboard::config::BoardConfig;

pub async fn cmd_serve(
    config: &BoardConfig,
    port: Option<u16>,
    host: Option<String>,
    dev: bool,
) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    let mut server_config: ServerConfig = config.server_config()?;
    if let Some(port) = port {
        server_config.port = port;
    }
    if let Some(host) = host {
        server_config.host = host;
    }
    if dev {
        server_config.dev_mode = true;
        if server_config.host == "127.0.0.1" {
            // Reachable from a dev container.
            server_config.host = "0.0.0.0".to_string();
        }
    }

    server::start_server(server_config).await
}

pub fn cmd_init(db_path: &Path) -> Result<()> {
    server::open_database(db_path)?;
    println!("Board database initialized at {}", db_path.display());
    Ok(())
}
