use std::path::PathBuf;

use anyhow::Result;

use crate::config;

pub fn run(
    http_addr: Option<String>,
    log_level: Option<String>,
    data_file: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut server_config = config::load(config_path.as_deref())?;

    // CLI flags override config values
    if let Some(addr) = http_addr {
        server_config.http_addr = addr;
    }
    if let Some(level) = log_level {
        server_config.log_level = level;
    }
    if let Some(path) = data_file {
        server_config.data_file = Some(path);
    }

    // Build tokio runtime explicitly (no #[tokio::main] on fn main)
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(crate::server::run(server_config))
}
