//! Configuration commands.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the current configuration to stdout.
pub fn dump(config: &ClientConfig) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", ClientConfig::default_path().display());
    println!("{}", toml_str);

    Ok(())
}

/// Show the configuration file path and the socket it resolves to.
pub fn path(config: &ClientConfig) -> ClientResult<()> {
    println!("config: {}", ClientConfig::default_path().display());
    println!("socket: {}", config.socket_path().display());
    Ok(())
}
