//! Command-line interface definition.

use std::path::PathBuf;

use bytes::Bytes;
use clap::{Args, Parser, Subcommand};

use crate::error::{ClientError, ClientResult};

/// netmux - name-addressed packets and requests over a local socket
#[derive(Debug, Parser)]
#[command(name = "netmux")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "NETMUX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Path to the server socket
    #[arg(long, env = "NETMUX_SOCKET")]
    pub socket_path: Option<PathBuf>,

    /// Seconds to wait for a request reply
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the server in the foreground
    Server,

    /// Check that the server answers
    Ping {
        /// Number of pings to send
        #[arg(long, short = 'n', default_value = "1")]
        count: u32,
    },

    /// Send a request and print the reply
    Request {
        /// Namespace identity, e.g. `pkg.a`
        namespace: String,
        /// Handler name
        name: String,
        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Send a one-shot packet to the server
    Send {
        /// Namespace identity, e.g. `pkg.a`
        namespace: String,
        /// Handler name
        name: String,
        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// List the namespaces registered on the server
    Namespaces,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Show configuration file path
    Path,
}

/// Payload given on the command line. Empty when neither flag is set.
#[derive(Debug, Default, Args)]
#[group(multiple = false)]
pub struct PayloadArgs {
    /// Payload as UTF-8 text
    #[arg(long)]
    pub text: Option<String>,

    /// Payload as hex bytes, e.g. `0102ff`
    #[arg(long)]
    pub hex: Option<String>,
}

impl PayloadArgs {
    /// Returns the payload bytes.
    pub fn to_bytes(&self) -> ClientResult<Bytes> {
        match (&self.text, &self.hex) {
            (Some(text), _) => Ok(Bytes::from(text.clone().into_bytes())),
            (None, Some(hex)) => decode_hex(hex).map(Bytes::from),
            (None, None) => Ok(Bytes::new()),
        }
    }
}

fn decode_hex(input: &str) -> ClientResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(ClientError::InvalidInput(format!(
            "hex payload has an odd number of digits: {}",
            input
        )));
    }

    digits
        .chunks(2)
        .map(|pair| match (hex_value(pair[0]), hex_value(pair[1])) {
            (Some(high), Some(low)) => Ok(high << 4 | low),
            _ => Err(ClientError::InvalidInput(format!(
                "not a hex byte: {}",
                String::from_utf8_lossy(pair)
            ))),
        })
        .collect()
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

/// Renders a reply for the terminal: UTF-8 text when it is printable,
/// lowercase hex otherwise.
pub fn render_payload(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(|c| c.is_control() && c != '\n' && c != '\t') => {
            text.to_string()
        }
        _ => payload.iter().map(|b| format!("{:02x}", b)).collect(),
    }
}
