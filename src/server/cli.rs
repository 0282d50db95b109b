//! Command-line interface and layered configuration.
//!
//! Settings are merged from, lowest priority first: built-in defaults, a TOML
//! file (`.zgate.toml` unless `--config` names another), `ZGATE_*` environment
//! variables and finally command-line flags.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use clap::{Args, Parser};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol;

/// Configuration file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = ".zgate.toml";
/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "ZGATE_";

/// Errors raised while assembling the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Command-line arguments were rejected.
    #[error(transparent)]
    Cli(#[from] clap::Error),
    /// A configuration layer could not be read or merged.
    #[error(transparent)]
    Figment(#[from] Box<figment::Error>),
}

/// Runtime configuration of the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Address to listen on.
    pub bind: String,
    /// Seconds of inactivity before an association is closed.
    pub idle_timeout_secs: u64,
    /// Seconds to wait for the peer's `Close` before dropping the connection.
    pub close_timeout_secs: u64,
    /// Largest preferred message size the server agrees to.
    pub preferred_message_size: u32,
    /// Largest exceptional record size the server agrees to.
    pub maximum_record_size: u32,
    /// Largest inbound request accepted.
    pub max_request_size: usize,
    /// Implementation name reported in Init responses.
    pub implementation_name: String,
    /// JSON dataset served by the in-memory backend.
    pub data_file: Option<PathBuf>,
    /// Translate keyword queries into prefix form.
    pub keyword_queries: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:2100".to_owned(),
            idle_timeout_secs: protocol::DEFAULT_IDLE_TIMEOUT.as_secs(),
            close_timeout_secs: protocol::DEFAULT_CLOSE_TIMEOUT.as_secs(),
            preferred_message_size: protocol::DEFAULT_PREFERRED_MESSAGE_SIZE,
            maximum_record_size: protocol::DEFAULT_MAXIMUM_RECORD_SIZE,
            max_request_size: protocol::DEFAULT_MAX_REQUEST_SIZE,
            implementation_name: env!("CARGO_PKG_NAME").to_owned(),
            data_file: None,
            keyword_queries: false,
        }
    }
}

/// Command-line overrides. Only flags actually given take part in merging.
#[derive(Args, Serialize, Deserialize, Default, Debug, Clone)]
pub struct ConfigOverrides {
    /// Address to listen on.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    /// Seconds of inactivity before an association is closed.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
    /// Seconds to wait for the peer's `Close`.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_timeout_secs: Option<u64>,
    /// Largest preferred message size.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_message_size: Option<u32>,
    /// Largest exceptional record size.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_record_size: Option<u32>,
    /// Largest inbound request.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_request_size: Option<usize>,
    /// Implementation name reported in Init responses.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implementation_name: Option<String>,
    /// JSON dataset for the in-memory backend.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_file: Option<PathBuf>,
    /// Translate keyword queries into prefix form.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_queries: Option<bool>,
}

/// Top-level command line.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Cli {
    /// Configuration file to read instead of `.zgate.toml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Settings overriding every other layer.
    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

impl Cli {
    /// Merge every configuration layer.
    ///
    /// # Errors
    /// Returns [`ConfigError::Figment`] if the file is malformed or a value
    /// has the wrong type.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let file = self
            .config
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(&self.overrides))
            .extract()
            .map_err(|e| ConfigError::Figment(Box::new(e)))
    }
}

impl AppConfig {
    /// Parse `args` as a command line and merge every configuration layer.
    ///
    /// # Errors
    /// Returns [`ConfigError::Cli`] for invalid arguments and
    /// [`ConfigError::Figment`] for invalid configuration.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Cli::try_parse_from(args)?.load()
    }
}
