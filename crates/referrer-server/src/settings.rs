//! Layered server configuration: built-in defaults, then an optional TOML
//! file, then `REFERRER_*` environment variables.
//!
//! Nested keys use a double underscore in the environment, e.g.
//! `REFERRER_SHARED_INDEX__ENABLED=true`. `allowed_orgs` accepts a
//! comma-separated list.

use std::path::{Path, PathBuf};

use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use referrer_core::config::SharedIndexConfig;
use serde::Deserialize;

const ENV_PREFIX: &str = "REFERRER";

/// Runtime server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  pub host:         String,
  pub port:         u16,
  /// SQLite database file. A leading `~/` is expanded.
  pub store_path:   PathBuf,
  #[serde(default)]
  pub shared_index: SharedIndexConfig,
}

impl ServerConfig {
  /// Load from `path` (if it exists) and the environment.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    Self::from_builder(
      Config::builder().add_source(File::from(path).required(false)),
      environment(),
    )
  }

  fn from_builder(
    builder: ConfigBuilder<DefaultState>,
    env: Environment,
  ) -> Result<Self, ConfigError> {
    Config::builder()
      .set_default("host", "127.0.0.1")?
      .set_default("port", 8080)?
      .set_default("store_path", "referrer.db")?
      .add_source(builder.build()?)
      .add_source(env)
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

fn environment() -> Environment {
  Environment::with_prefix(ENV_PREFIX)
    .prefix_separator("_")
    .separator("__")
    .list_separator(",")
    .with_list_parse_key("shared_index.allowed_orgs")
    .try_parsing(true)
}
