// src/config.rs
//! Static configuration: per-source URLs, table locators and vocabularies.
//! Loaded and validated once at startup, read-only afterwards.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Error;
use crate::sources::san_francisco::SanFranciscoConfig;
use crate::sources::sonoma::SonomaConfig;
use crate::sources::Registry;

static EMBEDDED_YAML: &str = include_str!("../config/sources.yaml");

static EMBEDDED: Lazy<Result<Arc<Config>, Error>> =
    Lazy::new(|| Config::from_yaml_str(EMBEDDED_YAML).map(Arc::new));

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub sources: SourcesConfig,
}

/// A source left out of the file is simply not registered.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourcesConfig {
    pub san_francisco: Option<SanFranciscoConfig>,
    pub sonoma: Option<SonomaConfig>,
}

impl Config {
    /// The configuration compiled into the binary.
    pub fn embedded() -> Result<Arc<Config>, Error> {
        (*EMBEDDED).clone()
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, Error> {
        let config: Config =
            serde_yaml::from_str(text).map_err(|e| Error::Config(format!("parsing YAML: {e}")))?;
        let registry = Registry::from_config(&config)?;
        debug!(sources = registry.len(), "config validated");
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        let config = Self::from_yaml_str(&text)?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }
}
