//! Config parsing and validation.

use crate::api_defaults;
use crate::error::{AddContext, CdaError};
use crate::Result;
use std::collections::HashMap;
use std::io::Read;

/// Stack level settings every client needs. `api_key`, `delivery_token` and
/// `environment` identify the stack; the rest have sensible defaults.
pub trait ConfigProperties {
    fn api_key(&self) -> &str;
    fn delivery_token(&self) -> &str;
    fn environment(&self) -> &str;
    fn host(&self) -> &str {
        api_defaults::DEFAULT_HOST
    }
    /// Plain http is only meant for local development instances.
    fn scheme(&self) -> &str {
        "https"
    }
    fn branch(&self) -> Option<&str> {
        None
    }
    fn cache_location(&self) -> Option<&str> {
        None
    }
    fn cache_memory_bytes(&self) -> usize {
        api_defaults::DEFAULT_CACHE_MEMORY_BYTES
    }
    fn cache_disk_bytes(&self) -> u64 {
        api_defaults::DEFAULT_CACHE_DISK_BYTES
    }
}

#[derive(Builder, Clone, Debug)]
#[builder(pattern = "owned")]
pub struct Config {
    #[builder(setter(into))]
    api_key: String,
    #[builder(setter(into))]
    delivery_token: String,
    #[builder(setter(into))]
    environment: String,
    #[builder(setter(into), default = "crate::api_defaults::DEFAULT_HOST.to_string()")]
    host: String,
    #[builder(setter(into, strip_option), default)]
    branch: Option<String>,
    #[builder(setter(into, strip_option), default)]
    cache_location: Option<String>,
    #[builder(default = "crate::api_defaults::DEFAULT_CACHE_MEMORY_BYTES")]
    cache_memory_bytes: usize,
    #[builder(default = "crate::api_defaults::DEFAULT_CACHE_DISK_BYTES")]
    cache_disk_bytes: u64,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reads `key=value` lines. Lines starting with `#` and blank lines are
    /// skipped. Unknown keys are ignored so configs can be shared with other
    /// tooling.
    pub fn new<T: Read>(mut reader: T) -> Result<Self> {
        let mut data = String::new();
        reader
            .read_to_string(&mut data)
            .err_context("Could not read configuration")?;
        let properties: HashMap<&str, &str> = data
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim(), value.trim()))
            .collect();

        let required = |key: &str| -> Result<String> {
            properties
                .get(key)
                .map(|value| value.to_string())
                .ok_or_else(|| {
                    CdaError::Configuration(format!("No {key} found in config")).into()
                })
        };

        let mut builder = Config::builder()
            .api_key(required("api_key")?)
            .delivery_token(required("delivery_token")?)
            .environment(required("environment")?);
        if let Some(host) = properties.get("host") {
            builder = builder.host(*host);
        }
        if let Some(branch) = properties.get("branch") {
            builder = builder.branch(*branch);
        }
        if let Some(location) = properties.get("cache_location") {
            builder = builder.cache_location(*location);
        }
        if let Some(bytes) = properties.get("cache_memory_bytes") {
            let bytes = bytes.parse::<usize>().map_err(|_| {
                CdaError::Configuration(format!(
                    "cache_memory_bytes must be a number of bytes, got {bytes}"
                ))
            })?;
            builder = builder.cache_memory_bytes(bytes);
        }
        if let Some(bytes) = properties.get("cache_disk_bytes") {
            let bytes = bytes.parse::<u64>().map_err(|_| {
                CdaError::Configuration(format!(
                    "cache_disk_bytes must be a number of bytes, got {bytes}"
                ))
            })?;
            builder = builder.cache_disk_bytes(bytes);
        }
        let config = builder
            .build()
            .map_err(|e| CdaError::Configuration(e.to_string()))?;
        Ok(config)
    }
}

impl ConfigProperties for Config {
    fn api_key(&self) -> &str {
        &self.api_key
    }
    fn delivery_token(&self) -> &str {
        &self.delivery_token
    }
    fn environment(&self) -> &str {
        &self.environment
    }
    fn host(&self) -> &str {
        &self.host
    }
    fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }
    fn cache_location(&self) -> Option<&str> {
        self.cache_location.as_deref()
    }
    fn cache_memory_bytes(&self) -> usize {
        self.cache_memory_bytes
    }
    fn cache_disk_bytes(&self) -> u64 {
        self.cache_disk_bytes
    }
}
