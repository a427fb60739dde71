//! Chain state settings read from a `key=value` configuration file.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use vgld_log::{Format, Level, LogConfig};

pub const DEFAULT_UTXO_CACHE_ENTRIES: usize = 200_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io(String),
    InvalidValue { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(message) => write!(f, "failed to read config: {message}"),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "invalid value '{value}' for {key}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

pub type ConfMap = HashMap<String, Vec<String>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChainConfig {
    /// Upper bound on encoded entries kept in memory; 0 disables the cache.
    pub utxo_cache_entries: usize,
    pub log: LogConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            utxo_cache_entries: DEFAULT_UTXO_CACHE_ENTRIES,
            log: LogConfig::default(),
        }
    }
}

impl ChainConfig {
    /// Applies the recognised keys of `conf` on top of the defaults. When a
    /// key repeats, the last value wins.
    pub fn from_conf(conf: &ConfMap) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = last_value(conf, "utxocache") {
            config.utxo_cache_entries = value
                .parse()
                .map_err(|_| invalid("utxocache", value))?;
        }
        if let Some(value) = last_value(conf, "loglevel") {
            config.log.level = Level::parse(value).ok_or_else(|| invalid("loglevel", value))?;
        }
        if let Some(value) = last_value(conf, "logformat") {
            config.log.format = Format::parse(value).ok_or_else(|| invalid("logformat", value))?;
        }
        if let Some(value) = last_value(conf, "logtimestamps") {
            config.log.timestamps =
                parse_conf_bool(value).ok_or_else(|| invalid("logtimestamps", value))?;
        }
        Ok(config)
    }

    /// Reads `path` if it exists; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match load_conf(path)? {
            Some(conf) => Self::from_conf(&conf),
            None => Ok(Self::default()),
        }
    }
}

fn last_value<'a>(conf: &'a ConfMap, key: &str) -> Option<&'a str> {
    conf.get(key)
        .and_then(|values| values.last())
        .map(String::as_str)
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    }
}

/// Parses `key=value` lines. `#` and `;` start comments, keys are
/// case-insensitive and a bare key means `1`. Returns `None` when the file
/// does not exist.
pub fn load_conf(path: &Path) -> Result<Option<ConfMap>, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(ConfigError::Io(err.to_string())),
    };
    Ok(Some(parse_conf(&contents)))
}

pub fn parse_conf(contents: &str) -> ConfMap {
    let mut out = ConfMap::new();
    for raw_line in contents.lines() {
        let mut line = raw_line.trim();
        if let Some(idx) = line.find(['#', ';']) {
            line = line[..idx].trim();
        }
        if line.is_empty() {
            continue;
        }
        let (key, value) = match line.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (line, "1"),
        };
        if key.is_empty() {
            continue;
        }
        out.entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.to_string());
    }
    out
}

pub fn parse_conf_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.is_empty() {
        return Some(true);
    }
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
