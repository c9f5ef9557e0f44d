// Configuration module
// INI-style key/value file with environment variable overrides
//
// The extractor reads its defaults from `extractors.conf`; any key can be
// overridden by `<prefix><Key>` in the environment (e.g. `Extractors_DataDir`).

use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;

pub const DEFAULT_ENV_PREFIX: &str = "Extractors_";

/// Configuration file parser
#[derive(Debug, Clone, Default)]
pub struct Config {
    values: HashMap<String, String>,
    filename: String,
    env_prefix: String,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config with no file behind it, only environment lookups
    pub fn from_env(env_prefix: &str) -> Self {
        Config {
            env_prefix: env_prefix.to_string(),
            ..Self::default()
        }
    }

    /// Load configuration from a file.
    /// A missing file is reported as `MissingFile`; callers that treat the
    /// file as optional fall back to `from_env`.
    pub fn load(filename: &str, env_prefix: &str) -> Result<Self> {
        let mut config = Config {
            values: HashMap::new(),
            filename: filename.to_string(),
            env_prefix: env_prefix.to_string(),
        };
        config.reload()?;
        Ok(config)
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Re-read the file this config was loaded from
    pub fn reload(&mut self) -> Result<()> {
        let path = Path::new(&self.filename);
        let bytes = crate::error::read_file(path)?;
        self.values = parse_ini(&String::from_utf8_lossy(&bytes));
        Ok(())
    }

    pub fn get_string_default(&self, key: &str, default: &str) -> String {
        self.get_env_or_config(key)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_string(&self, key: &str) -> String {
        self.get_string_default(key, "")
    }

    pub fn get_bool_default(&self, key: &str, default: bool) -> bool {
        match self.get_env_or_config(key) {
            Some(val) => {
                let lower = val.to_lowercase();
                matches!(lower.as_str(), "1" | "true" | "yes")
            }
            None => default,
        }
    }

    pub fn get_int_default(&self, key: &str, default: i32) -> i32 {
        match self.get_env_or_config(key) {
            Some(val) => val.parse().unwrap_or(default),
            None => default,
        }
    }

    /// Try environment variable first, then config file
    fn get_env_or_config(&self, key: &str) -> Option<String> {
        if !self.env_prefix.is_empty() {
            let env_key = format!("{}{}", self.env_prefix, key.replace('.', "_"));
            if let Ok(val) = std::env::var(&env_key) {
                return Some(val);
            }
        }

        self.values.get(key).cloned()
    }
}

fn parse_ini(content: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for line in content.lines() {
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        // Sections only group keys for the reader
        if trimmed.starts_with('[') {
            continue;
        }

        if let Some((key, value)) = trimmed.split_once('=') {
            let mut value = value.trim();
            if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                value = &value[1..value.len() - 1];
            }
            values.insert(key.trim().to_string(), value.to_string());
        }
    }
    values
}
