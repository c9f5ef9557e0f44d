// settings.rs - extractor settings from extractors.conf and the environment

use std::path::{Path, PathBuf};

use anyhow::Context;
use jmx_formats::terrain::TextureMask;
use jmx_shared::config::{Config, DEFAULT_ENV_PREFIX};

pub const DEFAULT_CONFIG_FILE: &str = "extractors.conf";
const DEFAULT_LOG_LEVEL: i32 = 2;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Config file the values came from, `None` when it was absent
    pub source: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub map_dir: Option<PathBuf>,
    pub logs_dir: Option<String>,
    /// File name inside `logs_dir`; the logger's default when unset
    pub log_file: Option<String>,
    pub log_level: i32,
    pub texture_mask: TextureMask,
    pub overwrite: bool,
}

impl Settings {
    /// Read `filename`; a missing file leaves only environment overrides.
    pub fn load(filename: &str) -> anyhow::Result<Settings> {
        let (config, source) = match Config::load(filename, DEFAULT_ENV_PREFIX) {
            Ok(config) => (config, Some(filename.to_string())),
            Err(e) if e.is_missing_file() => (Config::from_env(DEFAULT_ENV_PREFIX), None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read config {}", filename)),
        };
        let mut settings = Settings::from_config(&config)?;
        settings.source = source;
        Ok(settings)
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Settings> {
        let dir = |key: &str| {
            Some(config.get_string(key))
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
        };

        let mask_text = config.get_string_default("TerrainTextureMask", "10bit");
        let texture_mask = TextureMask::parse(&mask_text)
            .with_context(|| format!("TerrainTextureMask: unknown value {:?}", mask_text))?;

        Ok(Settings {
            source: None,
            data_dir: dir("DataDir"),
            map_dir: dir("MapDir"),
            logs_dir: Some(config.get_string("LogsDir")).filter(|s| !s.trim().is_empty()),
            log_file: Some(config.get_string("LogFile")).filter(|s| !s.trim().is_empty()),
            log_level: config.get_int_default("LogLevel", DEFAULT_LOG_LEVEL),
            texture_mask,
            overwrite: config.get_bool_default("Overwrite", false),
        })
    }

    pub fn require_data_dir(&self) -> anyhow::Result<&Path> {
        let dir = self
            .data_dir
            .as_deref()
            .context("DataDir is not configured (set it in extractors.conf or Extractors_DataDir)")?;
        if !dir.is_dir() {
            anyhow::bail!("DataDir does not exist: {}", dir.display());
        }
        Ok(dir)
    }

    /// object.ifo lives under the Data folder's navmesh directory
    pub fn object_index_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.require_data_dir()?.join("navmesh").join("object.ifo"))
    }

    pub fn tile_index_path(&self) -> Option<PathBuf> {
        self.map_dir.as_ref().map(|dir| dir.join("tile2d.ifo"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn settings_from(text: &str) -> anyhow::Result<Settings> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        let config = Config::load(file.path().to_str().unwrap(), "ExtractorsSettingsTest_").unwrap();
        Settings::from_config(&config)
    }

    #[test]
    fn test_defaults() {
        let settings = settings_from("").unwrap();
        assert!(settings.data_dir.is_none());
        assert!(settings.log_file.is_none());
        assert_eq!(settings.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(settings.texture_mask, TextureMask::Standard);
        assert!(!settings.overwrite);
        assert!(settings.require_data_dir().is_err());
    }

    #[test]
    fn test_values() {
        let settings = settings_from(
            "DataDir = \"/srv/client/Data\"\nMapDir = /srv/client/Map\nTerrainTextureMask = 20bit\nOverwrite = 1\nLogLevel = 3\nLogsDir = logs\nLogFile = tools.log\n",
        )
        .unwrap();
        assert_eq!(settings.data_dir, Some(PathBuf::from("/srv/client/Data")));
        assert_eq!(settings.tile_index_path(), Some(PathBuf::from("/srv/client/Map/tile2d.ifo")));
        assert_eq!(settings.texture_mask, TextureMask::Legacy);
        assert!(settings.overwrite);
        assert_eq!(settings.log_level, 3);
        assert_eq!(settings.logs_dir.as_deref(), Some("logs"));
        assert_eq!(settings.log_file.as_deref(), Some("tools.log"));
    }

    #[test]
    fn test_bad_mask() {
        assert!(settings_from("TerrainTextureMask = 12bit\n").is_err());
    }
}
