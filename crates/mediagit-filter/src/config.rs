// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 MediaGit Contributors

//! Repository configuration consumed by the filters
//!
//! Only the `core.*` keys that influence content filtering are modelled:
//!
//! ```toml
//! [core]
//! autocrlf = "input"   # true | false | input
//! safecrlf = "warn"    # true | false | warn
//! eol = "lf"           # lf | crlf | native
//! ```
//!
//! Values accept the usual git spellings for booleans (`yes`, `on`, `1`, ...).
//! Environment variables `MEDIAGIT_CORE_AUTOCRLF`, `MEDIAGIT_CORE_SAFECRLF` and
//! `MEDIAGIT_CORE_EOL` override file values when applied.

use crate::error::{FilterError, FilterResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Parse a git-style boolean
///
/// `true`, `yes`, `on` and any non-zero integer are true; `false`, `no`,
/// `off`, `0` and the empty string are false.
pub fn parse_bool(value: &str) -> FilterResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Ok(true),
        "false" | "no" | "off" | "" => Ok(false),
        other => other
            .parse::<i64>()
            .map(|n| n != 0)
            .map_err(|_| FilterError::Config(format!("failed to parse '{}' as a boolean value", value))),
    }
}

/// Raw configuration value as it appears in TOML/JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// `true` / `false`
    Bool(bool),
    /// Integer, interpreted as a boolean
    Int(i64),
    /// Any string spelling
    Str(String),
}

impl ConfigValue {
    fn into_string(self) -> String {
        match self {
            ConfigValue::Bool(b) => b.to_string(),
            ConfigValue::Int(n) => n.to_string(),
            ConfigValue::Str(s) => s,
        }
    }
}

/// `core.autocrlf`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "ConfigValue", into = "ConfigValue")]
pub enum AutoCrlf {
    /// No automatic conversion
    #[default]
    False,
    /// Normalize to LF on clean, expand to CRLF on smudge
    True,
    /// Normalize to LF on clean only
    Input,
}

impl FromStr for AutoCrlf {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("input") {
            return Ok(AutoCrlf::Input);
        }
        Ok(if parse_bool(s)? { AutoCrlf::True } else { AutoCrlf::False })
    }
}

impl TryFrom<ConfigValue> for AutoCrlf {
    type Error = FilterError;

    fn try_from(value: ConfigValue) -> Result<Self, Self::Error> {
        value.into_string().parse()
    }
}

impl From<AutoCrlf> for ConfigValue {
    fn from(value: AutoCrlf) -> Self {
        match value {
            AutoCrlf::False => ConfigValue::Bool(false),
            AutoCrlf::True => ConfigValue::Bool(true),
            AutoCrlf::Input => ConfigValue::Str("input".to_string()),
        }
    }
}

/// `core.safecrlf`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "ConfigValue", into = "ConfigValue")]
pub enum SafeCrlf {
    /// No irreversibility check
    #[default]
    False,
    /// Refuse irreversible conversions
    Fail,
    /// Warn about irreversible conversions but perform them
    Warn,
}

impl FromStr for SafeCrlf {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("warn") {
            return Ok(SafeCrlf::Warn);
        }
        Ok(if parse_bool(s)? { SafeCrlf::Fail } else { SafeCrlf::False })
    }
}

impl TryFrom<ConfigValue> for SafeCrlf {
    type Error = FilterError;

    fn try_from(value: ConfigValue) -> Result<Self, Self::Error> {
        value.into_string().parse()
    }
}

impl From<SafeCrlf> for ConfigValue {
    fn from(value: SafeCrlf) -> Self {
        match value {
            SafeCrlf::False => ConfigValue::Bool(false),
            SafeCrlf::Fail => ConfigValue::Bool(true),
            SafeCrlf::Warn => ConfigValue::Str("warn".to_string()),
        }
    }
}

/// `core.eol`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eol {
    /// No explicit setting
    Unset,
    /// Line feed only
    Lf,
    /// Carriage return + line feed
    Crlf,
    /// Platform line ending
    #[default]
    Native,
}

impl Eol {
    /// Line ending of the platform this crate was built for
    pub const PLATFORM: Eol = if cfg!(windows) { Eol::Crlf } else { Eol::Lf };

    /// Resolve `Native` (and `Unset`) to the platform line ending
    pub fn resolve(self) -> Eol {
        match self {
            Eol::Native | Eol::Unset => Eol::PLATFORM,
            other => other,
        }
    }
}

impl FromStr for Eol {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lf" => Ok(Eol::Lf),
            "crlf" => Ok(Eol::Crlf),
            "native" => Ok(Eol::Native),
            other => Err(FilterError::Config(format!(
                "invalid value '{}' for core.eol (expected lf, crlf or native)",
                other
            ))),
        }
    }
}

impl fmt::Display for Eol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Eol::Unset => "unset",
            Eol::Lf => "lf",
            Eol::Crlf => "crlf",
            Eol::Native => "native",
        };
        f.write_str(s)
    }
}

/// `[core]` section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    /// `core.autocrlf`
    #[serde(default)]
    pub autocrlf: AutoCrlf,

    /// `core.safecrlf`
    #[serde(default)]
    pub safecrlf: SafeCrlf,

    /// `core.eol`
    #[serde(default)]
    pub eol: Eol,
}

impl CoreConfig {
    /// Set `core.autocrlf`
    pub fn with_autocrlf(mut self, autocrlf: AutoCrlf) -> Self {
        self.autocrlf = autocrlf;
        self
    }

    /// Set `core.safecrlf`
    pub fn with_safecrlf(mut self, safecrlf: SafeCrlf) -> Self {
        self.safecrlf = safecrlf;
        self
    }

    /// Set `core.eol`
    pub fn with_eol(mut self, eol: Eol) -> Self {
        self.eol = eol;
        self
    }
}

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML document
    Toml,
    /// JSON document
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> FilterResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(ext) => Err(FilterError::Config(format!(
                "unsupported configuration format: {}. Supported formats: toml, json",
                ext
            ))),
            None => Err(FilterError::Config(format!(
                "invalid configuration path: {}",
                path.display()
            ))),
        }
    }
}

/// Repository configuration relevant to filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepoConfig {
    /// `[core]` section
    #[serde(default)]
    pub core: CoreConfig,
}

impl RepoConfig {
    /// Parse configuration from a string in the given format
    pub fn from_str_with_format(content: &str, format: ConfigFormat) -> FilterResult<Self> {
        let config = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    /// Load configuration from a TOML or JSON file
    pub fn load_file<P: AsRef<Path>>(path: P) -> FilterResult<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from: {}", path.display());

        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_str_with_format(&content, format)?;

        info!("Loaded configuration file: {}", path.display());
        Ok(config)
    }

    /// Load configuration from a file, then apply environment overrides
    pub fn load_with_overrides<P: AsRef<Path>>(path: P) -> FilterResult<Self> {
        let mut config = Self::load_file(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `MEDIAGIT_CORE_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> FilterResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> FilterResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("MEDIAGIT_CORE_AUTOCRLF") {
            self.core.autocrlf = value.parse()?;
        }
        if let Some(value) = lookup("MEDIAGIT_CORE_SAFECRLF") {
            self.core.safecrlf = value.parse()?;
        }
        if let Some(value) = lookup("MEDIAGIT_CORE_EOL") {
            self.core.eol = value.parse()?;
        }
        Ok(())
    }
}

impl From<CoreConfig> for RepoConfig {
    fn from(core: CoreConfig) -> Self {
        Self { core }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_bool_spellings() {
        for s in ["true", "YES", "on", "1", "-3"] {
            assert!(parse_bool(s).unwrap(), "{s}");
        }
        for s in ["false", "no", "OFF", "0", ""] {
            assert!(!parse_bool(s).unwrap(), "{s}");
        }
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_defaults_match_git() {
        let config = RepoConfig::default();
        assert_eq!(config.core.autocrlf, AutoCrlf::False);
        assert_eq!(config.core.safecrlf, SafeCrlf::False);
        assert_eq!(config.core.eol, Eol::Native);
    }

    #[test]
    fn test_toml_mixed_value_types() {
        let config = RepoConfig::from_str_with_format(
            "[core]\nautocrlf = true\nsafecrlf = \"warn\"\neol = \"crlf\"\n",
            ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(config.core.autocrlf, AutoCrlf::True);
        assert_eq!(config.core.safecrlf, SafeCrlf::Warn);
        assert_eq!(config.core.eol, Eol::Crlf);
    }

    #[test]
    fn test_json_config() {
        let config = RepoConfig::from_str_with_format(
            r#"{"core": {"autocrlf": "input", "safecrlf": 1}}"#,
            ConfigFormat::Json,
        )
        .unwrap();
        assert_eq!(config.core.autocrlf, AutoCrlf::Input);
        assert_eq!(config.core.safecrlf, SafeCrlf::Fail);
        assert_eq!(config.core.eol, Eol::Native);
    }

    #[test]
    fn test_invalid_eol_rejected() {
        let result = RepoConfig::from_str_with_format("[core]\neol = \"cr\"\n", ConfigFormat::Toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_path("a/config.toml").unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path("config.json").unwrap(), ConfigFormat::Json);
        assert!(ConfigFormat::from_path("config.ini").is_err());
        assert!(ConfigFormat::from_path("config").is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("MEDIAGIT_CORE_AUTOCRLF", "input"),
            ("MEDIAGIT_CORE_EOL", "lf"),
        ]
        .into_iter()
        .collect();

        let mut config = RepoConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.core.autocrlf, AutoCrlf::Input);
        assert_eq!(config.core.eol, Eol::Lf);
        assert_eq!(config.core.safecrlf, SafeCrlf::False);
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("filters.toml");
        std::fs::write(&path, "[core]\nautocrlf = \"yes\"\n").unwrap();

        let config = RepoConfig::load_file(&path).unwrap();
        assert_eq!(config.core.autocrlf, AutoCrlf::True);
    }

    #[test]
    fn test_eol_resolution() {
        assert_eq!(Eol::Crlf.resolve(), Eol::Crlf);
        assert_eq!(Eol::Native.resolve(), Eol::PLATFORM);
        assert_eq!(Eol::Unset.resolve(), Eol::PLATFORM);
    }
}
