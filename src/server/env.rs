//! Key/value configuration source
//!
//! Values come from a `.env` file, overlaid by the process environment for
//! the keys the relay understands.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::error::ConfigError;

/// Listen address (IP or hostname)
pub const SERVER_ADDRESS: &str = "SERVER_ADDRESS";
/// Listen port
pub const SERVER_PORT: &str = "SERVER_PORT";
/// Frame rate written into persisted videos
pub const OUTPUT_KEYFRAMES: &str = "OUTPUT_KEYFRAMES";

/// Keys read from the process environment
pub const KNOWN_KEYS: [&str; 3] = [SERVER_ADDRESS, SERVER_PORT, OUTPUT_KEYFRAMES];

/// String-to-string configuration map
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    values: HashMap<String, String>,
}

impl EnvSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from explicit pairs (tests, embedding)
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Load `path` if it exists, then apply process environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut source = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!(path = %path.display(), "Env file not found, using process environment");
            Self::new()
        };

        for key in KNOWN_KEYS {
            if let Ok(value) = std::env::var(key) {
                source.values.insert(key.to_string(), value);
            }
        }

        Ok(source)
    }

    /// Parse a `.env` file without touching the process environment
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let env_error = |e: dotenvy::Error| ConfigError::EnvFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let mut values = HashMap::new();
        for item in dotenvy::from_path_iter(path).map_err(env_error)? {
            let (key, value) = item.map_err(env_error)?;
            values.insert(key, value);
        }

        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Value of a key that must be present and non-empty
    pub fn require(&self, key: &'static str) -> Result<&str, ConfigError> {
        match self.get(key).map(str::trim) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ConfigError::MissingKey(key)),
        }
    }

    /// Parse a required key
    pub fn parse<T: FromStr>(&self, key: &'static str) -> Result<T, ConfigError> {
        let value = self.require(key)?;
        value.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
    }

    /// Parse an optional key, falling back to `default` when absent
    pub fn parse_or<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.require(key) {
            Ok(_) => self.parse(key),
            Err(ConfigError::MissingKey(_)) => Ok(default),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_require_and_parse() {
        let env = EnvSource::from_pairs([(SERVER_ADDRESS, "127.0.0.1"), (SERVER_PORT, "9000")]);

        assert_eq!(env.require(SERVER_ADDRESS).unwrap(), "127.0.0.1");
        assert_eq!(env.parse::<u16>(SERVER_PORT).unwrap(), 9000);
        assert_eq!(env.parse_or::<u32>(OUTPUT_KEYFRAMES, 30).unwrap(), 30);
    }

    #[test]
    fn test_missing_and_invalid() {
        let env = EnvSource::from_pairs([(SERVER_PORT, "not-a-port"), (SERVER_ADDRESS, "  ")]);

        assert_eq!(
            env.require(SERVER_ADDRESS),
            Err(ConfigError::MissingKey(SERVER_ADDRESS))
        );
        assert!(matches!(
            env.parse::<u16>(SERVER_PORT),
            Err(ConfigError::InvalidValue { key: SERVER_PORT, .. })
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# relay settings").unwrap();
        writeln!(file, "SERVER_ADDRESS=0.0.0.0").unwrap();
        writeln!(file, "SERVER_PORT=8485").unwrap();
        writeln!(file, "OUTPUT_KEYFRAMES=\"24\"").unwrap();

        let env = EnvSource::from_file(file.path()).unwrap();
        assert_eq!(env.get(SERVER_ADDRESS), Some("0.0.0.0"));
        assert_eq!(env.parse::<u16>(SERVER_PORT).unwrap(), 8485);
        assert_eq!(env.parse::<u32>(OUTPUT_KEYFRAMES).unwrap(), 24);
    }
}
