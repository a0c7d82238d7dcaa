use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const DB_FILE: &str = "fshare.db";
const CURRENT_DIR: &str = "./";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_COPY_DELAY_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a number, got `{value}`: {source}")]
    InvalidNumber {
        name: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// Emulator settings read from `FSHARE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub data_file: String,
    pub port: u16,
    /// Time a server-side copy stays pending before it runs
    pub copy_delay: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(CURRENT_DIR),
            data_file: DB_FILE.to_owned(),
            port: DEFAULT_PORT,
            copy_delay: Duration::from_millis(DEFAULT_COPY_DELAY_MS),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let data_dir = lookup("FSHARE_DATA_DIR").map_or(defaults.data_dir, PathBuf::from);
        let data_file = lookup("FSHARE_DATA_FILE").unwrap_or(defaults.data_file);
        let port = parse_number(&lookup, "FSHARE_PORT")?.unwrap_or(defaults.port);
        let copy_delay = parse_number(&lookup, "FSHARE_COPY_DELAY_MS")?
            .map_or(defaults.copy_delay, Duration::from_millis);
        Ok(Self {
            data_dir,
            data_file,
            port,
            copy_delay,
        })
    }

    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.data_file)
    }
}

fn parse_number<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr<Err = ParseIntError>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|source| ConfigError::InvalidNumber {
                name,
                value,
                source,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        // Act
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();

        // Assert
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.database_path(), PathBuf::from("./fshare.db"));
    }

    #[test]
    fn values_from_environment() {
        // Arrange
        let vars = [
            ("FSHARE_DATA_DIR", "/var/lib/fshare"),
            ("FSHARE_DATA_FILE", "emu.db"),
            ("FSHARE_PORT", "10000"),
            ("FSHARE_COPY_DELAY_MS", "0"),
        ];

        // Act
        let config = ServerConfig::from_lookup(lookup(&vars)).unwrap();

        // Assert
        assert_eq!(config.port, 10000);
        assert_eq!(config.copy_delay, Duration::ZERO);
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/fshare/emu.db"));
    }

    #[test]
    fn invalid_port_fails() {
        // Arrange
        let vars = [("FSHARE_PORT", "http")];

        // Act
        let result = ServerConfig::from_lookup(lookup(&vars));

        // Assert
        assert!(matches!(
            result,
            Err(ConfigError::InvalidNumber {
                name: "FSHARE_PORT",
                ..
            })
        ));
    }
}
