//! Server configuration module.
//!
//! Configuration is loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `KVSTORE_FILE_PATH`: Store file, created if missing (default: `./db`)
//! - `KVSTORE_PAGE_SIZE`: Page size in bytes for a new file (default: `1024`)
//! - `KVSTORE_MAX_KEYS`: Maximum keys per node, odd and at least 3 (default: `11`)
//! - `KVSTORE_LISTEN_ADDRESS`: Address to bind, all interfaces by default (default: `0.0.0.0`)
//! - `KVSTORE_LISTEN_PORT`: Port to listen on (default: `8080`)
//! - `KVSTORE_TELNET_MODE`: Drop `\r` and `\n` from client input (default: `false`)

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

const FILE_PATH_VAR: &str = "KVSTORE_FILE_PATH";
const PAGE_SIZE_VAR: &str = "KVSTORE_PAGE_SIZE";
const MAX_KEYS_VAR: &str = "KVSTORE_MAX_KEYS";
const LISTEN_ADDRESS_VAR: &str = "KVSTORE_LISTEN_ADDRESS";
const LISTEN_PORT_VAR: &str = "KVSTORE_LISTEN_PORT";
const TELNET_MODE_VAR: &str = "KVSTORE_TELNET_MODE";

/// Server configuration.
///
/// # Post-conditions
///
/// When built by `from_env()`:
/// - `page_size` is non-zero
/// - `max_keys` is odd and at least 3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Path of the store file.
    pub file_path: PathBuf,
    /// Page size used when the file is created.
    pub page_size: u32,
    /// Maximum keys per node.
    pub max_keys: u32,
    /// Address to bind.
    pub listen_address: IpAddr,
    /// Port to listen on.
    pub listen_port: u16,
    /// Whether to drop line endings from client input.
    pub telnet_mode: bool,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl ServerConfig {
    /// Default store file.
    pub const DEFAULT_FILE_PATH: &'static str = "./db";
    /// Default page size.
    pub const DEFAULT_PAGE_SIZE: u32 = 1024;
    /// Default maximum keys per node.
    pub const DEFAULT_MAX_KEYS: u32 = 11;
    /// Default bind address: all interfaces.
    pub const DEFAULT_LISTEN_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    /// Default port for the server.
    pub const DEFAULT_PORT: u16 = 8080;

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that doesn't parse or
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value if set.
    ///
    /// # Errors
    ///
    /// Same as [`ServerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file_path = lookup(FILE_PATH_VAR)
            .map_or_else(|| PathBuf::from(Self::DEFAULT_FILE_PATH), PathBuf::from);
        let page_size = lookup(PAGE_SIZE_VAR)
            .map_or(Ok(Self::DEFAULT_PAGE_SIZE), |value| load_page_size(&value))?;
        let max_keys = lookup(MAX_KEYS_VAR)
            .map_or(Ok(Self::DEFAULT_MAX_KEYS), |value| load_max_keys(&value))?;
        let listen_address = lookup(LISTEN_ADDRESS_VAR).map_or(
            Ok(Self::DEFAULT_LISTEN_ADDRESS),
            |value| load_listen_address(&value),
        )?;
        let listen_port = lookup(LISTEN_PORT_VAR)
            .map_or(Ok(Self::DEFAULT_PORT), |value| load_listen_port(&value))?;
        let telnet_mode = lookup(TELNET_MODE_VAR)
            .map_or(Ok(false), |value| load_telnet_mode(&value))?;

        Ok(Self {
            file_path,
            page_size,
            max_keys,
            listen_address,
            listen_port,
            telnet_mode,
        })
    }
}

fn invalid(name: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message,
    }
}

fn load_page_size(value: &str) -> Result<u32, ConfigError> {
    match value.parse::<u32>() {
        Ok(0) => Err(invalid(PAGE_SIZE_VAR, "must not be zero".to_string())),
        Ok(size) => Ok(size),
        Err(_) => Err(invalid(
            PAGE_SIZE_VAR,
            format!("'{value}' is not a valid page size"),
        )),
    }
}

fn load_max_keys(value: &str) -> Result<u32, ConfigError> {
    let max_keys = value.parse::<u32>().map_err(|_| {
        invalid(MAX_KEYS_VAR, format!("'{value}' is not a valid key count"))
    })?;
    if max_keys < 3 || max_keys % 2 == 0 {
        return Err(invalid(
            MAX_KEYS_VAR,
            format!("{max_keys} must be odd and at least 3"),
        ));
    }
    Ok(max_keys)
}

fn load_listen_address(value: &str) -> Result<IpAddr, ConfigError> {
    value.parse::<IpAddr>().map_err(|_| {
        invalid(
            LISTEN_ADDRESS_VAR,
            format!("'{value}' is not a valid IP address"),
        )
    })
}

fn load_listen_port(value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| {
        invalid(
            LISTEN_PORT_VAR,
            format!("'{value}' is not a valid port number (must be 1-65535)"),
        )
    })
}

fn load_telnet_mode(value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(invalid(
            TELNET_MODE_VAR,
            format!("'{value}' is not one of true, false, 1, 0"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[]).expect("defaults");
        assert_eq!(config.file_path, PathBuf::from("./db"));
        assert_eq!(config.page_size, 1024);
        assert_eq!(config.max_keys, 11);
        assert_eq!(config.listen_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.listen_port, 8080);
        assert!(!config.telnet_mode);
    }

    #[test]
    fn test_all_values_set() {
        let config = load(&[
            ("KVSTORE_FILE_PATH", "/tmp/store"),
            ("KVSTORE_PAGE_SIZE", "4096"),
            ("KVSTORE_MAX_KEYS", "5"),
            ("KVSTORE_LISTEN_ADDRESS", "127.0.0.1"),
            ("KVSTORE_LISTEN_PORT", "9000"),
            ("KVSTORE_TELNET_MODE", "1"),
        ])
        .expect("config");
        assert_eq!(
            config,
            ServerConfig {
                file_path: PathBuf::from("/tmp/store"),
                page_size: 4096,
                max_keys: 5,
                listen_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
                listen_port: 9000,
                telnet_mode: true,
            }
        );
    }

    #[test]
    fn test_max_keys_must_be_odd_and_at_least_three() {
        for bad in ["4", "1", "0", "-3", "many"] {
            assert!(
                matches!(
                    load(&[("KVSTORE_MAX_KEYS", bad)]),
                    Err(ConfigError::InvalidValue { ref name, .. }) if name == "KVSTORE_MAX_KEYS"
                ),
                "{bad} accepted"
            );
        }
        assert_eq!(load(&[("KVSTORE_MAX_KEYS", "3")]).expect("3").max_keys, 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(load(&[("KVSTORE_PAGE_SIZE", "0")]).is_err());
        assert!(load(&[("KVSTORE_PAGE_SIZE", "big")]).is_err());
        assert!(load(&[("KVSTORE_LISTEN_PORT", "70000")]).is_err());
        assert!(load(&[("KVSTORE_LISTEN_ADDRESS", "localhost")]).is_err());
        assert_eq!(
            load(&[("KVSTORE_LISTEN_ADDRESS", "::1")])
                .expect("ipv6")
                .listen_address,
            "::1".parse::<IpAddr>().expect("parse")
        );
    }

    #[test]
    fn test_telnet_mode_values() {
        assert!(load(&[("KVSTORE_TELNET_MODE", "true")]).expect("true").telnet_mode);
        assert!(!load(&[("KVSTORE_TELNET_MODE", "0")]).expect("0").telnet_mode);
        assert!(load(&[("KVSTORE_TELNET_MODE", "yes")]).is_err());
    }

    #[test]
    fn test_config_error_display_invalid() {
        let error = ConfigError::InvalidValue {
            name: "TEST_VAR".to_string(),
            message: "bad value".to_string(),
        };
        assert_eq!(error.to_string(), "invalid value for TEST_VAR: bad value");
    }
}
