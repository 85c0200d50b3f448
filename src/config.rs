//! Environment-driven configuration.
//!
//! | Variable                 | Meaning                                        |
//! |--------------------------|------------------------------------------------|
//! | `GOIO_BACKEND`           | `native`, `bridge` or `mock`                   |
//! | `GOIO_SERVER32`          | bridge helper to launch instead of connecting  |
//! | `GOIO_BRIDGE_HOST`       | bridge address                                 |
//! | `GOIO_BRIDGE_PORT`       | bridge port                                    |
//! | `GOIO_BRIDGE_TIMEOUT_MS` | connect and per-call socket timeout            |
//! | `GOIO_CMD_TIMEOUT_MS`    | sensor command timeout handed to the DLL       |
//! | `GOIO_PRODUCT`           | product family the viewer and demos look for   |

use crate::backend::Backend;
use crate::bridge::{self, BridgeClient};
use crate::device::GoIo;
use crate::protocol::DEFAULT_CMD_TIMEOUT_MS;
use crate::types::ProductId;
use crate::{GoIoError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BRIDGE_TIMEOUT_MS: u64 = 10_000;

/// Which implementation of the DLL entry points to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// GoIO_DLL loaded in this process.
    Native,
    /// GoIO_DLL hosted by a `goio-server32` process.
    Bridge,
    /// Simulated devices.
    Mock,
}

impl BackendKind {
    pub const fn name(self) -> &'static str {
        match self {
            BackendKind::Native => "native",
            BackendKind::Bridge => "bridge",
            BackendKind::Mock => "mock",
        }
    }
}

impl Default for BackendKind {
    fn default() -> Self {
        if cfg!(feature = "goio-sdk") {
            BackendKind::Native
        } else {
            BackendKind::Bridge
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = GoIoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(BackendKind::Native),
            "bridge" => Ok(BackendKind::Bridge),
            "mock" => Ok(BackendKind::Mock),
            _ => Err(GoIoError::InvalidName {
                kind: "backend",
                name: s.to_string(),
                expected: "native, bridge, mock".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoIoConfig {
    pub backend: BackendKind,
    pub server32: Option<PathBuf>,
    pub bridge_host: String,
    pub bridge_port: u16,
    pub bridge_timeout: Duration,
    pub cmd_timeout_ms: i32,
    pub product: ProductId,
}

impl Default for GoIoConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            server32: None,
            bridge_host: bridge::DEFAULT_HOST.to_string(),
            bridge_port: bridge::DEFAULT_PORT,
            bridge_timeout: Duration::from_millis(DEFAULT_BRIDGE_TIMEOUT_MS),
            cmd_timeout_ms: DEFAULT_CMD_TIMEOUT_MS,
            product: ProductId::GoLink,
        }
    }
}

impl GoIoConfig {
    /// Build a configuration from `GOIO_*` variables.
    ///
    /// Unset or unparsable numbers fall back to their defaults; an unknown
    /// backend or product name is an error.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let backend = match read_env_string("GOIO_BACKEND") {
            Some(name) => name.parse()?,
            None => defaults.backend,
        };
        let product = match read_env_string("GOIO_PRODUCT") {
            Some(name) => name.parse()?,
            None => defaults.product,
        };

        let config = Self {
            backend,
            server32: read_env_raw("GOIO_SERVER32").map(PathBuf::from),
            bridge_host: read_env_raw("GOIO_BRIDGE_HOST").unwrap_or(defaults.bridge_host),
            bridge_port: read_env_u16("GOIO_BRIDGE_PORT", defaults.bridge_port),
            bridge_timeout: Duration::from_millis(read_env_u64(
                "GOIO_BRIDGE_TIMEOUT_MS",
                DEFAULT_BRIDGE_TIMEOUT_MS,
            )),
            cmd_timeout_ms: read_env_i32("GOIO_CMD_TIMEOUT_MS", defaults.cmd_timeout_ms),
            product,
        };
        log::debug!("{:?}", config);
        Ok(config)
    }

    /// Create the configured backend.
    pub fn connect(&self) -> Result<Box<dyn Backend>> {
        match self.backend {
            BackendKind::Native => native_backend(),
            BackendKind::Bridge => {
                let client = match &self.server32 {
                    Some(path) => BridgeClient::spawn(
                        path,
                        &self.bridge_host,
                        self.bridge_port,
                        self.bridge_timeout,
                    )?,
                    None => BridgeClient::connect(
                        (self.bridge_host.as_str(), self.bridge_port),
                        self.bridge_timeout,
                    )?,
                };
                Ok(Box::new(client))
            }
            BackendKind::Mock => mock_backend(),
        }
    }

    /// Create the configured backend and initialise the library through it.
    pub fn open(&self) -> Result<GoIo> {
        GoIo::open_with_timeout(self.connect()?, self.cmd_timeout_ms)
    }
}

#[cfg(feature = "goio-sdk")]
fn native_backend() -> Result<Box<dyn Backend>> {
    Ok(Box::new(crate::native::NativeLibrary::new()))
}

#[cfg(not(feature = "goio-sdk"))]
fn native_backend() -> Result<Box<dyn Backend>> {
    Err(GoIoError::BackendUnavailable(
        "built without the goio-sdk feature".into(),
    ))
}

#[cfg(feature = "mock")]
fn mock_backend() -> Result<Box<dyn Backend>> {
    Ok(Box::new(crate::mock::MockLibrary::single_golink()))
}

#[cfg(not(feature = "mock"))]
fn mock_backend() -> Result<Box<dyn Backend>> {
    Err(GoIoError::BackendUnavailable(
        "built without the mock feature".into(),
    ))
}

fn read_env_raw(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_env_string(name: &str) -> Option<String> {
    read_env_raw(name).map(|v| v.to_ascii_lowercase())
}

fn read_env_u16(name: &str, default: u16) -> u16 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u16>().ok())
        .unwrap_or(default)
}

fn read_env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn read_env_i32(name: &str, default: i32) -> i32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<i32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        assert_eq!("NATIVE".parse::<BackendKind>().unwrap(), BackendKind::Native);
        assert_eq!(" bridge ".parse::<BackendKind>().unwrap(), BackendKind::Bridge);
        assert_eq!(BackendKind::Mock.to_string(), "mock");
        assert!(matches!(
            "dll".parse::<BackendKind>(),
            Err(GoIoError::InvalidName { kind: "backend", .. })
        ));
    }

    #[test]
    fn test_env_helpers() {
        std::env::set_var("GOIO_TEST_PORT", " 5000 ");
        std::env::set_var("GOIO_TEST_BAD_PORT", "70000");
        std::env::set_var("GOIO_TEST_TIMEOUT", "-5");
        std::env::set_var("GOIO_TEST_BLANK", "   ");

        assert_eq!(read_env_u16("GOIO_TEST_PORT", 1), 5000);
        assert_eq!(read_env_u16("GOIO_TEST_BAD_PORT", 1), 1);
        assert_eq!(read_env_i32("GOIO_TEST_TIMEOUT", 1000), 1000);
        assert_eq!(read_env_string("GOIO_TEST_BLANK"), None);
        assert_eq!(read_env_u64("GOIO_TEST_UNSET", 7), 7);
    }

    // The only test touching the real GOIO_* names.
    #[test]
    fn test_from_env() {
        std::env::set_var("GOIO_BACKEND", "Mock");
        std::env::set_var("GOIO_PRODUCT", "GoTemp");
        std::env::set_var("GOIO_BRIDGE_PORT", "4000");
        std::env::set_var("GOIO_SERVER32", "C:\\Tools\\goio-server32.exe");

        let config = GoIoConfig::from_env().unwrap();
        assert_eq!(config.backend, BackendKind::Mock);
        assert_eq!(config.product, ProductId::GoTemp);
        assert_eq!(config.bridge_port, 4000);
        assert_eq!(config.bridge_host, bridge::DEFAULT_HOST);
        assert_eq!(
            config.server32,
            Some(PathBuf::from("C:\\Tools\\goio-server32.exe"))
        );

        std::env::set_var("GOIO_PRODUCT", "GoBanana");
        assert!(GoIoConfig::from_env().is_err());

        for name in ["GOIO_BACKEND", "GOIO_PRODUCT", "GOIO_BRIDGE_PORT", "GOIO_SERVER32"] {
            std::env::remove_var(name);
        }
    }

    #[cfg(feature = "mock")]
    #[test]
    fn test_open_mock() {
        let config = GoIoConfig {
            backend: BackendKind::Mock,
            ..Default::default()
        };
        let goio = config.open().unwrap();
        assert_eq!(goio.devices(ProductId::GoLink).unwrap(), vec!["mock-golink-0"]);
    }

    #[cfg(not(feature = "goio-sdk"))]
    #[test]
    fn test_native_needs_sdk_feature() {
        let config = GoIoConfig {
            backend: BackendKind::Native,
            ..Default::default()
        };
        assert!(matches!(
            config.connect(),
            Err(GoIoError::BackendUnavailable(_))
        ));
    }
}
