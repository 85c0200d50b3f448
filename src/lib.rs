//! # goio - Rust binding for Vernier Go!Link / Go!Temp / Go!Motion sensors
//!
//! Drives sensors through the vendor GoIO_DLL. Provides:
//! - Library session, device enumeration and sensor sessions
//! - Sensor commands, LED control and raw/calibrated measurements
//! - A process bridge for 64-bit hosts and the 32-bit-only DLL
//! - A 0D viewer adapter with a C FFI for acquisition hosts
//!
//! ## Quick Start
//! ```no_run
//! use goio::{GoIoConfig, ProductId};
//!
//! let goio = GoIoConfig::from_env().unwrap().open().unwrap();
//! println!("GoIO_DLL {}", goio.version().unwrap());
//!
//! let devices = goio.devices(ProductId::GoLink).unwrap();
//! let sensor = goio.open_sensor(&devices[0], ProductId::GoLink).unwrap();
//! sensor.start().unwrap();
//! for raw in sensor.read_raw().unwrap() {
//!     println!("{:.3}", sensor.raw_to_calibrated(raw).unwrap());
//! }
//! ```

pub mod error;
pub mod types;
pub mod protocol;
pub mod backend;
pub mod device;
pub mod bridge;
pub mod config;
pub mod viewer;
pub mod ffi;

#[cfg(feature = "goio-sdk")]
mod sys;
#[cfg(feature = "goio-sdk")]
pub mod native;
#[cfg(feature = "mock")]
pub mod mock;

pub use backend::Backend;
pub use config::{BackendKind, GoIoConfig};
pub use device::{GoIo, Sensor};
pub use error::GoIoError;
pub use protocol::{DefaultResponse, LedParam, WireRecord};
pub use types::*;
pub use viewer::{Data0D, ListParameter, Viewer, ViewerSettings};

/// Result type alias for goio operations.
pub type Result<T> = std::result::Result<T, GoIoError>;
