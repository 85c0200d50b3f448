//! Wire format of the process bridge.
//!
//! Each frame is a little-endian `u32` payload length followed by a JSON
//! payload. The client sends a [`Request`] naming a GoIO_DLL entry point with
//! positional arguments; the server answers with exactly one [`Response`].

use crate::{GoIoError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Read, Write};

pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024; // 1MB safety limit

/// Method names understood by the bridge server.
pub mod method {
    pub const INIT: &str = "GoIO_Init";
    pub const UNINIT: &str = "GoIO_Uninit";
    pub const DLL_VERSION: &str = "GoIO_GetDLLVersion";
    pub const UPDATE_DEVICE_LIST: &str = "GoIO_UpdateListOfAvailableDevices";
    pub const NTH_DEVICE_NAME: &str = "GoIO_GetNthAvailableDeviceName";
    pub const SENSOR_OPEN: &str = "GoIO_Sensor_Open";
    pub const SENSOR_CLOSE: &str = "GoIO_Sensor_Close";
    pub const SENSOR_CLEAR_IO: &str = "GoIO_Sensor_ClearIO";
    pub const SENSOR_OPEN_DEVICE_NAME: &str = "GoIO_Sensor_GetOpenDeviceName";
    pub const SENSOR_SEND_CMD: &str = "GoIO_Sensor_SendCmdAndGetResponse";
    pub const SENSOR_LAST_CMD_STATUS: &str = "GoIO_Sensor_GetLastCmdResponseStatus";
    pub const SENSOR_NUM_AVAILABLE: &str = "GoIO_Sensor_GetNumMeasurementsAvailable";
    pub const SENSOR_READ_RAW: &str = "GoIO_Sensor_ReadRawMeasurements";
    pub const SENSOR_LATEST_RAW: &str = "GoIO_Sensor_GetLatestRawMeasurement";
    pub const SENSOR_TO_VOLTAGE: &str = "GoIO_Sensor_ConvertToVoltage";
    pub const SENSOR_CALIBRATE: &str = "GoIO_Sensor_CalibrateData";
    pub const SENSOR_PROBE_TYPE: &str = "GoIO_Sensor_GetProbeType";
    pub const SENSOR_SET_PERIOD: &str = "GoIO_Sensor_SetMeasurementPeriod";
    pub const SENSOR_GET_PERIOD: &str = "GoIO_Sensor_GetMeasurementPeriod";
    /// Ends the server loop after the response is sent.
    pub const SHUTDOWN: &str = "shutdown";
}

/// A forwarded call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Request {
    pub fn new(method: &str, args: Vec<Value>) -> Self {
        Self {
            method: method.to_string(),
            args,
        }
    }

    /// Deserialize the positional argument at `index`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let value = self.args.get(index).ok_or_else(|| {
            GoIoError::Protocol(format!(
                "{} expects argument #{}, got {}",
                self.method,
                index,
                self.args.len()
            ))
        })?;
        Ok(T::deserialize(value)?)
    }
}

/// Outcome of a forwarded call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Value { value: Value },
    Error { message: String },
}

/// Write a length-prefixed JSON message.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> Result<()> {
    let payload = serde_json::to_vec(msg)?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(GoIoError::Protocol(format!(
            "Message too large: {} bytes",
            payload.len()
        )));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Read a length-prefixed JSON message.
pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(GoIoError::Protocol(format!(
            "Message too large: {} bytes",
            len
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    log::trace!("bridge frame: {}", String::from_utf8_lossy(&payload));
    Ok(serde_json::from_slice(&payload)?)
}
