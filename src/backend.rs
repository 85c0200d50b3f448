//! The seam between sensor sessions and whatever hosts GoIO_DLL.
//!
//! One method per DLL entry point. Methods hand back the raw vendor values
//! (status codes, counts, handles); the `crate::Result` wrapper is reserved
//! for failures of the transport itself, e.g. a broken bridge connection.

use crate::types::{ProductId, SensorHandle, VendorId};
use crate::Result;
use serde::{Deserialize, Serialize};

/// `GoIO_GetDLLVersion` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReply {
    pub status: i32,
    pub major: u16,
    pub minor: u16,
}

/// `GoIO_GetNthAvailableDeviceName` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNameReply {
    pub status: i32,
    pub name: String,
}

/// `GoIO_Sensor_GetOpenDeviceName` output. Vendor and product are raw ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDeviceReply {
    pub status: i32,
    pub name: String,
    pub vendor: i32,
    pub product: i32,
}

/// `GoIO_Sensor_SendCmdAndGetResponse` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    pub status: i32,
    /// Bytes the device wrote into the response buffer.
    pub response: Vec<u8>,
}

/// `GoIO_Sensor_GetLastCmdResponseStatus` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCmdReply {
    pub status: i32,
    pub last_cmd: u8,
    pub last_cmd_status: u8,
    pub last_cmd_with_error: u8,
    pub last_error: u8,
}

/// GoIO_DLL entry points.
pub trait Backend: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    fn init(&self) -> Result<i32>;

    fn uninit(&self) -> Result<i32>;

    fn dll_version(&self) -> Result<VersionReply>;

    /// Rescan the bus; returns the number of matching devices.
    fn update_list_of_available_devices(&self, vendor: VendorId, product: ProductId)
        -> Result<i32>;

    fn nth_available_device_name(
        &self,
        vendor: VendorId,
        product: ProductId,
        n: i32,
    ) -> Result<DeviceNameReply>;

    /// `None` when the DLL refused to open the device.
    fn sensor_open(
        &self,
        device: &str,
        vendor: VendorId,
        product: ProductId,
        strict_dds_validation: i32,
    ) -> Result<Option<SensorHandle>>;

    fn sensor_close(&self, handle: SensorHandle) -> Result<i32>;

    fn sensor_clear_io(&self, handle: SensorHandle) -> Result<i32>;

    fn sensor_open_device_name(&self, handle: SensorHandle) -> Result<OpenDeviceReply>;

    /// Send `command` with `params` and collect at most `response_capacity`
    /// response bytes.
    fn sensor_send_cmd_and_get_response(
        &self,
        handle: SensorHandle,
        command: u8,
        params: &[u8],
        response_capacity: usize,
        timeout_ms: i32,
    ) -> Result<CommandReply>;

    fn sensor_last_cmd_response_status(&self, handle: SensorHandle) -> Result<LastCmdReply>;

    fn sensor_num_measurements_available(&self, handle: SensorHandle) -> Result<i32>;

    /// Drain up to `max_count` raw measurements. A negative first element of
    /// the tuple is the vendor failure code.
    fn sensor_read_raw_measurements(
        &self,
        handle: SensorHandle,
        max_count: u32,
    ) -> Result<(i32, Vec<i32>)>;

    fn sensor_latest_raw_measurement(&self, handle: SensorHandle) -> Result<i32>;

    fn sensor_convert_to_voltage(&self, handle: SensorHandle, raw: i32) -> Result<f64>;

    fn sensor_calibrate_data(&self, handle: SensorHandle, volts: f64) -> Result<f64>;

    fn sensor_probe_type(&self, handle: SensorHandle) -> Result<i32>;

    fn sensor_set_measurement_period(
        &self,
        handle: SensorHandle,
        seconds: f64,
        timeout_ms: i32,
    ) -> Result<i32>;

    /// Measurement period in seconds; the DLL reports failure as a
    /// non-positive value.
    fn sensor_measurement_period(&self, handle: SensorHandle, timeout_ms: i32) -> Result<f64>;
}
