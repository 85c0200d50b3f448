use crate::backend::{
    Backend, CommandReply, DeviceNameReply, LastCmdReply, OpenDeviceReply, VersionReply,
};
use crate::protocol::{self, MAX_SIZE_DEVICE_NAME};
use crate::sys;
use crate::types::{ProductId, SensorHandle, VendorId};
use crate::Result;
use std::ffi::{c_char, c_int, c_uint, c_void};

/// In-process backend calling GoIO_DLL directly.
///
/// Only usable when the process bitness matches the DLL (32-bit on Windows);
/// otherwise go through [`crate::bridge::BridgeClient`].
pub struct NativeLibrary {
    _private: (),
}

impl NativeLibrary {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for NativeLibrary {
    fn default() -> Self {
        Self::new()
    }
}

fn raw(handle: SensorHandle) -> sys::GoIoSensorHandle {
    handle.0 as usize as sys::GoIoSensorHandle
}

impl Backend for NativeLibrary {
    fn name(&self) -> &'static str {
        "native"
    }

    fn init(&self) -> Result<i32> {
        Ok(unsafe { sys::GoIO_Init() })
    }

    fn uninit(&self) -> Result<i32> {
        Ok(unsafe { sys::GoIO_Uninit() })
    }

    fn dll_version(&self) -> Result<VersionReply> {
        let mut major = 0u16;
        let mut minor = 0u16;
        let status = unsafe { sys::GoIO_GetDLLVersion(&mut major, &mut minor) };
        Ok(VersionReply {
            status,
            major,
            minor,
        })
    }

    fn update_list_of_available_devices(
        &self,
        vendor: VendorId,
        product: ProductId,
    ) -> Result<i32> {
        Ok(unsafe { sys::GoIO_UpdateListOfAvailableDevices(vendor.code(), product.code()) })
    }

    fn nth_available_device_name(
        &self,
        vendor: VendorId,
        product: ProductId,
        n: i32,
    ) -> Result<DeviceNameReply> {
        let mut buf = [0u8; MAX_SIZE_DEVICE_NAME];
        let status = unsafe {
            sys::GoIO_GetNthAvailableDeviceName(
                buf.as_mut_ptr() as *mut c_char,
                MAX_SIZE_DEVICE_NAME as c_uint,
                vendor.code(),
                product.code(),
                n,
            )
        };
        Ok(DeviceNameReply {
            status,
            name: protocol::extract_string(&buf),
        })
    }

    fn sensor_open(
        &self,
        device: &str,
        vendor: VendorId,
        product: ProductId,
        strict_dds_validation: i32,
    ) -> Result<Option<SensorHandle>> {
        let name = protocol::name_buffer(device);
        let handle = unsafe {
            sys::GoIO_Sensor_Open(
                name.as_ptr() as *const c_char,
                vendor.code(),
                product.code(),
                strict_dds_validation,
            )
        };
        if handle.is_null() {
            Ok(None)
        } else {
            Ok(Some(SensorHandle(handle as usize as u64)))
        }
    }

    fn sensor_close(&self, handle: SensorHandle) -> Result<i32> {
        Ok(unsafe { sys::GoIO_Sensor_Close(raw(handle)) })
    }

    fn sensor_clear_io(&self, handle: SensorHandle) -> Result<i32> {
        Ok(unsafe { sys::GoIO_Sensor_ClearIO(raw(handle)) })
    }

    fn sensor_open_device_name(&self, handle: SensorHandle) -> Result<OpenDeviceReply> {
        let mut buf = [0u8; MAX_SIZE_DEVICE_NAME];
        let mut vendor: c_int = 0;
        let mut product: c_int = 0;
        let status = unsafe {
            sys::GoIO_Sensor_GetOpenDeviceName(
                raw(handle),
                buf.as_mut_ptr() as *mut c_char,
                MAX_SIZE_DEVICE_NAME as c_uint,
                &mut vendor,
                &mut product,
            )
        };
        Ok(OpenDeviceReply {
            status,
            name: protocol::extract_string(&buf),
            vendor,
            product,
        })
    }

    fn sensor_send_cmd_and_get_response(
        &self,
        handle: SensorHandle,
        command: u8,
        params: &[u8],
        response_capacity: usize,
        timeout_ms: i32,
    ) -> Result<CommandReply> {
        let params_ptr = if params.is_empty() {
            std::ptr::null()
        } else {
            params.as_ptr() as *const c_void
        };

        let mut response = vec![0u8; response_capacity];
        let mut response_len = response_capacity as c_uint;
        let (response_ptr, response_len_ptr) = if response_capacity == 0 {
            (std::ptr::null_mut(), std::ptr::null_mut())
        } else {
            (
                response.as_mut_ptr() as *mut c_void,
                &mut response_len as *mut c_uint,
            )
        };

        let status = unsafe {
            sys::GoIO_Sensor_SendCmdAndGetResponse(
                raw(handle),
                command,
                params_ptr,
                params.len() as c_uint,
                response_ptr,
                response_len_ptr,
                timeout_ms,
            )
        };

        response.truncate((response_len as usize).min(response_capacity));
        Ok(CommandReply { status, response })
    }

    fn sensor_last_cmd_response_status(&self, handle: SensorHandle) -> Result<LastCmdReply> {
        let mut reply = LastCmdReply {
            status: 0,
            last_cmd: 0,
            last_cmd_status: 0,
            last_cmd_with_error: 0,
            last_error: 0,
        };
        reply.status = unsafe {
            sys::GoIO_Sensor_GetLastCmdResponseStatus(
                raw(handle),
                &mut reply.last_cmd,
                &mut reply.last_cmd_status,
                &mut reply.last_cmd_with_error,
                &mut reply.last_error,
            )
        };
        Ok(reply)
    }

    fn sensor_num_measurements_available(&self, handle: SensorHandle) -> Result<i32> {
        Ok(unsafe { sys::GoIO_Sensor_GetNumMeasurementsAvailable(raw(handle)) })
    }

    fn sensor_read_raw_measurements(
        &self,
        handle: SensorHandle,
        max_count: u32,
    ) -> Result<(i32, Vec<i32>)> {
        let mut values = vec![0 as c_int; max_count as usize];
        let count = unsafe {
            sys::GoIO_Sensor_ReadRawMeasurements(raw(handle), values.as_mut_ptr(), max_count)
        };
        values.truncate(count.max(0) as usize);
        Ok((count, values))
    }

    fn sensor_latest_raw_measurement(&self, handle: SensorHandle) -> Result<i32> {
        Ok(unsafe { sys::GoIO_Sensor_GetLatestRawMeasurement(raw(handle)) })
    }

    fn sensor_convert_to_voltage(&self, handle: SensorHandle, raw_value: i32) -> Result<f64> {
        Ok(unsafe { sys::GoIO_Sensor_ConvertToVoltage(raw(handle), raw_value) })
    }

    fn sensor_calibrate_data(&self, handle: SensorHandle, volts: f64) -> Result<f64> {
        Ok(unsafe { sys::GoIO_Sensor_CalibrateData(raw(handle), volts) })
    }

    fn sensor_probe_type(&self, handle: SensorHandle) -> Result<i32> {
        Ok(unsafe { sys::GoIO_Sensor_GetProbeType(raw(handle)) })
    }

    fn sensor_set_measurement_period(
        &self,
        handle: SensorHandle,
        seconds: f64,
        timeout_ms: i32,
    ) -> Result<i32> {
        Ok(unsafe { sys::GoIO_Sensor_SetMeasurementPeriod(raw(handle), seconds, timeout_ms) })
    }

    fn sensor_measurement_period(&self, handle: SensorHandle, timeout_ms: i32) -> Result<f64> {
        Ok(unsafe { sys::GoIO_Sensor_GetMeasurementPeriod(raw(handle), timeout_ms) })
    }
}
