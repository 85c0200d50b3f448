//! Raw declarations of the GoIO_DLL entry points.

#![allow(non_snake_case)]

use std::ffi::{c_char, c_int, c_uchar, c_uint, c_ushort, c_void};

/// `GOIO_SENSOR_HANDLE`: opaque pointer owned by the DLL.
pub type GoIoSensorHandle = *mut c_void;

#[cfg_attr(windows, link(name = "GoIO_DLL"))]
#[cfg_attr(not(windows), link(name = "GoIO"))]
extern "C" {
    pub fn GoIO_Init() -> c_int;

    pub fn GoIO_Uninit() -> c_int;

    pub fn GoIO_GetDLLVersion(pMajorVersion: *mut c_ushort, pMinorVersion: *mut c_ushort)
        -> c_int;

    pub fn GoIO_UpdateListOfAvailableDevices(vendorId: c_int, productId: c_int) -> c_int;

    pub fn GoIO_GetNthAvailableDeviceName(
        pBuf: *mut c_char,
        bufSize: c_uint,
        vendorId: c_int,
        productId: c_int,
        N: c_int,
    ) -> c_int;

    pub fn GoIO_Sensor_Open(
        pDeviceName: *const c_char,
        vendorId: c_int,
        productId: c_int,
        strictDDSValidationFlag: c_int,
    ) -> GoIoSensorHandle;

    pub fn GoIO_Sensor_Close(hSensor: GoIoSensorHandle) -> c_int;

    pub fn GoIO_Sensor_ClearIO(hSensor: GoIoSensorHandle) -> c_int;

    pub fn GoIO_Sensor_GetOpenDeviceName(
        hSensor: GoIoSensorHandle,
        pBuf: *mut c_char,
        bufSize: c_uint,
        pVendorId: *mut c_int,
        pProductId: *mut c_int,
    ) -> c_int;

    pub fn GoIO_Sensor_SendCmdAndGetResponse(
        hSensor: GoIoSensorHandle,
        cmd: c_uchar,
        pParams: *const c_void,
        nParamBytes: c_uint,
        pRespBuf: *mut c_void,
        pnRespBytes: *mut c_uint,
        timeoutMs: c_int,
    ) -> c_int;

    pub fn GoIO_Sensor_GetLastCmdResponseStatus(
        hSensor: GoIoSensorHandle,
        pLastCmd: *mut c_uchar,
        pLastCmdStatus: *mut c_uchar,
        pLastCmdWithErrorRespSentOvertheWire: *mut c_uchar,
        pLastErrorSentOvertheWire: *mut c_uchar,
    ) -> c_int;

    pub fn GoIO_Sensor_GetNumMeasurementsAvailable(hSensor: GoIoSensorHandle) -> c_int;

    pub fn GoIO_Sensor_ReadRawMeasurements(
        hSensor: GoIoSensorHandle,
        pMeasurementsBuf: *mut c_int,
        maxCount: c_uint,
    ) -> c_int;

    pub fn GoIO_Sensor_GetLatestRawMeasurement(hSensor: GoIoSensorHandle) -> c_int;

    pub fn GoIO_Sensor_ConvertToVoltage(hSensor: GoIoSensorHandle, rawMeasurement: c_int) -> f64;

    pub fn GoIO_Sensor_CalibrateData(hSensor: GoIoSensorHandle, volts: f64) -> f64;

    pub fn GoIO_Sensor_GetProbeType(hSensor: GoIoSensorHandle) -> c_int;

    pub fn GoIO_Sensor_SetMeasurementPeriod(
        hSensor: GoIoSensorHandle,
        desiredPeriod: f64,
        timeoutMs: c_int,
    ) -> c_int;

    pub fn GoIO_Sensor_GetMeasurementPeriod(hSensor: GoIoSensorHandle, timeoutMs: c_int) -> f64;
}
