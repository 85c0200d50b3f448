//! Simulated GoIO_DLL for tests and runs without hardware.
//!
//! Devices are declared up front. An open sensor that is collecting grows
//! its measurement queue by a fixed number of ramp samples every time it is
//! polled, so reads are deterministic.

use crate::backend::{
    Backend, CommandReply, DeviceNameReply, LastCmdReply, OpenDeviceReply, VersionReply,
};
use crate::protocol::{LedParam, WireRecord};
use crate::types::{
    LedBrightness, LedColor, ProbeType, ProductId, SensorCommand, SensorHandle, SensorStatus,
    VendorId,
};
use crate::{GoIoError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Status returned by the simulated DLL for any failed call.
pub const MOCK_FAILURE: i32 = -1;

const ADC_COUNTS: i32 = 4096;
const FIRST_HANDLE: u64 = 0x1000;

/// A simulated device visible on the bus.
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub name: String,
    pub product: ProductId,
    pub probe: ProbeType,
}

impl MockDevice {
    pub fn new(name: impl Into<String>, product: ProductId) -> Self {
        Self {
            name: name.into(),
            product,
            probe: ProbeType::Analog5V,
        }
    }
}

struct OpenSensor {
    device: usize,
    collecting: bool,
    queue: VecDeque<i32>,
    next_raw: i32,
    led: LedParam,
    period_s: f64,
    last_cmd: u8,
    last_cmd_status: u8,
    last_cmd_with_error: u8,
    last_error: u8,
}

impl OpenSensor {
    fn new(device: usize) -> Self {
        Self {
            device,
            collecting: false,
            queue: VecDeque::new(),
            next_raw: ADC_COUNTS / 2,
            led: LedParam::new(LedColor::Black, LedBrightness::Min),
            period_s: 0.01,
            last_cmd: 0,
            last_cmd_status: 0,
            last_cmd_with_error: 0,
            last_error: 0,
        }
    }

    fn poll(&mut self, samples: usize) {
        if !self.collecting {
            return;
        }
        for _ in 0..samples {
            self.queue.push_back(self.next_raw);
            self.next_raw = (self.next_raw + 1) % ADC_COUNTS;
        }
    }

    fn record(&mut self, command: u8, status: SensorStatus) {
        self.last_cmd = command;
        self.last_cmd_status = status.code();
        if status != SensorStatus::Success {
            self.last_cmd_with_error = command;
            self.last_error = status.code();
        }
    }
}

struct MockState {
    initialized: bool,
    sensors: HashMap<u64, OpenSensor>,
    next_handle: u64,
    fail_next: Option<i32>,
    fail_next_command: Option<i32>,
}

/// In-memory stand-in for GoIO_DLL.
///
/// Clones share one simulated library, so a test can keep a clone to inject
/// failures after handing the other to a session.
#[derive(Clone)]
pub struct MockLibrary {
    devices: Vec<MockDevice>,
    samples_per_poll: usize,
    gain: f64,
    offset: f64,
    state: Arc<Mutex<MockState>>,
}

impl MockLibrary {
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self {
            devices,
            samples_per_poll: 4,
            gain: 1.0,
            offset: 0.0,
            state: Arc::new(Mutex::new(MockState {
                initialized: false,
                sensors: HashMap::new(),
                next_handle: FIRST_HANDLE,
                fail_next: None,
                fail_next_command: None,
            })),
        }
    }

    /// A single Go!Link, the setup most demos expect.
    pub fn single_golink() -> Self {
        Self::new(vec![MockDevice::new("mock-golink-0", ProductId::GoLink)])
    }

    /// Linear calibration applied by `GoIO_Sensor_CalibrateData`.
    pub fn with_calibration(mut self, gain: f64, offset: f64) -> Self {
        self.gain = gain;
        self.offset = offset;
        self
    }

    pub fn with_samples_per_poll(mut self, samples: usize) -> Self {
        self.samples_per_poll = samples;
        self
    }

    /// Make the next call that returns a status fail with `code`.
    pub fn fail_next_call(&self, code: i32) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next = Some(code);
        }
    }

    /// Make the next sensor command fail with `code`, leaving other calls
    /// alone.
    pub fn fail_next_command(&self, code: i32) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next_command = Some(code);
        }
    }

    /// Append raw measurements to the queue of the open sensor on `device`.
    pub fn push_measurements(&self, device: &str, values: &[i32]) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        let Some(index) = self.devices.iter().position(|d| d.name == device) else {
            return false;
        };
        match state.sensors.values_mut().find(|s| s.device == index) {
            Some(sensor) => {
                sensor.queue.extend(values.iter().copied());
                true
            }
            None => false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().map(|s| s.initialized).unwrap_or(false)
    }

    pub fn open_sensor_count(&self) -> usize {
        self.state.lock().map(|s| s.sensors.len()).unwrap_or(0)
    }

    fn state(&self) -> Result<MutexGuard<'_, MockState>> {
        self.state
            .lock()
            .map_err(|_| GoIoError::BackendUnavailable("mock state poisoned".into()))
    }

    fn matching(&self, vendor: VendorId, product: ProductId) -> Vec<&MockDevice> {
        if vendor != VendorId::Vernier {
            return Vec::new();
        }
        self.devices.iter().filter(|d| d.product == product).collect()
    }

    /// Run `f` against an open sensor, failing like the DLL when the library
    /// is not initialised or the handle is unknown.
    fn with_sensor<T>(
        &self,
        handle: SensorHandle,
        failed: T,
        f: impl FnOnce(&mut OpenSensor, &MockLibrary) -> T,
    ) -> Result<T> {
        let mut state = self.state()?;
        if !state.initialized {
            return Ok(failed);
        }
        match state.sensors.get_mut(&handle.0) {
            Some(sensor) => Ok(f(sensor, self)),
            None => Ok(failed),
        }
    }

    fn take_failure(&self) -> Result<Option<i32>> {
        Ok(self.state()?.fail_next.take())
    }
}

impl Backend for MockLibrary {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn init(&self) -> Result<i32> {
        let mut state = self.state()?;
        if let Some(code) = state.fail_next.take() {
            return Ok(code);
        }
        state.initialized = true;
        Ok(0)
    }

    fn uninit(&self) -> Result<i32> {
        let mut state = self.state()?;
        if let Some(code) = state.fail_next.take() {
            return Ok(code);
        }
        if !state.initialized {
            return Ok(MOCK_FAILURE);
        }
        state.initialized = false;
        state.sensors.clear();
        Ok(0)
    }

    fn dll_version(&self) -> Result<VersionReply> {
        Ok(VersionReply {
            status: 0,
            major: 2,
            minor: 53,
        })
    }

    fn update_list_of_available_devices(
        &self,
        vendor: VendorId,
        product: ProductId,
    ) -> Result<i32> {
        if !self.state()?.initialized {
            return Ok(MOCK_FAILURE);
        }
        Ok(self.matching(vendor, product).len() as i32)
    }

    fn nth_available_device_name(
        &self,
        vendor: VendorId,
        product: ProductId,
        n: i32,
    ) -> Result<DeviceNameReply> {
        let initialized = self.state()?.initialized;
        let device = usize::try_from(n)
            .ok()
            .and_then(|n| self.matching(vendor, product).get(n).copied());
        Ok(match device {
            Some(device) if initialized => DeviceNameReply {
                status: 0,
                name: device.name.clone(),
            },
            _ => DeviceNameReply {
                status: MOCK_FAILURE,
                name: String::new(),
            },
        })
    }

    fn sensor_open(
        &self,
        device: &str,
        vendor: VendorId,
        product: ProductId,
        _strict_dds_validation: i32,
    ) -> Result<Option<SensorHandle>> {
        let mut state = self.state()?;
        if !state.initialized || state.fail_next.take().is_some() {
            return Ok(None);
        }
        let index = self.devices.iter().position(|d| {
            d.name == device && d.product == product && vendor == VendorId::Vernier
        });
        let Some(index) = index else {
            return Ok(None);
        };
        if state.sensors.values().any(|s| s.device == index) {
            return Ok(None);
        }

        let handle = state.next_handle;
        state.next_handle += 1;
        state.sensors.insert(handle, OpenSensor::new(index));
        log::debug!("mock: opened {} as handle 0x{:x}", device, handle);
        Ok(Some(SensorHandle(handle)))
    }

    fn sensor_close(&self, handle: SensorHandle) -> Result<i32> {
        let mut state = self.state()?;
        if !state.initialized {
            return Ok(MOCK_FAILURE);
        }
        Ok(match state.sensors.remove(&handle.0) {
            Some(_) => 0,
            None => MOCK_FAILURE,
        })
    }

    fn sensor_clear_io(&self, handle: SensorHandle) -> Result<i32> {
        if let Some(code) = self.take_failure()? {
            return Ok(code);
        }
        self.with_sensor(handle, MOCK_FAILURE, |sensor, _| {
            sensor.queue.clear();
            0
        })
    }

    fn sensor_open_device_name(&self, handle: SensorHandle) -> Result<OpenDeviceReply> {
        let failed = OpenDeviceReply {
            status: MOCK_FAILURE,
            name: String::new(),
            vendor: 0,
            product: 0,
        };
        self.with_sensor(handle, failed, |sensor, lib| {
            let device = &lib.devices[sensor.device];
            OpenDeviceReply {
                status: 0,
                name: device.name.clone(),
                vendor: VendorId::Vernier.code(),
                product: device.product.code(),
            }
        })
    }

    fn sensor_send_cmd_and_get_response(
        &self,
        handle: SensorHandle,
        command: u8,
        params: &[u8],
        response_capacity: usize,
        _timeout_ms: i32,
    ) -> Result<CommandReply> {
        let injected = {
            let mut state = self.state()?;
            state.fail_next.take().or_else(|| state.fail_next_command.take())
        };
        let failed = CommandReply {
            status: MOCK_FAILURE,
            response: Vec::new(),
        };
        self.with_sensor(handle, failed, |sensor, _| {
            if let Some(code) = injected {
                sensor.record(command, SensorStatus::Communication);
                return CommandReply {
                    status: code,
                    response: Vec::new(),
                };
            }

            let outcome = match SensorCommand::try_from(command) {
                Ok(SensorCommand::GetStatus) => Ok(vec![SensorStatus::Success.code()]),
                Ok(SensorCommand::StartMeasurements) => {
                    sensor.collecting = true;
                    Ok(vec![SensorStatus::Success.code()])
                }
                Ok(SensorCommand::StopMeasurements) => {
                    sensor.collecting = false;
                    Ok(vec![SensorStatus::Success.code()])
                }
                Ok(SensorCommand::Init) => {
                    sensor.collecting = false;
                    sensor.queue.clear();
                    Ok(vec![SensorStatus::Success.code()])
                }
                Ok(SensorCommand::SetLedState) => match LedParam::decode(params) {
                    Some(led) => {
                        sensor.led = led;
                        Ok(vec![SensorStatus::Success.code()])
                    }
                    None => Err(SensorStatus::InvalidParameter),
                },
                Ok(SensorCommand::GetLedState) => Ok(sensor.led.encode()),
                _ => Err(SensorStatus::CmdNotSupported),
            };

            match outcome {
                Ok(mut response) => {
                    sensor.record(command, SensorStatus::Success);
                    response.truncate(response_capacity);
                    CommandReply {
                        status: 0,
                        response,
                    }
                }
                Err(status) => {
                    sensor.record(command, status);
                    CommandReply {
                        status: MOCK_FAILURE,
                        response: Vec::new(),
                    }
                }
            }
        })
    }

    fn sensor_last_cmd_response_status(&self, handle: SensorHandle) -> Result<LastCmdReply> {
        let failed = LastCmdReply {
            status: MOCK_FAILURE,
            last_cmd: 0,
            last_cmd_status: 0,
            last_cmd_with_error: 0,
            last_error: 0,
        };
        self.with_sensor(handle, failed, |sensor, _| LastCmdReply {
            status: 0,
            last_cmd: sensor.last_cmd,
            last_cmd_status: sensor.last_cmd_status,
            last_cmd_with_error: sensor.last_cmd_with_error,
            last_error: sensor.last_error,
        })
    }

    fn sensor_num_measurements_available(&self, handle: SensorHandle) -> Result<i32> {
        self.with_sensor(handle, MOCK_FAILURE, |sensor, lib| {
            sensor.poll(lib.samples_per_poll);
            sensor.queue.len() as i32
        })
    }

    fn sensor_read_raw_measurements(
        &self,
        handle: SensorHandle,
        max_count: u32,
    ) -> Result<(i32, Vec<i32>)> {
        self.with_sensor(handle, (MOCK_FAILURE, Vec::new()), |sensor, _| {
            let count = (max_count as usize).min(sensor.queue.len());
            let values: Vec<i32> = sensor.queue.drain(..count).collect();
            (values.len() as i32, values)
        })
    }

    fn sensor_latest_raw_measurement(&self, handle: SensorHandle) -> Result<i32> {
        self.with_sensor(handle, 0, |sensor, lib| {
            sensor.poll(lib.samples_per_poll);
            let latest = sensor.queue.back().copied().unwrap_or(0);
            sensor.queue.clear();
            latest
        })
    }

    fn sensor_convert_to_voltage(&self, handle: SensorHandle, raw: i32) -> Result<f64> {
        self.with_sensor(handle, 0.0, |_, _| {
            raw as f64 * 5.0 / ADC_COUNTS as f64
        })
    }

    fn sensor_calibrate_data(&self, handle: SensorHandle, volts: f64) -> Result<f64> {
        self.with_sensor(handle, 0.0, |_, lib| volts * lib.gain + lib.offset)
    }

    fn sensor_probe_type(&self, handle: SensorHandle) -> Result<i32> {
        self.with_sensor(handle, ProbeType::NoProbe.code(), |sensor, lib| {
            lib.devices[sensor.device].probe.code()
        })
    }

    fn sensor_set_measurement_period(
        &self,
        handle: SensorHandle,
        seconds: f64,
        _timeout_ms: i32,
    ) -> Result<i32> {
        self.with_sensor(handle, MOCK_FAILURE, |sensor, _| {
            let command = SensorCommand::SetMeasurementPeriod.code();
            if sensor.collecting {
                sensor.record(command, SensorStatus::CannotChangePeriodWhileCollecting);
                return MOCK_FAILURE;
            }
            if !(seconds > 0.0) {
                sensor.record(command, SensorStatus::InvalidParameter);
                return MOCK_FAILURE;
            }
            sensor.record(command, SensorStatus::Success);
            sensor.period_s = seconds;
            0
        })
    }

    fn sensor_measurement_period(&self, handle: SensorHandle, _timeout_ms: i32) -> Result<f64> {
        self.with_sensor(handle, -1.0, |sensor, _| sensor.period_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(lib: &MockLibrary) -> SensorHandle {
        assert_eq!(lib.init().unwrap(), 0);
        lib.sensor_open("mock-golink-0", VendorId::Vernier, ProductId::GoLink, 1)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_calls_before_init_fail() {
        let lib = MockLibrary::single_golink();
        assert_eq!(
            lib.update_list_of_available_devices(VendorId::Vernier, ProductId::GoLink)
                .unwrap(),
            MOCK_FAILURE
        );
        assert!(lib
            .sensor_open("mock-golink-0", VendorId::Vernier, ProductId::GoLink, 1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_device_can_only_be_opened_once() {
        let lib = MockLibrary::single_golink();
        let _handle = open(&lib);
        assert!(lib
            .sensor_open("mock-golink-0", VendorId::Vernier, ProductId::GoLink, 1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_collecting_sensor_fills_queue() {
        let lib = MockLibrary::single_golink().with_samples_per_poll(3);
        let handle = open(&lib);
        assert_eq!(lib.sensor_num_measurements_available(handle).unwrap(), 0);

        let start = SensorCommand::StartMeasurements.code();
        let reply = lib
            .sensor_send_cmd_and_get_response(handle, start, &[], 0, 1000)
            .unwrap();
        assert_eq!(reply.status, 0);
        assert!(reply.response.is_empty());

        assert_eq!(lib.sensor_num_measurements_available(handle).unwrap(), 3);
        let (count, values) = lib.sensor_read_raw_measurements(handle, 16).unwrap();
        assert_eq!(count, 3);
        assert_eq!(values, vec![2048, 2049, 2050]);
    }

    #[test]
    fn test_unsupported_command_records_error() {
        let lib = MockLibrary::single_golink();
        let handle = open(&lib);
        let cmd = SensorCommand::GetSerialNumber.code();
        let reply = lib
            .sensor_send_cmd_and_get_response(handle, cmd, &[], 1, 1000)
            .unwrap();
        assert_eq!(reply.status, MOCK_FAILURE);

        let last = lib.sensor_last_cmd_response_status(handle).unwrap();
        assert_eq!(last.last_cmd_with_error, cmd);
        assert_eq!(last.last_error, SensorStatus::CmdNotSupported.code());
    }
}
