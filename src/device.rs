use crate::backend::Backend;
use crate::protocol::{
    DefaultResponse, LedParam, WireRecord, DEFAULT_CMD_TIMEOUT_MS, STRICT_DDS_VALIDATION,
};
use crate::types::{
    DllVersion, LedBrightness, LedColor, ProbeType, ProductId, SensorCommand, SensorErrorStatus,
    SensorHandle, SensorInfo, SensorStatus, VendorId,
};
use crate::{GoIoError, Result};
use std::sync::Arc;

/// Owns the backend and keeps GoIO_DLL initialised while any session or
/// sensor still refers to it.
struct Library {
    backend: Box<dyn Backend>,
    cmd_timeout_ms: i32,
    closed: std::sync::atomic::AtomicBool,
}

impl Library {
    fn uninit(&self) -> Result<()> {
        use std::sync::atomic::Ordering;
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let res = self.backend.uninit()?;
        if res != 0 {
            return Err(GoIoError::vendor("GoIO_Uninit", res));
        }
        log::info!("GoIO library closed ({} backend)", self.backend.name());
        Ok(())
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        if let Err(e) = self.uninit() {
            log::warn!("Failed to close GoIO library: {}", e);
        }
    }
}

/// An initialised GoIO_DLL session.
///
/// Sensors opened from the session keep it alive; the library is
/// uninitialised once the session and all of its sensors are gone.
pub struct GoIo {
    lib: Arc<Library>,
}

impl GoIo {
    /// Initialise the library through `backend`.
    pub fn open(backend: Box<dyn Backend>) -> Result<GoIo> {
        Self::open_with_timeout(backend, DEFAULT_CMD_TIMEOUT_MS)
    }

    /// Initialise the library, using `cmd_timeout_ms` for sensor command
    /// exchanges.
    pub fn open_with_timeout(backend: Box<dyn Backend>, cmd_timeout_ms: i32) -> Result<GoIo> {
        let res = backend.init()?;
        if res != 0 {
            return Err(GoIoError::vendor("GoIO_Init", res));
        }
        log::info!("GoIO library opened ({} backend)", backend.name());

        Ok(GoIo {
            lib: Arc::new(Library {
                backend,
                cmd_timeout_ms,
                closed: std::sync::atomic::AtomicBool::new(false),
            }),
        })
    }

    /// Uninitialise the library now and report the vendor status.
    ///
    /// Sensors still open from this session are left dangling; close them
    /// first.
    pub fn close(self) -> Result<()> {
        self.lib.uninit()
    }

    fn backend(&self) -> &dyn Backend {
        self.lib.backend.as_ref()
    }

    /// Version of the loaded GoIO_DLL.
    pub fn version(&self) -> Result<DllVersion> {
        let reply = self.backend().dll_version()?;
        if reply.status != 0 {
            return Err(GoIoError::vendor("GoIO_GetDLLVersion", reply.status));
        }
        Ok(DllVersion {
            major: reply.major,
            minor: reply.minor,
        })
    }

    /// Rescan the bus and return the number of connected devices of `product`.
    pub fn connected_products(&self, product: ProductId) -> Result<usize> {
        let count = self
            .backend()
            .update_list_of_available_devices(VendorId::Vernier, product)?;
        usize::try_from(count)
            .map_err(|_| GoIoError::vendor("GoIO_UpdateListOfAvailableDevices", count))
    }

    /// Name of the `index`-th connected device of `product`.
    pub fn device_by_index(&self, product: ProductId, index: usize) -> Result<String> {
        let connected = self.connected_products(product)?;
        if index >= connected {
            return Err(GoIoError::DeviceNotFound {
                device: format!("#{}", index),
                product,
            });
        }
        self.nth_device_name(product, index)
    }

    /// Names of every connected device of `product`.
    pub fn devices(&self, product: ProductId) -> Result<Vec<String>> {
        let connected = self.connected_products(product)?;
        (0..connected)
            .map(|index| self.nth_device_name(product, index))
            .collect()
    }

    fn nth_device_name(&self, product: ProductId, index: usize) -> Result<String> {
        let reply =
            self.backend()
                .nth_available_device_name(VendorId::Vernier, product, index as i32)?;
        if reply.status != 0 {
            return Err(GoIoError::vendor(
                "GoIO_GetNthAvailableDeviceName",
                reply.status,
            ));
        }
        Ok(reply.name)
    }

    /// A sensor bound to this session, not yet open.
    pub fn sensor(&self) -> Sensor {
        Sensor {
            lib: Arc::clone(&self.lib),
            info: None,
        }
    }

    /// Open `device_id` as a `product` sensor.
    pub fn open_sensor(&self, device_id: &str, product: ProductId) -> Result<Sensor> {
        let mut sensor = self.sensor();
        sensor.open(device_id, product)?;
        Ok(sensor)
    }
}

/// A GoIO sensor session.
///
/// Every operation other than `open` and `close` requires an open handle and
/// fails with [`GoIoError::SensorNotOpen`] otherwise.
pub struct Sensor {
    lib: Arc<Library>,
    info: Option<SensorInfo>,
}

impl Sensor {
    fn backend(&self) -> &dyn Backend {
        self.lib.backend.as_ref()
    }

    fn handle(&self) -> Result<SensorHandle> {
        self.info
            .as_ref()
            .map(|info| info.handle)
            .ok_or(GoIoError::SensorNotOpen)
    }

    /// Open `device_id`, which must currently be enumerated for `product`.
    ///
    /// A sensor that is already open is closed first.
    pub fn open(&mut self, device_id: &str, product: ProductId) -> Result<&SensorInfo> {
        self.close()?;

        let backend = self.backend();
        let count = backend.update_list_of_available_devices(VendorId::Vernier, product)?;
        let mut found = false;
        for index in 0..count.max(0) {
            let reply = backend.nth_available_device_name(VendorId::Vernier, product, index)?;
            if reply.status == 0 && reply.name == device_id {
                found = true;
                break;
            }
        }
        if !found {
            return Err(GoIoError::DeviceNotFound {
                device: device_id.to_string(),
                product,
            });
        }

        let handle = backend
            .sensor_open(device_id, VendorId::Vernier, product, STRICT_DDS_VALIDATION)?
            .ok_or_else(|| GoIoError::vendor("GoIO_Sensor_Open", -1))?;

        let info = SensorInfo {
            handle,
            name: device_id.to_string(),
            vendor: VendorId::Vernier,
            product,
        };
        log::info!("Opened sensor: {}", info);
        Ok(self.info.insert(info))
    }

    /// Close the sensor. Does nothing if it is not open.
    pub fn close(&mut self) -> Result<()> {
        let Some(info) = self.info.take() else {
            return Ok(());
        };
        let res = self.backend().sensor_close(info.handle)?;
        if res != 0 {
            return Err(GoIoError::vendor("GoIO_Sensor_Close", res));
        }
        log::info!("Closed sensor {}", info.name);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.info.is_some()
    }

    /// Identification captured when the sensor was opened.
    pub fn info(&self) -> Option<&SensorInfo> {
        self.info.as_ref()
    }

    /// Flush the sensor's input and output buffers.
    pub fn clear(&self) -> Result<()> {
        let res = self.backend().sensor_clear_io(self.handle()?)?;
        if res != 0 {
            return Err(GoIoError::vendor("GoIO_Sensor_ClearIO", res));
        }
        Ok(())
    }

    /// Read name, vendor and product of the open device back from the DLL.
    pub fn query_info(&self) -> Result<SensorInfo> {
        let handle = self.handle()?;
        let reply = self.backend().sensor_open_device_name(handle)?;
        if reply.status != 0 {
            return Err(GoIoError::vendor(
                "GoIO_Sensor_GetOpenDeviceName",
                reply.status,
            ));
        }
        Ok(SensorInfo {
            handle,
            name: reply.name,
            vendor: VendorId::try_from(reply.vendor)?,
            product: ProductId::try_from(reply.product)?,
        })
    }

    /// Send `command` and wait for its response.
    ///
    /// The parameter and response records are exchanged with exactly their
    /// wire size. A non-zero vendor status is reported as
    /// [`GoIoError::VendorCall`] naming the command.
    pub fn send_command<P, R>(
        &self,
        command: SensorCommand,
        parameter: Option<&P>,
        response: Option<&mut R>,
    ) -> Result<()>
    where
        P: WireRecord,
        R: WireRecord,
    {
        let handle = self.handle()?;
        let params = parameter.map(|p| p.encode()).unwrap_or_default();
        let capacity = if response.is_some() { R::SIZE } else { 0 };

        log::trace!(
            "send {} params={:02x?} response_len={}",
            command,
            params,
            capacity
        );
        let reply = self.backend().sensor_send_cmd_and_get_response(
            handle,
            command.code(),
            &params,
            capacity,
            self.lib.cmd_timeout_ms,
        )?;
        if reply.status != 0 {
            return Err(GoIoError::vendor(
                format!("Command {}", command.name()),
                reply.status,
            ));
        }

        if let Some(response) = response {
            *response = R::decode(&reply.response).ok_or(GoIoError::ResponseLength {
                command: command.name(),
                expected: R::SIZE,
                actual: reply.response.len(),
            })?;
        }
        Ok(())
    }

    /// Send a command that carries neither parameter nor response.
    pub fn send_simple_command(&self, command: SensorCommand) -> Result<()> {
        self.send_command::<DefaultResponse, DefaultResponse>(command, None, None)
    }

    /// Firmware status (`GET_STATUS`).
    pub fn status(&self) -> Result<SensorStatus> {
        let mut response = DefaultResponse::default();
        self.send_command::<DefaultResponse, _>(SensorCommand::GetStatus, None, Some(&mut response))?;
        response.status()
    }

    /// Last command and last failing command as recorded by the DLL.
    pub fn response_status(&self) -> Result<SensorErrorStatus> {
        let reply = self
            .backend()
            .sensor_last_cmd_response_status(self.handle()?)?;
        if reply.status != 0 {
            return Err(GoIoError::vendor(
                "GoIO_Sensor_GetLastCmdResponseStatus",
                reply.status,
            ));
        }
        Ok(SensorErrorStatus {
            last_command: SensorCommand::try_from(reply.last_cmd)?,
            last_status: SensorStatus::try_from(reply.last_cmd_status)?,
            last_command_with_error: SensorCommand::try_from(reply.last_cmd_with_error)?,
            last_error: SensorStatus::try_from(reply.last_error)?,
        })
    }

    /// Current LED color and brightness.
    pub fn led_state(&self) -> Result<LedParam> {
        let mut led = LedParam::default();
        self.send_command::<LedParam, _>(SensorCommand::GetLedState, None, Some(&mut led))?;
        Ok(led)
    }

    /// Set the LED color and brightness. Returns the parameter sent.
    pub fn set_led(&self, color: LedColor, brightness: LedBrightness) -> Result<LedParam> {
        let led = LedParam::new(color, brightness);
        let mut response = DefaultResponse::default();
        self.send_command(SensorCommand::SetLedState, Some(&led), Some(&mut response))?;
        match response.status()? {
            SensorStatus::Success => Ok(led),
            status => Err(GoIoError::vendor(
                format!("Command {}", SensorCommand::SetLedState.name()),
                status.code() as i32,
            )),
        }
    }

    /// Start measurement collection into the DLL-side queue.
    pub fn start(&self) -> Result<()> {
        self.send_simple_command(SensorCommand::StartMeasurements)
    }

    /// Stop measurement collection.
    pub fn stop(&self) -> Result<()> {
        self.send_simple_command(SensorCommand::StopMeasurements)
    }

    /// Measurement period in seconds.
    pub fn measurement_period(&self) -> Result<f64> {
        let period = self
            .backend()
            .sensor_measurement_period(self.handle()?, self.lib.cmd_timeout_ms)?;
        if period <= 0.0 {
            return Err(GoIoError::vendor("GoIO_Sensor_GetMeasurementPeriod", -1));
        }
        Ok(period)
    }

    /// Set the measurement period. The device rejects this while collecting.
    pub fn set_measurement_period(&self, seconds: f64) -> Result<()> {
        let res = self.backend().sensor_set_measurement_period(
            self.handle()?,
            seconds,
            self.lib.cmd_timeout_ms,
        )?;
        if res != 0 {
            return Err(GoIoError::vendor("GoIO_Sensor_SetMeasurementPeriod", res));
        }
        Ok(())
    }

    /// Number of measurements waiting in the DLL-side queue.
    pub fn available_measurements(&self) -> Result<usize> {
        let count = self
            .backend()
            .sensor_num_measurements_available(self.handle()?)?;
        usize::try_from(count)
            .map_err(|_| GoIoError::vendor("GoIO_Sensor_GetNumMeasurementsAvailable", count))
    }

    /// Drain every queued raw measurement.
    pub fn read_raw(&self) -> Result<Vec<i32>> {
        let available = self.available_measurements()?;
        if available == 0 {
            return Ok(Vec::new());
        }
        let (count, values) = self
            .backend()
            .sensor_read_raw_measurements(self.handle()?, available as u32)?;
        if count < 0 {
            return Err(GoIoError::vendor("GoIO_Sensor_ReadRawMeasurements", count));
        }
        Ok(values)
    }

    /// Latest raw measurement; the queue is cleared.
    pub fn read_raw_latest(&self) -> Result<i32> {
        self.backend().sensor_latest_raw_measurement(self.handle()?)
    }

    /// Convert a raw ADC value to volts.
    pub fn raw_to_voltage(&self, raw: i32) -> Result<f64> {
        self.backend().sensor_convert_to_voltage(self.handle()?, raw)
    }

    /// Apply the sensor calibration to a voltage. Units depend on the sensor.
    pub fn volt_to_calibrated(&self, volts: f64) -> Result<f64> {
        self.backend().sensor_calibrate_data(self.handle()?, volts)
    }

    pub fn raw_to_calibrated(&self, raw: i32) -> Result<f64> {
        let volts = self.raw_to_voltage(raw)?;
        self.volt_to_calibrated(volts)
    }

    pub fn probe_type(&self) -> Result<ProbeType> {
        let probe = self.backend().sensor_probe_type(self.handle()?)?;
        ProbeType::try_from(probe)
    }
}

impl Drop for Sensor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to close sensor on drop: {}", e);
        }
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockLibrary, MOCK_FAILURE};

    const GOLINK: &str = "mock-golink-0";

    fn goio() -> GoIo {
        GoIo::open(Box::new(MockLibrary::single_golink())).unwrap()
    }

    #[test]
    fn test_enumeration() {
        let goio = GoIo::open(Box::new(MockLibrary::new(vec![
            MockDevice::new("a", ProductId::GoLink),
            MockDevice::new("b", ProductId::GoTemp),
            MockDevice::new("c", ProductId::GoLink),
        ])))
        .unwrap();

        assert_eq!(goio.version().unwrap(), DllVersion { major: 2, minor: 53 });
        assert_eq!(goio.connected_products(ProductId::GoLink).unwrap(), 2);
        assert_eq!(goio.devices(ProductId::GoLink).unwrap(), vec!["a", "c"]);
        assert_eq!(goio.device_by_index(ProductId::GoTemp, 0).unwrap(), "b");
        assert!(matches!(
            goio.device_by_index(ProductId::GoTemp, 1),
            Err(GoIoError::DeviceNotFound { .. })
        ));
        assert!(goio.devices(ProductId::GoMotion).unwrap().is_empty());
    }

    #[test]
    fn test_init_failure_is_vendor_error() {
        let lib = MockLibrary::single_golink();
        lib.fail_next_call(-3);
        match GoIo::open(Box::new(lib)) {
            Err(GoIoError::VendorCall { call, code }) => {
                assert_eq!(call, "GoIO_Init");
                assert_eq!(code, -3);
            }
            _ => panic!("expected GoIO_Init failure"),
        }
    }

    #[test]
    fn test_open_unavailable_device_fails() {
        let goio = goio();
        let mut sensor = goio.sensor();
        assert!(matches!(
            sensor.open("no-such-device", ProductId::GoLink),
            Err(GoIoError::DeviceNotFound { .. })
        ));
        // Right name, wrong product.
        assert!(matches!(
            sensor.open(GOLINK, ProductId::GoTemp),
            Err(GoIoError::DeviceNotFound { .. })
        ));
        assert!(!sensor.is_open());
        sensor.close().unwrap();
    }

    #[test]
    fn test_double_close_is_noop() {
        let goio = goio();
        let mut sensor = goio.open_sensor(GOLINK, ProductId::GoLink).unwrap();
        assert!(sensor.is_open());
        sensor.close().unwrap();
        sensor.close().unwrap();
        assert!(sensor.info().is_none());
    }

    #[test]
    fn test_calls_before_open_fail() {
        let goio = goio();
        let sensor = goio.sensor();
        assert!(matches!(sensor.status(), Err(GoIoError::SensorNotOpen)));
        assert!(matches!(sensor.start(), Err(GoIoError::SensorNotOpen)));
        assert!(matches!(sensor.read_raw(), Err(GoIoError::SensorNotOpen)));
        assert!(matches!(sensor.read_raw_latest(), Err(GoIoError::SensorNotOpen)));
        assert!(matches!(sensor.clear(), Err(GoIoError::SensorNotOpen)));
    }

    #[test]
    fn test_calls_after_close_fail() {
        let goio = goio();
        let mut sensor = goio.open_sensor(GOLINK, ProductId::GoLink).unwrap();
        sensor.close().unwrap();
        assert!(matches!(sensor.probe_type(), Err(GoIoError::SensorNotOpen)));
    }

    #[test]
    fn test_sensor_info() {
        let goio = goio();
        let sensor = goio.open_sensor(GOLINK, ProductId::GoLink).unwrap();
        let queried = sensor.query_info().unwrap();
        assert_eq!(Some(&queried), sensor.info());
        assert_eq!(queried.vendor, VendorId::Vernier);
        assert_eq!(sensor.probe_type().unwrap(), ProbeType::Analog5V);
    }

    #[test]
    fn test_status_and_led() {
        let goio = goio();
        let sensor = goio.open_sensor(GOLINK, ProductId::GoLink).unwrap();
        assert_eq!(sensor.status().unwrap(), SensorStatus::Success);

        sensor.set_led(LedColor::Red, LedBrightness::Max).unwrap();
        let led = sensor.led_state().unwrap();
        assert_eq!(led.color().unwrap(), LedColor::Red);
        assert_eq!(led.brightness().unwrap(), LedBrightness::Max);

        let last = sensor.response_status().unwrap();
        assert_eq!(last.last_command, SensorCommand::GetLedState);
        assert_eq!(last.last_status, SensorStatus::Success);
    }

    #[test]
    fn test_command_failure_carries_command_name() {
        let lib = MockLibrary::single_golink();
        let goio = GoIo::open(Box::new(lib)).unwrap();
        let sensor = goio.open_sensor(GOLINK, ProductId::GoLink).unwrap();

        let err = sensor
            .send_simple_command(SensorCommand::GetSerialNumber)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Command GET_SERIAL_NUMBER returned with error {}", MOCK_FAILURE)
        );

        let last = sensor.response_status().unwrap();
        assert_eq!(last.last_command_with_error, SensorCommand::GetSerialNumber);
        assert_eq!(last.last_error, SensorStatus::CmdNotSupported);
    }

    #[test]
    fn test_response_size_mismatch() {
        let goio = goio();
        let sensor = goio.open_sensor(GOLINK, ProductId::GoLink).unwrap();
        // GET_STATUS answers with one byte; asking for an LED record must fail.
        let mut led = LedParam::default();
        let err = sensor
            .send_command::<LedParam, _>(SensorCommand::GetStatus, None, Some(&mut led))
            .unwrap_err();
        assert!(matches!(
            err,
            GoIoError::ResponseLength {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_measurements() {
        let lib = MockLibrary::single_golink()
            .with_samples_per_poll(2)
            .with_calibration(10.0, 1.0);
        let goio = GoIo::open(Box::new(lib)).unwrap();
        let sensor = goio.open_sensor(GOLINK, ProductId::GoLink).unwrap();

        assert!(sensor.read_raw().unwrap().is_empty());
        sensor.set_measurement_period(0.05).unwrap();
        assert_eq!(sensor.measurement_period().unwrap(), 0.05);

        sensor.start().unwrap();
        assert!(matches!(
            sensor.set_measurement_period(0.1),
            Err(GoIoError::VendorCall { .. })
        ));
        assert_eq!(sensor.read_raw().unwrap(), vec![2048, 2049]);
        assert_eq!(sensor.read_raw_latest().unwrap(), 2051);
        assert_eq!(sensor.available_measurements().unwrap(), 2);

        assert_eq!(sensor.raw_to_voltage(4096).unwrap(), 5.0);
        assert_eq!(sensor.raw_to_calibrated(2048).unwrap(), 26.0);

        sensor.stop().unwrap();
        sensor.clear().unwrap();
        assert_eq!(sensor.available_measurements().unwrap(), 0);
    }

    #[test]
    fn test_library_outlives_session_while_sensor_open() {
        let goio = goio();
        let sensor = goio.open_sensor(GOLINK, ProductId::GoLink).unwrap();
        drop(goio);
        assert_eq!(sensor.status().unwrap(), SensorStatus::Success);
    }
}
