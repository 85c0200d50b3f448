//! Zero-dimensional detector plugin for data-acquisition hosts.
//!
//! The host drives the usual lifecycle: [`Viewer::ini_detector`] once,
//! [`Viewer::grab_data`] at its own cadence, [`Viewer::stop`] to pause and
//! [`Viewer::close`] at the end. The only setting is the device to read,
//! exposed as a list parameter.

use crate::device::{GoIo, Sensor};
use crate::types::ProductId;
use crate::{GoIoError, Result};
use serde::{Deserialize, Serialize};

/// Name of the device selection parameter.
pub const DEVICE_PARAMETER: &str = "device";

/// A parameter whose value is picked from `limits`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParameter {
    pub name: String,
    pub value: Option<String>,
    pub limits: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerSettings {
    pub device: String,
    pub product: ProductId,
}

/// One scalar reading handed to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data0D {
    /// Product family the reading came from, e.g. `GoLink`.
    pub name: String,
    /// Calibrated value in sensor units, averaged over `samples`.
    pub value: f64,
    /// Most recent raw ADC value used.
    pub raw: i32,
    pub samples: usize,
}

pub struct Viewer {
    goio: GoIo,
    sensor: Sensor,
    settings: Option<ViewerSettings>,
    running: bool,
}

impl Viewer {
    pub fn new(goio: GoIo) -> Self {
        let sensor = goio.sensor();
        Self {
            goio,
            sensor,
            settings: None,
            running: false,
        }
    }

    pub fn goio(&self) -> &GoIo {
        &self.goio
    }

    pub fn settings(&self) -> Option<&ViewerSettings> {
        self.settings.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Device selection for `product`. Defaults to the current device if it
    /// is still connected, otherwise to the first one found.
    pub fn device_parameter(&self, product: ProductId) -> Result<ListParameter> {
        let limits = self.goio.devices(product)?;
        let current = self
            .settings
            .as_ref()
            .filter(|s| s.product == product && limits.contains(&s.device))
            .map(|s| s.device.clone());
        Ok(ListParameter {
            name: DEVICE_PARAMETER.to_string(),
            value: current.or_else(|| limits.first().cloned()),
            limits,
        })
    }

    /// Open the selected device and start collecting. Returns a description
    /// of the opened sensor.
    pub fn ini_detector(&mut self, settings: ViewerSettings) -> Result<String> {
        self.running = false;
        self.settings = None;
        let info = self.sensor.open(&settings.device, settings.product)?.to_string();
        self.settings = Some(settings);
        self.sensor.start()?;
        self.running = true;
        Ok(info)
    }

    /// Apply a changed setting. Selecting another device reopens the sensor
    /// on it; acquisition resumes on the next grab. The previous device is
    /// closed first, so a failed switch leaves the viewer uninitialised.
    pub fn commit_settings(&mut self, name: &str, value: &str) -> Result<()> {
        if name != DEVICE_PARAMETER {
            return Err(GoIoError::InvalidName {
                kind: "viewer parameter",
                name: name.to_string(),
                expected: DEVICE_PARAMETER.to_string(),
            });
        }

        let Some(current) = self.settings.as_ref() else {
            return Err(GoIoError::SensorNotOpen);
        };
        if current.device == value {
            return Ok(());
        }

        let settings = ViewerSettings {
            device: value.to_string(),
            product: current.product,
        };
        log::info!("Switching viewer to device {}", settings.device);
        self.running = false;
        self.settings = None;
        self.sensor.open(&settings.device, settings.product)?;
        self.settings = Some(settings);
        Ok(())
    }

    /// Read one value, restarting acquisition if it was stopped.
    ///
    /// With `n_average <= 1` the latest sample is used. Otherwise the queue
    /// is drained and the last `n_average` samples are averaged; an empty
    /// queue falls back to the latest sample.
    pub fn grab_data(&mut self, n_average: usize) -> Result<Data0D> {
        if !self.running {
            self.sensor.start()?;
            self.running = true;
        }

        let mut samples = if n_average > 1 {
            let mut queued = self.sensor.read_raw()?;
            let skip = queued.len().saturating_sub(n_average);
            queued.split_off(skip)
        } else {
            Vec::new()
        };
        if samples.is_empty() {
            samples.push(self.sensor.read_raw_latest()?);
        }

        let mut sum = 0.0;
        for raw in &samples {
            sum += self.sensor.raw_to_calibrated(*raw)?;
        }
        let name = self
            .sensor
            .info()
            .map(|info| info.product.to_string())
            .unwrap_or_default();

        Ok(Data0D {
            name,
            value: sum / samples.len() as f64,
            raw: samples[samples.len() - 1],
            samples: samples.len(),
        })
    }

    /// Stop collecting. The next grab starts again.
    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        self.sensor.stop()?;
        self.running = false;
        Ok(())
    }

    /// Close the sensor. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        self.running = false;
        self.settings = None;
        self.sensor.close()
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockLibrary};

    fn viewer() -> Viewer {
        let lib = MockLibrary::new(vec![
            MockDevice::new("golink-a", ProductId::GoLink),
            MockDevice::new("golink-b", ProductId::GoLink),
        ]);
        Viewer::new(GoIo::open(Box::new(lib)).unwrap())
    }

    fn golink(device: &str) -> ViewerSettings {
        ViewerSettings {
            device: device.to_string(),
            product: ProductId::GoLink,
        }
    }

    #[test]
    fn test_device_parameter() {
        let mut viewer = viewer();
        let param = viewer.device_parameter(ProductId::GoLink).unwrap();
        assert_eq!(param.name, "device");
        assert_eq!(param.value.as_deref(), Some("golink-a"));
        assert_eq!(param.limits, vec!["golink-a", "golink-b"]);

        viewer.ini_detector(golink("golink-b")).unwrap();
        let param = viewer.device_parameter(ProductId::GoLink).unwrap();
        assert_eq!(param.value.as_deref(), Some("golink-b"));

        let param = viewer.device_parameter(ProductId::GoTemp).unwrap();
        assert_eq!(param.value, None);
        assert!(param.limits.is_empty());
    }

    #[test]
    fn test_lifecycle() {
        let mut viewer = viewer();
        let info = viewer.ini_detector(golink("golink-a")).unwrap();
        assert!(info.contains("golink-a"));
        assert!(viewer.is_running());

        let data = viewer.grab_data(1).unwrap();
        assert_eq!(data.name, "GoLink");
        assert_eq!(data.raw, 2051);
        assert_eq!(data.samples, 1);
        assert!((data.value - 2051.0 * 5.0 / 4096.0).abs() < 1e-9);

        viewer.stop().unwrap();
        assert!(!viewer.is_running());
        viewer.stop().unwrap();

        // Grabbing after stop restarts acquisition.
        let data = viewer.grab_data(1).unwrap();
        assert!(viewer.is_running());
        assert_eq!(data.raw, 2055);

        viewer.close().unwrap();
        viewer.close().unwrap();
        assert!(viewer.settings().is_none());
        assert!(matches!(viewer.grab_data(1), Err(GoIoError::SensorNotOpen)));
    }

    #[test]
    fn test_grab_average() {
        let mut viewer = viewer();
        viewer.ini_detector(golink("golink-a")).unwrap();
        let data = viewer.grab_data(2).unwrap();
        assert_eq!(data.samples, 2);
        assert_eq!(data.raw, 2051);
        assert!((data.value - 2050.5 * 5.0 / 4096.0).abs() < 1e-9);
    }

    #[test]
    fn test_commit_device_reopens() {
        let mut viewer = viewer();
        viewer.ini_detector(golink("golink-a")).unwrap();
        viewer.commit_settings("device", "golink-a").unwrap();
        assert!(viewer.is_running());

        viewer.commit_settings("device", "golink-b").unwrap();
        assert_eq!(viewer.settings().unwrap().device, "golink-b");
        assert!(!viewer.is_running());
        assert_eq!(viewer.grab_data(1).unwrap().raw, 2051);

        assert!(matches!(
            viewer.commit_settings("exposure", "10"),
            Err(GoIoError::InvalidName { .. })
        ));

        assert!(matches!(
            viewer.commit_settings("device", "golink-z"),
            Err(GoIoError::DeviceNotFound { .. })
        ));
        assert!(viewer.settings().is_none());
        assert!(!viewer.is_running());
        assert!(matches!(viewer.grab_data(1), Err(GoIoError::SensorNotOpen)));
        let param = viewer.device_parameter(ProductId::GoLink).unwrap();
        assert_eq!(param.value.as_deref(), Some("golink-a"));

        // A fresh init recovers.
        viewer.ini_detector(golink("golink-a")).unwrap();
        assert_eq!(viewer.grab_data(1).unwrap().raw, 2051);
    }

    #[test]
    fn test_failed_start_keeps_settings_of_open_sensor() {
        let lib = MockLibrary::single_golink();
        let mut viewer = Viewer::new(GoIo::open(Box::new(lib.clone())).unwrap());
        let settings = ViewerSettings {
            device: "mock-golink-0".to_string(),
            product: ProductId::GoLink,
        };

        lib.fail_next_command(-7);
        match viewer.ini_detector(settings.clone()) {
            Err(GoIoError::VendorCall { call, code }) => {
                assert_eq!(call, "Command START_MEASUREMENTS");
                assert_eq!(code, -7);
            }
            other => panic!("expected START_MEASUREMENTS failure, got {:?}", other),
        }
        assert_eq!(viewer.settings(), Some(&settings));
        assert!(!viewer.is_running());

        // The next grab starts acquisition on the sensor that is still open.
        assert_eq!(viewer.grab_data(1).unwrap().raw, 2051);
        viewer.commit_settings("device", "mock-golink-0").unwrap();
    }

    #[test]
    fn test_grab_before_init_fails() {
        let mut viewer = viewer();
        assert!(matches!(viewer.grab_data(1), Err(GoIoError::SensorNotOpen)));
        assert!(matches!(
            viewer.commit_settings("device", "golink-a"),
            Err(GoIoError::SensorNotOpen)
        ));
    }
}
