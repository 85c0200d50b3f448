use super::protocol::{self, method, Request, Response};
use crate::backend::Backend;
use crate::types::SensorHandle;
use crate::{GoIoError, Result};
use serde_json::Value;
use std::io::{BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};

/// Hosts a [`Backend`] for a bridge client in another process.
///
/// Clients are served one at a time and each request is answered before the
/// next one is read.
pub struct BridgeServer<B: Backend> {
    backend: B,
}

impl<B: Backend> BridgeServer<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Accept clients on `listener` until one asks for shutdown.
    pub fn serve(&self, listener: TcpListener) -> Result<()> {
        log::info!(
            "Bridge server listening on {} ({} backend)",
            listener.local_addr()?,
            self.backend.name()
        );

        for stream in listener.incoming() {
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("Bridge accept error: {}", e);
                    continue;
                }
            };
            let peer = stream.peer_addr().ok();
            log::info!("Bridge client connected: {:?}", peer);

            match self.handle_client(stream) {
                Ok(true) => {
                    log::info!("Bridge shutdown requested by {:?}", peer);
                    return Ok(());
                }
                Ok(false) => log::info!("Bridge client disconnected: {:?}", peer),
                Err(e) => log::warn!("Bridge client {:?} dropped: {}", peer, e),
            }
        }
        Ok(())
    }

    /// Serve requests from one client. Returns `true` on shutdown request.
    fn handle_client(&self, stream: TcpStream) -> Result<bool> {
        stream.set_nodelay(true)?;
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);

        loop {
            let request: Request = match protocol::read_message(&mut reader) {
                Ok(r) => r,
                Err(GoIoError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(e) => return Err(e),
            };
            log::debug!("bridge call {} {:?}", request.method, request.args);

            if request.method == method::SHUTDOWN {
                protocol::write_message(&mut writer, &Response::Value { value: Value::Null })?;
                return Ok(true);
            }

            let response = match self.dispatch(&request) {
                Ok(value) => Response::Value { value },
                Err(e) => {
                    log::warn!("bridge call {} failed: {}", request.method, e);
                    Response::Error {
                        message: e.to_string(),
                    }
                }
            };
            protocol::write_message(&mut writer, &response)?;
        }
    }

    /// Invoke the backend method named by `request`.
    pub fn dispatch(&self, request: &Request) -> Result<Value> {
        let b = &self.backend;
        let handle = || request.arg::<SensorHandle>(0);

        let value = match request.method.as_str() {
            method::INIT => serde_json::to_value(b.init()?)?,
            method::UNINIT => serde_json::to_value(b.uninit()?)?,
            method::DLL_VERSION => serde_json::to_value(b.dll_version()?)?,
            method::UPDATE_DEVICE_LIST => serde_json::to_value(
                b.update_list_of_available_devices(request.arg(0)?, request.arg(1)?)?,
            )?,
            method::NTH_DEVICE_NAME => serde_json::to_value(b.nth_available_device_name(
                request.arg(0)?,
                request.arg(1)?,
                request.arg(2)?,
            )?)?,
            method::SENSOR_OPEN => {
                let device: String = request.arg(0)?;
                serde_json::to_value(b.sensor_open(
                    &device,
                    request.arg(1)?,
                    request.arg(2)?,
                    request.arg(3)?,
                )?)?
            }
            method::SENSOR_CLOSE => serde_json::to_value(b.sensor_close(handle()?)?)?,
            method::SENSOR_CLEAR_IO => serde_json::to_value(b.sensor_clear_io(handle()?)?)?,
            method::SENSOR_OPEN_DEVICE_NAME => {
                serde_json::to_value(b.sensor_open_device_name(handle()?)?)?
            }
            method::SENSOR_SEND_CMD => {
                let params: Vec<u8> = request.arg(2)?;
                serde_json::to_value(b.sensor_send_cmd_and_get_response(
                    handle()?,
                    request.arg(1)?,
                    &params,
                    request.arg(3)?,
                    request.arg(4)?,
                )?)?
            }
            method::SENSOR_LAST_CMD_STATUS => {
                serde_json::to_value(b.sensor_last_cmd_response_status(handle()?)?)?
            }
            method::SENSOR_NUM_AVAILABLE => {
                serde_json::to_value(b.sensor_num_measurements_available(handle()?)?)?
            }
            method::SENSOR_READ_RAW => serde_json::to_value(
                b.sensor_read_raw_measurements(handle()?, request.arg(1)?)?,
            )?,
            method::SENSOR_LATEST_RAW => {
                serde_json::to_value(b.sensor_latest_raw_measurement(handle()?)?)?
            }
            method::SENSOR_TO_VOLTAGE => finite(
                &request.method,
                b.sensor_convert_to_voltage(handle()?, request.arg(1)?)?,
            )?,
            method::SENSOR_CALIBRATE => finite(
                &request.method,
                b.sensor_calibrate_data(handle()?, request.arg(1)?)?,
            )?,
            method::SENSOR_PROBE_TYPE => serde_json::to_value(b.sensor_probe_type(handle()?)?)?,
            method::SENSOR_SET_PERIOD => serde_json::to_value(b.sensor_set_measurement_period(
                handle()?,
                request.arg(1)?,
                request.arg(2)?,
            )?)?,
            method::SENSOR_GET_PERIOD => finite(
                &request.method,
                b.sensor_measurement_period(handle()?, request.arg(1)?)?,
            )?,
            other => {
                return Err(GoIoError::Protocol(format!("Unknown method {}", other)));
            }
        };
        Ok(value)
    }
}

/// JSON has no NaN or infinity; `serde_json` would send them as `null`.
fn finite(method: &str, value: f64) -> Result<Value> {
    if value.is_finite() {
        Ok(Value::from(value))
    } else {
        Err(GoIoError::Protocol(format!(
            "{} returned {}, which cannot cross the bridge",
            method, value
        )))
    }
}
