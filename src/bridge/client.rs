use super::protocol::{self, method, Request, Response};
use crate::backend::{
    Backend, CommandReply, DeviceNameReply, LastCmdReply, OpenDeviceReply, VersionReply,
};
use crate::types::{ProductId, SensorHandle, VendorId};
use crate::{GoIoError, Result};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::process::{Child, Command};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(50);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// [`Backend`] forwarding every call to a bridge server, typically a 32-bit
/// `goio-server32` process hosting GoIO_DLL.
///
/// Calls are serialized: the connection is locked for the whole
/// request/response exchange, and each exchange is bounded by the socket
/// timeout given at connect time. A transport failure mid-exchange leaves
/// the stream out of step with the server, so the connection is dropped and
/// every later call fails with [`GoIoError::BackendUnavailable`].
pub struct BridgeClient {
    stream: Mutex<Option<TcpStream>>,
    child: Mutex<Option<Child>>,
}

impl BridgeClient {
    /// Connect to a running bridge server.
    pub fn connect(addr: impl ToSocketAddrs, timeout: Duration) -> Result<BridgeClient> {
        let stream = connect_stream(addr, timeout)?;
        Ok(BridgeClient {
            stream: Mutex::new(Some(stream)),
            child: Mutex::new(None),
        })
    }

    /// Launch the server executable and connect to it.
    ///
    /// The server is told where to listen through `GOIO_BRIDGE_HOST` and
    /// `GOIO_BRIDGE_PORT`. Connection attempts are retried until `timeout`
    /// elapses; the child is killed if it never answers.
    pub fn spawn(server: &Path, host: &str, port: u16, timeout: Duration) -> Result<BridgeClient> {
        log::info!("Launching bridge server {} on {}:{}", server.display(), host, port);
        let mut child = Command::new(server)
            .env("GOIO_BRIDGE_HOST", host)
            .env("GOIO_BRIDGE_PORT", port.to_string())
            .spawn()
            .map_err(|e| {
                GoIoError::BackendUnavailable(format!(
                    "cannot launch {}: {}",
                    server.display(),
                    e
                ))
            })?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Err(GoIoError::BackendUnavailable(format!(
                    "bridge server exited early with {}",
                    status
                )));
            }

            match connect_stream((host, port), timeout) {
                Ok(stream) => {
                    log::info!("Connected to bridge server (pid {})", child.id());
                    return Ok(BridgeClient {
                        stream: Mutex::new(Some(stream)),
                        child: Mutex::new(Some(child)),
                    });
                }
                Err(e) if Instant::now() < deadline => {
                    log::trace!("bridge not ready yet: {}", e);
                    std::thread::sleep(CONNECT_RETRY_DELAY);
                }
                Err(_) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(GoIoError::Timeout);
                }
            }
        }
    }

    /// Forward one call and decode its return value.
    fn call<T: DeserializeOwned>(&self, name: &str, args: Vec<Value>) -> Result<T> {
        let mut guard = self
            .stream
            .lock()
            .map_err(|_| GoIoError::BackendUnavailable("bridge connection poisoned".into()))?;
        let Some(stream) = guard.as_mut() else {
            return Err(GoIoError::BackendUnavailable(
                "bridge connection closed after an earlier failure".into(),
            ));
        };

        let request = Request::new(name, args);
        let exchange = protocol::write_message(&mut *stream, &request)
            .and_then(|()| protocol::read_message::<_, Response>(&mut *stream));
        let response = match exchange {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Bridge call {} failed, dropping connection: {}", name, e);
                if let Some(stream) = guard.take() {
                    let _ = stream.shutdown(Shutdown::Both);
                }
                return Err(timeout_as_error(e));
            }
        };
        drop(guard);

        match response {
            Response::Value { value } => Ok(serde_json::from_value(value)?),
            Response::Error { message } => Err(GoIoError::Remote {
                method: name.to_string(),
                message,
            }),
        }
    }

    /// Ask the server to stop serving.
    pub fn shutdown(&self) -> Result<()> {
        self.call::<Value>(method::SHUTDOWN, Vec::new()).map(|_| ())
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        let shutdown = self.shutdown();
        if let Err(e) = &shutdown {
            log::debug!("Bridge shutdown request failed: {}", e);
        }

        let Ok(mut child) = self.child.lock() else {
            return;
        };
        if let Some(mut child) = child.take() {
            let deadline = Instant::now() + SHUTDOWN_GRACE;
            loop {
                match child.try_wait() {
                    Ok(Some(_)) => return,
                    Ok(None) if shutdown.is_ok() && Instant::now() < deadline => {
                        std::thread::sleep(CONNECT_RETRY_DELAY);
                    }
                    _ => break,
                }
            }
            log::warn!("Bridge server did not exit, killing pid {}", child.id());
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn connect_stream(addr: impl ToSocketAddrs, timeout: Duration) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err
        .map(GoIoError::Io)
        .unwrap_or_else(|| GoIoError::Protocol("bridge address resolved to nothing".into())))
}

fn timeout_as_error(e: GoIoError) -> GoIoError {
    match e {
        GoIoError::Io(io)
            if matches!(
                io.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ) =>
        {
            GoIoError::Timeout
        }
        other => other,
    }
}

impl Backend for BridgeClient {
    fn name(&self) -> &'static str {
        "bridge"
    }

    fn init(&self) -> Result<i32> {
        self.call(method::INIT, Vec::new())
    }

    fn uninit(&self) -> Result<i32> {
        self.call(method::UNINIT, Vec::new())
    }

    fn dll_version(&self) -> Result<VersionReply> {
        self.call(method::DLL_VERSION, Vec::new())
    }

    fn update_list_of_available_devices(
        &self,
        vendor: VendorId,
        product: ProductId,
    ) -> Result<i32> {
        self.call(method::UPDATE_DEVICE_LIST, vec![json!(vendor), json!(product)])
    }

    fn nth_available_device_name(
        &self,
        vendor: VendorId,
        product: ProductId,
        n: i32,
    ) -> Result<DeviceNameReply> {
        self.call(
            method::NTH_DEVICE_NAME,
            vec![json!(vendor), json!(product), json!(n)],
        )
    }

    fn sensor_open(
        &self,
        device: &str,
        vendor: VendorId,
        product: ProductId,
        strict_dds_validation: i32,
    ) -> Result<Option<SensorHandle>> {
        self.call(
            method::SENSOR_OPEN,
            vec![
                json!(device),
                json!(vendor),
                json!(product),
                json!(strict_dds_validation),
            ],
        )
    }

    fn sensor_close(&self, handle: SensorHandle) -> Result<i32> {
        self.call(method::SENSOR_CLOSE, vec![json!(handle)])
    }

    fn sensor_clear_io(&self, handle: SensorHandle) -> Result<i32> {
        self.call(method::SENSOR_CLEAR_IO, vec![json!(handle)])
    }

    fn sensor_open_device_name(&self, handle: SensorHandle) -> Result<OpenDeviceReply> {
        self.call(method::SENSOR_OPEN_DEVICE_NAME, vec![json!(handle)])
    }

    fn sensor_send_cmd_and_get_response(
        &self,
        handle: SensorHandle,
        command: u8,
        params: &[u8],
        response_capacity: usize,
        timeout_ms: i32,
    ) -> Result<CommandReply> {
        self.call(
            method::SENSOR_SEND_CMD,
            vec![
                json!(handle),
                json!(command),
                json!(params),
                json!(response_capacity),
                json!(timeout_ms),
            ],
        )
    }

    fn sensor_last_cmd_response_status(&self, handle: SensorHandle) -> Result<LastCmdReply> {
        self.call(method::SENSOR_LAST_CMD_STATUS, vec![json!(handle)])
    }

    fn sensor_num_measurements_available(&self, handle: SensorHandle) -> Result<i32> {
        self.call(method::SENSOR_NUM_AVAILABLE, vec![json!(handle)])
    }

    fn sensor_read_raw_measurements(
        &self,
        handle: SensorHandle,
        max_count: u32,
    ) -> Result<(i32, Vec<i32>)> {
        self.call(method::SENSOR_READ_RAW, vec![json!(handle), json!(max_count)])
    }

    fn sensor_latest_raw_measurement(&self, handle: SensorHandle) -> Result<i32> {
        self.call(method::SENSOR_LATEST_RAW, vec![json!(handle)])
    }

    fn sensor_convert_to_voltage(&self, handle: SensorHandle, raw: i32) -> Result<f64> {
        self.call(method::SENSOR_TO_VOLTAGE, vec![json!(handle), json!(raw)])
    }

    fn sensor_calibrate_data(&self, handle: SensorHandle, volts: f64) -> Result<f64> {
        self.call(method::SENSOR_CALIBRATE, vec![json!(handle), json!(volts)])
    }

    fn sensor_probe_type(&self, handle: SensorHandle) -> Result<i32> {
        self.call(method::SENSOR_PROBE_TYPE, vec![json!(handle)])
    }

    fn sensor_set_measurement_period(
        &self,
        handle: SensorHandle,
        seconds: f64,
        timeout_ms: i32,
    ) -> Result<i32> {
        self.call(
            method::SENSOR_SET_PERIOD,
            vec![json!(handle), json!(seconds), json!(timeout_ms)],
        )
    }

    fn sensor_measurement_period(&self, handle: SensorHandle, timeout_ms: i32) -> Result<f64> {
        self.call(
            method::SENSOR_GET_PERIOD,
            vec![json!(handle), json!(timeout_ms)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_late_reply_is_not_taken_by_next_call() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        // Answers the first request only after the client has given up.
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let _: Request = protocol::read_message(&mut stream).unwrap();
            std::thread::sleep(Duration::from_millis(600));
            let _ = protocol::write_message(&mut stream, &Response::Value { value: json!(111) });
            if protocol::read_message::<_, Request>(&mut stream).is_ok() {
                let _ = protocol::write_message(&mut stream, &Response::Value { value: json!(222) });
            }
        });

        let client = BridgeClient::connect(addr, Duration::from_millis(200)).unwrap();
        assert!(matches!(client.init(), Err(GoIoError::Timeout)));
        assert!(matches!(
            client.sensor_probe_type(SensorHandle(0x1000)),
            Err(GoIoError::BackendUnavailable(_))
        ));
        assert!(client.shutdown().is_err());

        drop(client);
        server.join().unwrap();
    }

    #[test]
    fn test_remote_error_keeps_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let _: Request = protocol::read_message(&mut stream).unwrap();
            protocol::write_message(&mut stream, &Response::Error { message: "boom".into() })
                .unwrap();
            let _: Request = protocol::read_message(&mut stream).unwrap();
            protocol::write_message(&mut stream, &Response::Value { value: json!(0) }).unwrap();
        });

        let client = BridgeClient::connect(addr, Duration::from_secs(5)).unwrap();
        match client.init() {
            Err(GoIoError::Remote { method, message }) => {
                assert_eq!(method, "GoIO_Init");
                assert_eq!(message, "boom");
            }
            other => panic!("expected remote error, got {:?}", other),
        }
        assert_eq!(client.uninit().unwrap(), 0);

        drop(client);
        server.join().unwrap();
    }
}
