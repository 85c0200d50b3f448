//! Process bridge for hosts that cannot load the 32-bit GoIO_DLL.
//!
//! A [`BridgeServer`] runs in a helper process of the DLL's bitness (the
//! `goio-server32` binary) and serves a [`BridgeClient`], which implements
//! [`crate::backend::Backend`] by forwarding each call as a method name plus
//! positional arguments. See [`protocol`] for the frame format.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::BridgeClient;
pub use server::BridgeServer;

/// Default address the helper listens on.
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 47_623;

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::protocol::{method, Request};
    use super::*;
    use crate::device::GoIo;
    use crate::mock::MockLibrary;
    use crate::types::{LedBrightness, LedColor, ProductId, SensorStatus, VendorId};
    use crate::GoIoError;
    use serde_json::json;
    use std::net::TcpListener;
    use std::time::Duration;

    fn start_server() -> (std::net::SocketAddr, std::thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let thread = std::thread::spawn(move || {
            let server = BridgeServer::new(MockLibrary::single_golink().with_samples_per_poll(2));
            server.serve(listener).unwrap();
        });
        (addr, thread)
    }

    #[test]
    fn test_calls_forwarded_over_loopback() {
        let (addr, thread) = start_server();
        let client = BridgeClient::connect(addr, Duration::from_secs(5)).unwrap();
        let goio = GoIo::open(Box::new(client)).unwrap();

        assert_eq!(goio.version().unwrap().to_string(), "2.53");
        assert_eq!(goio.devices(ProductId::GoLink).unwrap(), vec!["mock-golink-0"]);

        let mut sensor = goio.open_sensor("mock-golink-0", ProductId::GoLink).unwrap();
        assert_eq!(sensor.status().unwrap(), SensorStatus::Success);
        let sent = sensor.set_led(LedColor::RedGreen, LedBrightness::Orange).unwrap();
        assert_eq!(sensor.led_state().unwrap(), sent);

        sensor.start().unwrap();
        assert_eq!(sensor.read_raw().unwrap(), vec![2048, 2049]);
        assert!(sensor.raw_to_calibrated(2048).unwrap() > 2.0);
        sensor.stop().unwrap();
        sensor.close().unwrap();

        // Uninit, then the client asks the server to stop.
        drop(sensor);
        drop(goio);
        thread.join().unwrap();
    }

    #[test]
    fn test_vendor_failures_cross_the_bridge() {
        let (addr, thread) = start_server();
        let client = BridgeClient::connect(addr, Duration::from_secs(5)).unwrap();
        let goio = GoIo::open(Box::new(client)).unwrap();
        let sensor = goio.open_sensor("mock-golink-0", ProductId::GoLink).unwrap();

        let err = sensor
            .send_simple_command(crate::SensorCommand::GetSensorId)
            .unwrap_err();
        assert!(matches!(err, GoIoError::VendorCall { .. }));

        drop(sensor);
        drop(goio);
        thread.join().unwrap();
    }

    #[test]
    fn test_non_finite_value_is_reported() {
        let server = BridgeServer::new(MockLibrary::single_golink().with_calibration(f64::NAN, 0.0));
        assert_eq!(
            server.dispatch(&Request::new(method::INIT, Vec::new())).unwrap(),
            json!(0)
        );
        let handle = server
            .dispatch(&Request::new(
                method::SENSOR_OPEN,
                vec![
                    json!("mock-golink-0"),
                    json!(VendorId::Vernier),
                    json!(ProductId::GoLink),
                    json!(1),
                ],
            ))
            .unwrap();
        assert!(handle.is_u64());

        let volts = server
            .dispatch(&Request::new(
                method::SENSOR_TO_VOLTAGE,
                vec![handle.clone(), json!(4096)],
            ))
            .unwrap();
        assert_eq!(volts, json!(5.0));

        match server.dispatch(&Request::new(
            method::SENSOR_CALIBRATE,
            vec![handle, json!(2.5)],
        )) {
            Err(GoIoError::Protocol(message)) => {
                assert!(message.contains("GoIO_Sensor_CalibrateData"), "{}", message);
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_method_is_remote_error() {
        let server = BridgeServer::new(MockLibrary::single_golink());
        let res = server.dispatch(&Request::new("GoIO_Sensor_Explode", Vec::new()));
        assert!(matches!(res, Err(GoIoError::Protocol(_))));

        let res = server.dispatch(&Request::new(method::SENSOR_CLOSE, Vec::new()));
        assert!(matches!(res, Err(GoIoError::Protocol(_))));
    }
}
