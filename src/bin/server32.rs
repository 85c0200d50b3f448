//! Bridge helper hosting GoIO_DLL for 64-bit clients.
//!
//! Build it for the DLL's bitness (e.g. `--target i686-pc-windows-msvc
//! --features goio-sdk`). It listens on `GOIO_BRIDGE_HOST`:`GOIO_BRIDGE_PORT`
//! and exits when a client sends `shutdown`. Without the `goio-sdk` feature
//! it serves simulated devices.

use goio::bridge::BridgeServer;
use goio::GoIoConfig;
use std::net::TcpListener;

fn main() {
    env_logger::init();

    let config = GoIoConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(2);
    });

    let addr = (config.bridge_host.as_str(), config.bridge_port);
    let listener = TcpListener::bind(addr).unwrap_or_else(|e| {
        eprintln!(
            "Failed to bind {}:{}: {}",
            config.bridge_host, config.bridge_port, e
        );
        std::process::exit(1);
    });

    if let Err(e) = serve(listener) {
        eprintln!("Bridge server failed: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "goio-sdk")]
fn serve(listener: TcpListener) -> goio::Result<()> {
    BridgeServer::new(goio::native::NativeLibrary::new()).serve(listener)
}

#[cfg(all(not(feature = "goio-sdk"), feature = "mock"))]
fn serve(listener: TcpListener) -> goio::Result<()> {
    log::warn!("Built without goio-sdk, serving simulated devices");
    BridgeServer::new(goio::mock::MockLibrary::single_golink()).serve(listener)
}

#[cfg(not(any(feature = "goio-sdk", feature = "mock")))]
fn serve(_listener: TcpListener) -> goio::Result<()> {
    Err(goio::GoIoError::BackendUnavailable(
        "built without the goio-sdk and mock features".into(),
    ))
}
