//! List connected GoIO devices of every product family.
//!
//! The backend comes from `GOIO_BACKEND` (`native`, `bridge` or `mock`).

fn main() {
    env_logger::init();

    let goio = match goio::GoIoConfig::from_env().and_then(|config| config.open()) {
        Ok(goio) => goio,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match goio.version() {
        Ok(version) => println!("GoIO_DLL {}", version),
        Err(e) => eprintln!("Version unavailable: {}", e),
    }

    for &product in goio::ProductId::ALL {
        match goio.devices(product) {
            Ok(devices) => {
                println!("{}: {} device(s)", product, devices.len());
                for (i, name) in devices.iter().enumerate() {
                    println!("  [{}] {}", i, name);
                }
            }
            Err(e) => eprintln!("{}: {}", product, e),
        }
    }
}
