//! Print detailed info about the first connected sensor of `GOIO_PRODUCT`.

use goio::{LedBrightness, LedColor};

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> goio::Result<()> {
    let config = goio::GoIoConfig::from_env()?;
    let goio = config.open()?;
    let device = goio.device_by_index(config.product, 0)?;
    let sensor = goio.open_sensor(&device, config.product)?;

    println!("Sensor:   {}", sensor.query_info()?);
    println!("Probe:    {}", sensor.probe_type()?);
    println!("Status:   {}", sensor.status()?);
    println!("Period:   {} s", sensor.measurement_period()?);

    sensor.set_led(LedColor::Green, LedBrightness::Max)?;
    let led = sensor.led_state()?;
    println!("LED:      {} / {}", led.color()?, led.brightness()?);

    let last = sensor.response_status()?;
    println!(
        "Last cmd: {} -> {} (last error: {} -> {})",
        last.last_command, last.last_status, last.last_command_with_error, last.last_error
    );
    Ok(())
}
