//! Stream calibrated measurements from the first sensor to stdout.
//!
//! Usage: cargo run --example stream
//! Press Ctrl+C to stop.

use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let config = match goio::GoIoConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let sensor = match config.open().and_then(|goio| {
        let device = goio.device_by_index(config.product, 0)?;
        goio.open_sensor(&device, config.product)
    }) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open sensor: {}", e);
            std::process::exit(1);
        }
    };

    let period = sensor.measurement_period().unwrap_or(0.01);
    if let Err(e) = sensor.start() {
        eprintln!("Failed to start measurements: {}", e);
        std::process::exit(1);
    }

    println!("Streaming at {:.1} Hz (Ctrl+C to stop)...", 1.0 / period);

    let start = Instant::now();
    let mut count: u64 = 0;
    let mut last_report = Instant::now();

    loop {
        let samples = match sensor.read_raw() {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        };

        for raw in samples {
            count += 1;
            // Print every ~50th sample to avoid flooding the terminal
            if count % 50 == 1 {
                match sensor.raw_to_calibrated(raw) {
                    Ok(value) => println!("#{:<8} raw={:<5} value={:+.4}", count, raw, value),
                    Err(e) => eprintln!("Conversion failed: {}", e),
                }
            }
        }

        let now = Instant::now();
        if now.duration_since(last_report) >= Duration::from_secs(3) {
            let elapsed = start.elapsed().as_secs_f64();
            println!(
                "--- {} samples in {:.1}s ({:.1} Hz) ---",
                count,
                elapsed,
                count as f64 / elapsed
            );
            last_report = now;
        }

        std::thread::sleep(Duration::from_millis(100));
    }

    if let Err(e) = sensor.stop() {
        eprintln!("Failed to stop measurements: {}", e);
    }
}
