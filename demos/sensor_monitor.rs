//! Live temperature/humidity monitoring example
//!
//! Run with: cargo run --example sensor_monitor

use mijia_rust_ble::{
    celsius_to_fahrenheit, dew_point_celsius, DeviceManager, ReadingUpdate, Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (minimal)
    tracing_subscriber::fmt().with_env_filter("warn").init();

    println!("MJ_HT_V1 Monitor");
    println!("================\n");

    let manager = DeviceManager::new().await?;
    manager.start().await?;

    let mut readings = manager.subscribe_readings();
    manager.start_scan().await?;

    println!("Scanning for the sensor...");
    println!("Press Ctrl+C to exit.\n");

    let mut battery_shown = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nExiting...");
                break;
            }
            update = readings.recv() => {
                let Ok(update) = update else { break };
                display_reading(&update);

                // One battery read once the link is streaming.
                if !battery_shown {
                    if let Ok(level) = manager.read_battery_level().await {
                        println!("  Battery: {}{}", level, if level.is_low() { " (low!)" } else { "" });
                        battery_shown = true;
                    }
                }
            }
        }
    }

    manager.shutdown().await?;

    Ok(())
}

fn display_reading(update: &ReadingUpdate) {
    let reading = update.reading;
    println!(
        "[{}] {:5.1}°C ({:5.1}°F)  {:5.1}%RH  dew point {:5.1}°C",
        update.received_at.format("%H:%M:%S"),
        reading.temperature_celsius,
        celsius_to_fahrenheit(reading.temperature_celsius),
        reading.humidity_percent,
        dew_point_celsius(reading.temperature_celsius, reading.humidity_percent),
    );
}
