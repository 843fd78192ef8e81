//! Drive the session through the messenger bridge alone
//!
//! Mirrors how a foreground UI talks to the background session owner:
//! register a reply channel, submit StartScan, consume events.
//!
//! Run with: cargo run --example bridge_client

use mijia_rust_ble::{Command, DeviceManager, Result, SensorReading, UiEvent};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let manager = DeviceManager::new().await?;
    manager.start().await?;

    let bridge = manager.bridge();
    let mut events = bridge.register_client();

    bridge.send_command(Command::StartScan);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nExiting...");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    UiEvent::ScanningStarted => println!("scanning..."),
                    UiEvent::ScanningStopped => println!("scan stopped"),
                    UiEvent::UiNotice(text) => println!("notice: {text}"),
                    UiEvent::SensorData(encoded) => match SensorReading::decode(&encoded) {
                        Ok(reading) => println!("{reading}"),
                        Err(e) => eprintln!("bad bridge payload: {e}"),
                    },
                }
            }
        }
    }

    manager.shutdown().await?;

    Ok(())
}
