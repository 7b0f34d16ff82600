//! Standalone bridge: keeps every configured purifier in sync and mirrors its
//! state to MQTT until interrupted.

use futures_util::StreamExt;
use log::{error, info};
use philair::device::DeviceEvent;
use philair::{BridgeConfig, Manager};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("philair {}", philair::version());

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: philair-bridge <config.json>");
        return ExitCode::FAILURE;
    };

    let config = match BridgeConfig::from_file(&path) {
        Ok(c) => c,
        Err(e) => {
            error!("Cannot load {}: {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let manager = Manager::new();
    for device in config.devices {
        let host = device.host.clone();
        if let Err(e) = manager.add(device).await {
            error!("Cannot register device at {}: {}", host, e);
            manager.shutdown().await;
            return ExitCode::FAILURE;
        }
    }

    let events = manager.stream();
    let reporter = manager.clone();
    tokio::spawn(async move {
        tokio::pin!(events);
        while let Some(event) = events.next().await {
            let Some(device) = reporter.get(&event.entity_id).await else {
                continue;
            };
            match event.event {
                DeviceEvent::AttributesUpdated(_) => info!(
                    "{}: speed={} power={}",
                    event.entity_id,
                    device.current_speed(),
                    device.current_power_state()
                ),
                DeviceEvent::LivenessChanged(online) => {
                    info!("{}: online={}", event.entity_id, online)
                }
            }
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for Ctrl-C: {}", e);
    }
    manager.shutdown().await;
    ExitCode::SUCCESS
}
