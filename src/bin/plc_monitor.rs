use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use voltage_plcvars::{
    console_logger, ConnectionMonitor, EnumType, Header, HeaderExpectation, MonitorConfig, MonitorEvent,
    PlcClient, PlcConfig, RegisterBank, TransportConnector, ValueType, VariableDescriptor, VariableMap,
};

/// Map and simulated PLC used when no config file is given
fn demo_setup() -> Result<(PlcClient, Arc<dyn TransportConnector>, MonitorConfig)> {
    let mode = EnumType::new("Mode", ValueType::UInt16, [("Off", 0), ("Auto", 1), ("Manual", 2)])?;
    let map = VariableMap::from_descriptors([
        VariableDescriptor::new("Running", ValueType::Bool, 2),
        VariableDescriptor::new("Counter", ValueType::UInt16, 3),
        VariableDescriptor::new("Temperature", ValueType::Float32, 4),
        VariableDescriptor::new("Mode", ValueType::Enum(mode), 6),
        VariableDescriptor::string("Station", 8, 7),
    ])?;

    let bank = RegisterBank::new();
    bank.set_header(Header::new(1, 11))?;
    bank.write_registers(2, &[1, 0, 0x41CC, 0x0000, 1])?;

    // Simulated process: the counter ticks on the PLC side
    let ticker = bank.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(700));
        loop {
            interval.tick().await;
            let next = ticker
                .read_holding_registers(3, 1)
                .ok()
                .and_then(|regs| regs.first().copied())
                .map_or(0, |count| count.wrapping_add(1));
            if let Err(e) = ticker.write_registers(3, &[next]) {
                warn!("Simulated PLC update failed: {}", e);
            }
        }
    });

    let client = PlcClient::with_logger(map, HeaderExpectation::new(1, 10, 12), 1, console_logger!());
    let config = MonitorConfig::default().with_check_interval(Duration::from_secs(1));
    let connector: Arc<dyn TransportConnector> = Arc::new(bank);
    Ok((client, connector, config))
}

fn file_setup(path: &str) -> Result<(PlcClient, Arc<dyn TransportConnector>, MonitorConfig)> {
    let config = PlcConfig::from_file(path).with_context(|| format!("Failed to load {}", path))?;
    let client = config.build_client()?;
    let connector: Arc<dyn TransportConnector> = Arc::new(config.connector()?);
    Ok((client, connector, config.monitor_config()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("{}", voltage_plcvars::info());

    let (client, connector, config) = match std::env::args().nth(1) {
        Some(path) => file_setup(&path)?,
        None => {
            println!("No config file given, using the simulated demo PLC");
            demo_setup()?
        }
    };
    info!(
        "Monitoring {} variables via {}",
        client.map().len(),
        connector.describe()
    );

    let monitor = ConnectionMonitor::new(client.clone(), connector, config);
    let mut events = monitor.subscribe();
    monitor.start()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Ctrl-C received, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(MonitorEvent::ConnectionStatusChanged { connected, state }) => {
                    println!("Connection: {} (connected: {})", state, connected);
                }
                Ok(MonitorEvent::DataRead(snapshot)) => {
                    println!(
                        "[{}] device {} v{}",
                        snapshot.read_at.format("%H:%M:%S%.3f"),
                        snapshot.header.device_type,
                        snapshot.header.version
                    );
                    for entry in &snapshot.values {
                        println!("  {:<16} {}", entry.name, entry.value);
                    }
                }
                Ok(MonitorEvent::ReadError(errors)) => {
                    for failed in errors {
                        warn!("{}: {}", failed.name, failed.error);
                    }
                }
                Ok(MonitorEvent::TransportError(e)) => warn!("Transport error: {}", e),
                Ok(MonitorEvent::HeaderRejected(e)) => {
                    error!("PLC header rejected: {}", e);
                    break;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Skipped {} monitor events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    monitor.shutdown().await?;
    Ok(())
}
