//! Integration Tests for Voltage PLC Vars
//!
//! End-to-end scenarios: client, reader, writer and monitor working together
//! against the simulated PLC.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::{sleep, timeout};
use voltage_plcvars::utils::logging::init_test_logger;
use voltage_plcvars::*;

fn fast_monitor_config() -> MonitorConfig {
    MonitorConfig::default()
        .with_check_interval(Duration::from_millis(10))
        .with_connect_timeout(Duration::from_millis(200))
}

/// Map of the PLC project used throughout these tests
fn plant_map() -> VariableMap {
    let mode = EnumType::new("Mode", ValueType::UInt16, [("Off", 0), ("Auto", 1), ("Manual", 2)]).unwrap();
    VariableMap::from_descriptors([
        VariableDescriptor::new("Running", ValueType::Bool, 2),
        VariableDescriptor::new("Setpoint", ValueType::Float32, 3),
        VariableDescriptor::new("Mode", ValueType::Enum(mode), 5),
        VariableDescriptor::string("Station", 6, 6),
    ])
    .unwrap()
}

fn plant_bank() -> RegisterBank {
    let bank = RegisterBank::new();
    bank.set_header(Header::new(7, 3)).unwrap();
    // Setpoint 21.5, Mode Auto, Station "A1"
    bank.write_registers(2, &[1, 0x41AC, 0x0000, 1, 2, b'A' as u16, b'1' as u16])
        .unwrap();
    bank
}

async fn plant_client(bank: &RegisterBank) -> PlcClient {
    let client = PlcClient::new(plant_map(), HeaderExpectation::new(7, 2, 4), 1);
    client.attach(bank.connect().await.unwrap()).await;
    client
}

async fn next_event(events: &mut broadcast::Receiver<MonitorEvent>) -> MonitorEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// States of every status event received so far
fn drain_states(events: &mut broadcast::Receiver<MonitorEvent>) -> Vec<ConnectionState> {
    let mut states = Vec::new();
    loop {
        match events.try_recv() {
            Ok(MonitorEvent::ConnectionStatusChanged { state, .. }) => states.push(state),
            Ok(_) => {}
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return states,
        }
    }
}

#[tokio::test]
async fn test_example_project_decode() {
    init_test_logger();

    let bank = RegisterBank::new();
    bank.write_registers(0, &[1, 11, 1, 13]).unwrap();
    let map = VariableMap::from_descriptors([
        VariableDescriptor::new("BoolVar", ValueType::Bool, 2),
        VariableDescriptor::new("ByteVar", ValueType::UInt8, 3),
    ])
    .unwrap();
    let client = PlcClient::new(map, HeaderExpectation::new(1, 10, 12), 1);
    client.attach(bank.connect().await.unwrap()).await;

    assert_eq!(client.read_window(), AddressWindow::new(0, 4));
    let snapshot = client.read_all().await.unwrap();
    assert_eq!(snapshot.header, Header::new(1, 11));
    assert_eq!(snapshot.get("BoolVar"), Some(&Value::Bool(true)));
    assert_eq!(snapshot.get("ByteVar"), Some(&Value::UInt8(13)));
    assert_eq!(bank.read_count(), 1);
}

#[tokio::test]
async fn test_full_read_of_plant() {
    let bank = plant_bank();
    let client = plant_client(&bank).await;

    let snapshot = client.read_all().await.unwrap();
    assert!(snapshot.is_complete());
    assert_eq!(snapshot.get("Setpoint"), Some(&Value::Float32(21.5)));
    assert_eq!(
        snapshot.get("Mode"),
        Some(&Value::Enum { name: "Auto".into(), value: 1 })
    );
    assert_eq!(snapshot.get("Station"), Some(&Value::from("A1")));

    let running = client.variable::<bool>("Running").unwrap();
    assert!(running.get(&snapshot).unwrap());
}

#[tokio::test]
async fn test_bad_variable_does_not_hide_the_others() {
    let bank = plant_bank();
    bank.write_registers(5, &[9]).unwrap();
    let client = plant_client(&bank).await;

    let snapshot = client.read_all().await.unwrap();
    assert_eq!(snapshot.errors.len(), 1);
    assert_eq!(snapshot.error("Mode"), Some(&PlcError::unknown_enum_value("Mode", 9)));
    assert_eq!(snapshot.values.len(), 3);
    assert_eq!(snapshot.get("Running"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn test_header_gate() {
    let bank = plant_bank();
    let client = plant_client(&bank).await;

    bank.set_header(Header::new(7, 5)).unwrap();
    assert_eq!(
        client.read_all().await.unwrap_err(),
        PlcError::unsupported_version(5, 2, 4)
    );

    bank.set_header(Header::new(8, 3)).unwrap();
    let err = client.read_all().await.unwrap_err();
    assert_eq!(err, PlcError::device_type_mismatch(7, 8));
    assert!(err.is_fatal_for_connection());
    assert!(client.confirmed_value("Setpoint").is_none());
}

#[tokio::test]
async fn test_differential_write() {
    let bank = plant_bank();
    let client = plant_client(&bank).await;
    client.read_all().await.unwrap();

    // same as the PLC: dropped
    assert!(!client.stage("Setpoint", 21.5).unwrap());
    assert!(client.flush().await.unwrap().is_empty());
    assert_eq!(bank.write_count(), 0);

    assert!(client.stage("Setpoint", 22.0).unwrap());
    let report = client.flush().await.unwrap();
    assert_eq!(report.requests(), 1);
    assert_eq!(bank.write_count(), 1);
    assert_eq!(
        bank.write_log(),
        vec![WriteRecord { slave: 1, start: 3, values: vec![0x41B0, 0x0000] }]
    );
    assert_eq!(client.confirmed_value("Setpoint"), Some(Value::Float32(22.0)));

    // nothing left to write
    assert!(client.flush().await.unwrap().is_empty());
    assert_eq!(bank.write_count(), 1);
}

#[tokio::test]
async fn test_adjacent_changes_share_one_request() {
    let bank = plant_bank();
    let client = plant_client(&bank).await;

    client.stage("Running", false).unwrap();
    client.stage("Setpoint", 30.0).unwrap();
    client.stage("Mode", "Manual").unwrap();
    client.stage("Station", "B").unwrap();

    let pending = client.pending_changes().unwrap();
    assert_eq!(
        pending.iter().map(|change| change.address).collect::<Vec<_>>(),
        vec![2, 3, 5, 6]
    );

    let report = client.flush().await.unwrap();
    assert_eq!(report.requests(), 1);
    assert_eq!(report.variables(), 4);
    assert_eq!(bank.write_count(), 1);

    let snapshot = client.read_all().await.unwrap();
    assert_eq!(snapshot.get("Running"), Some(&Value::Bool(false)));
    assert_eq!(
        snapshot.get("Mode"),
        Some(&Value::Enum { name: "Manual".into(), value: 2 })
    );
    assert_eq!(snapshot.get("Station"), Some(&Value::from("B")));
}

#[tokio::test]
async fn test_staging_errors_surface_immediately() {
    let client = PlcClient::new(plant_map(), HeaderExpectation::exact(7, 3), 1);

    assert_eq!(
        client.stage("Missing", 1).unwrap_err(),
        PlcError::unknown_variable("Missing")
    );
    assert!(matches!(
        client.stage("Station", "much too long").unwrap_err(),
        PlcError::StringTooLong { .. }
    ));
    assert!(matches!(
        client.stage("Mode", "Turbo").unwrap_err(),
        PlcError::Conversion { .. }
    ));
    assert_eq!(
        client.stage("Mode", 7).unwrap_err(),
        PlcError::unknown_enum_value("Mode", 7)
    );
    assert!(!client.has_pending_changes());
}

#[tokio::test]
async fn test_failed_flush_retries_next_time() {
    let bank = plant_bank();
    let client = plant_client(&bank).await;

    client.stage("Setpoint", 18.0).unwrap();
    bank.fail_next_writes(1);
    assert!(client.flush().await.unwrap_err().is_transport_error());
    assert!(client.has_pending_changes());

    client.flush().await.unwrap();
    assert!(!client.has_pending_changes());
    assert_eq!(bank.read_holding_registers(3, 2).unwrap(), vec![0x4190, 0x0000]);
}

#[tokio::test]
async fn test_monitor_recovers_after_read_failures() {
    init_test_logger();

    let bank = plant_bank();
    let client = PlcClient::new(plant_map(), HeaderExpectation::new(7, 2, 4), 1);
    let monitor = ConnectionMonitor::new(client, Arc::new(bank.clone()), fast_monitor_config());
    let mut events = monitor.subscribe();
    let mut state = monitor.watch_state();
    monitor.start().unwrap();

    timeout(Duration::from_secs(2), state.wait_for(|s| s.is_connected()))
        .await
        .unwrap()
        .unwrap();
    drain_states(&mut events);

    bank.fail_next_reads(3);
    let mut states = Vec::new();
    let mut failures = 0;
    while failures < 3 {
        match next_event(&mut events).await {
            MonitorEvent::TransportError(_) => failures += 1,
            MonitorEvent::ConnectionStatusChanged { connected, state } => {
                assert_eq!(connected, state.is_connected());
                states.push(state);
            }
            _ => {}
        }
    }
    timeout(Duration::from_secs(2), state.wait_for(|s| s.is_connected()))
        .await
        .unwrap()
        .unwrap();
    // a few healthy cycles
    sleep(Duration::from_millis(100)).await;
    states.extend(drain_states(&mut events));

    // probe failure, then two failed full reads right after reconnecting
    let cycle = [
        ConnectionState::Reconnecting,
        ConnectionState::Connecting,
        ConnectionState::Connected,
    ];
    let expected: Vec<ConnectionState> = cycle.iter().copied().cycle().take(9).collect();
    assert_eq!(states, expected);
    assert!(monitor.is_connected());

    monitor.shutdown().await.unwrap();
    assert_eq!(monitor.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_monitor_retries_connect() {
    let bank = plant_bank();
    bank.fail_next_connects(3);
    let client = PlcClient::new(plant_map(), HeaderExpectation::new(7, 2, 4), 1);
    let monitor = ConnectionMonitor::new(client.clone(), Arc::new(bank.clone()), fast_monitor_config());
    let mut events = monitor.subscribe();
    monitor.start().unwrap();

    let mut transport_errors = 0;
    let snapshot = loop {
        match next_event(&mut events).await {
            MonitorEvent::TransportError(_) => transport_errors += 1,
            MonitorEvent::DataRead(snapshot) => break snapshot,
            _ => {}
        }
    };
    assert_eq!(transport_errors, 3);
    assert_eq!(bank.connect_count(), 4);
    assert_eq!(snapshot.get("Setpoint"), Some(&Value::Float32(21.5)));

    // the client is shared with the monitor and now attached
    client.stage("Setpoint", 23.0).unwrap();
    assert_eq!(client.flush().await.unwrap().requests(), 1);

    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_monitor_rejects_wrong_project() {
    let bank = plant_bank();
    bank.set_header(Header::new(99, 1)).unwrap();
    let client = PlcClient::new(plant_map(), HeaderExpectation::new(7, 2, 4), 1);
    let monitor = ConnectionMonitor::new(client.clone(), Arc::new(bank.clone()), fast_monitor_config());
    let mut events = monitor.subscribe();
    monitor.start().unwrap();

    let rejected = loop {
        match next_event(&mut events).await {
            MonitorEvent::HeaderRejected(e) => break e,
            MonitorEvent::DataRead(_) => panic!("values decoded despite wrong header"),
            _ => {}
        }
    };
    assert_eq!(rejected, PlcError::device_type_mismatch(7, 99));

    let mut state = monitor.watch_state();
    timeout(Duration::from_secs(2), state.wait_for(|s| *s == ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(bank.connect_count(), 1);
    assert!(!client.is_attached().await);
    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_client_from_config() {
    let config = PlcConfig::from_yaml_str(
        r#"
endpoint: "127.0.0.1:1502"
header: { device_type: 7, min_version: 2, max_version: 4 }
variables:
  - { name: Running, type: { kind: bool }, address: 2 }
  - { name: Setpoint, type: { kind: real }, address: 3 }
"#,
    )
    .unwrap();
    assert_eq!(config.connector().unwrap().address().port(), 1502);

    let bank = plant_bank();
    let client = config.build_client().unwrap();
    client.attach(bank.connect().await.unwrap()).await;

    let setpoint = client.variable::<f32>("Setpoint").unwrap();
    let snapshot = client.read_all().await.unwrap();
    assert_eq!(setpoint.get(&snapshot).unwrap(), 21.5);
}

#[test]
fn test_logger_sees_register_traffic() {
    let lines = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = lines.clone();
    let callback: LogCallback = Box::new(move |_level, message| {
        sink.lock().unwrap().push(message.to_string());
    });
    let logger = custom_logger!(callback, LogLevel::Info);

    tokio_test::block_on(async {
        let bank = plant_bank();
        let client = PlcClient::with_logger(plant_map(), HeaderExpectation::new(7, 2, 4), 1, logger);
        client.attach(bank.connect().await.unwrap()).await;
        client.read_all().await.unwrap();
        client.stage("Running", false).unwrap();
        client.flush().await.unwrap();
    });

    let lines = lines.lock().unwrap();
    assert!(lines.iter().any(|l| l.starts_with("Read <- Slave: 1, Address: 0, Quantity: 13")));
    assert!(lines.iter().any(|l| l.starts_with("Snapshot <- Device: 7, Version: 3")));
    assert!(lines.iter().any(|l| l.starts_with("Write -> Slave: 1, Address: 2, Quantity: 1")));
}

#[test]
fn test_library_info() {
    assert!(info().contains(VERSION));
    assert_eq!(MAX_REGISTERS_PER_REQUEST, 125);
}
