//! Connection monitor
//!
//! A single background task that owns the connection lifecycle of one
//! [`PlcClient`]:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Reconnecting -> Connecting -> ...
//! ```
//!
//! - `Connecting` opens a transport through the [`TransportConnector`]. On
//!   success the client gets the session and a full read runs immediately; on
//!   failure the monitor waits one check interval and tries again.
//! - `Connected` waits one check interval, probes the first header register,
//!   and on success runs a full read. A transport failure moves to
//!   `Reconnecting`.
//! - `Reconnecting` closes the session and waits one check interval before
//!   `Connecting` again.
//! - A header that does not match the map (wrong device type or version) ends
//!   the task in `Disconnected`: retrying with the same map cannot succeed.
//!
//! Cycles run sequentially on the one task, so they never overlap. Stopping
//! interrupts a pending wait immediately; a transport call in flight is
//! allowed to finish first.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::client::PlcClient;
use crate::error::{PlcError, PlcResult};
use crate::reader::{ReadSnapshot, VariableError};
use crate::transport::TransportConnector;
use crate::utils::PerformanceMetrics;
use crate::{DEFAULT_CHECK_INTERVAL_MS, DEFAULT_EVENT_CAPACITY, DEFAULT_TIMEOUT_MS};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    /// Boolean projection exposed to consumers; only `Connected` counts
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Notifications published by the monitor
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// Emitted on every state transition
    ConnectionStatusChanged {
        connected: bool,
        state: ConnectionState,
    },
    /// A full read succeeded (possibly with per-variable errors)
    DataRead(ReadSnapshot),
    /// Variables that failed to decode in the last full read
    ReadError(Vec<VariableError>),
    /// Connect, probe or read failed at the transport level
    TransportError(PlcError),
    /// The PLC runs a project the map was not built for; the monitor stopped
    HeaderRejected(PlcError),
}

/// Monitor timing and buffering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub check_interval: Duration,
    pub connect_timeout: Duration,
    /// Capacity of the broadcast event channel
    pub event_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_millis(DEFAULT_CHECK_INTERVAL_MS),
            connect_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl MonitorConfig {
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// Background connection supervisor for one [`PlcClient`]
pub struct ConnectionMonitor {
    client: PlcClient,
    connector: Arc<dyn TransportConnector>,
    config: MonitorConfig,
    events: broadcast::Sender<MonitorEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    stop: watch::Sender<bool>,
    metrics: Arc<Mutex<PerformanceMetrics>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionMonitor {
    pub fn new(client: PlcClient, connector: Arc<dyn TransportConnector>, config: MonitorConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (state, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (stop, _) = watch::channel(false);
        Self {
            client,
            connector,
            config,
            events,
            state: Arc::new(state),
            state_rx,
            stop,
            metrics: Arc::new(Mutex::new(PerformanceMetrics::new())),
            worker: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &PlcClient {
        &self.client
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Spawn the monitor task.
    ///
    /// Subscribe before starting to observe the first transitions. A monitor
    /// runs once; starting it again, or after shutdown, is an error.
    pub fn start(&self) -> PlcResult<()> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| PlcError::internal("Failed to lock monitor worker"))?;
        if worker.is_some() || *self.stop.borrow() {
            return Err(PlcError::internal("Connection monitor already started"));
        }

        let task = Worker {
            client: self.client.clone(),
            connector: self.connector.clone(),
            config: self.config.clone(),
            events: self.events.clone(),
            state: self.state.clone(),
            stop: self.stop.subscribe(),
            metrics: self.metrics.clone(),
        };
        info!(
            "Starting connection monitor for {} (interval {:?})",
            self.connector.describe(),
            self.config.check_interval
        );
        *worker = Some(tokio::spawn(task.run()));
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Cycle timings of full reads
    pub fn metrics(&self) -> PerformanceMetrics {
        self.metrics
            .lock()
            .map(|metrics| metrics.clone())
            .unwrap_or_default()
    }

    /// Whether the monitor task is still running
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .map(|worker| worker.as_ref().map_or(false, |handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    /// Stop the task and wait for it to close the transport
    pub async fn shutdown(&self) -> PlcResult<()> {
        self.stop.send_replace(true);
        let handle = self
            .worker
            .lock()
            .map_err(|_| PlcError::internal("Failed to lock monitor worker"))?
            .take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| PlcError::internal(format!("Monitor task failed: {}", e)))?;
        }
        Ok(())
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}

struct Worker {
    client: PlcClient,
    connector: Arc<dyn TransportConnector>,
    config: MonitorConfig,
    events: broadcast::Sender<MonitorEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
    stop: watch::Receiver<bool>,
    metrics: Arc<Mutex<PerformanceMetrics>>,
}

impl Worker {
    async fn run(mut self) {
        let mut state = ConnectionState::Connecting;
        self.transition(state);

        while state != ConnectionState::Disconnected && !self.stop_requested() {
            let next = match state {
                ConnectionState::Connecting => self.connect().await,
                ConnectionState::Connected => {
                    if !self.wait().await {
                        break;
                    }
                    self.check().await
                }
                ConnectionState::Reconnecting => {
                    if let Err(e) = self.client.detach().await {
                        debug!("Error closing broken transport: {}", e);
                    }
                    if !self.wait().await {
                        break;
                    }
                    ConnectionState::Connecting
                }
                ConnectionState::Disconnected => break,
            };
            self.transition(next);
            state = next;
        }

        if let Err(e) = self.client.detach().await {
            debug!("Error closing transport on shutdown: {}", e);
        }
        self.transition(ConnectionState::Disconnected);
        info!("Connection monitor for {} stopped", self.connector.describe());
    }

    /// One connect attempt; stays in `Connecting` after waiting on failure
    async fn connect(&mut self) -> ConnectionState {
        let connect_timeout = self.config.connect_timeout;
        let attempt = tokio::select! {
            _ = wait_stop(self.stop.clone()) => return ConnectionState::Disconnected,
            result = timeout(connect_timeout, self.connector.connect()) => result,
        };

        let error = match attempt {
            Ok(Ok(transport)) => {
                self.client.attach(transport).await;
                info!("Connected to {}", self.connector.describe());
                self.transition(ConnectionState::Connected);
                return self.full_read().await;
            }
            Ok(Err(e)) => e,
            Err(_) => PlcError::timeout("connect", connect_timeout.as_millis() as u64),
        };

        warn!("Connect to {} failed: {}", self.connector.describe(), error);
        self.emit(MonitorEvent::TransportError(error));
        if !self.wait().await {
            return ConnectionState::Disconnected;
        }
        ConnectionState::Connecting
    }

    /// Liveness probe followed by a full read
    async fn check(&mut self) -> ConnectionState {
        match self.client.probe().await {
            Ok(()) => self.full_read().await,
            Err(e) => {
                warn!("Probe failed: {}", e);
                self.record(false, Duration::ZERO);
                self.emit(MonitorEvent::TransportError(e));
                ConnectionState::Reconnecting
            }
        }
    }

    async fn full_read(&mut self) -> ConnectionState {
        let started = Instant::now();
        match self.client.read_all().await {
            Ok(snapshot) => {
                self.record(true, started.elapsed());
                let errors = snapshot.errors.clone();
                self.emit(MonitorEvent::DataRead(snapshot));
                if !errors.is_empty() {
                    self.emit(MonitorEvent::ReadError(errors));
                }
                ConnectionState::Connected
            }
            Err(e) if e.is_fatal_for_connection() => {
                self.record(false, started.elapsed());
                warn!("PLC header rejected: {}", e);
                self.emit(MonitorEvent::HeaderRejected(e));
                ConnectionState::Disconnected
            }
            Err(e) => {
                self.record(false, started.elapsed());
                warn!("Full read failed: {}", e);
                let transport_failed = e.is_transport_error();
                self.emit(MonitorEvent::TransportError(e));
                if transport_failed {
                    ConnectionState::Reconnecting
                } else {
                    ConnectionState::Connected
                }
            }
        }
    }

    fn transition(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!("Connection state -> {}", next);
            self.emit(MonitorEvent::ConnectionStatusChanged {
                connected: next.is_connected(),
                state: next,
            });
        }
    }

    fn emit(&self, event: MonitorEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn record(&self, success: bool, duration: Duration) {
        if let Ok(mut metrics) = self.metrics.lock() {
            if success {
                metrics.record_success(duration);
            } else {
                metrics.record_failure(duration);
            }
        }
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    /// Sleep one check interval; `false` when stopped meanwhile
    async fn wait(&mut self) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.config.check_interval) => !self.stop_requested(),
            _ = wait_stop(self.stop.clone()) => false,
        }
    }
}

async fn wait_stop(mut stop_rx: watch::Receiver<bool>) {
    loop {
        if *stop_rx.borrow() {
            return;
        }
        if stop_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{Header, HeaderExpectation};
    use crate::register_bank::RegisterBank;
    use crate::value::ValueType;
    use crate::variable_map::{VariableDescriptor, VariableMap};

    fn fast_config() -> MonitorConfig {
        MonitorConfig::default()
            .with_check_interval(Duration::from_millis(10))
            .with_connect_timeout(Duration::from_millis(200))
    }

    fn monitor(bank: &RegisterBank) -> ConnectionMonitor {
        let map = VariableMap::from_descriptors([VariableDescriptor::new("Level", ValueType::UInt16, 2)]).unwrap();
        let client = PlcClient::new(map, HeaderExpectation::exact(1, 1), 1);
        ConnectionMonitor::new(client, Arc::new(bank.clone()), fast_config())
    }

    async fn next_event(events: &mut broadcast::Receiver<MonitorEvent>) -> MonitorEvent {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[test]
    fn test_state_projection() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Reconnecting.is_connected());
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }

    #[tokio::test]
    async fn test_connects_and_reads_immediately() {
        let bank = RegisterBank::new();
        bank.write_registers(0, &[1, 1, 77]).unwrap();
        let monitor = monitor(&bank);
        let mut events = monitor.subscribe();
        monitor.start().unwrap();

        assert!(matches!(
            next_event(&mut events).await,
            MonitorEvent::ConnectionStatusChanged { connected: false, state: ConnectionState::Connecting }
        ));
        assert!(matches!(
            next_event(&mut events).await,
            MonitorEvent::ConnectionStatusChanged { connected: true, state: ConnectionState::Connected }
        ));
        match next_event(&mut events).await {
            MonitorEvent::DataRead(snapshot) => {
                assert_eq!(snapshot.get("Level"), Some(&crate::Value::UInt16(77)));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(monitor.is_connected());
        assert!(monitor.metrics().successful_cycles >= 1);

        monitor.shutdown().await.unwrap();
        assert_eq!(monitor.state(), ConnectionState::Disconnected);
        assert!(!monitor.client().is_attached().await);
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_header_rejection_stops_monitor() {
        let bank = RegisterBank::new();
        bank.set_header(Header::new(2, 1)).unwrap();
        let monitor = monitor(&bank);
        let mut events = monitor.subscribe();
        monitor.start().unwrap();

        let rejected = loop {
            if let MonitorEvent::HeaderRejected(e) = next_event(&mut events).await {
                break e;
            }
        };
        assert_eq!(rejected, PlcError::device_type_mismatch(1, 2));

        let mut state = monitor.watch_state();
        timeout(Duration::from_secs(2), state.wait_for(|s| *s == ConnectionState::Disconnected))
            .await
            .unwrap()
            .unwrap();
        monitor.shutdown().await.unwrap();
        assert!(!monitor.client().is_attached().await);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let bank = RegisterBank::new();
        bank.set_offline(true);
        let monitor = monitor(&bank);
        monitor.start().unwrap();
        assert!(monitor.start().is_err());
        monitor.shutdown().await.unwrap();
        assert!(monitor.start().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_wait() {
        let bank = RegisterBank::new();
        bank.set_header(Header::new(1, 1)).unwrap();
        let map = VariableMap::new();
        let client = PlcClient::new(map, HeaderExpectation::exact(1, 1), 1);
        let config = fast_config().with_check_interval(Duration::from_secs(3600));
        let monitor = ConnectionMonitor::new(client, Arc::new(bank.clone()), config);
        let mut state = monitor.watch_state();
        monitor.start().unwrap();

        timeout(Duration::from_secs(2), state.wait_for(|s| s.is_connected()))
            .await
            .unwrap()
            .unwrap();
        timeout(Duration::from_secs(2), monitor.shutdown())
            .await
            .expect("shutdown waited for the check interval")
            .unwrap();
    }
}
