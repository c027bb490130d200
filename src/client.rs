/// High-level PLC client
///
/// This module ties the variable map, batched reader and differential writer
/// to one transport session. The session sits behind a single async lock, so
/// on-demand calls from the application and the connection monitor's cycles
/// never interleave requests on the wire.
///
/// The client does not connect by itself: a transport is attached either by
/// the application or by the [`ConnectionMonitor`](crate::monitor::ConnectionMonitor).

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{PlcError, PlcResult};
use crate::header::{self, Header, HeaderExpectation, HEADER_ADDRESS};
use crate::logging::CallbackLogger;
use crate::reader::{BatchedReader, ReadSnapshot};
use crate::transport::{RegisterTransport, SlaveId, TransportStats};
use crate::typed::{PlcType, TypedVariable};
use crate::utils::{OperationTimer, PerformanceMetrics};
use crate::value::Value;
use crate::variable_map::{AddressWindow, VariableMap};
use crate::writer::{DifferentialWriter, FlushReport, PendingChange};

type SharedTransport = Mutex<Option<Box<dyn RegisterTransport>>>;

struct ClientInner {
    reader: BatchedReader,
    writer: DifferentialWriter,
    slave_id: SlaveId,
    transport: SharedTransport,
    logger: Option<CallbackLogger>,
    /// Timings of on-demand reads and flushes
    metrics: StdMutex<PerformanceMetrics>,
}

/// Cloneable handle to one PLC: map, header expectation, pending writes and
/// the transport session
#[derive(Clone)]
pub struct PlcClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for PlcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlcClient")
            .field("slave_id", &self.inner.slave_id)
            .field("variables", &self.inner.reader.map().len())
            .field("window", &self.inner.reader.window())
            .finish()
    }
}

impl PlcClient {
    /// Create a client without a transport
    pub fn new(map: impl Into<Arc<VariableMap>>, expected: HeaderExpectation, slave_id: SlaveId) -> Self {
        Self::build(map.into(), expected, slave_id, None)
    }

    /// Create a client that reports register traffic to `logger`
    pub fn with_logger(
        map: impl Into<Arc<VariableMap>>,
        expected: HeaderExpectation,
        slave_id: SlaveId,
        logger: CallbackLogger,
    ) -> Self {
        Self::build(map.into(), expected, slave_id, Some(logger))
    }

    fn build(
        map: Arc<VariableMap>,
        expected: HeaderExpectation,
        slave_id: SlaveId,
        logger: Option<CallbackLogger>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                reader: BatchedReader::new(map.clone(), expected),
                writer: DifferentialWriter::new(map),
                slave_id,
                transport: Mutex::new(None),
                logger,
                metrics: StdMutex::new(PerformanceMetrics::new()),
            }),
        }
    }

    pub fn map(&self) -> &Arc<VariableMap> {
        self.inner.reader.map()
    }

    pub fn expected_header(&self) -> &HeaderExpectation {
        self.inner.reader.expected()
    }

    pub fn slave_id(&self) -> SlaveId {
        self.inner.slave_id
    }

    /// Register window read by [`read_all`](Self::read_all)
    pub fn read_window(&self) -> AddressWindow {
        self.inner.reader.window()
    }

    /// Install a transport session, closing any previous one
    pub async fn attach(&self, transport: Box<dyn RegisterTransport>) {
        let mut guard = self.inner.transport.lock().await;
        if let Some(mut previous) = guard.replace(transport) {
            if let Err(e) = previous.close().await {
                warn!("Error closing replaced transport: {}", e);
            }
        }
    }

    /// Remove and close the transport session, if any
    pub async fn detach(&self) -> PlcResult<()> {
        let previous = self.inner.transport.lock().await.take();
        match previous {
            Some(mut transport) => transport.close().await,
            None => Ok(()),
        }
    }

    pub async fn is_attached(&self) -> bool {
        self.inner.transport.lock().await.is_some()
    }

    /// Statistics of the attached transport
    pub async fn transport_stats(&self) -> Option<TransportStats> {
        self.inner
            .transport
            .lock()
            .await
            .as_ref()
            .map(|transport| transport.get_stats())
    }

    /// Read and decode the header block without validating it
    pub async fn read_header(&self) -> PlcResult<Header> {
        let mut guard = self.inner.transport.lock().await;
        let transport = attached(&mut guard)?;
        let header = header::read_header(transport.as_mut(), self.inner.slave_id).await?;
        if let Some(logger) = &self.inner.logger {
            logger.log_read(self.inner.slave_id, HEADER_ADDRESS, &header.encode());
        }
        Ok(header)
    }

    /// Minimal liveness check: read the first header register
    pub async fn probe(&self) -> PlcResult<()> {
        let mut guard = self.inner.transport.lock().await;
        let transport = attached(&mut guard)?;
        let registers = transport
            .read_registers(self.inner.slave_id, HEADER_ADDRESS, 1)
            .await?;
        if registers.len() != 1 {
            return Err(PlcError::protocol(format!(
                "Probe returned {} registers",
                registers.len()
            )));
        }
        Ok(())
    }

    /// Read the header and every variable from the configured slave
    pub async fn read_all(&self) -> PlcResult<ReadSnapshot> {
        self.read_all_from(self.inner.slave_id).await
    }

    /// Read the header and every variable from `slave`.
    ///
    /// Decoded values become the writer's last confirmed values.
    pub async fn read_all_from(&self, slave: SlaveId) -> PlcResult<ReadSnapshot> {
        let timer = OperationTimer::start("read_all");
        let result = self.read_and_decode(slave).await;
        self.record(timer, result.is_ok());
        result
    }

    async fn read_and_decode(&self, slave: SlaveId) -> PlcResult<ReadSnapshot> {
        let registers = {
            let mut guard = self.inner.transport.lock().await;
            let transport = attached(&mut guard)?;
            self.inner.reader.read_raw(transport.as_mut(), slave).await?
        };
        if let Some(logger) = &self.inner.logger {
            logger.log_read(slave, self.inner.reader.window().start, &registers);
        }

        let snapshot = self.inner.reader.decode(&registers)?;
        self.inner.writer.observe(&snapshot)?;
        if let Some(logger) = &self.inner.logger {
            logger.log_snapshot(&snapshot);
        }
        Ok(snapshot)
    }

    /// Stage a value for the next flush; see [`DifferentialWriter::stage`]
    pub fn stage(&self, name: &str, value: impl Into<Value>) -> PlcResult<bool> {
        self.inner.writer.stage(name, value)
    }

    /// Drop a staged value
    pub fn discard(&self, name: &str) -> PlcResult<bool> {
        self.inner.writer.discard(name)
    }

    pub fn pending_changes(&self) -> PlcResult<Vec<PendingChange>> {
        self.inner.writer.pending()
    }

    pub fn has_pending_changes(&self) -> bool {
        self.inner.writer.has_pending()
    }

    /// Last value read from or written to the PLC for `name`
    pub fn confirmed_value(&self, name: &str) -> Option<Value> {
        self.inner.writer.confirmed(name)
    }

    /// Write staged values to the configured slave
    pub async fn flush(&self) -> PlcResult<FlushReport> {
        self.flush_to(self.inner.slave_id).await
    }

    /// Write staged values to `slave`.
    ///
    /// With nothing staged no request is sent and no transport is required.
    pub async fn flush_to(&self, slave: SlaveId) -> PlcResult<FlushReport> {
        if !self.inner.writer.has_pending() {
            return Ok(FlushReport::default());
        }

        let timer = OperationTimer::start("flush");
        let flushed = {
            let mut guard = self.inner.transport.lock().await;
            match attached(&mut guard) {
                Ok(transport) => self.inner.writer.flush(transport.as_mut(), slave).await,
                Err(e) => Err(e),
            }
        };
        self.record(timer, flushed.is_ok());
        let report = flushed?;
        if let Some(logger) = &self.inner.logger {
            logger.log_flush(slave, &report);
        }
        debug!("Flush to slave {} wrote {} registers", slave, report.registers());
        Ok(report)
    }

    /// Timings of [`read_all`](Self::read_all) calls and of flushes with
    /// something staged
    pub fn operation_metrics(&self) -> PerformanceMetrics {
        self.inner
            .metrics
            .lock()
            .map(|metrics| metrics.clone())
            .unwrap_or_default()
    }

    fn record(&self, timer: OperationTimer, success: bool) {
        let duration = timer.stop_and_log(success);
        if let Ok(mut metrics) = self.inner.metrics.lock() {
            if success {
                metrics.record_success(duration);
            } else {
                metrics.record_failure(duration);
            }
        }
    }

    /// Typed handle to one variable of the map
    pub fn variable<T: PlcType>(&self, name: &str) -> PlcResult<TypedVariable<T>> {
        TypedVariable::bind(self.map(), name)
    }
}

fn attached<'a>(
    guard: &'a mut Option<Box<dyn RegisterTransport>>,
) -> PlcResult<&'a mut Box<dyn RegisterTransport>> {
    guard
        .as_mut()
        .ok_or_else(|| PlcError::connection("No transport attached"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register_bank::RegisterBank;
    use crate::transport::TransportConnector;
    use crate::value::ValueType;
    use crate::variable_map::VariableDescriptor;

    fn client() -> PlcClient {
        let map = VariableMap::from_descriptors([
            VariableDescriptor::new("Temp", ValueType::Float32, 2),
            VariableDescriptor::new("Running", ValueType::Bool, 4),
        ])
        .unwrap();
        PlcClient::new(map, HeaderExpectation::new(5, 1, 2), 1)
    }

    async fn attached_client(bank: &RegisterBank) -> PlcClient {
        bank.set_header(Header::new(5, 2)).unwrap();
        let client = client();
        client.attach(bank.connect().await.unwrap()).await;
        client
    }

    #[tokio::test]
    async fn test_calls_without_transport_fail() {
        let client = client();
        assert!(matches!(client.read_all().await, Err(PlcError::Connection { .. })));
        assert!(matches!(client.probe().await, Err(PlcError::Connection { .. })));

        // nothing staged: no transport needed
        assert!(client.flush().await.unwrap().is_empty());

        client.stage("Running", true).unwrap();
        assert!(matches!(client.flush().await, Err(PlcError::Connection { .. })));
        assert!(client.has_pending_changes());
    }

    #[tokio::test]
    async fn test_read_all_confirms_values() {
        let bank = RegisterBank::new();
        bank.write_registers(2, &[0x41CC, 0x0000, 1]).unwrap();
        let client = attached_client(&bank).await;

        let snapshot = client.read_all().await.unwrap();
        assert_eq!(snapshot.get("Temp"), Some(&Value::Float32(25.5)));
        assert_eq!(client.confirmed_value("Running"), Some(Value::Bool(true)));

        // equal to what the PLC holds: nothing to write
        assert!(!client.stage("Temp", 25.5).unwrap());
        assert!(client.flush().await.unwrap().is_empty());
        assert_eq!(bank.write_count(), 0);
    }

    #[tokio::test]
    async fn test_flush_through_client() {
        let bank = RegisterBank::new();
        let client = attached_client(&bank).await;

        client.stage("Temp", 21.5).unwrap();
        client.stage("Temp", 22.0).unwrap();
        let report = client.flush().await.unwrap();
        assert_eq!(report.requests(), 1);
        assert_eq!(bank.read_holding_registers(2, 2).unwrap(), vec![0x41B0, 0x0000]);
        assert_eq!(bank.write_count(), 1);
    }

    #[tokio::test]
    async fn test_header_and_probe() {
        let bank = RegisterBank::new();
        let client = attached_client(&bank).await;

        assert_eq!(client.read_header().await.unwrap(), Header::new(5, 2));
        client.probe().await.unwrap();

        bank.fail_next_reads(1);
        assert!(client.probe().await.unwrap_err().is_transport_error());

        client.detach().await.unwrap();
        assert!(!client.is_attached().await);
        assert!(client.transport_stats().await.is_none());
    }

    #[tokio::test]
    async fn test_header_mismatch_reported() {
        let bank = RegisterBank::new();
        let client = attached_client(&bank).await;
        bank.set_header(Header::new(6, 2)).unwrap();

        assert_eq!(
            client.read_all().await.unwrap_err(),
            PlcError::device_type_mismatch(5, 6)
        );
    }

    #[tokio::test]
    async fn test_operation_metrics() {
        let bank = RegisterBank::new();
        let client = attached_client(&bank).await;
        assert_eq!(client.operation_metrics().total_cycles, 0);

        client.read_all().await.unwrap();
        client.stage("Running", true).unwrap();
        client.flush().await.unwrap();
        // empty flush is not timed
        client.flush().await.unwrap();

        bank.fail_next_reads(1);
        assert!(client.read_all().await.is_err());

        let metrics = client.operation_metrics();
        assert_eq!(metrics.total_cycles, 3);
        assert_eq!(metrics.successful_cycles, 2);
        assert_eq!(metrics.failed_cycles, 1);
        assert!(metrics.last_duration.is_some());
    }
}
