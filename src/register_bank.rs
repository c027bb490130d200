/// Simulated PLC register bank
///
/// This module provides thread-safe holding-register storage that implements
/// the transport traits, so the reader, writer and connection monitor can be
/// driven without a real PLC. Faults can be injected per operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{PlcError, PlcResult};
use crate::header::{Header, HEADER_ADDRESS};
use crate::transport::{RegisterTransport, SlaveId, TransportConnector, TransportStats};

/// One write received by the bank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub slave: SlaveId,
    pub start: u16,
    pub values: Vec<u16>,
}

/// In-memory holding registers shared by every transport it hands out
///
/// Cloning is cheap; clones share the same storage, counters and faults.
/// Unset registers read as zero.
#[derive(Debug, Clone, Default)]
pub struct RegisterBank {
    holding_registers: Arc<RwLock<HashMap<u16, u16>>>,
    write_log: Arc<Mutex<Vec<WriteRecord>>>,
    faults: Arc<Faults>,
    counters: Arc<Counters>,
    latency: Option<Duration>,
}

#[derive(Debug, Default)]
struct Faults {
    offline: AtomicBool,
    connect_failures: AtomicU32,
    read_failures: AtomicU32,
    write_failures: AtomicU32,
}

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
}

/// Consume one pending injected failure, if any
fn take_fault(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl RegisterBank {
    /// Create a new register bank with all registers zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every read and write by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Read holding registers starting at address
    pub fn read_holding_registers(&self, address: u16, quantity: u16) -> PlcResult<Vec<u16>> {
        let registers = self
            .holding_registers
            .read()
            .map_err(|_| PlcError::internal("Failed to lock holding registers"))?;
        let mut result = Vec::with_capacity(quantity as usize);

        for i in 0..quantity {
            let addr = address.wrapping_add(i);
            result.push(registers.get(&addr).copied().unwrap_or(0));
        }

        Ok(result)
    }

    /// Write consecutive holding registers without going through a transport
    pub fn write_registers(&self, address: u16, values: &[u16]) -> PlcResult<()> {
        let mut registers = self
            .holding_registers
            .write()
            .map_err(|_| PlcError::internal("Failed to lock holding registers"))?;
        for (i, &value) in values.iter().enumerate() {
            let addr = address.wrapping_add(i as u16);
            registers.insert(addr, value);
        }
        Ok(())
    }

    /// Store the project header in registers 0 and 1
    pub fn set_header(&self, header: Header) -> PlcResult<()> {
        self.write_registers(HEADER_ADDRESS, &header.encode())
    }

    /// Every write received through a transport, oldest first
    pub fn write_log(&self) -> Vec<WriteRecord> {
        self.write_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn clear_write_log(&self) {
        if let Ok(mut log) = self.write_log.lock() {
            log.clear();
        }
    }

    /// While offline, connects fail and open transports stop answering
    pub fn set_offline(&self, offline: bool) {
        self.faults.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fail_next_connects(&self, count: u32) {
        self.faults.connect_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_reads(&self, count: u32) {
        self.faults.read_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_writes(&self, count: u32) {
        self.faults.write_failures.store(count, Ordering::SeqCst);
    }

    /// Number of connect attempts, failed ones included
    pub fn connect_count(&self) -> u64 {
        self.counters.connects.load(Ordering::SeqCst)
    }

    /// Number of read requests received, failed ones included
    pub fn read_count(&self) -> u64 {
        self.counters.reads.load(Ordering::SeqCst)
    }

    /// Number of write requests received, failed ones included
    pub fn write_count(&self) -> u64 {
        self.counters.writes.load(Ordering::SeqCst)
    }

    /// Get register bank statistics
    pub fn get_stats(&self) -> RegisterBankStats {
        RegisterBankStats {
            holding_registers_count: self
                .holding_registers
                .read()
                .map(|registers| registers.len())
                .unwrap_or(0),
            connects: self.connect_count(),
            reads: self.read_count(),
            writes: self.write_count(),
        }
    }

    fn is_offline(&self) -> bool {
        self.faults.offline.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

/// Register bank statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBankStats {
    pub holding_registers_count: usize,
    pub connects: u64,
    pub reads: u64,
    pub writes: u64,
}

#[async_trait]
impl TransportConnector for RegisterBank {
    async fn connect(&self) -> PlcResult<Box<dyn RegisterTransport>> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        if self.is_offline() || take_fault(&self.faults.connect_failures) {
            return Err(PlcError::connection("Simulated PLC refused the connection"));
        }
        debug!("Simulated PLC accepted a connection");
        Ok(Box::new(BankTransport::new(self.clone())))
    }

    fn describe(&self) -> String {
        "simulated PLC".to_string()
    }
}

/// Transport session to a [`RegisterBank`]
#[derive(Debug)]
pub struct BankTransport {
    bank: RegisterBank,
    connected: bool,
    stats: TransportStats,
}

impl BankTransport {
    pub fn new(bank: RegisterBank) -> Self {
        Self {
            bank,
            connected: true,
            stats: TransportStats::default(),
        }
    }

    fn check_link(&mut self) -> PlcResult<()> {
        if !self.connected {
            return Err(PlcError::connection("Transport is closed"));
        }
        if self.bank.is_offline() {
            self.connected = false;
            return Err(PlcError::io("Simulated PLC is offline"));
        }
        Ok(())
    }

    fn fail(&mut self, error: PlcError) -> PlcError {
        self.stats.errors += 1;
        error
    }
}

#[async_trait]
impl RegisterTransport for BankTransport {
    async fn read_registers(&mut self, _slave: SlaveId, start: u16, count: u16) -> PlcResult<Vec<u16>> {
        self.bank.counters.reads.fetch_add(1, Ordering::SeqCst);
        self.stats.requests_sent += 1;
        self.bank.simulate_latency().await;

        if let Err(e) = self.check_link() {
            return Err(self.fail(e));
        }
        if take_fault(&self.bank.faults.read_failures) {
            return Err(self.fail(PlcError::io("Injected read failure")));
        }
        if start as u32 + count as u32 > 65536 {
            return Err(self.fail(PlcError::exception("Illegal data address")));
        }

        let registers = self.bank.read_holding_registers(start, count)?;
        self.stats.responses_received += 1;
        self.stats.registers_read += registers.len() as u64;
        Ok(registers)
    }

    async fn write_registers(&mut self, slave: SlaveId, start: u16, values: &[u16]) -> PlcResult<()> {
        self.bank.counters.writes.fetch_add(1, Ordering::SeqCst);
        self.stats.requests_sent += 1;
        self.bank.simulate_latency().await;

        if let Err(e) = self.check_link() {
            return Err(self.fail(e));
        }
        if take_fault(&self.bank.faults.write_failures) {
            return Err(self.fail(PlcError::io("Injected write failure")));
        }

        self.bank.write_registers(start, values)?;
        if let Ok(mut log) = self.bank.write_log.lock() {
            log.push(WriteRecord {
                slave,
                start,
                values: values.to_vec(),
            });
        }
        self.stats.responses_received += 1;
        self.stats.registers_written += values.len() as u64;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) -> PlcResult<()> {
        self.connected = false;
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
