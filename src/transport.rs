//! # Register Transport Layer
//!
//! This module defines the minimal transport surface the PLC variable core
//! needs (read and write a block of holding registers) and provides a Modbus
//! TCP implementation on top of `tokio-modbus`.
//!
//! ## Traits
//!
//! - [`RegisterTransport`]: one open session to a PLC. Implementations must
//!   not be used for interleaved requests; callers serialize access.
//! - [`TransportConnector`]: opens new sessions. The connection monitor holds a
//!   connector and calls it again after every transport failure.
//!
//! ## Modbus TCP
//!
//! ```rust,no_run
//! use voltage_plcvars::transport::{TcpConnector, TransportConnector};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = TcpConnector::new("192.168.1.10:502".parse()?, Duration::from_secs(2));
//!     let mut transport = connector.connect().await?;
//!
//!     let registers = transport.read_registers(1, 0, 10).await?;
//!     println!("Registers: {:04X?}", registers);
//!
//!     let stats = transport.get_stats();
//!     println!("Requests sent: {}", stats.requests_sent);
//!
//!     transport.close().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_modbus::client::{tcp, Context as ModbusContext};
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{PlcError, PlcResult};
use crate::utils::format::registers_to_hex;
use crate::{MAX_REGISTERS_PER_REQUEST, MAX_WRITE_REGISTERS_PER_REQUEST};

/// Modbus unit identifier
pub type SlaveId = u8;

/// One open register session to a PLC
///
/// ## Error Handling
///
/// Every I/O problem, timeout or Modbus exception response is reported as a
/// transport-class [`PlcError`] (see [`PlcError::is_transport_error`]). After a
/// transport error the session should be considered broken.
#[async_trait]
pub trait RegisterTransport: Send {
    /// Read `count` holding registers starting at `start`.
    ///
    /// A successful result always holds exactly `count` registers.
    async fn read_registers(&mut self, slave: SlaveId, start: u16, count: u16) -> PlcResult<Vec<u16>>;

    /// Write `values` to consecutive holding registers starting at `start`
    async fn write_registers(&mut self, slave: SlaveId, start: u16, values: &[u16]) -> PlcResult<()>;

    /// Local view of the session state; does not contact the PLC
    fn is_connected(&self) -> bool;

    /// Close the session and release the socket
    async fn close(&mut self) -> PlcResult<()>;

    /// Get communication statistics
    fn get_stats(&self) -> TransportStats;
}

/// Factory for new transport sessions
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self) -> PlcResult<Box<dyn RegisterTransport>>;

    /// Human readable peer description for logs
    fn describe(&self) -> String;
}

/// Transport layer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub registers_read: u64,
    pub registers_written: u64,
}

/// Log packet with direction
fn log_packet(direction: &str, slave: SlaveId, start: u16, registers: &[u16]) {
    info!(
        "[PLC-TCP] {} slave:{} @{} {}",
        direction,
        slave,
        start,
        registers_to_hex(registers)
    );
}

/// Modbus TCP transport backed by a `tokio-modbus` client context
pub struct TcpRegisterTransport {
    context: Option<ModbusContext>,
    pub address: SocketAddr,
    timeout: Duration,
    stats: TransportStats,
    /// Enable packet logging for debugging
    packet_logging: bool,
}

impl TcpRegisterTransport {
    /// Open a TCP session; the connect itself is bounded by `timeout`
    pub async fn connect(address: SocketAddr, timeout_duration: Duration) -> PlcResult<Self> {
        let stream = timeout(timeout_duration, TcpStream::connect(address))
            .await
            .map_err(|_| PlcError::timeout(format!("connect {}", address), timeout_duration.as_millis() as u64))?
            .map_err(|e| PlcError::connection(format!("Failed to connect to {}: {}", address, e)))?;
        stream.set_nodelay(true).ok();

        debug!("Connected to PLC at {}", address);
        Ok(Self {
            context: Some(tcp::attach(stream)),
            address,
            timeout: timeout_duration,
            stats: TransportStats::default(),
            packet_logging: false,
        })
    }

    /// Enable or disable packet logging
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    fn context(&mut self) -> PlcResult<&mut ModbusContext> {
        self.context
            .as_mut()
            .ok_or_else(|| PlcError::connection(format!("Not connected to {}", self.address)))
    }

    /// Record a failed request; transport-level failures break the session
    fn fail(&mut self, error: PlcError) -> PlcError {
        self.stats.errors += 1;
        match &error {
            PlcError::Timeout { .. } => {
                self.stats.timeouts += 1;
                self.context = None;
            }
            PlcError::Io { .. } | PlcError::Connection { .. } | PlcError::Protocol { .. } => {
                self.context = None;
            }
            _ => {}
        }
        error
    }

    async fn read_chunk(&mut self, slave: SlaveId, start: u16, count: u16) -> PlcResult<Vec<u16>> {
        let timeout_duration = self.timeout;
        let ctx = self.context()?;
        ctx.set_slave(Slave(slave));

        let registers = timeout(timeout_duration, ctx.read_holding_registers(start, count))
            .await
            .map_err(|_| PlcError::timeout("read_holding_registers", timeout_duration.as_millis() as u64))?
            .map_err(|e| PlcError::io(e.to_string()))?
            .map_err(|code| PlcError::exception(format!("{} (read {}+{})", code, start, count)))?;

        if registers.len() != count as usize {
            return Err(PlcError::protocol(format!(
                "Expected {} registers, got {}",
                count,
                registers.len()
            )));
        }
        Ok(registers)
    }

    async fn write_chunk(&mut self, slave: SlaveId, start: u16, values: &[u16]) -> PlcResult<()> {
        let timeout_duration = self.timeout;
        let ctx = self.context()?;
        ctx.set_slave(Slave(slave));

        timeout(timeout_duration, ctx.write_multiple_registers(start, values))
            .await
            .map_err(|_| PlcError::timeout("write_multiple_registers", timeout_duration.as_millis() as u64))?
            .map_err(|e| PlcError::io(e.to_string()))?
            .map_err(|code| PlcError::exception(format!("{} (write {}+{})", code, start, values.len())))
    }
}

#[async_trait]
impl RegisterTransport for TcpRegisterTransport {
    async fn read_registers(&mut self, slave: SlaveId, start: u16, count: u16) -> PlcResult<Vec<u16>> {
        let mut registers = Vec::with_capacity(count as usize);
        let mut address = start;
        let mut remaining = count;

        // one logical read, split to respect the per-request protocol limit
        while remaining > 0 {
            let chunk = remaining.min(MAX_REGISTERS_PER_REQUEST);
            self.stats.requests_sent += 1;
            match self.read_chunk(slave, address, chunk).await {
                Ok(values) => {
                    self.stats.responses_received += 1;
                    self.stats.registers_read += values.len() as u64;
                    if self.packet_logging {
                        log_packet("receive", slave, address, &values);
                    }
                    registers.extend(values);
                }
                Err(e) => return Err(self.fail(e)),
            }
            address = address.wrapping_add(chunk);
            remaining -= chunk;
        }

        Ok(registers)
    }

    async fn write_registers(&mut self, slave: SlaveId, start: u16, values: &[u16]) -> PlcResult<()> {
        let mut address = start;
        for chunk in values.chunks(MAX_WRITE_REGISTERS_PER_REQUEST as usize) {
            self.stats.requests_sent += 1;
            if self.packet_logging {
                log_packet("send", slave, address, chunk);
            }
            if let Err(e) = self.write_chunk(slave, address, chunk).await {
                return Err(self.fail(e));
            }
            self.stats.responses_received += 1;
            self.stats.registers_written += chunk.len() as u64;
            address = address.wrapping_add(chunk.len() as u16);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    async fn close(&mut self) -> PlcResult<()> {
        if let Some(mut ctx) = self.context.take() {
            if let Err(e) = ctx.disconnect().await {
                warn!("Error disconnecting from {}: {}", self.address, e);
            }
            debug!("Disconnected from PLC at {}", self.address);
        }
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

/// Connector opening [`TcpRegisterTransport`] sessions
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: SocketAddr,
    timeout: Duration,
    packet_logging: bool,
}

impl TcpConnector {
    pub fn new(address: SocketAddr, timeout: Duration) -> Self {
        Self {
            address,
            timeout,
            packet_logging: false,
        }
    }

    /// Create a connector whose sessions log every packet
    pub fn with_packet_logging(address: SocketAddr, timeout: Duration, enable_logging: bool) -> Self {
        Self {
            address,
            timeout,
            packet_logging: enable_logging,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

#[async_trait]
impl TransportConnector for TcpConnector {
    async fn connect(&self) -> PlcResult<Box<dyn RegisterTransport>> {
        let mut transport = TcpRegisterTransport::connect(self.address, self.timeout).await?;
        transport.set_packet_logging(self.packet_logging);
        Ok(Box::new(transport))
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }
}
