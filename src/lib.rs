//! # Voltage PLC Vars - Named, Typed PLC Variables over Modbus
//!
//! **Author:** Evan Liu <evan.liu@voltageenergy.com>
//! **License:** MIT
//!
//! A PLC only exposes a flat array of 16-bit holding registers. This library
//! lets applications work with named, typed variables instead: a variable map
//! says where each variable lives and what it is, and the library takes care
//! of reading, decoding, encoding, writing and staying connected.
//!
//! ## Features
//!
//! - **Register codec**: bool, 8 to 64 bit integers, floats, durations,
//!   timestamps, enums, length-prefixed strings and arrays
//! - **Batched reads**: header plus every variable in one register read
//! - **Header gate**: values are only decoded for the device type and
//!   version range the map was built for
//! - **Differential writes**: only changed values are written, adjacent
//!   changes are merged into one request
//! - **Connection monitor**: background reconnect loop with broadcast events
//! - **Typed layer**: `TypedVariable<T>` for variables whose Rust type is known
//!
//! ## Register Layout
//!
//! | Address | Content |
//! |---------|---------|
//! | 0 | Device type (project identifier) |
//! | 1 | Project version |
//! | 2.. | Variables, as described by the variable map |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use voltage_plcvars::{
//!     ConnectionMonitor, HeaderExpectation, MonitorConfig, MonitorEvent, PlcClient, PlcResult,
//!     TcpConnector, ValueType, VariableDescriptor, VariableMap,
//! };
//!
//! #[tokio::main]
//! async fn main() -> PlcResult<()> {
//!     let map = VariableMap::from_descriptors([
//!         VariableDescriptor::new("Running", ValueType::Bool, 2),
//!         VariableDescriptor::new("Setpoint", ValueType::Float32, 3),
//!     ])?;
//!     let client = PlcClient::new(map, HeaderExpectation::new(1, 10, 12), 1);
//!
//!     let connector = TcpConnector::new("192.168.1.10:502".parse().unwrap(), Duration::from_secs(5));
//!     let monitor = ConnectionMonitor::new(client.clone(), Arc::new(connector), MonitorConfig::default());
//!     let mut events = monitor.subscribe();
//!     monitor.start()?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let MonitorEvent::DataRead(snapshot) = event {
//!             println!("Setpoint = {:?}", snapshot.get("Setpoint"));
//!             client.stage("Setpoint", 21.5)?;
//!             client.flush().await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────────┐
//! │   Application   │    │  ConnectionMonitor  │
//! └─────────────────┘    └─────────────────────┘
//!          │                       │
//! ┌──────────────────────────────────────────────┐
//! │        PlcClient (shared transport lock)     │
//! └──────────────────────────────────────────────┘
//!          │                       │
//! ┌─────────────────┐    ┌─────────────────────┐
//! │  BatchedReader  │    │ DifferentialWriter  │
//! └─────────────────┘    └─────────────────────┘
//!          │                       │
//! ┌──────────────────────────────────────────────┐
//! │  Codec / VariableMap / Header                │
//! └──────────────────────────────────────────────┘
//!          │
//! ┌──────────────────────────────────────────────┐
//! │  RegisterTransport (Modbus TCP | simulated)  │
//! └──────────────────────────────────────────────┘
//! ```

/// Core error types and result handling
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod error;

/// Runtime value model
pub mod value;

/// Register encoding and decoding of typed values
pub mod codec;

/// Variable descriptors, the variable map and address windows
pub mod variable_map;

/// Project header block and its validation
pub mod header;

/// Single-request reads of the header and every variable
pub mod reader;

/// Change tracking and merged writes
pub mod writer;

/// Register transport abstraction and the Modbus TCP adapter
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod transport;

/// High-level PLC client
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod client;

/// Background connection supervision
pub mod monitor;

/// Compile-time typed variable handles
pub mod typed;

/// Thread-safe simulated PLC for tests and demos
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod register_bank;

/// YAML/JSON configuration
pub mod config;

/// Logging system for the library
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod logging;

/// Utility functions and performance monitoring
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod utils;

// Re-export main types for convenience
pub use error::{PlcError, PlcResult};
pub use value::{EnumType, EnumVariant, Value, ValueType};
pub use variable_map::{AddressWindow, VariableDescriptor, VariableMap};
pub use header::{Header, HeaderExpectation, HEADER_ADDRESS, HEADER_SPAN};
pub use reader::{BatchedReader, ReadSnapshot, VariableError, VariableValue};
pub use writer::{DifferentialWriter, FlushReport, PendingChange, WriteRun};
pub use transport::{
    RegisterTransport, SlaveId, TcpConnector, TcpRegisterTransport, TransportConnector, TransportStats,
};
pub use client::PlcClient;
pub use monitor::{ConnectionMonitor, ConnectionState, MonitorConfig, MonitorEvent};
pub use typed::{PlcType, TypedVariable};
pub use register_bank::{BankTransport, RegisterBank, RegisterBankStats, WriteRecord};
pub use config::PlcConfig;
pub use utils::{OperationTimer, PerformanceMetrics};
pub use logging::{CallbackLogger, LogCallback, LogLevel, LoggingMode};

/// Default timeout for connects and requests (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default pause between monitor cycles (1 second)
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 1000;

/// Default capacity of the monitor's event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Maximum number of registers that can be read in a single request
pub const MAX_REGISTERS_PER_REQUEST: u16 = 125;

/// Maximum number of registers that can be written in a single request
pub const MAX_WRITE_REGISTERS_PER_REQUEST: u16 = 123;

/// Modbus TCP default port
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!("Voltage PLC Vars v{} - Named PLC variables over Modbus by Evan Liu", VERSION)
}
