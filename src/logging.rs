use std::sync::Arc;

use crate::reader::ReadSnapshot;
use crate::transport::SlaveId;
use crate::writer::FlushReport;

/// Log levels for the callback logging system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Error messages
    Error,
    /// Warning messages
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
}

/// Logging mode for register traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// Show raw register data as hex only
    Raw,
    /// Show addresses, counts and decoded variable values
    Interpreted,
    /// Show both raw and interpreted data
    Both,
}

impl LogLevel {
    /// Convert log level to string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Type alias for log callback functions
///
/// The callback receives a log level and message string
pub type LogCallback = Box<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Logger that uses callbacks for flexible logging
#[derive(Clone)]
pub struct CallbackLogger {
    callback: Option<Arc<LogCallback>>,
    min_level: LogLevel,
    mode: LoggingMode,
}

impl std::fmt::Debug for CallbackLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackLogger")
            .field("enabled", &self.callback.is_some())
            .field("min_level", &self.min_level)
            .field("mode", &self.mode)
            .finish()
    }
}

impl CallbackLogger {
    /// Create a new callback logger
    pub fn new(callback: Option<LogCallback>, min_level: LogLevel) -> Self {
        Self {
            callback: callback.map(Arc::new),
            min_level,
            mode: LoggingMode::Interpreted,
        }
    }

    /// Create a new callback logger with specific mode
    pub fn with_mode(callback: Option<LogCallback>, min_level: LogLevel, mode: LoggingMode) -> Self {
        Self {
            callback: callback.map(Arc::new),
            min_level,
            mode,
        }
    }

    /// Create a logger with default console output
    pub fn console() -> Self {
        let callback: LogCallback = Box::new(|level, message| {
            let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
            match level {
                LogLevel::Error => eprintln!("[{}] ERROR: {}", timestamp, message),
                LogLevel::Warn => eprintln!("[{}] WARN: {}", timestamp, message),
                LogLevel::Info => println!("[{}] INFO: {}", timestamp, message),
                LogLevel::Debug => println!("[{}] DEBUG: {}", timestamp, message),
            }
        });
        Self::new(Some(callback), LogLevel::Info)
    }

    /// Create a logger that outputs nothing (disabled)
    pub fn disabled() -> Self {
        Self::new(None, LogLevel::Error)
    }

    /// Set logging mode
    pub fn set_mode(&mut self, mode: LoggingMode) {
        self.mode = mode;
    }

    /// Get current logging mode
    pub fn get_mode(&self) -> LoggingMode {
        self.mode
    }

    /// Log a message at the specified level
    pub fn log(&self, level: LogLevel, message: &str) {
        if self.should_log(level) {
            if let Some(ref callback) = self.callback {
                callback(level, message);
            }
        }
    }

    /// Log an error message
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Log a warning message
    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Log an info message
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Log a debug message
    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Check if a message at the given level should be logged
    fn should_log(&self, level: LogLevel) -> bool {
        self.callback.is_some() && level as u8 <= self.min_level as u8
    }

    /// Log a block of registers read from the PLC
    pub fn log_read(&self, slave: SlaveId, start: u16, registers: &[u16]) {
        self.log_registers("Read <-", slave, start, registers);
    }

    /// Log a block of registers written to the PLC
    pub fn log_write(&self, slave: SlaveId, start: u16, registers: &[u16]) {
        self.log_registers("Write ->", slave, start, registers);
    }

    /// Log every write run of a completed flush
    pub fn log_flush(&self, slave: SlaveId, report: &FlushReport) {
        for run in &report.runs {
            self.log_write(slave, run.start, &run.registers);
            if self.mode != LoggingMode::Raw {
                self.debug(&format!("Write -> Variables: {}", run.variables.join(", ")));
            }
        }
    }

    /// Log the decoded content of a snapshot
    pub fn log_snapshot(&self, snapshot: &ReadSnapshot) {
        if !self.should_log(LogLevel::Info) || self.mode == LoggingMode::Raw {
            return;
        }

        let values = snapshot
            .values
            .iter()
            .map(|entry| format!("{}={}", entry.name, entry.value))
            .collect::<Vec<_>>()
            .join(", ");
        self.info(&format!(
            "Snapshot <- Device: {}, Version: {}, {}",
            snapshot.header.device_type, snapshot.header.version, values
        ));
        for failed in &snapshot.errors {
            self.warn(&format!("Snapshot <- {}: {}", failed.name, failed.error));
        }
    }

    fn log_registers(&self, direction: &str, slave: SlaveId, start: u16, registers: &[u16]) {
        match self.mode {
            LoggingMode::Raw => {
                self.info(&format!("{} Raw: {}", direction, raw_hex(registers)));
            }
            LoggingMode::Interpreted => {
                self.info(&interpret(direction, slave, start, registers));
            }
            LoggingMode::Both => {
                self.info(&interpret(direction, slave, start, registers));
                self.debug(&format!("{} Raw: {}", direction, raw_hex(registers)));
            }
        }
    }
}

/// Registers as big-endian hex bytes
fn raw_hex(registers: &[u16]) -> String {
    let bytes: Vec<u8> = registers.iter().flat_map(|r| r.to_be_bytes()).collect();
    hex::encode_upper(bytes)
}

fn interpret(direction: &str, slave: SlaveId, start: u16, registers: &[u16]) -> String {
    format!(
        "{} Slave: {}, Address: {}, Quantity: {}, Registers: {:?}",
        direction,
        slave,
        start,
        registers.len(),
        &registers[..registers.len().min(8)]
    )
}

impl Default for CallbackLogger {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Convenience macro for creating a simple console logger
#[macro_export]
macro_rules! console_logger {
    () => {
        $crate::logging::CallbackLogger::console()
    };
}

/// Convenience macro for creating a custom logger
#[macro_export]
macro_rules! custom_logger {
    ($callback:expr) => {
        $crate::logging::CallbackLogger::new(Some($callback), $crate::logging::LogLevel::Info)
    };
    ($callback:expr, $level:expr) => {
        $crate::logging::CallbackLogger::new(Some($callback), $level)
    };
    ($callback:expr, $level:expr, $mode:expr) => {
        $crate::logging::CallbackLogger::with_mode(Some($callback), $level, $mode)
    };
}
