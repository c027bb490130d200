/// Utility functions and helpers for PLC variable access
///
/// This module contains cycle metrics for the connection monitor, an
/// operation timer, range validation and display helpers.

use std::time::{Duration, Instant};
use log::{debug, warn};
use crate::error::{PlcError, PlcResult};

/// Performance metrics for monitor cycles and on-demand operations
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    pub total_cycles: u64,
    pub successful_cycles: u64,
    pub failed_cycles: u64,
    pub total_duration: Duration,
    pub min_duration: Option<Duration>,
    pub max_duration: Option<Duration>,
    pub avg_duration: Duration,
    pub last_duration: Option<Duration>,
}

impl PerformanceMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful cycle
    pub fn record_success(&mut self, duration: Duration) {
        self.successful_cycles += 1;
        self.record(duration);
        self.min_duration = Some(self.min_duration.map_or(duration, |min| min.min(duration)));
        self.max_duration = Some(self.max_duration.map_or(duration, |max| max.max(duration)));
    }

    /// Record a failed cycle
    pub fn record_failure(&mut self, duration: Duration) {
        self.failed_cycles += 1;
        self.record(duration);
    }

    fn record(&mut self, duration: Duration) {
        self.total_cycles += 1;
        self.total_duration += duration;
        self.last_duration = Some(duration);
        // u32 division is fine until four billion cycles
        self.avg_duration = self.total_duration / self.total_cycles.min(u32::MAX as u64) as u32;
    }

    /// Get success rate as percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_cycles == 0 {
            return 0.0;
        }
        (self.successful_cycles as f64 / self.total_cycles as f64) * 100.0
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Timer for measuring operation duration
pub struct OperationTimer {
    start: Instant,
    operation_name: String,
}

impl OperationTimer {
    /// Start a new timer
    pub fn start(operation_name: &str) -> Self {
        debug!("Starting operation: {}", operation_name);
        Self {
            start: Instant::now(),
            operation_name: operation_name.to_string(),
        }
    }

    /// Stop the timer and return duration
    pub fn stop(self) -> Duration {
        let duration = self.start.elapsed();
        debug!("Operation '{}' completed in {:?}", self.operation_name, duration);
        duration
    }

    /// Stop timer and log result
    pub fn stop_and_log(self, success: bool) -> Duration {
        let duration = self.start.elapsed();
        if success {
            debug!("Operation '{}' succeeded in {:?}", self.operation_name, duration);
        } else {
            warn!("Operation '{}' failed after {:?}", self.operation_name, duration);
        }
        duration
    }
}

/// Data validation utilities
pub mod validation {
    use super::*;

    /// Validate slave ID (1-247)
    pub fn validate_slave_id(slave_id: u8) -> PlcResult<()> {
        if slave_id == 0 || slave_id > 247 {
            return Err(PlcError::configuration(format!(
                "Invalid slave ID: {} (must be 1-247)",
                slave_id
            )));
        }
        Ok(())
    }

    /// Validate that `count` registers starting at `start` fit the 16-bit
    /// address space
    pub fn validate_address_range(start: u16, count: u16) -> PlcResult<()> {
        if count == 0 {
            return Err(PlcError::invalid_address(start, count));
        }

        if (start as u32 + count as u32) > 65536 {
            return Err(PlcError::invalid_address(start, count));
        }

        Ok(())
    }
}

/// Formatting and display utilities
pub mod format {
    use super::*;

    /// Format register values as hex
    pub fn registers_to_hex(registers: &[u16]) -> String {
        registers
            .iter()
            .map(|r| format!("{:04X}", r))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Format duration in a human-readable way
    pub fn format_duration(duration: Duration) -> String {
        let millis = duration.as_millis();
        if millis < 1000 {
            format!("{}ms", millis)
        } else if millis < 60_000 {
            format!("{:.2}s", duration.as_secs_f64())
        } else {
            let mins = millis / 60_000;
            let secs = (millis % 60_000) as f64 / 1000.0;
            format!("{}m {:.1}s", mins, secs)
        }
    }

    /// Format cycle metrics as a table
    pub fn format_metrics(metrics: &PerformanceMetrics) -> String {
        format!(
            "Cycle Metrics:\n\
             ├─ Total Cycles: {}\n\
             ├─ Successful: {} ({:.1}%)\n\
             ├─ Failed: {}\n\
             ├─ Average Duration: {}\n\
             ├─ Min Duration: {}\n\
             └─ Max Duration: {}",
            metrics.total_cycles,
            metrics.successful_cycles,
            metrics.success_rate(),
            metrics.failed_cycles,
            format_duration(metrics.avg_duration),
            metrics.min_duration.map_or("N/A".to_string(), format_duration),
            metrics.max_duration.map_or("N/A".to_string(), format_duration),
        )
    }
}

/// Logging utilities
pub mod logging {
    /// Initialize simple logger for testing
    pub fn init_test_logger() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_performance_metrics() {
        let mut metrics = PerformanceMetrics::new();

        metrics.record_success(Duration::from_millis(100));
        metrics.record_success(Duration::from_millis(200));
        metrics.record_failure(Duration::from_millis(150));

        assert_eq!(metrics.total_cycles, 3);
        assert_eq!(metrics.successful_cycles, 2);
        assert_eq!(metrics.failed_cycles, 1);
        assert_eq!(metrics.min_duration, Some(Duration::from_millis(100)));
        assert_eq!(metrics.max_duration, Some(Duration::from_millis(200)));
        assert_eq!(metrics.avg_duration, Duration::from_millis(150));
        assert_eq!(metrics.last_duration, Some(Duration::from_millis(150)));
        assert!((metrics.success_rate() - 66.67).abs() < 0.1);

        metrics.reset();
        assert_eq!(metrics.total_cycles, 0);
        assert_eq!(metrics.success_rate(), 0.0);
    }

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::start("sleep");
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.stop() >= Duration::from_millis(5));
        assert!(OperationTimer::start("noop").stop_and_log(false) < Duration::from_secs(1));
    }

    #[test]
    fn test_validation() {
        assert!(validation::validate_slave_id(1).is_ok());
        assert!(validation::validate_slave_id(247).is_ok());
        assert!(validation::validate_slave_id(0).is_err());
        assert!(validation::validate_slave_id(248).is_err());

        assert!(validation::validate_address_range(0, 10).is_ok());
        assert!(validation::validate_address_range(65530, 6).is_ok());
        assert!(validation::validate_address_range(65530, 7).is_err());
        assert!(validation::validate_address_range(10, 0).is_err());
    }

    #[test]
    fn test_formatting() {
        let registers = vec![0x1234, 0x5678];
        assert_eq!(format::registers_to_hex(&registers), "1234 5678");

        assert_eq!(format::format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format::format_duration(Duration::from_millis(42)), "42ms");

        let mut metrics = PerformanceMetrics::new();
        metrics.record_success(Duration::from_millis(10));
        let table = format::format_metrics(&metrics);
        assert!(table.contains("Total Cycles: 1"));
        assert!(table.contains("100.0%"));
    }
}
