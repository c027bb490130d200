//! File-based configuration
//!
//! A [`PlcConfig`] bundles everything needed to talk to one PLC: where it is,
//! which project header it must report and the variable map. Maps can always
//! be built in code; this is the YAML/JSON shortcut for applications that keep
//! them in files.
//!
//! ```rust
//! use voltage_plcvars::PlcConfig;
//!
//! let config = PlcConfig::from_yaml_str(r#"
//! endpoint: "192.168.1.10:502"
//! header: { device_type: 1, min_version: 10, max_version: 12 }
//! variables:
//!   - { name: BoolVar, type: { kind: bool }, address: 2 }
//!   - { name: ByteVar, type: { kind: byte }, address: 3 }
//! "#).unwrap();
//!
//! assert_eq!(config.slave_id, 1);
//! assert_eq!(config.build_map().unwrap().len(), 2);
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::PlcClient;
use crate::error::{PlcError, PlcResult};
use crate::header::HeaderExpectation;
use crate::monitor::MonitorConfig;
use crate::transport::{SlaveId, TcpConnector};
use crate::utils::validation;
use crate::variable_map::{VariableDescriptor, VariableMap};
use crate::{DEFAULT_CHECK_INTERVAL_MS, DEFAULT_EVENT_CAPACITY, DEFAULT_TCP_PORT, DEFAULT_TIMEOUT_MS};

fn default_slave_id() -> SlaveId {
    1
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_check_interval_ms() -> u64 {
    DEFAULT_CHECK_INTERVAL_MS
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

/// Connection settings, header expectation and variable map of one PLC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlcConfig {
    /// `host:port`, or a bare IP address for the default Modbus port
    pub endpoint: String,
    #[serde(default = "default_slave_id")]
    pub slave_id: SlaveId,
    /// Connect and per-request timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Trace every request and response of the TCP transport
    #[serde(default)]
    pub packet_logging: bool,
    pub header: HeaderExpectation,
    #[serde(default)]
    pub variables: Vec<VariableDescriptor>,
}

impl PlcConfig {
    pub fn new<S: Into<String>>(endpoint: S, header: HeaderExpectation) -> Self {
        Self {
            endpoint: endpoint.into(),
            slave_id: default_slave_id(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            packet_logging: false,
            header,
            variables: Vec::new(),
        }
    }

    pub fn with_variable(mut self, descriptor: VariableDescriptor) -> Self {
        self.variables.push(descriptor);
        self
    }

    pub fn from_yaml_str(content: &str) -> PlcResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> PlcResult<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yaml`, `.yml` or `.json` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> PlcResult<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| PlcError::configuration("Config file must have an extension"))?;

        let content = std::fs::read_to_string(path).map_err(|e| {
            PlcError::configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        debug!("Loading PLC config from {}", path.display());
        match extension {
            "yaml" | "yml" => Self::from_yaml_str(&content),
            "json" => Self::from_json_str(&content),
            other => Err(PlcError::configuration(format!(
                "Unsupported config file format: {}",
                other
            ))),
        }
    }

    pub fn to_yaml_string(&self) -> PlcResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check the settings that do not depend on the variable map
    pub fn validate(&self) -> PlcResult<()> {
        validation::validate_slave_id(self.slave_id)?;
        if self.timeout_ms == 0 {
            return Err(PlcError::configuration("timeout_ms must be greater than 0"));
        }
        if self.check_interval_ms == 0 {
            return Err(PlcError::configuration("check_interval_ms must be greater than 0"));
        }
        if self.event_capacity == 0 {
            return Err(PlcError::configuration("event_capacity must be greater than 0"));
        }
        if self.header.min_version > self.header.max_version {
            return Err(PlcError::configuration(format!(
                "min_version {} is greater than max_version {}",
                self.header.min_version, self.header.max_version
            )));
        }
        self.socket_addr()?;
        Ok(())
    }

    /// Resolve the endpoint; a bare IP address gets port 502
    pub fn socket_addr(&self) -> PlcResult<SocketAddr> {
        if let Ok(addr) = self.endpoint.parse::<SocketAddr>() {
            return Ok(addr);
        }
        self.endpoint
            .parse::<std::net::IpAddr>()
            .map(|ip| SocketAddr::new(ip, DEFAULT_TCP_PORT))
            .map_err(|_| PlcError::configuration(format!("Invalid endpoint: {}", self.endpoint)))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Build the variable map from the configured descriptors
    pub fn build_map(&self) -> PlcResult<VariableMap> {
        VariableMap::from_descriptors(self.variables.iter().cloned())
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::default()
            .with_check_interval(Duration::from_millis(self.check_interval_ms))
            .with_connect_timeout(self.timeout())
            .with_event_capacity(self.event_capacity)
    }

    pub fn connector(&self) -> PlcResult<TcpConnector> {
        Ok(TcpConnector::with_packet_logging(
            self.socket_addr()?,
            self.timeout(),
            self.packet_logging,
        ))
    }

    /// Client for this PLC, without a transport attached
    pub fn build_client(&self) -> PlcResult<PlcClient> {
        Ok(PlcClient::new(self.build_map()?, self.header, self.slave_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;

    const YAML: &str = r#"
endpoint: "127.0.0.1:5020"
slave_id: 3
check_interval_ms: 250
header:
  device_type: 1
  min_version: 10
  max_version: 12
variables:
  - name: Temperature
    type: { kind: real }
    address: 2
  - name: Mode
    type:
      kind: enum
      name: Mode
      underlying: { kind: uint16 }
      variants:
        - { name: Idle, value: 0 }
        - { name: Auto, value: 1 }
    address: 4
  - name: Label
    type: { kind: string, capacity: 8 }
    address: 5
    span: 12
"#;

    #[test]
    fn test_yaml_config() {
        let config = PlcConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(config.slave_id, 3);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.header, HeaderExpectation::new(1, 10, 12));
        assert_eq!(config.socket_addr().unwrap().port(), 5020);

        let map = config.build_map().unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.lookup("Temperature").unwrap().value_type, ValueType::Float32);
        assert_eq!(map.lookup("Label").unwrap().register_span(), 12);

        let monitor = config.monitor_config();
        assert_eq!(monitor.check_interval, Duration::from_millis(250));
        assert_eq!(monitor.connect_timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
    }

    #[test]
    fn test_json_config_with_bare_ip() {
        let config = PlcConfig::from_json_str(
            r#"{"endpoint": "10.0.0.7", "header": {"device_type": 2, "min_version": 1, "max_version": 1}}"#,
        )
        .unwrap();
        assert_eq!(config.socket_addr().unwrap(), "10.0.0.7:502".parse().unwrap());
        assert!(config.build_map().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let base = PlcConfig::new("127.0.0.1:502", HeaderExpectation::exact(1, 1));
        assert!(base.validate().is_ok());

        let mut config = base.clone();
        config.slave_id = 0;
        assert!(matches!(config.validate(), Err(PlcError::Configuration { .. })));

        let mut config = base.clone();
        config.check_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.header = HeaderExpectation::new(1, 5, 4);
        assert!(config.validate().is_err());

        let mut config = base;
        config.endpoint = "not an address".into();
        assert!(config.validate().is_err());

        assert!(PlcConfig::from_yaml_str("endpoint: [").is_err());
    }

    #[test]
    fn test_duplicate_names_surface_from_build_map() {
        let config = PlcConfig::new("127.0.0.1:502", HeaderExpectation::exact(1, 1))
            .with_variable(VariableDescriptor::new("A", ValueType::Bool, 2))
            .with_variable(VariableDescriptor::new("A", ValueType::Bool, 3));
        assert_eq!(config.build_map().unwrap_err(), PlcError::duplicate_name("A"));
    }

    #[test]
    fn test_from_file_and_round_trip() {
        let dir = std::env::temp_dir().join(format!("plcvars-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let config = PlcConfig::from_yaml_str(YAML).unwrap();
        let yaml_path = dir.join("plc.yaml");
        std::fs::write(&yaml_path, config.to_yaml_string().unwrap()).unwrap();
        assert_eq!(PlcConfig::from_file(&yaml_path).unwrap(), config);

        let json_path = dir.join("plc.json");
        std::fs::write(&json_path, serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(PlcConfig::from_file(&json_path).unwrap(), config);

        assert!(PlcConfig::from_file(dir.join("plc.toml")).is_err());
        let missing = PlcConfig::from_file(dir.join("missing.yaml")).unwrap_err();
        assert!(matches!(missing, PlcError::Configuration { .. }));
        assert!(!missing.is_transport_error());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
