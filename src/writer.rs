//! Differential writer
//!
//! Application code stages values by variable name; [`DifferentialWriter::flush`]
//! writes only the staged variables, merging variables at adjacent addresses
//! into one request per contiguous run.
//!
//! Staging encodes immediately, so range and length errors surface at the
//! call site instead of during a later flush. A staged value equal to the last
//! value confirmed on the PLC (read or written) is not written at all.
//!
//! Every pending entry carries a sequence number. A flush snapshots the
//! pending set, writes it without holding the lock, and then removes only the
//! entries whose sequence number did not change in the meantime, so a value
//! staged while the flush was in flight is written by the next flush. Names
//! being written are tracked as in flight: staging the confirmed value over an
//! in-flight write still queues a write, since the PLC is about to hold the
//! in-flight value instead.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::codec;
use crate::error::{PlcError, PlcResult};
use crate::reader::ReadSnapshot;
use crate::transport::{RegisterTransport, SlaveId};
use crate::value::Value;
use crate::variable_map::VariableMap;
use crate::MAX_WRITE_REGISTERS_PER_REQUEST;

#[derive(Debug, Clone)]
struct PendingWrite {
    value: Value,
    address: u16,
    registers: Vec<u16>,
    sequence: u64,
}

/// Pending values by variable name; last stage per name wins
#[derive(Debug, Default)]
struct ChangeSet {
    entries: HashMap<String, PendingWrite>,
    next_sequence: u64,
    /// Names written by the flush currently running
    in_flight: HashSet<String>,
}

/// A staged value waiting for the next flush
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub name: String,
    pub address: u16,
    pub value: Value,
}

/// One write request covering consecutive registers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRun {
    pub start: u16,
    pub registers: Vec<u16>,
    pub variables: Vec<String>,
}

/// Outcome of a successful flush
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub runs: Vec<WriteRun>,
}

impl FlushReport {
    /// Number of transport write calls issued
    pub fn requests(&self) -> usize {
        self.runs.len()
    }

    /// Number of variables written
    pub fn variables(&self) -> usize {
        self.runs.iter().map(|run| run.variables.len()).sum()
    }

    /// Number of registers written
    pub fn registers(&self) -> usize {
        self.runs.iter().map(|run| run.registers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Tracks staged values and the last values confirmed on the PLC
#[derive(Debug)]
pub struct DifferentialWriter {
    map: Arc<VariableMap>,
    changes: Mutex<ChangeSet>,
    confirmed: Mutex<HashMap<String, Value>>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> PlcResult<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| PlcError::internal(format!("Failed to lock {}", what)))
}

impl DifferentialWriter {
    pub fn new(map: Arc<VariableMap>) -> Self {
        Self {
            map,
            changes: Mutex::new(ChangeSet::default()),
            confirmed: Mutex::new(HashMap::new()),
        }
    }

    /// Stage a value for `name`.
    ///
    /// Returns `true` when a write is now pending for the variable and
    /// `false` when the value equals the last confirmed PLC value, in which
    /// case any earlier pending value for the name is discarded.
    pub fn stage(&self, name: &str, value: impl Into<Value>) -> PlcResult<bool> {
        let descriptor = self.map.lookup(name)?;
        let value = value.into().coerce_to(&descriptor.value_type)?;
        let registers =
            codec::encode_with_span(&value, &descriptor.value_type, descriptor.register_span())?;

        let unchanged = lock(&self.confirmed, "confirmed values")?.get(name) == Some(&value);

        let mut changes = lock(&self.changes, "change set")?;
        if unchanged && !changes.in_flight.contains(name) {
            changes.entries.remove(name);
            return Ok(false);
        }

        let sequence = changes.next_sequence;
        changes.next_sequence += 1;
        changes.entries.insert(
            descriptor.name.clone(),
            PendingWrite {
                value,
                address: descriptor.address,
                registers,
                sequence,
            },
        );
        Ok(true)
    }

    /// Staged values ordered by address
    pub fn pending(&self) -> PlcResult<Vec<PendingChange>> {
        let changes = lock(&self.changes, "change set")?;
        let mut pending: Vec<_> = changes
            .entries
            .iter()
            .map(|(name, entry)| PendingChange {
                name: name.clone(),
                address: entry.address,
                value: entry.value.clone(),
            })
            .collect();
        pending.sort_by_key(|change| change.address);
        Ok(pending)
    }

    pub fn has_pending(&self) -> bool {
        self.changes
            .lock()
            .map(|changes| !changes.entries.is_empty())
            .unwrap_or(false)
    }

    /// Drop the staged value of `name`; returns whether one existed
    pub fn discard(&self, name: &str) -> PlcResult<bool> {
        Ok(lock(&self.changes, "change set")?.entries.remove(name).is_some())
    }

    /// Drop every staged value
    pub fn clear(&self) -> PlcResult<()> {
        lock(&self.changes, "change set")?.entries.clear();
        Ok(())
    }

    /// Last value confirmed on the PLC for `name`
    pub fn confirmed(&self, name: &str) -> Option<Value> {
        self.confirmed
            .lock()
            .ok()
            .and_then(|confirmed| confirmed.get(name).cloned())
    }

    /// Record the values of a successful read as confirmed PLC values
    pub fn observe(&self, snapshot: &ReadSnapshot) -> PlcResult<()> {
        let mut confirmed = lock(&self.confirmed, "confirmed values")?;
        for entry in &snapshot.values {
            confirmed.insert(entry.name.clone(), entry.value.clone());
        }
        Ok(())
    }

    /// Write every staged value.
    ///
    /// An empty change set issues no transport call. On a transport error the
    /// change set is left as it was and the error is returned, so the next
    /// flush retries the same values.
    pub async fn flush(&self, transport: &mut dyn RegisterTransport, slave: SlaveId) -> PlcResult<FlushReport> {
        let drained: Vec<(String, PendingWrite)> = {
            let mut changes = lock(&self.changes, "change set")?;
            let drained: Vec<_> = changes
                .entries
                .iter()
                .map(|(name, entry)| (name.clone(), entry.clone()))
                .collect();
            changes.in_flight = drained.iter().map(|(name, _)| name.clone()).collect();
            drained
        };
        if drained.is_empty() {
            return Ok(FlushReport::default());
        }

        let runs = plan_runs(&drained, MAX_WRITE_REGISTERS_PER_REQUEST as usize);
        let mut written = Ok(());
        for run in &runs {
            written = transport.write_registers(slave, run.start, &run.registers).await;
            if written.is_err() {
                break;
            }
        }

        {
            let mut changes = lock(&self.changes, "change set")?;
            changes.in_flight.clear();
            written?;
            for (name, written) in &drained {
                let unchanged = changes
                    .entries
                    .get(name)
                    .map_or(false, |current| current.sequence == written.sequence);
                if unchanged {
                    changes.entries.remove(name);
                }
            }
        }
        {
            let mut confirmed = lock(&self.confirmed, "confirmed values")?;
            for (name, written) in drained {
                confirmed.insert(name, written.value);
            }
        }

        let report = FlushReport { runs };
        debug!(
            "Flushed {} variables in {} requests to slave {}",
            report.variables(),
            report.requests(),
            slave
        );
        Ok(report)
    }
}

/// Group pending writes into runs of exactly adjacent registers.
///
/// Entries are ordered by address; an entry joins the current run when it
/// starts right where the run ends and the run stays within `max_registers`.
fn plan_runs(entries: &[(String, PendingWrite)], max_registers: usize) -> Vec<WriteRun> {
    let mut ordered: Vec<&(String, PendingWrite)> = entries.iter().collect();
    ordered.sort_by_key(|(_, entry)| entry.address);

    let mut runs: Vec<WriteRun> = Vec::new();
    for (name, entry) in ordered {
        if let Some(run) = runs.last_mut() {
            let run_end = run.start as usize + run.registers.len();
            if entry.address as usize == run_end
                && run.registers.len() + entry.registers.len() <= max_registers
            {
                run.registers.extend_from_slice(&entry.registers);
                run.variables.push(name.clone());
                continue;
            }
        }
        runs.push(WriteRun {
            start: entry.address,
            registers: entry.registers.clone(),
            variables: vec![name.clone()],
        });
    }
    runs
}
