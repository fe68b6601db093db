//! Benchmark drivers and results
//!
//! One [`MetricRecord`] per benchmark invocation is the canonical output
//! unit of the whole run. Records are append-only: drivers push them into
//! a shared [`RunResults`] collection and never mutate them afterwards.
//! Failed invocations still produce a record (carrying an error marker)
//! so the results file always accounts for everything that was attempted.

pub mod cpu;
pub mod network;
pub mod parser;
pub mod storage;
pub mod sysbench;

use std::collections::BTreeMap;
use std::fmt;

/// Benchmark domain a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Storage,
    Cpu,
    Network,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Storage => write!(f, "storage"),
            Domain::Cpu => write!(f, "cpu"),
            Domain::Network => write!(f, "network"),
        }
    }
}

/// One structured result row. Identity fields that do not apply to the
/// record's domain stay `None`; metric values that the tool did not report
/// are simply absent from the map (rendered as an explicit sentinel by the
/// CSV writer, never as a blank).
#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub node: String,
    pub domain: Domain,
    pub device: Option<String>,
    pub interface: Option<String>,
    pub peer: Option<String>,
    pub workload: Option<String>,
    pub blocksize: Option<String>,
    pub threads: Option<u32>,
    pub flags: Option<String>,
    /// Metric name → value, deterministically ordered.
    pub metrics: BTreeMap<String, f64>,
    /// Error marker when the invocation (or the whole device) failed.
    pub error: Option<String>,
}

impl MetricRecord {
    pub fn new(node: impl Into<String>, domain: Domain) -> Self {
        Self {
            node: node.into(),
            domain,
            device: None,
            interface: None,
            peer: None,
            workload: None,
            blocksize: None,
            threads: None,
            flags: None,
            metrics: BTreeMap::new(),
            error: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Append-only collection of records for one run, handed to the CSV
/// writer at the end.
#[derive(Debug, Default)]
pub struct RunResults {
    records: Vec<MetricRecord>,
}

impl RunResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: MetricRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records carrying an error marker.
    pub fn degraded(&self) -> usize {
        self.records.iter().filter(|r| r.is_degraded()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_display() {
        assert_eq!(Domain::Storage.to_string(), "storage");
        assert_eq!(Domain::Cpu.to_string(), "cpu");
        assert_eq!(Domain::Network.to_string(), "network");
    }

    #[test]
    fn test_degraded_count() {
        let mut results = RunResults::new();
        results.push(MetricRecord::new("n", Domain::Cpu));
        let mut bad = MetricRecord::new("n", Domain::Storage);
        bad.error = Some("timeout".to_string());
        results.push(bad);
        assert_eq!(results.len(), 2);
        assert_eq!(results.degraded(), 1);
    }
}
