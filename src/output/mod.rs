//! Results file output
//!
//! A single flat CSV with a fixed schema is the only output surface: one
//! row per benchmark invocation, identity columns first, then every known
//! metric column, then the error marker. Columns that do not apply to a
//! row's domain are filled with explicit sentinels rather than left blank,
//! so downstream tooling never has to guess whether a value is missing or
//! merely zero.

pub mod csv;

pub use csv::CsvWriter;

/// Sentinel for a metric or identity column that does not apply to the row.
pub const UNAVAILABLE: &str = "NA";

/// Sentinel for the error column of a successful row.
pub const NO_ERROR: &str = "-";

/// Fixed metric column set, the union of everything the parsers can emit.
/// The order here is the column order in the file.
pub const METRIC_COLUMNS: &[&str] = &[
    "throughput_mb_s",
    "iops",
    "reads_per_sec",
    "writes_per_sec",
    "fsyncs_per_sec",
    "read_mib_s",
    "written_mib_s",
    "events_per_second",
    "bandwidth_mbits",
    "latency_min_ms",
    "latency_avg_ms",
    "latency_max_ms",
    "latency_ms_95th",
    "latency_sum_ms",
    "total_time_s",
    "total_events",
    "events_avg",
    "events_stddev",
    "exec_time_avg_s",
    "exec_time_stddev",
];
