//! sysbench output parser
//!
//! Extracts structured metrics from the textual reports sysbench prints
//! for `fileio` and `cpu` runs. One fixed regex rule per metric; a line
//! that is missing or mangled degrades that single metric (the key is
//! simply absent from the result map), never the whole record. Only output
//! with no recognizable report signature at all (empty, or clearly not a
//! sysbench report) is a [`BenchError::Parse`].
//!
//! Besides the raw sysbench fields, three canonical metrics are derived
//! for the fileio report: `throughput_mb_s` (read + written MiB/s),
//! `iops` (reads/s + writes/s), and `latency_ms_95th` (the 95th
//! percentile line as reported).

use crate::error::BenchError;
use crate::Result;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

type Rules = Vec<(&'static str, Regex)>;

fn rule(pattern: &str) -> Regex {
    Regex::new(pattern).expect("metric rule pattern is valid")
}

fn fileio_rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            ("reads_per_sec", rule(r"reads/s:\s+([\d.]+)")),
            ("writes_per_sec", rule(r"writes/s:\s+([\d.]+)")),
            ("fsyncs_per_sec", rule(r"fsyncs/s:\s+([\d.]+)")),
            ("read_mib_s", rule(r"read, MiB/s:\s+([\d.]+)")),
            ("written_mib_s", rule(r"written, MiB/s:\s+([\d.]+)")),
            ("total_time_s", rule(r"total time:\s+([\d.]+)s")),
            ("total_events", rule(r"total number of events:\s+(\d+)")),
            ("latency_min_ms", rule(r"min:\s+([\d.]+)")),
            ("latency_avg_ms", rule(r"avg:\s+([\d.]+)")),
            ("latency_max_ms", rule(r"max:\s+([\d.]+)")),
            ("latency_ms_95th", rule(r"95th percentile:\s+([\d.]+)")),
            ("latency_sum_ms", rule(r"sum:\s+([\d.]+)")),
            ("events_avg", rule(r"events \(avg/stddev\):\s+([\d.]+)")),
            ("events_stddev", rule(r"events \(avg/stddev\):\s+[\d.]+/([\d.]+)")),
            ("exec_time_avg_s", rule(r"execution time \(avg/stddev\):\s+([\d.]+)")),
            (
                "exec_time_stddev",
                rule(r"execution time \(avg/stddev\):\s+[\d.]+/([\d.]+)"),
            ),
        ]
    })
}

fn cpu_rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            ("events_per_second", rule(r"events per second:\s+([\d.]+)")),
            ("total_time_s", rule(r"total time:\s+([\d.]+)s")),
            ("total_events", rule(r"total number of events:\s+(\d+)")),
            ("latency_min_ms", rule(r"min:\s+([\d.]+)")),
            ("latency_avg_ms", rule(r"avg:\s+([\d.]+)")),
            ("latency_max_ms", rule(r"max:\s+([\d.]+)")),
            ("latency_ms_95th", rule(r"95th percentile:\s+([\d.]+)")),
            ("latency_sum_ms", rule(r"sum:\s+([\d.]+)")),
        ]
    })
}

fn apply_rules(rules: &Rules, output: &str) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();
    for (key, pattern) in rules {
        if let Some(captures) = pattern.captures(output) {
            if let Ok(value) = captures[1].parse::<f64>() {
                metrics.insert((*key).to_string(), value);
            }
        }
    }
    metrics
}

/// Parse a sysbench report, auto-detecting fileio vs cpu.
pub fn parse(output: &str) -> Result<BTreeMap<String, f64>> {
    if output.contains("File operations") {
        let mut metrics = apply_rules(fileio_rules(), output);
        derive_fileio_metrics(&mut metrics);
        Ok(metrics)
    } else if output.contains("CPU speed") || output.contains("events per second") {
        Ok(apply_rules(cpu_rules(), output))
    } else {
        Err(BenchError::Parse {
            reason: if output.trim().is_empty() {
                "empty output".to_string()
            } else {
                "no fileio or cpu report signature found".to_string()
            },
        }
        .into())
    }
}

fn derive_fileio_metrics(metrics: &mut BTreeMap<String, f64>) {
    let read = metrics.get("read_mib_s").copied();
    let written = metrics.get("written_mib_s").copied();
    if read.is_some() || written.is_some() {
        metrics.insert(
            "throughput_mb_s".to_string(),
            read.unwrap_or(0.0) + written.unwrap_or(0.0),
        );
    }
    let reads = metrics.get("reads_per_sec").copied();
    let writes = metrics.get("writes_per_sec").copied();
    if reads.is_some() || writes.is_some() {
        metrics.insert("iops".to_string(), reads.unwrap_or(0.0) + writes.unwrap_or(0.0));
    }
}
