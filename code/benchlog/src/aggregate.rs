/// Merge per-file record sequences into one validated table.
///
/// Files are pushed in discovery order and records keep their order within a file, so the table
/// order depends only on the input set.  Records with a unit outside their benchmark's allowed set
/// are dropped and counted; the run continues.  No deduplication is performed.

use crate::{Benchmark, MetricRecord, Unit};

use log::warn;
use thiserror::Error;
use ustr::Ustr;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{file}: unit {unit} is not valid for the {benchmark} benchmark")]
pub struct SchemaViolation {
    pub benchmark: Benchmark,
    pub unit: Unit,
    pub file: Ustr,
}

pub fn validate(r: &MetricRecord) -> Result<(), SchemaViolation> {
    if r.benchmark.allows(r.unit) {
        Ok(())
    } else {
        Err(SchemaViolation {
            benchmark: r.benchmark,
            unit: r.unit,
            file: r.source,
        })
    }
}

/// The merged output of a run.

#[derive(Debug, Default)]
pub struct Table {
    pub records: Vec<MetricRecord>,

    /// Number of records dropped for schema violations.
    pub violations: usize,
}

#[derive(Default)]
pub struct Aggregator {
    table: Table,
}

impl Aggregator {
    pub fn new() -> Aggregator {
        Aggregator::default()
    }

    /// Append one file's records.  Invalid records are logged and skipped.

    pub fn push_file(&mut self, records: Vec<MetricRecord>) {
        for r in records {
            match validate(&r) {
                Ok(()) => self.table.records.push(r),
                Err(e) => {
                    warn!("Skipping record: {e}");
                    self.table.violations += 1;
                }
            }
        }
    }

    pub fn finish(self) -> Table {
        self.table
    }
}

#[cfg(test)]
fn rec(source: &str, benchmark: Benchmark, value: f64, unit: Unit) -> MetricRecord {
    MetricRecord::new(Ustr::from(source), benchmark, "op", "".to_string(), value, unit).unwrap()
}

#[test]
fn test_validate() {
    assert!(validate(&rec("a", Benchmark::Boot, 1.0, Unit::Ms)).is_ok());
    assert!(validate(&rec("a", Benchmark::Tcp, 1.0, Unit::Seconds)).is_ok());
    let e = validate(&rec("a.txt", Benchmark::Syscall, 1.0, Unit::MBps)).unwrap_err();
    assert!(e.benchmark == Benchmark::Syscall);
    assert!(e.unit == Unit::MBps);
    assert!(e.to_string() == "a.txt: unit MB/s is not valid for the Syscall benchmark");
}

#[test]
fn test_aggregate_order_and_violations() {
    let mut agg = Aggregator::new();
    agg.push_file(vec![
        rec("a", Benchmark::Boot, 1.0, Unit::Ms),
        rec("a", Benchmark::Boot, 2.0, Unit::OpsPerSec),
        rec("a", Benchmark::Malloc, 3.0, Unit::KopsPerSec),
    ]);
    agg.push_file(vec![]);
    agg.push_file(vec![rec("b", Benchmark::Boot, 4.0, Unit::Ms)]);
    // The same file again is not deduplicated.
    agg.push_file(vec![rec("b", Benchmark::Boot, 4.0, Unit::Ms)]);
    let t = agg.finish();
    assert!(t.violations == 1);
    let values = t.records.iter().map(|r| r.value).collect::<Vec<f64>>();
    assert!(values == vec![1.0, 3.0, 4.0, 4.0]);
    assert!(t.records[2].source.as_str() == "b");
}
