/// Write the metrics table as CSV with a header row.
///
/// The column set is fixed by the schema.  Values are formatted deterministically: boot durations
/// with a fixed number of decimals for their unit (3 for ms, 6 for seconds), everything else with
/// the shortest representation that reads back as the same number.  Writing the same table twice
/// produces the same bytes.

use anyhow::{bail, Result};
use benchlog::{Benchmark, MetricRecord, OutputSchema, Table, Unit};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

pub const RESULTS_FILE: &str = "benchmark_results.csv";

/// Write `table` to `dir`/benchmark_results.csv, replacing any previous table, and return the path.

pub fn write_table(dir: &Path, table: &Table, schema: OutputSchema) -> Result<PathBuf> {
    let path = dir.join(RESULTS_FILE);
    let file = match File::create(&path) {
        Ok(f) => f,
        Err(e) => bail!("Could not create {}: {e}", path.display()),
    };
    let mut output = io::BufWriter::new(file);
    format_csv(&mut output, &table.records, schema)?;
    Ok(path)
}

pub fn format_csv(
    output: &mut dyn io::Write,
    records: &[MetricRecord],
    schema: OutputSchema,
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(schema.header())?;
    for r in records {
        writer.write_record(row(r, schema))?;
    }
    writer.flush()?;
    Ok(())
}

fn row(r: &MetricRecord, schema: OutputSchema) -> [String; 5] {
    match schema {
        OutputSchema::Flat => [
            r.source.to_string(),
            r.benchmark.title().to_string(),
            metric_name(r),
            format_value(r),
            r.unit.to_string(),
        ],
        OutputSchema::Detailed => [
            r.benchmark.key().to_string(),
            r.operation.to_string(),
            r.detail.clone(),
            format_value(r),
            r.unit.to_string(),
        ],
    }
}

/// The flat table has no detail column, so the detail goes into the metric name.

pub fn metric_name(r: &MetricRecord) -> String {
    if r.detail.is_empty() {
        r.operation.to_string()
    } else {
        format!("{} ({})", r.operation, r.detail)
    }
}

pub fn format_value(r: &MetricRecord) -> String {
    match (r.benchmark, r.unit) {
        (Benchmark::Boot, Unit::Ms) => format!("{:.3}", r.value),
        (Benchmark::Boot, Unit::Seconds) => format!("{:.6}", r.value),
        _ => format!("{}", r.value),
    }
}

#[cfg(test)]
use ustr::Ustr;

#[cfg(test)]
fn rec(
    source: &str,
    benchmark: Benchmark,
    op: &str,
    detail: &str,
    value: f64,
    unit: Unit,
) -> MetricRecord {
    MetricRecord::new(Ustr::from(source), benchmark, op, detail.to_string(), value, unit).unwrap()
}

#[cfg(test)]
fn sample() -> Vec<MetricRecord> {
    vec![
        rec("boot.txt", Benchmark::Boot, "Boot Time", "", 453.0, Unit::Ms),
        rec("boot2.txt", Benchmark::Boot, "Boot Time", "", 0.453, Unit::Seconds),
        rec(
            "m.txt",
            Benchmark::Malloc,
            "memory allocation",
            "1000 blocks, 64 bytes each",
            0.001186,
            Unit::Seconds,
        ),
        rec("s.txt", Benchmark::Syscall, "Syscall Latency", "", 5.26, Unit::Us),
        rec("t.txt", Benchmark::Tcp, "Throughput", "", 843.12, Unit::MBps),
    ]
}

#[cfg(test)]
fn to_string(records: &[MetricRecord], schema: OutputSchema) -> String {
    let mut out = Vec::<u8>::new();
    format_csv(&mut out, records, schema).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_flat_table() {
    let s = to_string(&sample(), OutputSchema::Flat);
    let expected = "File,Benchmark,Metric,Value,Unit
boot.txt,Boot,Boot Time,453.000,ms
boot2.txt,Boot,Boot Time,0.453000,seconds
m.txt,Malloc,\"memory allocation (1000 blocks, 64 bytes each)\",0.001186,seconds
s.txt,Syscall,Syscall Latency,5.26,us
t.txt,TCP,Throughput,843.12,MB/s
";
    assert!(s == expected);
}

#[test]
fn test_detailed_table() {
    let s = to_string(&sample()[1..3], OutputSchema::Detailed);
    let expected = "benchmark,operation,detail,value,unit
boot,Boot Time,,0.453000,seconds
malloc,memory allocation,\"1000 blocks, 64 bytes each\",0.001186,seconds
";
    assert!(s == expected);
}

#[test]
fn test_values_read_back() {
    for r in sample() {
        let v = format_value(&r).parse::<f64>().unwrap();
        assert!(v == r.value);
    }
    // Three decimals is the precision for ms, and what reads back is the value at that precision.
    let r = rec("b", Benchmark::Boot, "Boot Time", "", 2250.0004, Unit::Ms);
    assert!(format_value(&r) == "2250.000");
}

#[test]
fn test_write_table_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let table = Table {
        records: sample(),
        violations: 0,
    };
    let p = write_table(dir.path(), &table, OutputSchema::Flat).unwrap();
    assert!(p.ends_with(RESULTS_FILE));
    let first = std::fs::read(&p).unwrap();
    write_table(dir.path(), &table, OutputSchema::Flat).unwrap();
    let second = std::fs::read(&p).unwrap();
    assert!(first == second);
}

#[test]
fn test_write_table_unwritable() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("not-there");
    assert!(write_table(&missing, &Table::default(), OutputSchema::Flat).is_err());
}
