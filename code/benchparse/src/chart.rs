/// Read a metrics table back and print it as a text bar chart.
///
/// Either schema is accepted; which one is decided from the header.  Rows are grouped by
/// "Benchmark (Metric)" label, groups appear in the order their first row appears in the table,
/// and rows keep their table order within a group.  Bars are scaled to the largest value in the
/// group, as a group's rows normally share a unit.

use anyhow::{bail, Result};
use benchlog::{Benchmark, OutputSchema, Unit};
use itertools::Itertools;
use serde::Deserialize;
use std::fs::File;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct ChartRow {
    pub label: String,

    /// Distinguishes rows within a group: the file name for the flat table, the detail for the
    /// detailed table.
    pub name: String,

    pub value: f64,
    pub unit: Unit,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FlatRow {
    file: String,
    benchmark: String,
    metric: String,
    value: f64,
    unit: String,
}

#[derive(Deserialize)]
struct DetailedRow {
    benchmark: String,
    operation: String,
    detail: String,
    value: f64,
    unit: String,
}

pub fn read_table(path: &Path) -> Result<Vec<ChartRow>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => bail!("Could not open {}: {e}", path.display()),
    };
    read_rows(io::BufReader::new(file))
}

pub fn read_rows<R: io::Read>(input: R) -> Result<Vec<ChartRow>> {
    let mut reader = csv::Reader::from_reader(input);
    let headers = reader.headers()?.clone();
    let mut rows = vec![];
    if headers.iter().eq(OutputSchema::Flat.header()) {
        for r in reader.deserialize::<FlatRow>() {
            let r = r?;
            rows.push(ChartRow {
                label: format!("{} ({})", benchmark_title(&r.benchmark)?, r.metric),
                name: r.file,
                value: r.value,
                unit: unit_of(&r.unit)?,
            });
        }
    } else if headers.iter().eq(OutputSchema::Detailed.header()) {
        for r in reader.deserialize::<DetailedRow>() {
            let r = r?;
            rows.push(ChartRow {
                label: format!("{} ({})", benchmark_title(&r.benchmark)?, r.operation),
                name: r.detail,
                value: r.value,
                unit: unit_of(&r.unit)?,
            });
        }
    } else {
        bail!("Not a metrics table: unrecognized header");
    }
    Ok(rows)
}

fn benchmark_title(s: &str) -> Result<&'static str> {
    match Benchmark::from_name(s) {
        Some(b) => Ok(b.title()),
        None => bail!("Unknown benchmark '{s}'"),
    }
}

fn unit_of(s: &str) -> Result<Unit> {
    match Unit::from_token(s) {
        Some(u) => Ok(u),
        None => bail!("Unknown unit '{s}'"),
    }
}

/// Print one line per group label followed by one bar per row, `width` characters for the largest
/// value in the group.

pub fn render(output: &mut dyn io::Write, rows: &[ChartRow], width: usize) -> Result<()> {
    for label in rows.iter().map(|r| r.label.as_str()).unique() {
        let group = rows.iter().filter(|r| r.label == label).collect::<Vec<&ChartRow>>();
        let max = group.iter().map(|r| r.value).fold(0.0, f64::max);
        let nw = group.iter().map(|r| r.name.len()).max().unwrap_or(0);
        writeln!(output, "{label}")?;
        for r in group {
            let n = if max > 0.0 {
                ((r.value / max) * width as f64).round() as usize
            } else {
                0
            };
            let bar = "#".repeat(n);
            let s = format!("  {:nw$}  {:width$}  {} {}", r.name, bar, r.value, r.unit);
            writeln!(output, "{}", s.trim_end())?;
        }
    }
    Ok(())
}

#[cfg(test)]
fn render_to_string(rows: &[ChartRow], width: usize) -> String {
    let mut out = Vec::<u8>::new();
    render(&mut out, rows, width).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_chart_flat() {
    let table = "File,Benchmark,Metric,Value,Unit
a.txt,TCP,Throughput,100,MB/s
b.txt,Syscall,Syscall Latency,5.26,us
c.txt,TCP,Throughput,50,MB/s
";
    let rows = read_rows(io::Cursor::new(table)).unwrap();
    assert!(rows.len() == 3);
    assert!(rows[1].label == "Syscall (Syscall Latency)");
    assert!(rows[1].unit == Unit::Us);
    let expected = "TCP (Throughput)
  a.txt  ##########  100 MB/s
  c.txt  #####       50 MB/s
Syscall (Syscall Latency)
  b.txt  ##########  5.26 us
";
    assert!(render_to_string(&rows, 10) == expected);
}

#[test]
fn test_chart_detailed() {
    let table = "benchmark,operation,detail,value,unit
malloc,memory allocation,\"10 blocks, 64 bytes each\",0.5,seconds
malloc,memory allocation,\"1 blocks, 4096 bytes each\",0.25,seconds
boot,Boot Time,,0,seconds
";
    let rows = read_rows(io::Cursor::new(table)).unwrap();
    assert!(rows[0].label == "Malloc (memory allocation)");
    assert!(rows[2].label == "Boot (Boot Time)");
    let expected = "Malloc (memory allocation)
  10 blocks, 64 bytes each   ####  0.5 seconds
  1 blocks, 4096 bytes each  ##    0.25 seconds
Boot (Boot Time)
          0 seconds
";
    assert!(render_to_string(&rows, 4) == expected);
}

#[test]
fn test_chart_reads_sink_output() {
    let records = vec![benchlog::MetricRecord::new(
        ustr::Ustr::from("boot.txt"),
        Benchmark::Boot,
        "Boot Time",
        "".to_string(),
        453.0,
        Unit::Ms,
    )
    .unwrap()];
    for schema in [OutputSchema::Flat, OutputSchema::Detailed] {
        let mut out = Vec::<u8>::new();
        crate::sink::format_csv(&mut out, &records, schema).unwrap();
        let rows = read_rows(io::Cursor::new(out)).unwrap();
        assert!(rows.len() == 1);
        assert!(rows[0].label == "Boot (Boot Time)");
        assert!(rows[0].value == 453.0);
        assert!(rows[0].unit == Unit::Ms);
    }
}

#[test]
fn test_chart_errors() {
    let header = "File,Benchmark,Metric,Value,Unit\n";
    assert!(read_rows(io::Cursor::new("a,b,c\n1,2,3\n")).is_err());
    // Unknown benchmark, unknown unit, bad number
    for row in ["x,Disk,IO,1,ms\n", "x,Boot,T,1,hours\n", "x,Boot,T,fast,ms\n"] {
        assert!(read_rows(io::Cursor::new(format!("{header}{row}"))).is_err());
    }
    assert!(read_table(Path::new("no-such-table.csv")).is_err());
}
