/// Line scanner for benchmark log files.
///
/// NOTE:
///
/// - Every line is read exactly once and offered to every extractor that is interested in the
///   file.  Each extractor gets its own `ScannerState`, which carries the context that some formats
///   split across lines (the allocation being timed, the first and last kernel timestamps, and so
///   on).  State never crosses file boundaries.
///
/// - Lines that no matcher recognizes are expected noise and are skipped silently.  Lines that are
///   recognized but carry an unusable value (an overflowing literal, an unknown unit, a negative
///   duration) are dropped and counted; they never abort the scan.
///
/// - Invalid UTF-8 is replaced, not rejected, since the logs come from serial consoles that will
///   occasionally produce garbage.

use crate::extractors::{Emit, Extractor};
use crate::matchers::{match_line, Match};
use crate::MetricRecord;

use anyhow::Result;
use log::debug;
use std::io::BufRead;
use std::path::Path;
use ustr::Ustr;

/// Per-file, per-extractor carry-over state.

#[derive(Debug, Clone)]
pub struct ScannerState {
    /// The file being scanned, stamped on every record.
    pub source: Ustr,

    /// The last descriptive context seen (allocation size, syscall name).  Overwritten by the next
    /// context line, cleared when a claim is given up.
    pub pending_detail: Option<String>,

    /// Number of timestamped lines seen, and the first and last of them with line numbers.
    pub timestamps: usize,
    pub first_timestamp: Option<f64>,
    pub last_timestamp: Option<(usize, f64)>,

    /// Explicit start and end markers.  Only the first start and the first end after it count.
    pub start_marker: Option<f64>,
    pub end_marker: Option<(usize, f64)>,

    /// True once the file has shown a line that identifies it as belonging to this extractor, until
    /// a line belonging to another extractor gives the claim up.
    pub claimed: bool,

    /// True once an aggregate line has produced this file's single summary record.
    pub summary_seen: bool,
}

impl ScannerState {
    pub fn new(source: Ustr) -> ScannerState {
        ScannerState {
            source,
            pending_detail: None,
            timestamps: 0,
            first_timestamp: None,
            last_timestamp: None,
            start_marker: None,
            end_marker: None,
            claimed: false,
            summary_seen: false,
        }
    }
}

/// The result of scanning one file: records in line order, and the number of recognized lines that
/// were dropped.

#[derive(Debug, Default)]
pub struct FileScan {
    pub records: Vec<MetricRecord>,
    pub discarded: usize,
}

/// Scan a log file.  The name of the file (not the full path) becomes the records' `source`.
/// Returns an error only for I/O errors.

pub fn scan_logfile(path: &Path, extractors: &[&dyn Extractor]) -> Result<FileScan> {
    let file = std::fs::File::open(path)?;
    let source = match path.file_name() {
        Some(name) => Ustr::from(name.to_string_lossy().as_ref()),
        None => Ustr::from(path.to_string_lossy().as_ref()),
    };
    scan_reader(source, std::io::BufReader::new(file), extractors)
}

/// Scan lines from `reader`, feeding every extractor.  Records are returned ordered by the line
/// that completed them; records completed on the same line keep extractor order.

pub fn scan_reader<R: BufRead>(
    source: Ustr,
    mut reader: R,
    extractors: &[&dyn Extractor],
) -> Result<FileScan> {
    let mut states = extractors
        .iter()
        .map(|_| ScannerState::new(source))
        .collect::<Vec<ScannerState>>();
    let mut found: Vec<(usize, MetricRecord)> = vec![];
    let mut discarded: usize = 0;
    let mut buf = Vec::<u8>::new();
    let mut line_no = 0usize;

    let mut take = |line_no: usize, e: Emit, found: &mut Vec<(usize, MetricRecord)>| match e {
        Emit::Nothing => {}
        Emit::Record(r) => found.push((line_no, r)),
        Emit::Discard => {
            debug!("{source}:{line_no}: dropped unusable measurement");
            discarded += 1;
        }
    };

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(&['\n', '\r'][..]);
        for (x, state) in extractors.iter().zip(states.iter_mut()) {
            match match_line(x.matchers(), line) {
                Match::NoMatch => {}
                Match::Rejected => take(line_no, Emit::Discard, &mut found),
                m => take(line_no, x.step(state, line_no, m), &mut found),
            }
        }
    }

    for (x, state) in extractors.iter().zip(states.iter()) {
        if let Some((at, e)) = x.finish(state) {
            take(at, e, &mut found);
        }
    }

    // Stable, so ties keep the order in which they were produced.
    found.sort_by_key(|(n, _)| *n);

    Ok(FileScan {
        records: found.into_iter().map(|(_, r)| r).collect(),
        discarded,
    })
}

#[cfg(test)]
use crate::extractors::{BootExtractor, MallocExtractor, SyscallExtractor, TcpExtractor};
#[cfg(test)]
use crate::{Benchmark, BootStrategy, ExtractMode, Unit};

#[cfg(test)]
fn scan_str(text: &str, extractors: &[&dyn Extractor]) -> FileScan {
    scan_reader(Ustr::from("test.txt"), std::io::Cursor::new(text.as_bytes()), extractors).unwrap()
}

#[test]
fn test_scan_line_order_across_extractors() {
    // A combined log: the boot record is completed by the last timestamp, which comes after the
    // malloc line, so it must come after it in the output.
    let boot = BootExtractor::new(BootStrategy::Span, Unit::Ms, true);
    let malloc = MallocExtractor::new(ExtractMode::Summary, true);
    let text = "[0.500000] boot: starting\n\
                MALLOC_OPS: 843120\n\
                [0.750000] boot: done\n";
    let scan = scan_str(text, &[&boot, &malloc]);
    assert!(scan.records.len() == 2);
    assert!(scan.records[0].benchmark == Benchmark::Malloc);
    assert!(scan.records[1].benchmark == Benchmark::Boot);
    assert!(scan.records[1].value == (0.75 - 0.5) * 1000.0);
    assert!(scan.records[0].source.as_str() == "test.txt");
}

#[test]
fn test_scan_state_is_per_extractor() {
    // The syscall extractor must not see the malloc context, and vice versa.
    let malloc = MallocExtractor::new(ExtractMode::Events, false);
    let syscall = SyscallExtractor::new(ExtractMode::Events, true);
    let text = "Allocating 10 blocks of 64 bytes\nTime taken: 0.5 seconds\n";
    let scan = scan_str(text, &[&malloc, &syscall]);
    assert!(scan.records.len() == 1);
    assert!(scan.records[0].benchmark == Benchmark::Malloc);
    assert!(scan.records[0].detail == "10 blocks, 64 bytes each");
}

#[test]
fn test_scan_counts_discards() {
    let tcp = TcpExtractor::new(ExtractMode::Summary);
    let text = "TCP_THROUGHPUT: 1e999\nTCP_THROUGHPUT: 5 parsecs\nTCP_THROUGHPUT: 12.5\n";
    let scan = scan_str(text, &[&tcp]);
    assert!(scan.discarded == 2);
    assert!(scan.records.len() == 1);
    assert!(scan.records[0].value == 12.5);
    assert!(scan.records[0].unit == Unit::MBps);
}

#[test]
fn test_scan_tolerates_bad_utf8_and_crlf() {
    let tcp = TcpExtractor::new(ExtractMode::Events);
    let mut bytes = b"\xff\xfe garbage\r\n".to_vec();
    bytes.extend_from_slice(b"Sent 100 bytes in 0.25 seconds\r\n");
    let scan = scan_reader(Ustr::from("t"), std::io::Cursor::new(bytes), &[&tcp]).unwrap();
    assert!(scan.records.len() == 1);
    assert!(scan.records[0].unit == Unit::Seconds);
}

#[test]
fn test_scan_empty_input() {
    let boot = BootExtractor::new(BootStrategy::Marker, Unit::Seconds, false);
    let scan = scan_str("", &[&boot]);
    assert!(scan.records.is_empty() && scan.discarded == 0);
}

#[test]
fn test_scan_logfile_missing() {
    let tcp = TcpExtractor::new(ExtractMode::Events);
    assert!(scan_logfile(Path::new("../tests/benchlog/no-such-file.txt"), &[&tcp]).is_err());
}
