/// Enumerate log files in a results directory; run the pipeline over a set of files.

use crate::aggregate::{Aggregator, Table};
use crate::extractors::{make_extractor, Extractor};
use crate::scanner::scan_logfile;
use crate::{Benchmark, Binding, PipelineConfig};

use anyhow::{bail, Result};
use log::warn;
use std::path::{Path, PathBuf};

/// A log file to be scanned, and the benchmark it's bound to by name, if any.

#[derive(Debug, Clone, PartialEq)]
pub struct LogFile {
    pub path: PathBuf,
    pub bound: Option<Benchmark>,
}

/// The fixed names, in processing order.

pub const FIXED_NAMES: [(&str, Benchmark); 4] = [
    ("benchmark-boot.txt", Benchmark::Boot),
    ("benchmark-malloc.txt", Benchmark::Malloc),
    ("benchmark-syscall.txt", Benchmark::Syscall),
    ("benchmark-tcp.txt", Benchmark::Tcp),
];

/// Find the log files in `dir`.
///
/// With `Binding::Sniff` these are all the regular `*.txt` files in the directory, sorted by name,
/// and no file is bound.  With `Binding::Fixed` these are the fixed names that exist, each bound to
/// its benchmark; a warning is logged for every one that is absent.
///
/// This returns an error if `dir` does not name a directory or if the directory cannot be read.

pub fn find_logfiles(dir: &Path, binding: Binding) -> Result<Vec<LogFile>> {
    if !dir.is_dir() {
        bail!("Not a viable results directory: {}", dir.display());
    }

    match binding {
        Binding::Fixed => {
            let mut files = vec![];
            for (name, kind) in FIXED_NAMES {
                let path = dir.join(name);
                if path.is_file() {
                    files.push(LogFile {
                        path,
                        bound: Some(kind),
                    });
                } else {
                    warn!("{} not found, no {kind} records", path.display());
                }
            }
            Ok(files)
        }
        Binding::Sniff => {
            let mut paths = vec![];
            for entry in dir.read_dir()? {
                // Bad directory entries are ignored; read_dir makes progress past them.
                let Ok(entry) = entry else {
                    continue;
                };
                let p = entry.path();
                if p.is_file() && p.extension().is_some_and(|e| e == "txt") {
                    paths.push(p);
                }
            }
            paths.sort();
            Ok(paths
                .into_iter()
                .map(|path| LogFile { path, bound: None })
                .collect())
        }
    }
}

/// The result of a run.

#[derive(Debug, Default)]
pub struct RunOutcome {
    pub table: Table,

    /// Recognized lines whose measurement could not be used.
    pub discarded: usize,

    /// Files that could not be read.
    pub files_skipped: usize,
}

/// Scan all the files in order and merge their records.
///
/// A bound file is scanned by its own extractor only.  An unbound file is offered to every
/// extractor, each of which has to find evidence that the file is its own.  A file that cannot be
/// read is logged and contributes nothing.

pub fn read_logfiles(files: &[LogFile], config: &PipelineConfig) -> Result<RunOutcome> {
    let bound = Benchmark::ALL
        .iter()
        .map(|kind| make_extractor(*kind, config, false))
        .collect::<Vec<Box<dyn Extractor>>>();
    let unbound = Benchmark::ALL
        .iter()
        .map(|kind| make_extractor(*kind, config, true))
        .collect::<Vec<Box<dyn Extractor>>>();

    let mut agg = Aggregator::new();
    let mut discarded = 0;
    let mut files_skipped = 0;
    for file in files {
        let xs = match file.bound {
            Some(kind) => bound
                .iter()
                .filter(|x| x.kind() == kind)
                .map(|x| x.as_ref())
                .collect::<Vec<&dyn Extractor>>(),
            None => unbound.iter().map(|x| x.as_ref()).collect::<Vec<&dyn Extractor>>(),
        };
        match scan_logfile(&file.path, &xs) {
            Ok(scan) => {
                discarded += scan.discarded;
                agg.push_file(scan.records);
            }
            Err(e) => {
                warn!("Skipping {}: {e}", file.path.display());
                files_skipped += 1;
            }
        }
    }

    Ok(RunOutcome {
        table: agg.finish(),
        discarded,
        files_skipped,
    })
}

#[cfg(test)]
use crate::{ExtractMode, Unit};

#[test]
fn test_find_logfiles_sniff() {
    // The tree has a non-txt file and a subdirectory, neither should be listed.
    let xs = find_logfiles(Path::new("../tests/benchlog/sniff-tree"), Binding::Sniff).unwrap();
    let names = xs
        .iter()
        .map(|f| f.path.file_name().unwrap().to_str().unwrap().to_string())
        .collect::<Vec<String>>();
    assert!(names == vec!["boot.txt", "malloc.txt", "mixed.txt", "syscall.txt", "tcp.txt"]);
    assert!(xs.iter().all(|f| f.bound.is_none()));
}

#[test]
fn test_find_logfiles_fixed() {
    // malloc and tcp are absent: warned about, not an error.
    let xs = find_logfiles(Path::new("../tests/benchlog/fixed-tree"), Binding::Fixed).unwrap();
    assert!(xs.len() == 2);
    assert!(xs[0].bound == Some(Benchmark::Boot));
    assert!(xs[1].bound == Some(Benchmark::Syscall));
    assert!(xs[1].path.ends_with("benchmark-syscall.txt"));
}

#[test]
fn test_find_logfiles_bad_dir() {
    assert!(find_logfiles(Path::new("../tests/benchlog/no-such-dir"), Binding::Sniff).is_err());
    // A file is not a directory
    assert!(find_logfiles(Path::new("../tests/benchlog/whitebox-config.json"), Binding::Fixed)
        .is_err());
}

#[test]
fn test_read_logfiles_sniff() {
    let files = find_logfiles(Path::new("../tests/benchlog/sniff-tree"), Binding::Sniff).unwrap();
    let outcome = read_logfiles(&files, &PipelineConfig::default()).unwrap();
    let rs = &outcome.table.records;
    let got = rs
        .iter()
        .map(|r| (r.source.as_str(), r.benchmark, r.operation.as_str(), r.value, r.unit))
        .collect::<Vec<_>>();
    assert!(
        got == vec![
            ("boot.txt", Benchmark::Boot, "Boot Time", 453.0, Unit::Ms),
            ("malloc.txt", Benchmark::Malloc, "Malloc Ops/Sec", 843.12, Unit::KopsPerSec),
            ("mixed.txt", Benchmark::Syscall, "Syscall Latency", 5.26, Unit::Us),
            ("mixed.txt", Benchmark::Tcp, "Throughput", 112.5, Unit::MBps),
            ("syscall.txt", Benchmark::Syscall, "Syscall Latency", 5.26, Unit::Us),
            ("tcp.txt", Benchmark::Tcp, "Throughput", 250.0, Unit::MBps),
        ]
    );
    assert!(outcome.table.violations == 0);
    assert!(outcome.files_skipped == 0);
}

#[test]
fn test_read_logfiles_fixed_events() {
    let config = PipelineConfig {
        binding: Binding::Fixed,
        boot: crate::BootStrategy::Span,
        syscall: ExtractMode::Events,
        ..PipelineConfig::default()
    };
    let files = find_logfiles(Path::new("../tests/benchlog/fixed-tree"), config.binding).unwrap();
    let outcome = read_logfiles(&files, &config).unwrap();
    let rs = &outcome.table.records;
    assert!(rs.len() == 3);

    // Bound by name, so the boot file needs no "boot" line to be claimed.
    assert!(rs[0].benchmark == Benchmark::Boot);
    assert!(rs[0].value == (2.5 - 0.25) * 1000.0);
    assert!(rs[0].unit == Unit::Ms);

    assert!(rs[1].detail == "getpid");
    assert!(rs[1].value == 0.000052);
    assert!(rs[2].detail == "getppid");
    assert!(rs[2].unit == Unit::Seconds);
}

#[test]
fn test_read_logfiles_unreadable() {
    let files = vec![
        LogFile {
            path: PathBuf::from("../tests/benchlog/no-such-file.txt"),
            bound: None,
        },
        LogFile {
            path: PathBuf::from("../tests/benchlog/sniff-tree/tcp.txt"),
            bound: None,
        },
    ];
    let outcome = read_logfiles(&files, &PipelineConfig::default()).unwrap();
    assert!(outcome.files_skipped == 1);
    assert!(outcome.table.records.len() == 1);
}

#[test]
fn test_read_logfiles_violation() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("odd.txt"),
        "SYSCALL_LATENCY: 5 MB/s\nSYSCALL_LATENCY: 4\nTCP_THROUGHPUT: 7 parsecs\n",
    )
    .unwrap();
    let files = find_logfiles(dir.path(), Binding::Sniff).unwrap();
    let outcome = read_logfiles(&files, &PipelineConfig::default()).unwrap();
    // The wrong unit is rejected, and the next summary line takes its place.
    assert!(outcome.table.violations == 1);
    assert!(outcome.table.records.len() == 1);
    assert!(outcome.table.records[0].value == 4.0);
    assert!(outcome.table.records[0].unit == Unit::Us);
    assert!(outcome.discarded == 1);
}

#[test]
fn test_read_logfiles_two_benchmarks_one_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("both.txt"),
        "Allocating 10 blocks of 64 bytes\nTime taken: 0.5 seconds\n\
         Invoking getpid\nTime taken: 0.000052 seconds\n",
    )
    .unwrap();
    let config = PipelineConfig {
        malloc: ExtractMode::Events,
        syscall: ExtractMode::Events,
        ..PipelineConfig::default()
    };
    let files = find_logfiles(dir.path(), Binding::Sniff).unwrap();
    let outcome = read_logfiles(&files, &config).unwrap();
    let rs = &outcome.table.records;
    // Each timing line goes to exactly one benchmark.
    assert!(rs.len() == 2);
    assert!(rs[0].benchmark == Benchmark::Malloc);
    assert!(rs[0].detail == "10 blocks, 64 bytes each" && rs[0].value == 0.5);
    assert!(rs[1].benchmark == Benchmark::Syscall);
    assert!(rs[1].detail == "getpid" && rs[1].value == 0.000052);
}
