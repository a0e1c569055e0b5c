/// The normalized data model: benchmark kinds, the closed set of units, and the record type that
/// every extractor produces.

use std::fmt;
use ustr::Ustr;

/// The benchmark family that produced a record.

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Benchmark {
    Boot,
    Malloc,
    Syscall,
    Tcp,
}

impl Benchmark {
    /// The units a record of this kind may carry.  Anything else is a schema violation.

    pub fn allowed_units(self) -> &'static [Unit] {
        match self {
            Benchmark::Boot => &[Unit::Seconds, Unit::Ms],
            Benchmark::Malloc => &[Unit::Seconds, Unit::KopsPerSec],
            Benchmark::Syscall => &[Unit::Seconds, Unit::Us],
            Benchmark::Tcp => &[Unit::Seconds, Unit::MBps],
        }
    }

    pub fn allows(self, unit: Unit) -> bool {
        self.allowed_units().contains(&unit)
    }

    /// Name as written in the flat table.  "TCP" is uppercase for compatibility with existing
    /// result files.

    pub fn title(self) -> &'static str {
        match self {
            Benchmark::Boot => "Boot",
            Benchmark::Malloc => "Malloc",
            Benchmark::Syscall => "Syscall",
            Benchmark::Tcp => "TCP",
        }
    }

    /// Name as written in the detailed table.

    pub fn key(self) -> &'static str {
        match self {
            Benchmark::Boot => "boot",
            Benchmark::Malloc => "malloc",
            Benchmark::Syscall => "syscall",
            Benchmark::Tcp => "tcp",
        }
    }

    /// Accept either rendering, case-insensitively.

    pub fn from_name(s: &str) -> Option<Benchmark> {
        match s.to_ascii_lowercase().as_str() {
            "boot" => Some(Benchmark::Boot),
            "malloc" => Some(Benchmark::Malloc),
            "syscall" => Some(Benchmark::Syscall),
            "tcp" => Some(Benchmark::Tcp),
            _ => None,
        }
    }

    pub const ALL: [Benchmark; 4] = [
        Benchmark::Boot,
        Benchmark::Malloc,
        Benchmark::Syscall,
        Benchmark::Tcp,
    ];
}

impl fmt::Display for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// The closed set of output units.

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Unit {
    Ms,
    Us,
    Seconds,
    OpsPerSec,
    KopsPerSec,
    MBps,
}

impl Unit {
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Ms => "ms",
            Unit::Us => "us",
            Unit::Seconds => "seconds",
            Unit::OpsPerSec => "ops/sec",
            Unit::KopsPerSec => "Kops/sec",
            Unit::MBps => "MB/s",
        }
    }

    /// Exact spelling only; spelling variants are folded by the normalizer before this is called.

    pub fn from_token(s: &str) -> Option<Unit> {
        match s {
            "ms" => Some(Unit::Ms),
            "us" => Some(Unit::Us),
            "seconds" => Some(Unit::Seconds),
            "ops/sec" => Some(Unit::OpsPerSec),
            "Kops/sec" => Some(Unit::KopsPerSec),
            "MB/s" => Some(Unit::MBps),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One measurement.  Records are built once by an extractor and never mutated; the fields are
/// public for reading but the only constructor validates the value.
///
/// `source` and `operation` repeat across many records and are interned.

#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    /// The log file the record came from.
    pub source: Ustr,

    pub benchmark: Benchmark,

    /// Human-readable sub-operation, eg "memory allocation" or "Syscall Latency".
    pub operation: Ustr,

    /// Context captured from the measurement line or a preceding line (block counts, call names,
    /// byte counts).  Empty if there is none.
    pub detail: String,

    /// Always finite and non-negative.
    pub value: f64,

    pub unit: Unit,
}

impl MetricRecord {
    /// Returns None if `value` is negative, infinite or NaN; such a measurement is dropped rather
    /// than emitted.

    pub fn new(
        source: Ustr,
        benchmark: Benchmark,
        operation: &str,
        detail: String,
        value: f64,
        unit: Unit,
    ) -> Option<MetricRecord> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        Some(MetricRecord {
            source,
            benchmark,
            operation: Ustr::from(operation),
            detail,
            value,
            unit,
        })
    }
}

#[test]
fn test_record_rejects_bad_values() {
    let src = Ustr::from("x.txt");
    assert!(MetricRecord::new(src, Benchmark::Boot, "Boot Time", "".to_string(), -0.5, Unit::Ms)
        .is_none());
    assert!(MetricRecord::new(src, Benchmark::Boot, "Boot Time", "".to_string(), f64::NAN, Unit::Ms)
        .is_none());
    assert!(MetricRecord::new(
        src,
        Benchmark::Boot,
        "Boot Time",
        "".to_string(),
        f64::INFINITY,
        Unit::Ms
    )
    .is_none());
    let r = MetricRecord::new(src, Benchmark::Boot, "Boot Time", "".to_string(), 0.0, Unit::Ms)
        .unwrap();
    assert!(r.value == 0.0);
    assert!(r.operation.as_str() == "Boot Time");
}

#[test]
fn test_allowed_units() {
    assert!(Benchmark::Boot.allows(Unit::Ms));
    assert!(Benchmark::Boot.allows(Unit::Seconds));
    assert!(!Benchmark::Boot.allows(Unit::Us));
    assert!(Benchmark::Malloc.allows(Unit::KopsPerSec));
    assert!(!Benchmark::Malloc.allows(Unit::OpsPerSec));
    assert!(Benchmark::Syscall.allows(Unit::Us));
    assert!(!Benchmark::Syscall.allows(Unit::Ms));
    assert!(Benchmark::Tcp.allows(Unit::MBps));
    assert!(!Benchmark::Tcp.allows(Unit::KopsPerSec));
}

#[test]
fn test_names() {
    for b in Benchmark::ALL {
        assert!(Benchmark::from_name(b.title()) == Some(b));
        assert!(Benchmark::from_name(b.key()) == Some(b));
    }
    assert!(Benchmark::Tcp.to_string() == "TCP");
    assert!(Benchmark::from_name("disk").is_none());
    assert!(Unit::from_token("Kops/sec") == Some(Unit::KopsPerSec));
    assert!(Unit::from_token("kops/sec").is_none());
}
