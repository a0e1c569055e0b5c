/// Unit resolution.  The benchmarks print units in whatever spelling and scale their authors
/// preferred; here the raw token from a log line is folded onto the closed set of output units,
/// and values are rescaled where a benchmark's output scale is outside what its records allow.
///
/// A token that names a unit in the closed set but has no conversion for the benchmark passes
/// through unchanged, so that the aggregator can reject it as a schema violation.  A token we do
/// not know at all makes the line unusable.

use crate::{Benchmark, Unit};

/// Resolve `token` for `benchmark`, returning the output unit and the value in that unit.

pub fn resolve_unit(benchmark: Benchmark, token: &str, value: f64) -> Option<(Unit, f64)> {
    let token = token.trim();

    // Spelling variants of units in the closed set.
    let folded = match token {
        "s" | "sec" | "secs" | "second" | "seconds" => Some(Unit::Seconds),
        "ms" | "msec" | "msecs" => Some(Unit::Ms),
        "us" | "usec" | "usecs" | "µs" => Some(Unit::Us),
        "ops/sec" | "ops/s" => Some(Unit::OpsPerSec),
        "MB/s" | "MB/sec" => Some(Unit::MBps),
        _ if token.eq_ignore_ascii_case("kops/sec") || token.eq_ignore_ascii_case("kops/s") => {
            Some(Unit::KopsPerSec)
        }
        _ => None,
    };

    match (benchmark, folded, token) {
        (Benchmark::Boot, _, "ns") => Some((Unit::Ms, value / 1e6)),
        (Benchmark::Boot, Some(Unit::Us), _) => Some((Unit::Ms, value / 1e3)),
        (Benchmark::Malloc, Some(Unit::OpsPerSec), _) => Some((Unit::KopsPerSec, value / 1e3)),
        (Benchmark::Syscall, _, "ns") => Some((Unit::Us, value / 1e3)),
        (Benchmark::Syscall, Some(Unit::Ms), _) => Some((Unit::Us, value * 1e3)),
        (Benchmark::Tcp, _, "Gbps") => Some((Unit::MBps, value * 125.0)),
        (Benchmark::Tcp, _, "Mbps") => Some((Unit::MBps, value / 8.0)),
        (Benchmark::Tcp, _, "KB/s") => Some((Unit::MBps, value / 1e3)),
        (_, Some(unit), _) => Some((unit, value)),
        (_, None, _) => None,
    }
}

/// Rescale a duration between the time units.  Returns None if either unit is not a time unit.

pub fn convert_time(value: f64, from: Unit, to: Unit) -> Option<f64> {
    let per_second = |u: Unit| match u {
        Unit::Seconds => Some(1.0),
        Unit::Ms => Some(1e3),
        Unit::Us => Some(1e6),
        _ => None,
    };
    let (f, t) = (per_second(from)?, per_second(to)?);
    if f == t {
        Some(value)
    } else {
        Some(value / f * t)
    }
}

#[test]
fn test_resolve_spelling() {
    assert!(resolve_unit(Benchmark::Tcp, "seconds", 2.0) == Some((Unit::Seconds, 2.0)));
    assert!(resolve_unit(Benchmark::Tcp, "sec", 2.0) == Some((Unit::Seconds, 2.0)));
    assert!(resolve_unit(Benchmark::Malloc, "kops/sec", 8.5) == Some((Unit::KopsPerSec, 8.5)));
    assert!(resolve_unit(Benchmark::Malloc, "Kops/sec", 8.5) == Some((Unit::KopsPerSec, 8.5)));
    assert!(resolve_unit(Benchmark::Syscall, "µs", 3.0) == Some((Unit::Us, 3.0)));
}

#[test]
fn test_resolve_conversions() {
    assert!(
        resolve_unit(Benchmark::Malloc, "ops/sec", 843120.0) == Some((Unit::KopsPerSec, 843.12))
    );
    assert!(resolve_unit(Benchmark::Syscall, "ns", 5260.0) == Some((Unit::Us, 5.26)));
    assert!(resolve_unit(Benchmark::Syscall, "ms", 2.0) == Some((Unit::Us, 2000.0)));
    assert!(resolve_unit(Benchmark::Tcp, "Gbps", 2.0) == Some((Unit::MBps, 250.0)));
    assert!(resolve_unit(Benchmark::Tcp, "Mbps", 80.0) == Some((Unit::MBps, 10.0)));
    assert!(resolve_unit(Benchmark::Boot, "ns", 453000000.0) == Some((Unit::Ms, 453.0)));
}

#[test]
fn test_resolve_passthrough_and_unknown() {
    // Known unit, no conversion: left for the aggregator to reject.
    assert!(resolve_unit(Benchmark::Syscall, "MB/s", 1.0) == Some((Unit::MBps, 1.0)));
    assert!(resolve_unit(Benchmark::Boot, "ops/sec", 1.0) == Some((Unit::OpsPerSec, 1.0)));
    assert!(resolve_unit(Benchmark::Tcp, "furlongs", 1.0).is_none());
    assert!(resolve_unit(Benchmark::Malloc, "ns", 1.0).is_none());
}

#[test]
fn test_convert_time() {
    assert!(convert_time(0.453, Unit::Seconds, Unit::Ms) == Some(0.453 / 1.0 * 1e3));
    assert!(convert_time(453.0, Unit::Ms, Unit::Seconds) == Some(0.453));
    assert!(convert_time(7.0, Unit::Ms, Unit::Ms) == Some(7.0));
    assert!(convert_time(7.0, Unit::MBps, Unit::Ms).is_none());
}
