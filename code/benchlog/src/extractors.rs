/// One extractor per benchmark kind.  An extractor is pure configuration: which matchers to run,
/// and what to do with a match.  The mutable per-file context is a `ScannerState` owned by the
/// scanner and passed in on every step, so one extractor value can be reused across files.
///
/// Two conventions exist for most benchmarks and we pick one per run, never both:
///
///  - Boot: the span from the first to the last kernel timestamp in the file, the span between an
///    explicit start marker and an explicit end marker, or a duration the benchmark reported
///    itself.
///
///  - Malloc, Syscall, Tcp: one record per timed event, or a single record from the aggregate line
///    the benchmark prints at the end.

use crate::matchers::{
    BootEvent, Candidate, Match, Matcher, MallocEvent, SyscallEvent, TcpEvent,
    BOOT_MARKER_MATCHERS, BOOT_SPAN_MATCHERS, BOOT_SUMMARY_MATCHERS, MALLOC_EVENT_MATCHERS,
    MALLOC_SUMMARY_MATCHERS, SYSCALL_EVENT_MATCHERS, SYSCALL_SUMMARY_MATCHERS, TCP_EVENT_MATCHERS,
    TCP_SUMMARY_MATCHERS,
};
use crate::normalize::{convert_time, resolve_unit};
use crate::scanner::ScannerState;
use crate::{Benchmark, BootStrategy, ExtractMode, MetricRecord, PipelineConfig, Unit};

use log::debug;

/// What a step produced.

#[derive(Debug, Clone, PartialEq)]
pub enum Emit {
    Nothing,
    Record(MetricRecord),

    /// The line was ours but the measurement is unusable.
    Discard,
}

pub trait Extractor {
    fn kind(&self) -> Benchmark;

    /// The matchers to run on every line, in priority order.
    fn matchers(&self) -> &'static [Matcher];

    /// Handle a match for one of our matchers on line `line_no`.
    fn step(&self, state: &mut ScannerState, line_no: usize, m: Match) -> Emit;

    /// Called at end of file.  Returns the line the result belongs to, for ordering.
    fn finish(&self, state: &ScannerState) -> Option<(usize, Emit)>;
}

/// Build the extractor for `kind` as configured.  `require_claim` is set when the file was not
/// bound to this kind by name, see the extractors for what it means for each.

pub fn make_extractor(
    kind: Benchmark,
    config: &PipelineConfig,
    require_claim: bool,
) -> Box<dyn Extractor> {
    match kind {
        Benchmark::Boot => Box::new(BootExtractor::new(
            config.boot,
            config.boot_unit(),
            require_claim,
        )),
        Benchmark::Malloc => Box::new(MallocExtractor::new(config.malloc, require_claim)),
        Benchmark::Syscall => Box::new(SyscallExtractor::new(config.syscall, require_claim)),
        Benchmark::Tcp => Box::new(TcpExtractor::new(config.tcp)),
    }
}

// Operation names.  The aggregate names are those used by existing result tables.

pub const OP_BOOT_TIME: &str = "Boot Time";
pub const OP_MALLOC_OPS: &str = "Malloc Ops/Sec";
pub const OP_SYSCALL_LATENCY: &str = "Syscall Latency";
pub const OP_THROUGHPUT: &str = "Throughput";
pub const OP_MEMORY_ALLOCATION: &str = "memory allocation";
pub const OP_SYSTEM_CALL: &str = "system call";
pub const OP_TCP_SEND: &str = "tcp send";
pub const OP_TCP_RECEIVE: &str = "tcp receive";
pub const OP_TCP_TRANSFER: &str = "tcp transfer";

/// Turn a candidate into a record: resolve the unit token, then validate the value.

fn emit_candidate(
    state: &ScannerState,
    kind: Benchmark,
    operation: &str,
    detail: String,
    c: &Candidate,
) -> Emit {
    let Some((unit, value)) = resolve_unit(kind, &c.unit, c.value) else {
        debug!("{}: unknown unit `{}` for {kind}", state.source, c.unit);
        return Emit::Discard;
    };
    emit_value(state, kind, operation, detail, value, unit)
}

fn emit_value(
    state: &ScannerState,
    kind: Benchmark,
    operation: &str,
    detail: String,
    value: f64,
    unit: Unit,
) -> Emit {
    match MetricRecord::new(state.source, kind, operation, detail, value, unit) {
        Some(r) => Emit::Record(r),
        None => Emit::Discard,
    }
}

/// Emit the file's single summary record from the first aggregate line whose unit is valid for
/// the benchmark.  A record with a unit the benchmark does not allow is still emitted, for the
/// aggregator to reject, but does not use up the summary.

fn emit_summary(
    state: &mut ScannerState,
    kind: Benchmark,
    operation: &str,
    detail: String,
    c: &Candidate,
) -> Emit {
    if state.summary_seen {
        debug!("{}: ignoring repeated {kind} summary", state.source);
        return Emit::Nothing;
    }
    let e = emit_candidate(state, kind, operation, detail, c);
    if let Emit::Record(ref r) = e {
        state.summary_seen = kind.allows(r.unit);
    }
    e
}

// Another benchmark's context has started; its timing lines are not ours.

fn release_claim(state: &mut ScannerState) {
    state.claimed = false;
    state.pending_detail = None;
}

/// Boot duration.
///
/// With `require_claim`, the span strategy reports only for files where some timestamped line
/// mentions "boot"; every kernel-style log has timestamps, and without the check any such file
/// would be taken for a boot log.  The marker and summary strategies are self-identifying.

pub struct BootExtractor {
    strategy: BootStrategy,
    unit: Unit,
    require_claim: bool,
}

impl BootExtractor {
    /// `unit` must be a time unit, `Unit::Seconds` or `Unit::Ms`.

    pub fn new(strategy: BootStrategy, unit: Unit, require_claim: bool) -> BootExtractor {
        BootExtractor {
            strategy,
            unit,
            require_claim,
        }
    }

    fn record(&self, state: &ScannerState, value: f64, unit: Unit) -> Emit {
        emit_value(state, Benchmark::Boot, OP_BOOT_TIME, "".to_string(), value, unit)
    }

    // Timestamps are in seconds.
    fn scale(&self) -> f64 {
        if self.unit == Unit::Ms {
            1000.0
        } else {
            1.0
        }
    }
}

impl Extractor for BootExtractor {
    fn kind(&self) -> Benchmark {
        Benchmark::Boot
    }

    fn matchers(&self) -> &'static [Matcher] {
        match self.strategy {
            BootStrategy::Span => BOOT_SPAN_MATCHERS,
            BootStrategy::Marker => BOOT_MARKER_MATCHERS,
            BootStrategy::Summary => BOOT_SUMMARY_MATCHERS,
        }
    }

    fn step(&self, state: &mut ScannerState, line_no: usize, m: Match) -> Emit {
        let Match::Boot(ev) = m else {
            return Emit::Nothing;
        };
        match ev {
            BootEvent::Timestamp { at, mentions_boot } => {
                if state.first_timestamp.is_none() {
                    state.first_timestamp = Some(at);
                }
                state.timestamps += 1;
                state.last_timestamp = Some((line_no, at));
                state.claimed |= mentions_boot;
                Emit::Nothing
            }
            BootEvent::Start(t) => {
                if state.start_marker.is_none() {
                    state.start_marker = Some(t);
                }
                Emit::Nothing
            }
            BootEvent::End(t) => {
                if state.start_marker.is_some() && state.end_marker.is_none() {
                    state.end_marker = Some((line_no, t));
                }
                Emit::Nothing
            }
            BootEvent::Reported(c) => {
                if state.summary_seen {
                    return Emit::Nothing;
                }
                let Some((unit, value)) = resolve_unit(Benchmark::Boot, &c.unit, c.value) else {
                    return Emit::Discard;
                };
                // Bring time units onto the configured scale; anything else is passed on for
                // the aggregator to reject.
                let (unit, value) = match convert_time(value, unit, self.unit) {
                    Some(v) => (self.unit, v),
                    None => (unit, value),
                };
                let e = self.record(state, value, unit);
                if let Emit::Record(ref r) = e {
                    state.summary_seen = Benchmark::Boot.allows(r.unit);
                }
                e
            }
        }
    }

    fn finish(&self, state: &ScannerState) -> Option<(usize, Emit)> {
        match self.strategy {
            BootStrategy::Span => {
                if state.timestamps < 2 || (self.require_claim && !state.claimed) {
                    return None;
                }
                let first = state.first_timestamp?;
                let (at, last) = state.last_timestamp?;
                let value = (last - first) * self.scale();
                Some((at, self.record(state, value, self.unit)))
            }
            BootStrategy::Marker => {
                let start = state.start_marker?;
                let (at, end) = state.end_marker?;
                let value = (end - start) * self.scale();
                Some((at, self.record(state, value, self.unit)))
            }
            BootStrategy::Summary => None,
        }
    }
}

/// Allocator benchmark.
///
/// In events mode, every "Time taken" line becomes a record carrying the most recent "Allocating"
/// context.  With `require_claim`, "Time taken" lines are ignored until an "Allocating" line has
/// been seen, since the syscall benchmark prints the same timing lines, and an "Invoking" line
/// gives up the claim again until the next "Allocating" line.

pub struct MallocExtractor {
    mode: ExtractMode,
    require_claim: bool,
}

impl MallocExtractor {
    pub fn new(mode: ExtractMode, require_claim: bool) -> MallocExtractor {
        MallocExtractor {
            mode,
            require_claim,
        }
    }
}

impl Extractor for MallocExtractor {
    fn kind(&self) -> Benchmark {
        Benchmark::Malloc
    }

    fn matchers(&self) -> &'static [Matcher] {
        match self.mode {
            ExtractMode::Events => MALLOC_EVENT_MATCHERS,
            ExtractMode::Summary => MALLOC_SUMMARY_MATCHERS,
        }
    }

    fn step(&self, state: &mut ScannerState, _line_no: usize, m: Match) -> Emit {
        let Match::Malloc(ev) = m else {
            return Emit::Nothing;
        };
        match ev {
            MallocEvent::Allocating(detail) => {
                state.pending_detail = Some(detail);
                state.claimed = true;
                Emit::Nothing
            }
            MallocEvent::TimeTaken(c) => {
                if self.require_claim && !state.claimed {
                    return Emit::Nothing;
                }
                let detail = state.pending_detail.clone().unwrap_or_default();
                emit_candidate(state, Benchmark::Malloc, OP_MEMORY_ALLOCATION, detail, &c)
            }
            MallocEvent::Throughput(c) => {
                emit_summary(state, Benchmark::Malloc, OP_MALLOC_OPS, "".to_string(), &c)
            }
            MallocEvent::Foreign => {
                if self.require_claim {
                    release_claim(state);
                }
                Emit::Nothing
            }
        }
    }

    fn finish(&self, _state: &ScannerState) -> Option<(usize, Emit)> {
        None
    }
}

/// System call benchmark, keyed on "Invoking X" context lines.  Same rules as for Malloc, with the
/// roles of "Allocating" and "Invoking" swapped.  The summary record has no detail, whichever form
/// the aggregate line takes.

pub struct SyscallExtractor {
    mode: ExtractMode,
    require_claim: bool,
}

impl SyscallExtractor {
    pub fn new(mode: ExtractMode, require_claim: bool) -> SyscallExtractor {
        SyscallExtractor {
            mode,
            require_claim,
        }
    }
}

impl Extractor for SyscallExtractor {
    fn kind(&self) -> Benchmark {
        Benchmark::Syscall
    }

    fn matchers(&self) -> &'static [Matcher] {
        match self.mode {
            ExtractMode::Events => SYSCALL_EVENT_MATCHERS,
            ExtractMode::Summary => SYSCALL_SUMMARY_MATCHERS,
        }
    }

    fn step(&self, state: &mut ScannerState, _line_no: usize, m: Match) -> Emit {
        let Match::Syscall(ev) = m else {
            return Emit::Nothing;
        };
        match ev {
            SyscallEvent::Invoking(name) => {
                state.pending_detail = Some(name);
                state.claimed = true;
                Emit::Nothing
            }
            SyscallEvent::TimeTaken(c) => {
                if self.require_claim && !state.claimed {
                    return Emit::Nothing;
                }
                let detail = state.pending_detail.clone().unwrap_or_default();
                emit_candidate(state, Benchmark::Syscall, OP_SYSTEM_CALL, detail, &c)
            }
            SyscallEvent::Latency(c) => {
                emit_summary(state, Benchmark::Syscall, OP_SYSCALL_LATENCY, "".to_string(), &c)
            }
            SyscallEvent::Foreign => {
                if self.require_claim {
                    release_claim(state);
                }
                Emit::Nothing
            }
        }
    }

    fn finish(&self, _state: &ScannerState) -> Option<(usize, Emit)> {
        None
    }
}

/// Network benchmark.  Every line format is self-identifying, so there is no claim rule.

pub struct TcpExtractor {
    mode: ExtractMode,
}

impl TcpExtractor {
    pub fn new(mode: ExtractMode) -> TcpExtractor {
        TcpExtractor { mode }
    }
}

impl Extractor for TcpExtractor {
    fn kind(&self) -> Benchmark {
        Benchmark::Tcp
    }

    fn matchers(&self) -> &'static [Matcher] {
        match self.mode {
            ExtractMode::Events => TCP_EVENT_MATCHERS,
            ExtractMode::Summary => TCP_SUMMARY_MATCHERS,
        }
    }

    fn step(&self, state: &mut ScannerState, _line_no: usize, m: Match) -> Emit {
        let Match::Tcp(ev) = m else {
            return Emit::Nothing;
        };
        match ev {
            TcpEvent::Sent(c) => {
                emit_candidate(state, Benchmark::Tcp, OP_TCP_SEND, c.detail.clone(), &c)
            }
            TcpEvent::Received(c) => {
                emit_candidate(state, Benchmark::Tcp, OP_TCP_RECEIVE, c.detail.clone(), &c)
            }
            TcpEvent::Transfer(c) => {
                emit_candidate(state, Benchmark::Tcp, OP_TCP_TRANSFER, "".to_string(), &c)
            }
            TcpEvent::Throughput(c) => {
                emit_summary(state, Benchmark::Tcp, OP_THROUGHPUT, "".to_string(), &c)
            }
        }
    }

    fn finish(&self, _state: &ScannerState) -> Option<(usize, Emit)> {
        None
    }
}

#[cfg(test)]
use crate::scanner::scan_reader;
#[cfg(test)]
use ustr::Ustr;

#[cfg(test)]
fn extract(text: &str, x: &dyn Extractor) -> Vec<MetricRecord> {
    scan_reader(Ustr::from("log.txt"), std::io::Cursor::new(text.as_bytes()), &[x])
        .unwrap()
        .records
}

#[test]
fn test_boot_span() {
    let x = BootExtractor::new(BootStrategy::Span, Unit::Ms, false);
    let rs = extract(
        "[0.000000] Booting\nsome noise\n[0.104000] Mounting\n[1.250000] Ready\n",
        &x,
    );
    assert!(rs.len() == 1);
    assert!(rs[0].value == (1.25 - 0.0) * 1000.0);
    assert!(rs[0].unit == Unit::Ms);
    assert!(rs[0].operation.as_str() == OP_BOOT_TIME);

    // Fewer than two timestamps is no record, not an error.
    assert!(extract("[0.5] only one\n", &x).is_empty());
    assert!(extract("nothing at all\n", &x).is_empty());
}

#[test]
fn test_boot_span_claim() {
    let x = BootExtractor::new(BootStrategy::Span, Unit::Ms, true);
    assert!(extract("[0.1] malloc starting\n[0.2] malloc done\n", &x).is_empty());
    let rs = extract("[0.1] boot\n[0.2] done\n", &x);
    assert!(rs.len() == 1);
}

#[test]
fn test_boot_span_non_monotonic() {
    // A clock that goes backwards gives a negative span, which is dropped.
    let x = BootExtractor::new(BootStrategy::Span, Unit::Seconds, false);
    assert!(extract("[5.0] a\n[1.0] b\n", &x).is_empty());
}

#[test]
fn test_boot_marker() {
    let x = BootExtractor::new(BootStrategy::Marker, Unit::Seconds, false);
    let rs = extract(
        "[99.000000] early line\n[100.000000] boot benchmark: start\n[100.200000] init\n\
         [100.453000] boot benchmark: end\n[101.000000] late line\n",
        &x,
    );
    assert!(rs.len() == 1);
    assert!(rs[0].value == (100.453 - 100.0) * 1.0);
    assert!(rs[0].unit == Unit::Seconds);
    assert!(rs[0].benchmark == Benchmark::Boot);

    // Missing end, or end without start, yields nothing.
    assert!(extract("[1.0] boot benchmark: start\n", &x).is_empty());
    assert!(extract("[1.0] boot benchmark: end\n[0.5] boot benchmark: start\n", &x).is_empty());
}

#[test]
fn test_boot_summary() {
    let x = BootExtractor::new(BootStrategy::Summary, Unit::Ms, false);
    let rs = extract(
        "[BOOT TIME] Start timestamp: 1000 ns\n[BOOT TIME] Reached main()\n\
         [BOOT TIME] Duration: 453000000 ns (453.000 ms)\nBOOT_TIME: 12\n",
        &x,
    );
    assert!(rs.len() == 1);
    assert!(rs[0].value == 453.0);
    assert!(rs[0].unit == Unit::Ms);

    let x = BootExtractor::new(BootStrategy::Summary, Unit::Seconds, false);
    let rs = extract("BOOT_TIME: 453\n", &x);
    assert!(rs.len() == 1 && rs[0].value == 0.453 && rs[0].unit == Unit::Seconds);
}

#[test]
fn test_malloc_events() {
    let x = MallocExtractor::new(ExtractMode::Events, false);
    let rs = extract(
        "Time taken: 0.1 seconds\n\
         Allocating 1000 blocks of 64 bytes\n\
         Time taken: 0.002500 seconds\n\
         Time taken: 0.002600 seconds\n\
         Allocating 10 blocks of 4096 bytes\n\
         Time taken: 0.000300 seconds\n",
        &x,
    );
    assert!(rs.len() == 4);
    assert!(rs[0].detail == "");
    assert!(rs[1].detail == "1000 blocks, 64 bytes each" && rs[1].value == 0.0025);
    assert!(rs[2].detail == "1000 blocks, 64 bytes each" && rs[2].value == 0.0026);
    assert!(rs[3].detail == "10 blocks, 4096 bytes each" && rs[3].value == 0.0003);
    assert!(rs.iter().all(|r| r.unit == Unit::Seconds
        && r.operation.as_str() == OP_MEMORY_ALLOCATION
        && r.benchmark == Benchmark::Malloc));
}

#[test]
fn test_malloc_summary() {
    let x = MallocExtractor::new(ExtractMode::Summary, false);
    let rs = extract(
        "Allocating 1 blocks of 1 bytes\n[MALLOC] Throughput: 843.12 Kops/sec\nMALLOC_OPS: 5\n",
        &x,
    );
    assert!(rs.len() == 1);
    assert!(rs[0].operation.as_str() == OP_MALLOC_OPS);
    assert!(rs[0].value == 843.12);
    assert!(rs[0].unit == Unit::KopsPerSec);
    assert!(rs[0].detail == "");

    let rs = extract("MALLOC_OPS: 843120\n", &x);
    assert!(rs.len() == 1 && rs[0].value == 843.12 && rs[0].unit == Unit::KopsPerSec);
}

#[test]
fn test_syscall_events_and_summary() {
    let x = SyscallExtractor::new(ExtractMode::Events, true);
    let rs = extract(
        "Time taken: 9 seconds\nInvoking getpid\nTime taken: 0.000052 seconds\n\
         Invoking getppid...\nTime taken: 0.000061 seconds\n",
        &x,
    );
    assert!(rs.len() == 2);
    assert!(rs[0].detail == "getpid" && rs[0].value == 0.000052);
    assert!(rs[1].detail == "getppid" && rs[1].operation.as_str() == OP_SYSTEM_CALL);

    let x = SyscallExtractor::new(ExtractMode::Summary, false);
    let rs = extract("SYSCALL_LATENCY: 5.26\n", &x);
    assert!(rs.len() == 1);
    assert!(rs[0].benchmark == Benchmark::Syscall);
    assert!(rs[0].operation.as_str() == "Syscall Latency");
    assert!(rs[0].value == 5.26);
    assert!(rs[0].unit == Unit::Us);

    let rs = extract("[Syscall Latency] getpid(): 52.60 ns\n", &x);
    assert!(rs.len() == 1 && rs[0].detail == "" && rs[0].unit == Unit::Us);
    assert!(rs[0].operation.as_str() == OP_SYSCALL_LATENCY);
}

#[test]
fn test_tcp_events() {
    let x = TcpExtractor::new(ExtractMode::Events);
    let rs = extract(
        "connecting\nSent 4096 bytes in 0.002 seconds\nReceived 4096 bytes in 0.003 seconds\n\
         [TCP] Server transfer duration: 1.50 seconds\nTCP_THROUGHPUT: 10\n",
        &x,
    );
    assert!(rs.len() == 3);
    assert!(rs[0].operation.as_str() == OP_TCP_SEND && rs[0].detail == "4096 bytes");
    assert!(rs[0].value == 0.002 && rs[0].unit == Unit::Seconds);
    assert!(rs[1].operation.as_str() == OP_TCP_RECEIVE && rs[1].value == 0.003);
    assert!(rs[2].operation.as_str() == OP_TCP_TRANSFER && rs[2].detail == "");
}

#[test]
fn test_tcp_summary() {
    let x = TcpExtractor::new(ExtractMode::Summary);
    let rs = extract("[TCP] Throughput: 2.00 Gbps\n", &x);
    assert!(rs.len() == 1 && rs[0].value == 250.0 && rs[0].unit == Unit::MBps);
    assert!(rs[0].operation.as_str() == OP_THROUGHPUT);
    assert!(extract("Sent 1 bytes in 1 seconds\n", &x).is_empty());
}

#[test]
fn test_disallowed_unit_passes_through() {
    // A known unit that is wrong for the benchmark reaches the aggregator, which rejects it.
    let x = SyscallExtractor::new(ExtractMode::Summary, false);
    let rs = extract("SYSCALL_LATENCY: 5 MB/s\n", &x);
    assert!(rs.len() == 1 && rs[0].unit == Unit::MBps);
}

#[test]
fn test_claim_released_by_other_context() {
    let text = "Allocating 10 blocks of 64 bytes\nTime taken: 0.5 seconds\n\
                Invoking getpid\nTime taken: 0.000052 seconds\n\
                Allocating 1 blocks of 8 bytes\nTime taken: 0.25 seconds\n";

    let rs = extract(text, &MallocExtractor::new(ExtractMode::Events, true));
    assert!(rs.len() == 2);
    assert!(rs[0].detail == "10 blocks, 64 bytes each" && rs[0].value == 0.5);
    assert!(rs[1].detail == "1 blocks, 8 bytes each" && rs[1].value == 0.25);

    let rs = extract(text, &SyscallExtractor::new(ExtractMode::Events, true));
    assert!(rs.len() == 1);
    assert!(rs[0].detail == "getpid" && rs[0].value == 0.000052);

    // Bound by name, every timing line belongs to the extractor.
    let rs = extract(text, &MallocExtractor::new(ExtractMode::Events, false));
    assert!(rs.len() == 3);
    assert!(rs[1].detail == "10 blocks, 64 bytes each");
}

#[test]
fn test_summary_kept_for_allowed_unit() {
    let x = SyscallExtractor::new(ExtractMode::Summary, false);
    let rs = extract("SYSCALL_LATENCY: 5 MB/s\nSYSCALL_LATENCY: 4\nSYSCALL_LATENCY: 3\n", &x);
    assert!(rs.len() == 2);
    assert!(rs[0].unit == Unit::MBps);
    assert!(rs[1].value == 4.0 && rs[1].unit == Unit::Us);
}
