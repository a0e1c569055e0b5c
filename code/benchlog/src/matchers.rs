/// Stateless line matchers for the benchmark log formats.
///
/// The log formats are not under our control and have drifted over time, so there are several
/// recognizers per benchmark:
///
///  - kernel-style timestamps, `[12.345678] ...`, anywhere in the line
///  - explicit boot markers, `[t] boot benchmark: start` and `[t] boot benchmark: end`
///  - labeled aggregates, `MALLOC_OPS: 843120` and friends, with an optional trailing unit
///  - bracketed aggregates, `[MALLOC] Throughput: 843.12 Kops/sec` and friends
///  - narrative lines, `Allocating 100 blocks of 256 bytes`, `Time taken: 0.25 seconds`,
///    `Sent 4096 bytes in 0.002 seconds`
///
/// A matcher looks at one line and returns a tagged `Match`.  Each extractor has an ordered list of
/// matchers and the first one that does not return `NoMatch` wins, so no two rules compete for a
/// line.  A line whose shape matches but whose number is unusable is `Rejected`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::str::FromStr;

/// A measurement as it appears in the log: the number, the raw unit token, and descriptive text
/// from the same line (empty if there is none).

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub value: f64,
    pub unit: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BootEvent {
    Timestamp { at: f64, mentions_boot: bool },
    Start(f64),
    End(f64),
    Reported(Candidate),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MallocEvent {
    /// "A blocks, B bytes each"
    Allocating(String),
    TimeTaken(Candidate),
    Throughput(Candidate),

    /// Another benchmark's context line.
    Foreign,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyscallEvent {
    /// The name of the call being timed.
    Invoking(String),
    TimeTaken(Candidate),
    Latency(Candidate),

    /// Another benchmark's context line.
    Foreign,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TcpEvent {
    Sent(Candidate),
    Received(Candidate),
    Transfer(Candidate),
    Throughput(Candidate),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Match {
    NoMatch,
    Rejected,
    Boot(BootEvent),
    Malloc(MallocEvent),
    Syscall(SyscallEvent),
    Tcp(TcpEvent),
}

pub type Matcher = fn(&str) -> Match;

/// Apply the matchers in order, returning the first result that is not `NoMatch`.

pub fn match_line(matchers: &[Matcher], line: &str) -> Match {
    for m in matchers {
        let r = m(line);
        if r != Match::NoMatch {
            return r;
        }
    }
    Match::NoMatch
}

pub static BOOT_SPAN_MATCHERS: &[Matcher] = &[match_timestamp];
pub static BOOT_MARKER_MATCHERS: &[Matcher] = &[match_boot_marker];
pub static BOOT_SUMMARY_MATCHERS: &[Matcher] = &[match_boot_time_label, match_boot_time_bracket];
pub static MALLOC_EVENT_MATCHERS: &[Matcher] =
    &[match_allocating, match_malloc_time_taken, match_foreign_invoking];
pub static MALLOC_SUMMARY_MATCHERS: &[Matcher] = &[match_malloc_ops_label, match_malloc_bracket];
pub static SYSCALL_EVENT_MATCHERS: &[Matcher] =
    &[match_invoking, match_syscall_time_taken, match_foreign_allocating];
pub static SYSCALL_SUMMARY_MATCHERS: &[Matcher] =
    &[match_syscall_latency_label, match_syscall_bracket];
pub static TCP_EVENT_MATCHERS: &[Matcher] = &[match_sent_received, match_tcp_transfer];
pub static TCP_SUMMARY_MATCHERS: &[Matcher] = &[match_tcp_throughput_label, match_tcp_bracket];

// The numeric literal and unit token shapes shared by all the expressions below.  A unit is a
// word, optionally with a "/word" rate suffix.

macro_rules! num {
    () => {
        r"(\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)"
    };
}

macro_rules! unit {
    () => {
        r"([A-Za-zµ]+(?:/[A-Za-z]+)?)"
    };
}

static TIMESTAMP_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\s*(\d+(?:\.\d+)?)\s*\]").unwrap());

static BOOT_WORD_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bboot\b").unwrap());

static MARKER_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\s*(\d+(?:\.\d+)?)\s*\].*?(?:(\w+)\s+)?benchmark\s*:\s*(start|end)\b").unwrap()
});

static LABEL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\b(BOOT_TIME|MALLOC_OPS|SYSCALL_LATENCY|TCP_THROUGHPUT)\s*:\s*",
        num!(),
        r"(?:\s*",
        unit!(),
        r")?"
    ))
    .unwrap()
});

static BOOT_BRACKET_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(r"(?i)\[boot time\]\s*duration\s*:\s*", num!(), r"\s*", unit!())).unwrap()
});

static MALLOC_BRACKET_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(r"(?i)\[malloc\]\s*throughput\s*:\s*", num!(), r"\s*", unit!())).unwrap()
});

static SYSCALL_BRACKET_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(r"(?i)\[syscall latency\]\s*([^:]*?)\s*:\s*", num!(), r"\s*", unit!()))
        .unwrap()
});

static TCP_BRACKET_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(r"(?i)\[tcp\]\s*throughput\s*:\s*", num!(), r"\s*", unit!())).unwrap()
});

static TCP_TRANSFER_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(r"(?i)\[tcp\]\s*server transfer duration\s*:\s*", num!(), r"\s*", unit!()))
        .unwrap()
});

static ALLOCATING_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Allocating\s+(\d+)\s+blocks?\s+of\s+(\d+)\s+bytes?").unwrap());

static INVOKING_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"Invoking\s+(\S.*?)[\s.:]*$").unwrap());

static TIME_TAKEN_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(r"(?i)time taken\s*:\s*", num!(), r"(?:\s*", unit!(), r")?")).unwrap()
});

static SENT_RECEIVED_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\b(Sent|Received)\s+(\d+)\s+bytes?\s+in\s+",
        num!(),
        r"(?:\s*",
        unit!(),
        r")?"
    ))
    .unwrap()
});

/// Parse a captured literal.  The expressions only capture digit strings, but a huge exponent can
/// still overflow to infinity, and that's not a measurement.

fn get_f64(s: &str) -> Option<f64> {
    match f64::from_str(s) {
        Ok(n) if n.is_finite() => Some(n),
        _ => None,
    }
}

fn group<'a>(caps: &'a Captures, i: usize) -> &'a str {
    caps.get(i).map(|m| m.as_str()).unwrap_or("")
}

/// Build a candidate from a number group and an optional unit group, defaulting the unit.

fn candidate(
    caps: &Captures,
    num: usize,
    unit: usize,
    default_unit: &str,
    detail: String,
) -> Option<Candidate> {
    let value = get_f64(group(caps, num))?;
    let unit = match caps.get(unit) {
        Some(u) => u.as_str().to_string(),
        None => default_unit.to_string(),
    };
    Some(Candidate {
        value,
        unit,
        detail,
    })
}

fn wrap<T>(
    c: Option<Candidate>,
    f: impl FnOnce(Candidate) -> T,
    g: impl FnOnce(T) -> Match,
) -> Match {
    match c {
        Some(c) => g(f(c)),
        None => Match::Rejected,
    }
}

pub fn match_timestamp(line: &str) -> Match {
    match TIMESTAMP_RX.captures(line) {
        Some(caps) => match get_f64(group(&caps, 1)) {
            Some(at) => Match::Boot(BootEvent::Timestamp {
                at,
                mentions_boot: BOOT_WORD_RX.is_match(line),
            }),
            None => Match::Rejected,
        },
        None => Match::NoMatch,
    }
}

pub fn match_boot_marker(line: &str) -> Match {
    let Some(caps) = MARKER_RX.captures(line) else {
        return Match::NoMatch;
    };
    // "[t] benchmark: start" is taken to be ours, "[t] malloc benchmark: start" is not.
    if let Some(prefix) = caps.get(2) {
        if !prefix.as_str().eq_ignore_ascii_case("boot") {
            return Match::NoMatch;
        }
    }
    match get_f64(group(&caps, 1)) {
        Some(t) if group(&caps, 3) == "start" => Match::Boot(BootEvent::Start(t)),
        Some(t) => Match::Boot(BootEvent::End(t)),
        None => Match::Rejected,
    }
}

// The labeled aggregate lines.  The label determines the default unit.

fn match_label(line: &str, label: &str, default_unit: &str) -> Option<Option<Candidate>> {
    LABEL_RX
        .captures_iter(line)
        .find(|caps| group(caps, 1) == label)
        .map(|caps| candidate(&caps, 2, 3, default_unit, "".to_string()))
}

pub fn match_boot_time_label(line: &str) -> Match {
    match match_label(line, "BOOT_TIME", "ms") {
        Some(c) => wrap(c, BootEvent::Reported, Match::Boot),
        None => Match::NoMatch,
    }
}

pub fn match_malloc_ops_label(line: &str) -> Match {
    match match_label(line, "MALLOC_OPS", "ops/sec") {
        Some(c) => wrap(c, MallocEvent::Throughput, Match::Malloc),
        None => Match::NoMatch,
    }
}

pub fn match_syscall_latency_label(line: &str) -> Match {
    match match_label(line, "SYSCALL_LATENCY", "us") {
        Some(c) => wrap(c, SyscallEvent::Latency, Match::Syscall),
        None => Match::NoMatch,
    }
}

pub fn match_tcp_throughput_label(line: &str) -> Match {
    match match_label(line, "TCP_THROUGHPUT", "MB/s") {
        Some(c) => wrap(c, TcpEvent::Throughput, Match::Tcp),
        None => Match::NoMatch,
    }
}

// The bracketed aggregate lines always carry their unit.

pub fn match_boot_time_bracket(line: &str) -> Match {
    match BOOT_BRACKET_RX.captures(line) {
        Some(caps) => wrap(
            candidate(&caps, 1, 2, "", "".to_string()),
            BootEvent::Reported,
            Match::Boot,
        ),
        None => Match::NoMatch,
    }
}

pub fn match_malloc_bracket(line: &str) -> Match {
    match MALLOC_BRACKET_RX.captures(line) {
        Some(caps) => wrap(
            candidate(&caps, 1, 2, "", "".to_string()),
            MallocEvent::Throughput,
            Match::Malloc,
        ),
        None => Match::NoMatch,
    }
}

pub fn match_syscall_bracket(line: &str) -> Match {
    match SYSCALL_BRACKET_RX.captures(line) {
        Some(caps) => {
            let detail = group(&caps, 1).to_string();
            wrap(
                candidate(&caps, 2, 3, "", detail),
                SyscallEvent::Latency,
                Match::Syscall,
            )
        }
        None => Match::NoMatch,
    }
}

pub fn match_tcp_bracket(line: &str) -> Match {
    match TCP_BRACKET_RX.captures(line) {
        Some(caps) => wrap(
            candidate(&caps, 1, 2, "", "".to_string()),
            TcpEvent::Throughput,
            Match::Tcp,
        ),
        None => Match::NoMatch,
    }
}

pub fn match_tcp_transfer(line: &str) -> Match {
    match TCP_TRANSFER_RX.captures(line) {
        Some(caps) => wrap(
            candidate(&caps, 1, 2, "", "".to_string()),
            TcpEvent::Transfer,
            Match::Tcp,
        ),
        None => Match::NoMatch,
    }
}

// Narrative lines.

pub fn match_allocating(line: &str) -> Match {
    match ALLOCATING_RX.captures(line) {
        Some(caps) => Match::Malloc(MallocEvent::Allocating(format!(
            "{} blocks, {} bytes each",
            group(&caps, 1),
            group(&caps, 2)
        ))),
        None => Match::NoMatch,
    }
}

pub fn match_invoking(line: &str) -> Match {
    match INVOKING_RX.captures(line) {
        Some(caps) => Match::Syscall(SyscallEvent::Invoking(group(&caps, 1).to_string())),
        None => Match::NoMatch,
    }
}

// The malloc and syscall benchmarks print the same timing lines, so each needs to see where the
// other's context begins.

pub fn match_foreign_invoking(line: &str) -> Match {
    if INVOKING_RX.is_match(line) {
        Match::Malloc(MallocEvent::Foreign)
    } else {
        Match::NoMatch
    }
}

pub fn match_foreign_allocating(line: &str) -> Match {
    if ALLOCATING_RX.is_match(line) {
        Match::Syscall(SyscallEvent::Foreign)
    } else {
        Match::NoMatch
    }
}

fn time_taken(line: &str) -> Option<Option<Candidate>> {
    TIME_TAKEN_RX
        .captures(line)
        .map(|caps| candidate(&caps, 1, 2, "seconds", "".to_string()))
}

pub fn match_malloc_time_taken(line: &str) -> Match {
    match time_taken(line) {
        Some(c) => wrap(c, MallocEvent::TimeTaken, Match::Malloc),
        None => Match::NoMatch,
    }
}

pub fn match_syscall_time_taken(line: &str) -> Match {
    match time_taken(line) {
        Some(c) => wrap(c, SyscallEvent::TimeTaken, Match::Syscall),
        None => Match::NoMatch,
    }
}

pub fn match_sent_received(line: &str) -> Match {
    let Some(caps) = SENT_RECEIVED_RX.captures(line) else {
        return Match::NoMatch;
    };
    let detail = format!("{} bytes", group(&caps, 2));
    let c = candidate(&caps, 3, 4, "seconds", detail);
    if group(&caps, 1) == "Sent" {
        wrap(c, TcpEvent::Sent, Match::Tcp)
    } else {
        wrap(c, TcpEvent::Received, Match::Tcp)
    }
}

#[cfg(test)]
fn cand(value: f64, unit: &str, detail: &str) -> Candidate {
    Candidate {
        value,
        unit: unit.to_string(),
        detail: detail.to_string(),
    }
}

#[test]
fn test_timestamp() {
    assert!(
        match_timestamp("[    0.123456] Booting Unikraft") == Match::Boot(BootEvent::Timestamp {
            at: 0.123456,
            mentions_boot: false
        })
    );
    assert!(
        match_timestamp("[100.5] boot complete") == Match::Boot(BootEvent::Timestamp {
            at: 100.5,
            mentions_boot: true
        })
    );
    assert!(match_timestamp("[MALLOC] Throughput: 843.12 Kops/sec") == Match::NoMatch);
    assert!(match_timestamp("no brackets here 12.5") == Match::NoMatch);
}

#[test]
fn test_boot_marker() {
    assert!(
        match_boot_marker("[100.000000] boot benchmark: start")
            == Match::Boot(BootEvent::Start(100.0))
    );
    assert!(
        match_boot_marker("[100.453000] boot benchmark: end")
            == Match::Boot(BootEvent::End(100.453))
    );
    assert!(match_boot_marker("[1.5] benchmark: start") == Match::Boot(BootEvent::Start(1.5)));
    assert!(match_boot_marker("[1.5] malloc benchmark: start") == Match::NoMatch);
    assert!(match_boot_marker("boot benchmark: start") == Match::NoMatch);
}

#[test]
fn test_labels() {
    assert!(
        match_syscall_latency_label("SYSCALL_LATENCY: 5.26")
            == Match::Syscall(SyscallEvent::Latency(cand(5.26, "us", "")))
    );
    assert!(
        match_malloc_ops_label("MALLOC_OPS: 843120 ops/sec")
            == Match::Malloc(MallocEvent::Throughput(cand(843120.0, "ops/sec", "")))
    );
    assert!(
        match_tcp_throughput_label("result TCP_THROUGHPUT: 1.5e3")
            == Match::Tcp(TcpEvent::Throughput(cand(1500.0, "MB/s", "")))
    );
    assert!(
        match_boot_time_label("BOOT_TIME: 12.5")
            == Match::Boot(BootEvent::Reported(cand(12.5, "ms", "")))
    );
    // The label must be the right one for the matcher.
    assert!(match_boot_time_label("SYSCALL_LATENCY: 5.26") == Match::NoMatch);
    assert!(match_syscall_latency_label("SYSCALL_LATENCY: fast") == Match::NoMatch);
    assert!(match_syscall_latency_label("SYSCALL_LATENCY: 1e999") == Match::Rejected);
}

#[test]
fn test_brackets() {
    assert!(
        match_malloc_bracket("[MALLOC] Throughput: 843.12 Kops/sec")
            == Match::Malloc(MallocEvent::Throughput(cand(843.12, "Kops/sec", "")))
    );
    assert!(
        match_malloc_bracket("[Malloc] Throughput: 12.00 Kops/sec")
            == Match::Malloc(MallocEvent::Throughput(cand(12.0, "Kops/sec", "")))
    );
    assert!(
        match_syscall_bracket("[Syscall Latency] getpid(): 52.60 ns")
            == Match::Syscall(SyscallEvent::Latency(cand(52.6, "ns", "getpid()")))
    );
    assert!(
        match_tcp_bracket("[TCP] Throughput: 3.20 Gbps")
            == Match::Tcp(TcpEvent::Throughput(cand(3.2, "Gbps", "")))
    );
    assert!(
        match_tcp_transfer("[TCP] Server transfer duration: 1.25 seconds")
            == Match::Tcp(TcpEvent::Transfer(cand(1.25, "seconds", "")))
    );
    assert!(
        match_boot_time_bracket("[BOOT TIME] Duration: 453000000 ns (453.000 ms)")
            == Match::Boot(BootEvent::Reported(cand(453000000.0, "ns", "")))
    );
    assert!(match_boot_time_bracket("[BOOT TIME] Reached main()") == Match::NoMatch);
}

#[test]
fn test_narrative() {
    assert!(
        match_allocating("Allocating 100 blocks of 256 bytes")
            == Match::Malloc(MallocEvent::Allocating("100 blocks, 256 bytes each".to_string()))
    );
    assert!(
        match_invoking("Invoking getpid...")
            == Match::Syscall(SyscallEvent::Invoking("getpid".to_string()))
    );
    assert!(
        match_malloc_time_taken("Time taken: 0.000123 seconds")
            == Match::Malloc(MallocEvent::TimeTaken(cand(0.000123, "seconds", "")))
    );
    assert!(
        match_syscall_time_taken("Time taken: 4")
            == Match::Syscall(SyscallEvent::TimeTaken(cand(4.0, "seconds", "")))
    );
    assert!(
        match_sent_received("Sent 4096 bytes in 0.002 seconds")
            == Match::Tcp(TcpEvent::Sent(cand(0.002, "seconds", "4096 bytes")))
    );
    assert!(
        match_sent_received("Received 8192 bytes in 0.5 seconds")
            == Match::Tcp(TcpEvent::Received(cand(0.5, "seconds", "8192 bytes")))
    );
    assert!(match_sent_received("Sent a postcard") == Match::NoMatch);
    assert!(match_foreign_invoking("Invoking getpid") == Match::Malloc(MallocEvent::Foreign));
    assert!(
        match_foreign_allocating("Allocating 1 blocks of 8 bytes")
            == Match::Syscall(SyscallEvent::Foreign)
    );
    assert!(match_foreign_allocating("Invoking getpid") == Match::NoMatch);
}

#[test]
fn test_priority() {
    // A line that several matchers accept goes to the first one in the list.
    let line = "Allocating 4 blocks of 16 bytes; Time taken: 1 seconds";
    assert!(matches!(
        match_line(MALLOC_EVENT_MATCHERS, line),
        Match::Malloc(MallocEvent::Allocating(_))
    ));
    assert!(match_line(MALLOC_EVENT_MATCHERS, "nothing to see") == Match::NoMatch);
    assert!(matches!(
        match_line(TCP_SUMMARY_MATCHERS, "[TCP] Throughput: 1 Gbps"),
        Match::Tcp(TcpEvent::Throughput(_))
    ));
}
