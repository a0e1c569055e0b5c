/// A benchmark log is an unstructured log: the micro-benchmarks (boot timing, memory allocator
/// throughput, system call latency, network throughput) print whatever their authors found useful,
/// as kernel-style timestamped lines, labeled `KEY: value` lines, or plain sentences with numbers in
/// them.  Log files are found in a *results directory*, either under fixed names or as any `*.txt`
/// file whose content says what it is.
///
/// This library turns a set of such files into one table of *metric records* with a uniform schema.
/// The task breaks down into a number of subtasks:
///
/// - Find the log files in the results directory, and decide which extractors see which files.
///
/// - Recognize lines with typed matchers, run in a fixed priority order per benchmark kind.
///
/// - Scan each file exactly once, threading the cross-line context (the allocation being timed,
///   the first and last kernel timestamps) through an explicit per-file state.
///
/// - Normalize unit spellings and scales, and merge the per-file records into one table in
///   discovery order, rejecting records whose unit is not valid for their benchmark.
///
/// There are conflicting conventions for several benchmarks (span or markers for boot, per-event or
/// aggregate lines for the others).  Exactly one convention per benchmark is chosen for a run, by
/// `PipelineConfig`.
mod aggregate;
mod configs;
mod extractors;
mod logtree;
mod matchers;
mod normalize;
mod record;
mod scanner;

// The benchmark kinds, the closed set of output units, and the record type.

pub use record::Benchmark;
pub use record::MetricRecord;
pub use record::Unit;

// Run configuration and the choices it carries.

pub use configs::Binding;
pub use configs::BootStrategy;
pub use configs::ExtractMode;
pub use configs::OutputSchema;
pub use configs::PipelineConfig;

// Read a configuration file, starting from the defaults.

pub use configs::read_pipeline_config;

// Value parsers for the configuration choices, usable from a command line.

pub use configs::parse_binding;
pub use configs::parse_boot_strategy;
pub use configs::parse_boot_unit;
pub use configs::parse_extract_mode;
pub use configs::parse_schema;

// Find the log files in a results directory, under the chosen binding.

pub use logtree::find_logfiles;
pub use logtree::LogFile;

// Scan a set of log files and merge the records into a table.

pub use logtree::read_logfiles;
pub use logtree::RunOutcome;

// Scan a single file or reader with a set of extractors.

pub use scanner::scan_logfile;
pub use scanner::scan_reader;
pub use scanner::FileScan;
pub use scanner::ScannerState;

// The extractor interface, and the configured extractor for each benchmark kind.

pub use extractors::make_extractor;
pub use extractors::Emit;
pub use extractors::Extractor;

// Map a raw unit token onto the closed set of units for a benchmark.

pub use normalize::resolve_unit;

// The merged table, and the check that every record in it passed.

pub use aggregate::validate;
pub use aggregate::Aggregator;
pub use aggregate::SchemaViolation;
pub use aggregate::Table;
