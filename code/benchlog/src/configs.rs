/// Pipeline configuration: how log files are bound to extractors, which convention each extractor
/// follows, and which table schema is produced.  The choices are made once per run.
///
/// A configuration file is a JSON object with the following optional fields, all strings:
///
///   binding - "sniff" (every *.txt file, content decides) or "fixed" (benchmark-<kind>.txt)
///   schema - "flat" (File,Benchmark,Metric,Value,Unit) or "detailed" (benchmark,operation,...)
///   boot - "span", "marker" or "summary"
///   boot-unit - "ms" or "seconds"; the default depends on `boot`
///   malloc, syscall, tcp - "events" or "summary"
///
/// Any field name starting with '#' is reserved for arbitrary comments.  Other field names are
/// errors, as are values outside the listed ones.
///
/// The defaults reproduce the results scripts that existed before this program: every *.txt file is
/// examined, the flat table is written, and each benchmark contributes its aggregate line.

use crate::Unit;

use anyhow::{bail, Result};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Binding {
    Sniff,
    Fixed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutputSchema {
    Flat,
    Detailed,
}

impl OutputSchema {
    pub fn header(self) -> [&'static str; 5] {
        match self {
            OutputSchema::Flat => ["File", "Benchmark", "Metric", "Value", "Unit"],
            OutputSchema::Detailed => ["benchmark", "operation", "detail", "value", "unit"],
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BootStrategy {
    /// Last timestamp in the file minus the first.
    Span,

    /// "benchmark: end" timestamp minus "benchmark: start" timestamp.
    Marker,

    /// The duration the benchmark printed.
    Summary,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExtractMode {
    /// One record per timed event.
    Events,

    /// One record per file, from the aggregate line.
    Summary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub binding: Binding,
    pub schema: OutputSchema,
    pub boot: BootStrategy,
    pub boot_unit: Option<Unit>,
    pub malloc: ExtractMode,
    pub syscall: ExtractMode,
    pub tcp: ExtractMode,
}

impl Default for PipelineConfig {
    fn default() -> PipelineConfig {
        PipelineConfig {
            binding: Binding::Sniff,
            schema: OutputSchema::Flat,
            boot: BootStrategy::Summary,
            boot_unit: None,
            malloc: ExtractMode::Summary,
            syscall: ExtractMode::Summary,
            tcp: ExtractMode::Summary,
        }
    }
}

impl PipelineConfig {
    /// The unit of boot records.  Spans of kernel timestamps are reported in milliseconds and
    /// marker intervals in seconds unless configured otherwise.

    pub fn boot_unit(&self) -> Unit {
        match (self.boot_unit, self.boot) {
            (Some(u), _) => u,
            (None, BootStrategy::Marker) => Unit::Seconds,
            (None, _) => Unit::Ms,
        }
    }
}

// Value parsers, shared with the command line.

pub fn parse_binding(s: &str) -> Result<Binding> {
    match s {
        "sniff" => Ok(Binding::Sniff),
        "fixed" => Ok(Binding::Fixed),
        _ => bail!("Binding must be 'sniff' or 'fixed'"),
    }
}

pub fn parse_schema(s: &str) -> Result<OutputSchema> {
    match s {
        "flat" => Ok(OutputSchema::Flat),
        "detailed" => Ok(OutputSchema::Detailed),
        _ => bail!("Schema must be 'flat' or 'detailed'"),
    }
}

pub fn parse_boot_strategy(s: &str) -> Result<BootStrategy> {
    match s {
        "span" => Ok(BootStrategy::Span),
        "marker" => Ok(BootStrategy::Marker),
        "summary" => Ok(BootStrategy::Summary),
        _ => bail!("Boot strategy must be 'span', 'marker' or 'summary'"),
    }
}

pub fn parse_boot_unit(s: &str) -> Result<Unit> {
    match s {
        "ms" => Ok(Unit::Ms),
        "seconds" => Ok(Unit::Seconds),
        _ => bail!("Boot unit must be 'ms' or 'seconds'"),
    }
}

pub fn parse_extract_mode(s: &str) -> Result<ExtractMode> {
    match s {
        "events" => Ok(ExtractMode::Events),
        "summary" => Ok(ExtractMode::Summary),
        _ => bail!("Mode must be 'events' or 'summary'"),
    }
}

/// Read a configuration file, starting from the defaults.  Since the input is human-generated and
/// every field is optional, this uses the generic JSON parser followed by explicit decoding of the
/// fields.

pub fn read_pipeline_config(filename: &str) -> Result<PipelineConfig> {
    let file = File::open(path::Path::new(filename))?;
    let reader = BufReader::new(file);
    let v = serde_json::from_reader(reader)?;
    let Value::Object(fields) = v else {
        bail!("Expected an object value")
    };
    let mut cfg = PipelineConfig::default();
    for (name, _) in fields.iter() {
        match name.as_str() {
            "binding" | "schema" | "boot" | "boot-unit" | "malloc" | "syscall" | "tcp" => {}
            _ if name.starts_with('#') => {}
            _ => bail!("Unknown field '{name}'"),
        }
    }
    if let Some(s) = grab_string_opt(&fields, "binding")? {
        cfg.binding = parse_binding(&s)?;
    }
    if let Some(s) = grab_string_opt(&fields, "schema")? {
        cfg.schema = parse_schema(&s)?;
    }
    if let Some(s) = grab_string_opt(&fields, "boot")? {
        cfg.boot = parse_boot_strategy(&s)?;
    }
    if let Some(s) = grab_string_opt(&fields, "boot-unit")? {
        cfg.boot_unit = Some(parse_boot_unit(&s)?);
    }
    if let Some(s) = grab_string_opt(&fields, "malloc")? {
        cfg.malloc = parse_extract_mode(&s)?;
    }
    if let Some(s) = grab_string_opt(&fields, "syscall")? {
        cfg.syscall = parse_extract_mode(&s)?;
    }
    if let Some(s) = grab_string_opt(&fields, "tcp")? {
        cfg.tcp = parse_extract_mode(&s)?;
    }
    Ok(cfg)
}

fn grab_string_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Option<String>> {
    if let Some(val) = fields.get(name) {
        if let Value::String(s) = val {
            Ok(Some(s.to_string()))
        } else {
            bail!("Field '{name}' must have a string value");
        }
    } else {
        Ok(None)
    }
}

#[test]
fn test_defaults() {
    let cfg = PipelineConfig::default();
    assert!(cfg.binding == Binding::Sniff);
    assert!(cfg.schema == OutputSchema::Flat);
    assert!(cfg.boot_unit() == Unit::Ms);
    let cfg = PipelineConfig {
        boot: BootStrategy::Marker,
        ..PipelineConfig::default()
    };
    assert!(cfg.boot_unit() == Unit::Seconds);
    let cfg = PipelineConfig {
        boot: BootStrategy::Marker,
        boot_unit: Some(Unit::Ms),
        ..PipelineConfig::default()
    };
    assert!(cfg.boot_unit() == Unit::Ms);
}

// Whitebox tests of config reading.  The files are in ../tests/benchlog.

#[test]
fn test_config() {
    let cfg = read_pipeline_config("../tests/benchlog/whitebox-config.json").unwrap();
    assert!(cfg.binding == Binding::Fixed);
    assert!(cfg.schema == OutputSchema::Detailed);
    assert!(cfg.boot == BootStrategy::Span);
    assert!(cfg.boot_unit == Some(Unit::Seconds));
    assert!(cfg.malloc == ExtractMode::Events);
    assert!(cfg.syscall == ExtractMode::Events);
    // Not mentioned in the file
    assert!(cfg.tcp == ExtractMode::Summary);
}

#[test]
fn test_config_errors() {
    assert!(read_pipeline_config("../tests/benchlog/bad-config-value.json").is_err());
    assert!(read_pipeline_config("../tests/benchlog/bad-config-field.json").is_err());
    assert!(read_pipeline_config("../tests/benchlog/bad-config-array.json").is_err());
    assert!(read_pipeline_config("../tests/benchlog/no-such-config.json").is_err());
}
