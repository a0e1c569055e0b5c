/// `benchparse` -- Turn micro-benchmark logs into a metrics table
///
/// Run with --help for brief help.
///
/// Quirks
///
/// The benchmarks disagree among themselves about how to report a result, and most of them report
/// it in two ways.  Which one is used is a per-run choice (see --boot, --malloc, --syscall and
/// --tcp); the defaults use the aggregate line each benchmark prints at the end, which is what the
/// existing result tables contain.
///
/// With the default --binding=sniff, every *.txt file in the results directory is offered to every
/// benchmark's extractor, and it's up to the content to say which benchmark it belongs to.  A boot
/// log that never mentions "boot" is therefore not recognized under --boot=span; use
/// --binding=fixed with the benchmark-<kind>.txt names for such logs.
///
/// The table is written to benchmark_results.csv in the results directory, replacing any previous
/// table.  It is not itself a *.txt file and so is never read back as a log.
mod chart;
mod sink;

use anyhow::{bail, Result};
use benchlog::{
    parse_binding, parse_boot_strategy, parse_boot_unit, parse_extract_mode, parse_schema, Binding,
    BootStrategy, ExtractMode, OutputSchema, PipelineConfig, Unit,
};
use clap::{Args, Parser, Subcommand};
use log::{debug, warn};
use std::io::{self, Write};
use std::path::Path;
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print information about the program
    Version,

    /// Scan the benchmark logs and write the metrics table
    Parse(ParseCmdArgs),

    /// Print the metrics table as a bar chart
    Chart(ChartCmdArgs),
}

#[derive(Args, Debug)]
pub struct ParseCmdArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    pipeline_args: PipelineArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct ChartCmdArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    /// Width of the longest bar in each group
    #[arg(long, default_value_t = 40)]
    width: usize,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Directory holding the benchmark logs and the metrics table
    #[arg(long, default_value = "results")]
    results_dir: String,
}

#[derive(Args, Debug)]
pub struct PipelineArgs {
    /// File containing JSON data with pipeline settings; options below override it [default: none]
    #[arg(long)]
    config_file: Option<String>,

    /// How logs are bound to benchmarks, "sniff" (any *.txt) or "fixed" (benchmark-<kind>.txt)
    /// [default: sniff]
    #[arg(long, value_parser = parse_binding)]
    binding: Option<Binding>,

    /// Table schema, "flat" or "detailed" [default: flat]
    #[arg(long, value_parser = parse_schema)]
    schema: Option<OutputSchema>,

    /// Boot duration from "span" (first to last timestamp), "marker" (start/end markers) or
    /// "summary" (reported duration) [default: summary]
    #[arg(long, value_parser = parse_boot_strategy)]
    boot: Option<BootStrategy>,

    /// Unit of boot durations, "ms" or "seconds" [default: seconds for marker, otherwise ms]
    #[arg(long, value_parser = parse_boot_unit)]
    boot_unit: Option<Unit>,

    /// Malloc records from "events" (per allocation) or "summary" [default: summary]
    #[arg(long, value_parser = parse_extract_mode)]
    malloc: Option<ExtractMode>,

    /// Syscall records from "events" (per call) or "summary" [default: summary]
    #[arg(long, value_parser = parse_extract_mode)]
    syscall: Option<ExtractMode>,

    /// TCP records from "events" (per send/receive) or "summary" [default: summary]
    #[arg(long, value_parser = parse_extract_mode)]
    tcp: Option<ExtractMode>,
}

#[derive(Args, Debug)]
pub struct MetaArgs {
    /// Print useful information about dropped lines and other decisions
    #[arg(long, short)]
    verbose: bool,
}

fn main() {
    match benchparse() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            process::exit(1);
        }
    }
}

fn benchparse() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            // Syntax:
            //  - components are space-separated but there are spaces nowhere else
            //  - the keyword "benchparse" is always the first component
            //  - every component is keyword(value)
            println!("benchparse version(0.1.0) features()");
            Ok(())
        }
        Commands::Parse(ref parse_args) => {
            init_logging(&parse_args.meta_args);
            parse_logs(parse_args)
        }
        Commands::Chart(ref chart_args) => {
            init_logging(&chart_args.meta_args);
            let path = Path::new(&chart_args.source_args.results_dir).join(sink::RESULTS_FILE);
            let rows = chart::read_table(&path)?;
            let mut stdout = io::stdout();
            chart::render(&mut stdout, &rows, chart_args.width)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

// Warnings are always shown, RUST_LOG can select more, and --verbose selects debug output.

fn init_logging(meta_args: &MetaArgs) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if meta_args.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder
        .format(|buf, record| writeln!(buf, "{}: {}", record.level(), record.args()))
        .init();
}

fn parse_logs(parse_args: &ParseCmdArgs) -> Result<()> {
    let config = pipeline_config(&parse_args.pipeline_args)?;
    debug!("{:?}", config);

    let dir = Path::new(&parse_args.source_args.results_dir);
    let files = benchlog::find_logfiles(dir, config.binding)?;
    let outcome = benchlog::read_logfiles(&files, &config)?;
    if outcome.discarded > 0 {
        debug!("{} recognized lines dropped", outcome.discarded);
    }
    if outcome.table.violations > 0 {
        warn!("{} records skipped for invalid units", outcome.table.violations);
    }

    let path = sink::write_table(dir, &outcome.table, config.schema)?;
    println!("Wrote {} records to {}", outcome.table.records.len(), path.display());
    Ok(())
}

/// The configuration file, if any, then the command line options on top.

fn pipeline_config(args: &PipelineArgs) -> Result<PipelineConfig> {
    let mut config = if let Some(ref filename) = args.config_file {
        match benchlog::read_pipeline_config(filename) {
            Ok(c) => c,
            Err(e) => bail!("Bad config file {filename}: {e}"),
        }
    } else {
        PipelineConfig::default()
    };
    if let Some(b) = args.binding {
        config.binding = b;
    }
    if let Some(s) = args.schema {
        config.schema = s;
    }
    if let Some(b) = args.boot {
        config.boot = b;
    }
    if args.boot_unit.is_some() {
        config.boot_unit = args.boot_unit;
    }
    if let Some(m) = args.malloc {
        config.malloc = m;
    }
    if let Some(m) = args.syscall {
        config.syscall = m;
    }
    if let Some(m) = args.tcp {
        config.tcp = m;
    }
    Ok(config)
}

#[cfg(test)]
fn no_overrides() -> PipelineArgs {
    PipelineArgs {
        config_file: None,
        binding: None,
        schema: None,
        boot: None,
        boot_unit: None,
        malloc: None,
        syscall: None,
        tcp: None,
    }
}

#[test]
fn test_pipeline_config_overrides() {
    let config = pipeline_config(&no_overrides()).unwrap();
    assert!(config == PipelineConfig::default());

    // The file says fixed/detailed/span/seconds/events/events; the command line wins where given.
    let args = PipelineArgs {
        config_file: Some("../tests/benchlog/whitebox-config.json".to_string()),
        schema: Some(OutputSchema::Flat),
        boot_unit: Some(Unit::Ms),
        tcp: Some(ExtractMode::Events),
        ..no_overrides()
    };
    let config = pipeline_config(&args).unwrap();
    assert!(config.binding == Binding::Fixed);
    assert!(config.schema == OutputSchema::Flat);
    assert!(config.boot == BootStrategy::Span);
    assert!(config.boot_unit() == Unit::Ms);
    assert!(config.malloc == ExtractMode::Events);
    assert!(config.tcp == ExtractMode::Events);

    let args = PipelineArgs {
        config_file: Some("../tests/benchlog/bad-config-value.json".to_string()),
        ..no_overrides()
    };
    assert!(pipeline_config(&args).is_err());
}

#[test]
fn test_cli_values() {
    let cli = Cli::try_parse_from([
        "benchparse",
        "parse",
        "--results-dir",
        "out",
        "--boot",
        "marker",
        "--schema",
        "detailed",
    ])
    .unwrap();
    let Commands::Parse(args) = cli.command else {
        panic!("Expected parse")
    };
    assert!(args.source_args.results_dir == "out");
    assert!(args.pipeline_args.boot == Some(BootStrategy::Marker));
    assert!(args.pipeline_args.schema == Some(OutputSchema::Detailed));
    assert!(!args.meta_args.verbose);

    assert!(Cli::try_parse_from(["benchparse", "parse", "--boot", "stopwatch"]).is_err());
    assert!(Cli::try_parse_from(["benchparse", "parse", "--boot-unit", "us"]).is_err());
}

#[test]
fn test_parse_end_to_end() {
    // Copy the sniff tree into a scratch directory, so that the table is written there.
    let dir = tempfile::tempdir().unwrap();
    for entry in std::fs::read_dir("../tests/benchlog/sniff-tree").unwrap() {
        let p = entry.unwrap().path();
        if p.is_file() {
            std::fs::copy(&p, dir.path().join(p.file_name().unwrap())).unwrap();
        }
    }
    let results_dir = dir.path().to_str().unwrap().to_string();
    let args = ParseCmdArgs {
        source_args: SourceArgs {
            results_dir: results_dir.clone(),
        },
        pipeline_args: no_overrides(),
        meta_args: MetaArgs { verbose: false },
    };
    parse_logs(&args).unwrap();
    let first = std::fs::read_to_string(dir.path().join(sink::RESULTS_FILE)).unwrap();
    let expected = "File,Benchmark,Metric,Value,Unit
boot.txt,Boot,Boot Time,453.000,ms
malloc.txt,Malloc,Malloc Ops/Sec,843.12,Kops/sec
mixed.txt,Syscall,Syscall Latency,5.26,us
mixed.txt,TCP,Throughput,112.5,MB/s
syscall.txt,Syscall,Syscall Latency,5.26,us
tcp.txt,TCP,Throughput,250,MB/s
";
    assert!(first == expected);

    // Running again over the same directory produces the same table.
    parse_logs(&args).unwrap();
    let second = std::fs::read_to_string(dir.path().join(sink::RESULTS_FILE)).unwrap();
    assert!(first == second);

    // And the chart can read it.
    let rows = chart::read_table(&dir.path().join(sink::RESULTS_FILE)).unwrap();
    assert!(rows.len() == 6);
    assert!(rows[5].label == "TCP (Throughput)");

    let args = ParseCmdArgs {
        source_args: SourceArgs {
            results_dir: dir.path().join("no-such-dir").to_str().unwrap().to_string(),
        },
        pipeline_args: no_overrides(),
        meta_args: MetaArgs { verbose: false },
    };
    assert!(parse_logs(&args).is_err());
}
