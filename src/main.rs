use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use env_logger::Builder;
use log::LevelFilter;

use isalens::{inspect_snapshot, InspectRequest, ReportWriter};
use isalens_core::{FormatOptions, LensConfig, ResolutionPolicy};

/// Print the runtime (dynamic) type of a value in a process snapshot
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Variable or member path, e.g. myObserver->_source
    path: String,
    /// Snapshot of the stopped process (JSON)
    #[clap(short = 's', long)]
    snapshot: PathBuf,
    /// Object file whose debug info supplies additional types
    #[clap(short = 'b', long)]
    binary: Option<PathBuf>,
    /// JSON configuration file
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,
    /// Stack frame to evaluate in
    #[clap(short = 'f', long, default_value = "0")]
    frame: usize,
    /// Dynamic value policy: no-dynamic-values, run-target or no-run-target
    #[clap(short = 'd', long = "dynamic-type", default_value = "no-run-target")]
    dynamic: ResolutionPolicy,
    /// Show the type of every child
    #[clap(short = 'T', long)]
    show_types: bool,
    /// Show runtime-generated proxy class names
    #[clap(long)]
    raw_types: bool,
    /// Child depth to expand
    #[clap(short = 'D', long)]
    depth: Option<usize>,
    /// Resolve where stepping into this selector would land
    #[clap(long)]
    step: Option<String>,
    /// Write inspect_report.json and inspect_report.txt to this directory
    #[clap(short, long)]
    output: Option<PathBuf>,
    /// Never run code in the target, even with -d run-target
    #[clap(long)]
    no_runtime_calls: bool,
    /// Enable verbose logging (use multiple times for more verbosity)
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn load_config(args: &Args) -> Result<LensConfig> {
    let mut config = match &args.config {
        Some(path) => LensConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LensConfig::default(),
    };

    if args.no_runtime_calls {
        config.allow_runtime_calls = false;
    }
    if let Some(depth) = args.depth {
        config.summary_depth = depth;
    }
    config.validate()?;
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let request = InspectRequest {
        snapshot: args.snapshot.clone(),
        binary: args.binary.clone(),
        format: FormatOptions {
            show_types: args.show_types,
            raw_types: args.raw_types,
            depth: config.summary_depth,
        },
        config,
        frame: args.frame,
        path: args.path.clone(),
        policy: args.dynamic,
        step: args.step.clone(),
    };

    let report = inspect_snapshot(&request)
        .with_context(|| format!("inspecting {} in {}", args.path, args.snapshot.display()))?;

    println!("{}", "================================================".bright_black().bold());
    println!("{} #{} {}", "Frame:".bright_black().bold(), report.frame, report.function);
    println!("{} {}", "Policy:".bright_black().bold(), report.policy);
    println!("{} {}", "Address:".bright_black().bold(), report.address);
    println!("{}", "================================================".bright_black().bold());

    println!("\n{}", report.rendered);

    if let Some(error) = &report.resolution_error {
        println!(
            "\n{} {}",
            "Dynamic type unavailable, showing static type:".bright_yellow().bold(),
            error
        );
    }
    if report.resolved_via_runtime_call {
        println!("\n{}", "Type resolved by running code in the target".bright_blue().bold());
    }

    if let Some(step) = &report.step {
        println!("\n{} {}", "Step into lands in:".bright_green().bold(), step.class_name);
        println!(
            "- {}:{} ({})",
            step.file.as_deref().unwrap_or("<unknown>"),
            step.line,
            step.selector
        );
        for through in &step.stepped_through {
            println!("- stepped through {}", through);
        }
    }

    if let Some(output) = &args.output {
        let written = ReportWriter::new().write_report(&report, output)?;
        println!("\n{}", "Results written to:".bright_green().bold());
        for path in written {
            println!("- {}", path.display());
        }
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    let mut builder = Builder::new();
    let log_level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    builder
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let start_time = Instant::now();

    if let Err(e) = run(args) {
        eprintln!("{} {:#}", "Error:".bright_red().bold(), e);
        std::process::exit(1);
    }

    let duration = start_time.elapsed();
    println!("\n{} {:.2?}", "Total execution time:".bright_yellow().bold(), duration);
}
