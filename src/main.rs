use anyhow::{Context as _, Result};
use clap::Parser;
use gotest_otel::{
    cli::Cli,
    collector::EventGroups,
    event::{EventStream, TestEvent},
    otlp_exporter::OtlpExporter,
    pipeline,
    runner::GoTest,
    summary,
    trace_context::TraceContext,
};
use opentelemetry::Context;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::process::ExitStatus;
use std::time::SystemTime;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; warnings are always shown, everything with --debug
fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::TRACE
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

/// Remote parent from --trace-parent / TRACEPARENT, if valid
fn parent_context(trace_parent: Option<&str>) -> Context {
    match trace_parent.map(TraceContext::parse) {
        Some(Ok(ctx)) => {
            tracing::info!("Distributed tracing enabled, continuing trace {}", ctx);
            ctx.to_context()
        }
        Some(Err(e)) => {
            tracing::warn!("Ignoring invalid trace parent: {}", e);
            Context::new()
        }
        None => Context::new(),
    }
}

fn echo_output(quiet: bool) -> impl FnMut(&TestEvent) {
    move |event| {
        if quiet {
            return;
        }
        if let Some(text) = &event.output {
            print!("{}", text);
        }
    }
}

/// Collect events from a recorded stream
fn read_input(path: &Path, quiet: bool) -> Result<EventGroups> {
    let groups = if path == Path::new("-") {
        EventGroups::collect(EventStream::new(io::stdin().lock()), echo_output(quiet))?
    } else {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        EventGroups::collect(EventStream::new(BufReader::new(file)), echo_output(quiet))?
    };
    Ok(groups)
}

/// Collect events from a live go test run
fn run_go_test(args: &Cli) -> Result<(EventGroups, ExitStatus)> {
    let mut run = GoTest::spawn(&args.go, &args.packages, &args.wd)?;
    let groups = EventGroups::collect(run.events()?, echo_output(args.quiet))?;
    let status = run.wait()?;
    Ok((groups, status))
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let started = SystemTime::now();
    let parent = parent_context(args.trace_parent.as_deref());

    let exporter = if args.no_export {
        OtlpExporter::offline(&args.otlp_service_name)
    } else {
        OtlpExporter::new(args.otlp_config())?
    };

    let (groups, status) = match &args.input {
        Some(path) => (read_input(path, args.quiet)?, None),
        None => {
            let (groups, status) = run_go_test(&args)?;
            (groups, Some(status))
        }
    };
    io::stdout().flush()?;

    let outcome = pipeline::export_groups(&groups, exporter.tracer(), &parent, started)?;
    println!("{}", outcome.trace_id);

    exporter.flush()?;
    exporter.shutdown()?;

    let comment = summary::generate(&groups);
    match &args.summary_file {
        Some(path) => std::fs::write(path, comment + "\n")
            .with_context(|| format!("Failed to write summary to {}", path.display()))?,
        None => println!("{}", comment),
    }

    match status {
        Some(status) if !status.success() => std::process::exit(status.code().unwrap_or(1)),
        _ => Ok(()),
    }
}
