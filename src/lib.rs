//! chunksim - chunk-checksum similarity for sets of files
//!
//! Every input file is cut into fixed-size chunks, each chunk is reduced to
//! the sum of its bytes, and every unordered pair of files is scored by the
//! fraction of chunk positions whose sums agree. Fingerprinting and
//! comparison both run on rayon pools; see [`pipeline`] for how the two
//! stages are wired together.

pub mod cli;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod signal;
pub mod similarity;
pub mod sums;

mod pool;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Context;
use bytesize::ByteSize;

use crate::cli::{Cli, OutputFormat};
use crate::config::Config;
use crate::error::ExitCode;
use crate::output::{write_sums, CsvOutput, CsvSums, JsonOutput, JsonSums, OutputError, TextOutput};
use crate::pipeline::{Pipeline, PipelineReport};
use crate::progress::Progress;
use crate::sums::SumReport;

/// Run the application with parsed arguments, writing results to stdout.
///
/// # Errors
///
/// Returns an error for invalid configuration, an interrupted or timed-out
/// run, or a failure writing the output. [`ExitCode::from_error`] maps it
/// to the process exit code.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_app_to(cli, &mut out)
}

/// [`run_app`] with an explicit output writer.
///
/// # Errors
///
/// See [`run_app`].
pub fn run_app_to<W: Write>(cli: Cli, out: &mut W) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply_to(&mut config)?;
    log::debug!("Effective configuration: {config:?}");
    if let Some(ref path) = cli.save_config {
        config.save(path)?;
        log::info!("Saved configuration to {}", path.display());
    }

    let handler = signal::install_handler().context("Failed to set up Ctrl+C handling")?;
    let mut pipeline_config = config.validate()?.with_cancel_token(handler.token());
    if cli.show_progress() {
        pipeline_config = pipeline_config.with_progress_callback(Arc::new(Progress::new(false)));
    }
    let pipeline = Pipeline::new(pipeline_config);

    if cli.sums {
        return run_sums(&pipeline, &cli, out);
    }

    let report = match cli.output {
        OutputFormat::Text => {
            let mut text = TextOutput::new(&mut *out);
            let mut write_error: Option<OutputError> = None;
            let report = pipeline.run_with(&cli.paths, |result| {
                if write_error.is_none() {
                    if let Err(e) = text.write_result(&result) {
                        write_error = Some(e);
                    }
                }
            })?;
            if let Some(e) = write_error {
                return Err(e).context("Failed to write results");
            }
            text.finish().context("Failed to write results")?;
            report
        }
        OutputFormat::Json => {
            let run = pipeline.run(&cli.paths)?;
            let exit_code = exit_code_for(&run.report);
            JsonOutput::new(&run.results, &run.report, exit_code)
                .write_to(out, true)
                .context("Failed to write JSON report")?;
            run.report
        }
        OutputFormat::Csv => {
            let run = pipeline.run(&cli.paths)?;
            CsvOutput::new(&run.results)
                .write_to(&mut *out)
                .context("Failed to write CSV")?;
            run.report
        }
    };

    log_summary(&report);
    Ok(exit_code_for(&report))
}

fn run_sums<W: Write>(pipeline: &Pipeline, cli: &Cli, out: &mut W) -> anyhow::Result<ExitCode> {
    let report = pipeline.sums(&cli.paths)?;
    let exit_code = if report.is_partial() {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    };

    match cli.output {
        OutputFormat::Text => write_sums(&mut *out, &report),
        OutputFormat::Json => JsonSums::new(&report, exit_code).write_to(out),
        OutputFormat::Csv => CsvSums::new(&report.sums).write_to(&mut *out),
    }
    .context("Failed to write sums")?;

    log_sums_summary(&report);
    Ok(exit_code)
}

fn exit_code_for(report: &PipelineReport) -> ExitCode {
    if report.is_partial() {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    }
}

fn log_summary(report: &PipelineReport) {
    log::info!(
        "Compared {} pairs across {} files ({} read, {} failed) in {:?}",
        report.compare.pairs_compared,
        report.fingerprint.fingerprinted_files,
        ByteSize::b(report.fingerprint.bytes_read),
        report.failures.len(),
        report.duration
    );
    for failure in &report.failures {
        log::debug!("Not compared: {}", failure.path().display());
    }
}

fn log_sums_summary(report: &SumReport) {
    log::info!(
        "Summed {} files ({} read, {} failed) in {:?}",
        report.sums.len(),
        ByteSize::b(report.stats.bytes_read),
        report.failures.len(),
        report.stats.duration
    );
}
