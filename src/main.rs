use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;

use reclass::config::AdapterConfig;
use reclass::convert::{convert, write_archive};
use reclass::source::open_source;

/// CLI arguments for a reclass run.
#[derive(Parser, Debug)]
#[command(
    name = "reclass",
    about = "Adapt a compiled JVM class library to a remapped namespace.",
    version
)]
struct Cli {
    /// JAR, ZIP, class directory or gzip unit archive.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Destination unit archive.
    #[arg(long, value_name = "PATH")]
    output: PathBuf,
    /// TOML adapter configuration; built-in tables are used without it.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Append a synthesized module descriptor to the archive.
    #[arg(long)]
    module_info: bool,
    /// Write a JSON report to PATH, or to stdout with `-`.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
    /// Exit with a failure status if any unit failed to convert.
    #[arg(long)]
    strict: bool,
    #[arg(long, conflicts_with = "quiet")]
    verbose: bool,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // info on stderr by default; --verbose enables debug; RUST_LOG overrides
    if !cli.quiet {
        let level = if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("reclass", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_target(false)
            .init();
    }

    run(cli)
}

fn run(cli: Cli) -> Result<ExitCode> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }

    let started_at = Instant::now();
    let mut config = match &cli.config {
        Some(path) => AdapterConfig::load(path)?,
        None => AdapterConfig::default(),
    };
    if cli.module_info {
        config.module.emit = true;
    }

    let mut source = open_source(&cli.input)?;
    let output = convert(source.as_mut(), &config)?;

    let file = File::create(&cli.output)
        .with_context(|| format!("failed to open {}", cli.output.display()))?;
    let entries = write_archive(&output, BufWriter::new(file))
        .with_context(|| format!("failed to write {}", cli.output.display()))?;

    if let Some(path) = cli.report.as_deref() {
        let mut writer = output_writer(path)?;
        serde_json::to_writer_pretty(&mut writer, &output.report())
            .context("failed to serialize report")?;
        writer.write_all(b"\n").context("failed to write report")?;
        writer.flush().context("failed to write report")?;
    }

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} units={} entries={}",
            started_at.elapsed().as_millis(),
            output.units.len(),
            entries
        );
    }

    if cli.strict && output.has_failures() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn output_writer(path: &Path) -> Result<Box<dyn Write>> {
    if path == Path::new("-") {
        return Ok(Box::new(io::stdout()));
    }
    Ok(Box::new(
        File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_accepts_the_full_flag_set() {
        let cli = Cli::try_parse_from([
            "reclass",
            "--input",
            "classlib.jar",
            "--output",
            "out.bin",
            "--config",
            "reclass.toml",
            "--module-info",
            "--report",
            "-",
            "--strict",
            "--verbose",
            "--timing",
        ])
        .expect("parse");
        assert!(cli.module_info && cli.strict && cli.verbose && cli.timing);
        assert_eq!(cli.report.as_deref(), Some(Path::new("-")));
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        let result = Cli::try_parse_from([
            "reclass", "--input", "a.jar", "--output", "b.bin", "--verbose", "--quiet",
        ]);
        assert!(result.is_err());
    }
}
