//! Batch pipeline: read units from a source, adapt them in parallel, encode,
//! verify and hand the result to the archive writer.

use std::collections::{BTreeSet, HashSet};
use std::io::Write;

use anyhow::{Context, Result};
use jclassfile::class_file;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::adapt::{Adapted, Adapter, SuppressReason};
use crate::archive::ArchiveWriter;
use crate::classfile::{decode_unit, encode_module_descriptor, encode_unit};
use crate::config::AdapterConfig;
use crate::error::UnitError;
use crate::rename::package_of;
use crate::source::UnitSource;

pub const MODULE_INFO_ENTRY: &str = "module-info.class";

/// What happened to one input unit.
#[derive(Clone, Debug)]
pub enum UnitOutcome {
    Emitted { name: String, bytes: Vec<u8> },
    Suppressed(SuppressReason),
    Failed(UnitError),
}

#[derive(Clone, Debug)]
pub struct UnitRecord {
    pub source_name: String,
    pub outcome: UnitOutcome,
}

#[derive(Clone, Debug)]
pub struct ModuleDescriptor {
    pub name: String,
    pub packages: Vec<String>,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct ConversionOutput {
    /// One record per input unit, in input name order.
    pub units: Vec<UnitRecord>,
    pub module_descriptor: Option<ModuleDescriptor>,
}

impl ConversionOutput {
    /// Emitted units sorted by renamed name.
    pub fn emitted(&self) -> Vec<(&str, &[u8])> {
        let mut emitted: Vec<(&str, &[u8])> = self
            .units
            .iter()
            .filter_map(|record| match &record.outcome {
                UnitOutcome::Emitted { name, bytes } => Some((name.as_str(), bytes.as_slice())),
                _ => None,
            })
            .collect();
        emitted.sort_by(|a, b| a.0.cmp(b.0));
        emitted
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitError> {
        self.units.iter().filter_map(|record| match &record.outcome {
            UnitOutcome::Failed(error) => Some(error),
            _ => None,
        })
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn report(&self) -> Report {
        let mut report = Report {
            units: self.units.len(),
            ..Report::default()
        };
        for record in &self.units {
            match &record.outcome {
                UnitOutcome::Emitted { name, .. } => report.emitted.push(EmittedEntry {
                    source: record.source_name.clone(),
                    name: name.clone(),
                }),
                UnitOutcome::Suppressed(reason) => report.suppressed.push(SuppressedEntry {
                    source: record.source_name.clone(),
                    reason: reason.to_string(),
                }),
                UnitOutcome::Failed(error) => report.failed.push(FailedEntry {
                    source: record.source_name.clone(),
                    error: error.to_string(),
                }),
            }
        }
        report.module = self.module_descriptor.as_ref().map(|module| ModuleEntry {
            name: module.name.clone(),
            packages: module.packages.clone(),
        });
        report
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Report {
    pub units: usize,
    pub emitted: Vec<EmittedEntry>,
    pub suppressed: Vec<SuppressedEntry>,
    pub failed: Vec<FailedEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<ModuleEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EmittedEntry {
    pub source: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SuppressedEntry {
    pub source: String,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct FailedEntry {
    pub source: String,
    pub error: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ModuleEntry {
    pub name: String,
    pub packages: Vec<String>,
}

/// Converts every unit of `source`. Unit failures are recorded, never
/// returned; only source I/O and configuration problems abort the batch.
pub fn convert(source: &mut dyn UnitSource, config: &AdapterConfig) -> Result<ConversionOutput> {
    let adapter = Adapter::new(config).context("invalid adapter configuration")?;

    let names = source.names();
    let mut inputs = Vec::with_capacity(names.len());
    for name in names {
        let bytes = source
            .read(&name)
            .with_context(|| format!("failed to read unit {name} from {}", source.describe()))?;
        inputs.push((name, bytes));
    }

    let outcomes: Vec<UnitOutcome> = inputs
        .par_iter()
        .map(|(name, bytes)| convert_unit(&adapter, name, bytes))
        .collect();

    let mut seen = HashSet::new();
    let mut units = Vec::with_capacity(outcomes.len());
    for ((source_name, _), outcome) in inputs.into_iter().zip(outcomes) {
        let outcome = match outcome {
            UnitOutcome::Emitted { name, .. } if !seen.insert(name.clone()) => {
                warn!("{source_name} renames to {name}, which is already emitted; skipping");
                UnitOutcome::Suppressed(SuppressReason::Duplicate { name })
            }
            UnitOutcome::Suppressed(reason) => {
                debug!("suppressed {source_name}: {reason}");
                UnitOutcome::Suppressed(reason)
            }
            UnitOutcome::Failed(error) => {
                warn!("{error}");
                UnitOutcome::Failed(error)
            }
            emitted => emitted,
        };
        units.push(UnitRecord {
            source_name,
            outcome,
        });
    }

    let mut output = ConversionOutput {
        units,
        module_descriptor: None,
    };
    if config.module.emit {
        let packages: Vec<String> = output
            .emitted()
            .iter()
            .filter_map(|(name, _)| package_of(name))
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let bytes = encode_module_descriptor(&config.module.name, &packages)
            .context("failed to encode module descriptor")?;
        output.module_descriptor = Some(ModuleDescriptor {
            name: config.module.name.clone(),
            packages,
            bytes,
        });
    }

    let report = output.report();
    info!(
        "converted {} units: {} emitted, {} suppressed, {} failed",
        report.units,
        report.emitted.len(),
        report.suppressed.len(),
        report.failed.len()
    );
    Ok(output)
}

fn convert_unit(adapter: &Adapter, source_name: &str, bytes: &[u8]) -> UnitOutcome {
    match adapt_bytes(adapter, source_name, bytes) {
        Ok(outcome) => outcome,
        Err(error) => UnitOutcome::Failed(error),
    }
}

fn adapt_bytes(
    adapter: &Adapter,
    source_name: &str,
    bytes: &[u8],
) -> std::result::Result<UnitOutcome, UnitError> {
    let unit = decode_unit(bytes).map_err(|source| UnitError::ClassFile {
        unit: source_name.to_string(),
        source,
    })?;
    let adapted = adapter
        .adapt(&unit)
        .map_err(|source| UnitError::Descriptor {
            unit: source_name.to_string(),
            source,
        })?;
    let (name, unit) = match adapted {
        Adapted::Kept { name, unit } => (name, unit),
        Adapted::Suppressed(reason) => return Ok(UnitOutcome::Suppressed(reason)),
    };
    let bytes = encode_unit(&unit).map_err(|source| UnitError::ClassFile {
        unit: source_name.to_string(),
        source,
    })?;
    verify(&bytes).map_err(|reason| UnitError::Verification {
        unit: source_name.to_string(),
        reason,
    })?;
    Ok(UnitOutcome::Emitted { name, bytes })
}

/// Re-parses an emitted class file. Attributes the parser does not model
/// are checked with the crate's own decoder instead.
fn verify(bytes: &[u8]) -> std::result::Result<(), String> {
    match class_file::parse(bytes) {
        Ok(_) => Ok(()),
        Err(error) => {
            let message = format!("{error}");
            if message.contains("unmatched attribute") {
                decode_unit(bytes).map(|_| ()).map_err(|error| error.to_string())
            } else {
                Err(message)
            }
        }
    }
}

/// Writes emitted units as `<name>.class` entries in name order, followed by
/// the module descriptor when one was synthesized. Returns the entry count.
pub fn write_archive<W: Write>(output: &ConversionOutput, writer: W) -> Result<usize> {
    let mut archive = ArchiveWriter::new(writer);
    for (name, bytes) in output.emitted() {
        archive.append(&format!("{name}.class"), bytes)?;
    }
    if let Some(module) = &output.module_descriptor {
        archive.append(MODULE_INFO_ENTRY, &module.bytes)?;
    }
    let entries = archive.entries();
    archive.finish()?;
    Ok(entries)
}
