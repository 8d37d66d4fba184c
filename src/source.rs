//! Catalogs of compiled units keyed by qualified name.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use zip::ZipArchive;

use crate::archive::ArchiveReader;

const CLASS_SUFFIX: &str = ".class";
const MODULE_INFO: &str = "module-info";

/// Read-only, pull-based catalog of `(qualified name, class bytes)` pairs.
pub trait UnitSource {
    /// Unit names in ascending order.
    fn names(&self) -> Vec<String>;

    fn read(&mut self, name: &str) -> Result<Vec<u8>>;

    fn describe(&self) -> String;
}

/// Maps an entry path such as `java/lang/Object.class` to its unit name.
/// Anything that is not a class file, or is a module descriptor, is skipped.
fn unit_name(entry: &str) -> Option<String> {
    let entry = entry.replace('\\', "/");
    let name = entry.strip_suffix(CLASS_SUFFIX)?;
    if name.is_empty() || name.starts_with("META-INF/") {
        return None;
    }
    let simple = name.rsplit('/').next().unwrap_or(name);
    if simple == MODULE_INFO {
        return None;
    }
    Some(name.to_string())
}

/// Units held in memory, typically decoded from an archive.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    units: BTreeMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.units.insert(name.into(), bytes);
    }

    /// Loads every class entry of a gzip archive (see [`crate::archive`]).
    pub fn from_archive(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut reader = ArchiveReader::new(BufReader::new(file));
        let mut source = MemorySource::new();
        while let Some((entry, bytes)) = reader
            .next_entry()
            .with_context(|| format!("failed to read {}", path.display()))?
        {
            if let Some(name) = unit_name(&entry) {
                source.insert(name, bytes);
            }
        }
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl UnitSource for MemorySource {
    fn names(&self) -> Vec<String> {
        self.units.keys().cloned().collect()
    }

    fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        self.units
            .get(name)
            .cloned()
            .with_context(|| format!("unknown unit {name}"))
    }

    fn describe(&self) -> String {
        format!("{} in-memory units", self.units.len())
    }
}

/// Class entries of a JAR or ZIP file.
pub struct JarSource {
    path: PathBuf,
    archive: ZipArchive<File>,
    entries: BTreeMap<String, String>,
}

impl JarSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut archive =
            ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;
        let mut entries = BTreeMap::new();
        for index in 0..archive.len() {
            let entry = archive
                .by_index(index)
                .with_context(|| format!("failed to read {}", path.display()))?;
            if entry.is_dir() {
                continue;
            }
            if let Some(name) = unit_name(entry.name()) {
                entries.insert(name, entry.name().to_string());
            }
        }
        Ok(JarSource {
            path: path.to_path_buf(),
            archive,
            entries,
        })
    }
}

impl UnitSource for JarSource {
    fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry_name = self
            .entries
            .get(name)
            .with_context(|| format!("unknown unit {name} in {}", self.path.display()))?;
        let mut entry = self
            .archive
            .by_name(entry_name)
            .with_context(|| format!("failed to read {}:{}", self.path.display(), entry_name))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}:{}", self.path.display(), entry_name))?;
        Ok(data)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Class files below a directory; the relative path is the unit name.
pub struct DirSource {
    root: PathBuf,
    files: BTreeMap<String, PathBuf>,
}

impl DirSource {
    pub fn open(root: &Path) -> Result<Self> {
        let mut files = BTreeMap::new();
        walk(root, root, &mut files)?;
        Ok(DirSource {
            root: root.to_path_buf(),
            files,
        })
    }
}

fn walk(root: &Path, dir: &Path, files: &mut BTreeMap<String, PathBuf>) -> Result<()> {
    let mut entries = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read directory {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("failed to read entry under {}", dir.display()))?;
        entries.push(entry.path());
    }
    entries.sort();

    for entry in entries {
        if entry.is_dir() {
            walk(root, &entry, files)?;
            continue;
        }
        let Ok(relative) = entry.strip_prefix(root) else {
            continue;
        };
        let relative: Vec<String> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect();
        if let Some(name) = unit_name(&relative.join("/")) {
            files.insert(name, entry);
        }
    }
    Ok(())
}

impl UnitSource for DirSource {
    fn names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let path = self
            .files
            .get(name)
            .with_context(|| format!("unknown unit {name} under {}", self.root.display()))?;
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Picks a catalog for `path`: directories are walked, `.jar`/`.zip` files
/// are opened as ZIP archives and `.bin`/`.gz` files as gzip archives.
pub fn open_source(path: &Path) -> Result<Box<dyn UnitSource>> {
    if path.is_dir() {
        return Ok(Box::new(DirSource::open(path)?));
    }
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match extension {
        "jar" | "zip" => Ok(Box::new(JarSource::open(path)?)),
        "bin" | "gz" => Ok(Box::new(MemorySource::from_archive(path)?)),
        _ => anyhow::bail!("unsupported input file: {}", path.display()),
    }
}
