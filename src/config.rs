use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::patch::{PatchEntry, PatchTable, Patcher};
use crate::rename::{PrefixRule, Renamer};

/// A method converted into a public static final field of its return type.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FieldConversion {
    pub owner: String,
    pub method: String,
}

/// Module descriptor synthesis settings.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleSettings {
    pub name: String,
    pub emit: bool,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        ModuleSettings {
            name: "java.base".to_string(),
            emit: false,
        }
    }
}

/// Adapter configuration. Every section falls back to the built-in tables,
/// so an empty document is a complete configuration.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterConfig {
    pub names: BTreeMap<String, String>,
    pub prefix: Vec<PrefixRule>,
    pub exclude: Vec<String>,
    pub supertype_overrides: BTreeMap<String, String>,
    pub field_conversions: Vec<FieldConversion>,
    pub module: ModuleSettings,
    pub class_replacements: BTreeMap<String, String>,
    pub patch: Vec<PatchEntry>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        let strings = |values: &[&str]| values.iter().map(|value| value.to_string()).collect();
        let pairs = |values: &[(&str, &str)]| {
            values
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect()
        };
        AdapterConfig {
            names: BTreeMap::new(),
            prefix: vec![PrefixRule {
                from: "org/teavm/classlib/java/".to_string(),
                to: "java/".to_string(),
                marker: Some('T'),
            }],
            exclude: strings(&[
                "org/teavm/classlib/",
                "org/teavm/jso/impl/",
                "org/teavm/platform",
                "java/nio/charset/impl/",
                "java/util/stream/impl",
                "java/util/stream/intimpl",
                "java/util/stream/longimpl",
                "java/util/stream/doubleimpl",
            ]),
            supertype_overrides: pairs(&[
                ("java/lang/Throwable", "java/lang/Object"),
                ("java/lang/RuntimeException", "java/lang/Exception"),
            ]),
            field_conversions: ["in", "out", "err"]
                .iter()
                .map(|method| FieldConversion {
                    owner: "java/lang/System".to_string(),
                    method: method.to_string(),
                })
                .collect(),
            module: ModuleSettings::default(),
            class_replacements: pairs(&[
                (
                    "com/sun/tools/javac/util/ServiceLoader",
                    "java/util/ServiceLoader",
                ),
                ("java/util/concurrent/ConcurrentHashMap", "java/util/HashMap"),
                ("java/util/WeakHashMap", "java/util/HashMap"),
            ]),
            patch: Vec::new(),
        }
    }
}

impl AdapterConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AdapterConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.renamer()?;
        self.class_replacer()?;
        self.patch_table()?;
        Ok(())
    }

    /// Rename function for unit adaptation.
    pub fn renamer(&self) -> Result<Renamer, ConfigError> {
        Renamer::new(self.names.clone(), self.prefix.clone())
    }

    fn class_replacer(&self) -> Result<Renamer, ConfigError> {
        Renamer::new(self.class_replacements.clone(), Vec::new())
    }

    /// Built-in patches overlaid with the configured `[[patch]]` entries.
    pub fn patch_table(&self) -> Result<PatchTable, ConfigError> {
        let mut table = PatchTable::default_table();
        for entry in &self.patch {
            table.insert(entry.clone());
        }
        table.validate()?;
        Ok(table)
    }

    pub fn patcher(&self) -> Result<Patcher, ConfigError> {
        Ok(Patcher::new(self.patch_table()?, self.class_replacer()?))
    }
}
