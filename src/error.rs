use std::path::PathBuf;

use thiserror::Error;

/// A descriptor or generic signature violates its grammar.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("malformed {kind} `{input}` at {position}: {reason}")]
pub struct DescriptorError {
    pub kind: &'static str,
    pub input: String,
    pub position: usize,
    pub reason: &'static str,
}

/// Structural problems found while decoding a class file.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClassFileError {
    #[error("unexpected end of class data at offset {offset} (needed {needed} bytes)")]
    Truncated { offset: usize, needed: usize },
    #[error("invalid class file magic {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported constant pool tag {tag} at index {index}")]
    UnknownConstantTag { tag: u8, index: u16 },
    #[error("constant pool index {index} does not refer to a {expected} entry")]
    BadConstantRef { index: u16, expected: &'static str },
    #[error("invalid modified UTF-8 in constant pool entry {index}")]
    InvalidUtf8 { index: u16 },
    #[error("unknown annotation element tag `{0}`")]
    UnknownElementTag(char),
    #[error("{count} bytes of trailing data after class structure")]
    TrailingData { count: usize },
    #[error("{what} count {count} exceeds the class file limit")]
    TooMany { what: &'static str, count: usize },
}

/// Failure to adapt one compiled unit. Never fatal for a batch.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UnitError {
    #[error("unit {unit}: {source}")]
    Descriptor {
        unit: String,
        #[source]
        source: DescriptorError,
    },
    #[error("unit {unit}: {source}")]
    ClassFile {
        unit: String,
        #[source]
        source: ClassFileError,
    },
    #[error("unit {unit}: emitted class file failed verification: {reason}")]
    Verification { unit: String, reason: String },
}

impl UnitError {
    pub fn unit(&self) -> &str {
        match self {
            UnitError::Descriptor { unit, .. }
            | UnitError::ClassFile { unit, .. }
            | UnitError::Verification { unit, .. } => unit,
        }
    }
}

/// Errors raised by the program patcher and the simplification passes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("program invariant violated in block {block}: {reason}")]
    InvariantViolation { block: u32, reason: String },
    #[error("patch target descriptor `{descriptor}` is not a method descriptor: {reason}")]
    BadTargetDescriptor { descriptor: String, reason: String },
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

impl PatchError {
    pub(crate) fn invariant(block: u32, reason: impl Into<String>) -> Self {
        PatchError::InvariantViolation {
            block,
            reason: reason.into(),
        }
    }
}

/// Errors raised while loading or validating the adapter configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("rename table has a cycle: `{from}` maps to `{to}`, which is renamed again")]
    RenameCycle { from: String, to: String },
    #[error("patch entry for {class}.{method}: {reason}")]
    InvalidPatch {
        class: String,
        method: String,
        reason: String,
    },
}
