//! Namespace adaptation of compiled JVM class libraries and instruction-level
//! patching of method programs.
//!
//! The adaptation side reads compiled units from a [`source`], rewrites names,
//! descriptors and generic signatures through [`adapt`], and packs the result
//! with [`archive`]. The patching side works on [`ir::Program`]s: [`patch`]
//! applies the patch table and [`simplify`] normalizes the result.

pub mod adapt;
pub mod archive;
pub mod cfg;
pub mod classfile;
pub mod config;
pub mod convert;
pub mod descriptor;
pub mod error;
pub mod ir;
pub mod patch;
pub mod rename;
pub mod signature;
pub mod simplify;
pub mod source;
pub mod unit;
