//! jv_classpath - module-image classpath entry
//!
//! Answers package existence, binary type and type-name queries against a
//! platform module image (exploded module directories or `jmods`), scoped by
//! module. Module descriptors are scanned once per image into a process-wide
//! registry, and external annotation overlays can be layered onto found types.

pub mod access;
pub mod annotations;
pub mod classfile;
pub mod classpath;
pub mod config;
pub mod environment;
pub mod image;
pub mod modules;

pub use access::{AccessRestriction, AccessRule, AccessRuleKind, AccessRuleSet};
pub use annotations::ExternalAnnotationProvider;
pub use classfile::{BinaryType, ClassParseError, ModuleDescriptor};
pub use classpath::{ClasspathEntry, ClasspathJrt, ClasspathMode, TypeAnswer};
pub use config::{ConfigError, JrtConfig};
pub use environment::{ModuleEnvironment, PackageLookup, TypeLookup};
pub use image::{ImageError, ModuleFilter, ModuleImage};
pub use modules::{ModuleRegistry, ModuleSnapshot};

#[cfg(test)]
mod tests;
