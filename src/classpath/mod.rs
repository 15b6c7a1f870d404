//! Classpath entry contract consumed by the compiler's name environment.

mod jrt;
mod type_names;

pub use jrt::ClasspathJrt;
pub use type_names::TypeNameCollector;

use crate::access::AccessRestriction;
use crate::classfile::{BinaryType, ModuleDescriptor};
use crate::image::ModuleFilter;
use std::path::Path;
use std::sync::Arc;

/// What kind of units an entry supplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClasspathMode {
    Source,
    Binary,
    SourceAndBinary,
}

/// A found binary type and the access restriction that applies to it.
#[derive(Debug, Clone)]
pub struct TypeAnswer {
    binary_type: BinaryType,
    access_restriction: Option<AccessRestriction>,
    module: String,
}

impl TypeAnswer {
    pub fn new(
        binary_type: BinaryType,
        access_restriction: Option<AccessRestriction>,
        module: impl Into<String>,
    ) -> Self {
        Self {
            binary_type,
            access_restriction,
            module: module.into(),
        }
    }

    pub fn binary_type(&self) -> &BinaryType {
        &self.binary_type
    }

    pub fn into_binary_type(self) -> BinaryType {
        self.binary_type
    }

    pub fn access_restriction(&self) -> Option<&AccessRestriction> {
        self.access_restriction.as_ref()
    }

    /// On-disk name of the module the type was read from.
    pub fn module(&self) -> &str {
        &self.module
    }
}

/// Lookup contract of one classpath location.
///
/// Lookups never fail: unreadable or malformed content answers "not found".
/// Package names are internal (`java/lang`); binary names carry the `.class`
/// suffix (`java/lang/String.class`).
pub trait ClasspathEntry {
    fn find_type(
        &self,
        type_name: &str,
        qualified_package_name: &str,
        qualified_binary_file_name: &str,
        as_binary_only: bool,
        modules: ModuleFilter<'_>,
    ) -> Option<TypeAnswer>;

    fn is_package(&self, qualified_package_name: &str, module: ModuleFilter<'_>) -> bool;

    /// Type names directly inside `qualified_package_name`, each given as the
    /// package segments followed by the simple name.
    fn find_type_names(
        &self,
        qualified_package_name: &str,
        module: ModuleFilter<'_>,
    ) -> Option<Vec<Vec<String>>>;

    fn get_module(&self, name: &str) -> Option<Arc<ModuleDescriptor>>;

    fn serves_module(&self, name: &str) -> bool;

    fn initialize(&mut self);

    fn reset(&mut self);

    fn canonical_path(&self) -> &Path;

    fn normalized_path(&self) -> &str;

    fn destination_path(&self) -> Option<&Path>;

    fn mode(&self) -> ClasspathMode;
}
