//! Module-scoped views over a `ClasspathJrt`.
//!
//! A view resolves against the entry's descriptor registry when a lookup is
//! requested. Modules the entry does not serve get `Unserved` lookups that
//! answer "not found" for everything, so callers iterating many entries never
//! special-case a missing module.

use crate::classpath::{ClasspathEntry, ClasspathJrt, TypeAnswer};
use crate::image::ModuleFilter;

#[derive(Debug, Clone, Copy)]
pub struct ModuleEnvironment<'a> {
    entry: &'a ClasspathJrt,
    module: Option<&'a str>,
}

impl<'a> ModuleEnvironment<'a> {
    pub(crate) fn for_module(entry: &'a ClasspathJrt, module: &'a str) -> Self {
        Self {
            entry,
            module: Some(module),
        }
    }

    pub(crate) fn unrestricted(entry: &'a ClasspathJrt) -> Self {
        Self {
            entry,
            module: None,
        }
    }

    pub fn module(&self) -> Option<&'a str> {
        self.module
    }

    pub fn type_lookup(&self) -> TypeLookup<'a> {
        match self.module {
            None => TypeLookup::Unrestricted { entry: self.entry },
            Some(module) if self.entry.serves_module(module) => TypeLookup::Module {
                entry: self.entry,
                module,
            },
            Some(_) => TypeLookup::Unserved,
        }
    }

    pub fn package_lookup(&self) -> PackageLookup<'a> {
        match self.module {
            None => PackageLookup::Unrestricted { entry: self.entry },
            Some(module) if self.entry.serves_module(module) => PackageLookup::Module {
                entry: self.entry,
                module,
            },
            Some(_) => PackageLookup::Unserved,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TypeLookup<'a> {
    Module {
        entry: &'a ClasspathJrt,
        module: &'a str,
    },
    Unrestricted {
        entry: &'a ClasspathJrt,
    },
    Unserved,
}

impl TypeLookup<'_> {
    pub fn is_served(&self) -> bool {
        !matches!(self, TypeLookup::Unserved)
    }

    pub fn find_type(
        &self,
        type_name: &str,
        qualified_package_name: &str,
        qualified_binary_file_name: &str,
        as_binary_only: bool,
    ) -> Option<TypeAnswer> {
        let (entry, filter) = match *self {
            TypeLookup::Module { entry, module } => (entry, ModuleFilter::Named(module)),
            TypeLookup::Unrestricted { entry } => (entry, ModuleFilter::Unnamed),
            TypeLookup::Unserved => return None,
        };
        entry.find_type(
            type_name,
            qualified_package_name,
            qualified_binary_file_name,
            as_binary_only,
            filter,
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub enum PackageLookup<'a> {
    Module {
        entry: &'a ClasspathJrt,
        module: &'a str,
    },
    Unrestricted {
        entry: &'a ClasspathJrt,
    },
    Unserved,
}

impl PackageLookup<'_> {
    pub fn is_served(&self) -> bool {
        !matches!(self, PackageLookup::Unserved)
    }

    pub fn is_package(&self, qualified_package_name: &str) -> bool {
        match *self {
            PackageLookup::Module { entry, module } => {
                entry.is_package(qualified_package_name, ModuleFilter::Named(module))
            }
            PackageLookup::Unrestricted { entry } => {
                entry.is_package(qualified_package_name, ModuleFilter::Unnamed)
            }
            PackageLookup::Unserved => false,
        }
    }
}
