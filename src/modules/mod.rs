//! Process-wide module descriptor registry.
//!
//! Descriptors are grouped per image: each scan of an image publishes one
//! immutable snapshot, indexed by declared module name. Snapshots are never
//! evicted; a rescan replaces the image's snapshot with a newer generation.

mod scanner;

pub use scanner::{load_modules, scan_descriptors, DescriptorScanner};

use crate::classfile::ModuleDescriptor;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

static GLOBAL_REGISTRY: Lazy<Arc<ModuleRegistry>> = Lazy::new(|| Arc::new(ModuleRegistry::new()));

/// Descriptors found by one scan of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSnapshot {
    image: PathBuf,
    generation: u64,
    modules: HashMap<String, Vec<Arc<ModuleDescriptor>>>,
}

impl ModuleSnapshot {
    fn new(image: PathBuf, generation: u64, descriptors: Vec<ModuleDescriptor>) -> Self {
        let mut modules: HashMap<String, Vec<Arc<ModuleDescriptor>>> = HashMap::new();
        for descriptor in descriptors {
            let bucket = modules.entry(descriptor.name.clone()).or_default();
            if !bucket.iter().any(|known| **known == descriptor) {
                bucket.push(Arc::new(descriptor));
            }
        }
        Self {
            image,
            generation,
            modules,
        }
    }

    pub fn image(&self) -> &Path {
        &self.image
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModuleDescriptor>> {
        self.modules
            .get(name)?
            .iter()
            .find(|descriptor| descriptor.name == name)
            .cloned()
    }

    /// Every descriptor registered under `name`.
    pub fn descriptors(&self, name: &str) -> &[Arc<ModuleDescriptor>] {
        self.modules.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ModuleRegistry {
    snapshots: RwLock<HashMap<PathBuf, Arc<ModuleSnapshot>>>,
    generations: AtomicU64,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by every classpath entry that was not given its own.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Current snapshot for the image at canonical path `image`.
    pub fn snapshot(&self, image: &Path) -> Option<Arc<ModuleSnapshot>> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(image)
            .cloned()
    }

    pub fn is_populated(&self, image: &Path) -> bool {
        self.snapshot(image).is_some()
    }

    /// Publishes a new generation for `image`, replacing any earlier snapshot.
    pub fn publish(&self, image: &Path, descriptors: Vec<ModuleDescriptor>) -> Arc<ModuleSnapshot> {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot = Arc::new(ModuleSnapshot::new(
            image.to_path_buf(),
            generation,
            descriptors,
        ));
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(image.to_path_buf(), Arc::clone(&snapshot));
        snapshot
    }

    pub fn image_count(&self) -> usize {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
