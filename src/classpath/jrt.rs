use super::{ClasspathEntry, ClasspathMode, TypeAnswer, TypeNameCollector};
use crate::access::{AccessRestriction, AccessRuleSet};
use crate::annotations::attach_external_annotations;
use crate::classfile::{parse_class, BinaryType, ModuleDescriptor, CLASS_SUFFIX};
use crate::config::{ConfigError, JrtConfig};
use crate::environment::ModuleEnvironment;
use crate::image::{package_path, walk, ModuleFilter, ModuleImage, NotifyMode};
use crate::modules::{load_modules, ModuleRegistry, ModuleSnapshot};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Classpath entry backed by a platform module image.
///
/// Several entries may share one `ModuleImage`; only the entry created with
/// `close_at_end` releases the image's handles on `reset`.
#[derive(Debug)]
pub struct ClasspathJrt {
    image: Arc<ModuleImage>,
    close_at_end: bool,
    access_rules: AccessRuleSet,
    destination_path: Option<PathBuf>,
    annotation_paths: Vec<PathBuf>,
    registry: Arc<ModuleRegistry>,
}

impl ClasspathJrt {
    pub fn new(
        image: Arc<ModuleImage>,
        close_at_end: bool,
        access_rules: AccessRuleSet,
        destination_path: Option<PathBuf>,
    ) -> Self {
        Self {
            image,
            close_at_end,
            access_rules,
            destination_path,
            annotation_paths: Vec::new(),
            registry: ModuleRegistry::global(),
        }
    }

    /// Builds an entry from configuration, detecting the Java home when no
    /// image is configured.
    pub fn from_config(config: &JrtConfig) -> Result<Self, ConfigError> {
        let image = ModuleImage::shared(config.resolve_image()?);
        let access_rules = AccessRuleSet::new(
            config.access_rules.clone(),
            image.root().display().to_string(),
        );
        let mut entry = Self::new(
            image,
            config.close_at_end,
            access_rules,
            config.destination_path.clone(),
        );
        entry.set_annotation_paths(config.annotation_paths.clone());
        Ok(entry)
    }

    /// Uses `registry` instead of the process-wide one.
    pub fn with_registry(mut self, registry: Arc<ModuleRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn image(&self) -> &Arc<ModuleImage> {
        &self.image
    }

    pub fn closes_at_end(&self) -> bool {
        self.close_at_end
    }

    pub fn access_rules(&self) -> &AccessRuleSet {
        &self.access_rules
    }

    pub fn annotation_paths(&self) -> &[PathBuf] {
        &self.annotation_paths
    }

    /// Overlay sources tried in order for every found type.
    pub fn set_annotation_paths(&mut self, paths: Vec<PathBuf>) {
        self.annotation_paths = paths;
    }

    /// Registers this image's module descriptors unless already registered.
    pub fn load_modules(&self) -> Option<Arc<ModuleSnapshot>> {
        load_modules(&self.image, &self.registry, false)
    }

    /// Rescans the image and publishes a new descriptor generation.
    pub fn reload_modules(&self) -> Option<Arc<ModuleSnapshot>> {
        load_modules(&self.image, &self.registry, true)
    }

    pub fn modules_snapshot(&self) -> Option<Arc<ModuleSnapshot>> {
        self.registry.snapshot(self.image.canonical_path())
    }

    /// Lookups narrowed to `module`.
    pub fn lookup_environment_for<'a>(&'a self, module: &'a str) -> ModuleEnvironment<'a> {
        ModuleEnvironment::for_module(self, module)
    }

    /// Lookups across every module of the image.
    pub fn lookup_environment(&self) -> ModuleEnvironment<'_> {
        ModuleEnvironment::unrestricted(self)
    }

    fn fetch_access_restriction(
        &self,
        qualified_binary_file_name: &str,
    ) -> Option<AccessRestriction> {
        if self.access_rules.is_empty() {
            return None;
        }
        self.access_rules
            .violated_restriction(strip_class_suffix(qualified_binary_file_name))
    }

    fn attach_annotation_overlays(
        &self,
        binary_type: &mut BinaryType,
        qualified_binary_file_name: &str,
    ) {
        if self.annotation_paths.is_empty() {
            return;
        }
        let qualified_type_name = strip_class_suffix(qualified_binary_file_name);
        let mut handle = self.image.overlay_handle();
        for overlay in &self.annotation_paths {
            let attached =
                attach_external_annotations(binary_type, overlay, qualified_type_name, &mut handle);
            match attached {
                Ok(true) => break,
                Ok(false) => {}
                Err(error) => {
                    debug!(
                        overlay = %overlay.display(),
                        type_name = qualified_type_name,
                        %error,
                        "skipping unreadable annotation overlay"
                    );
                }
            }
        }
    }
}

impl ClasspathEntry for ClasspathJrt {
    fn find_type(
        &self,
        _type_name: &str,
        qualified_package_name: &str,
        qualified_binary_file_name: &str,
        _as_binary_only: bool,
        modules: ModuleFilter<'_>,
    ) -> Option<TypeAnswer> {
        if !self.is_package(qualified_package_name, modules) {
            return None;
        }

        let unit = match self.image.read_binary_unit(qualified_binary_file_name, modules) {
            Ok(Some(unit)) => unit,
            Ok(None) => return None,
            Err(error) => {
                debug!(unit = qualified_binary_file_name, %error, "binary unit unreadable");
                return None;
            }
        };

        let mut binary_type = match parse_class(&unit.bytes) {
            Ok(binary_type) => binary_type,
            Err(error) => {
                debug!(
                    unit = qualified_binary_file_name,
                    module = %unit.module,
                    %error,
                    "malformed binary unit"
                );
                return None;
            }
        };

        self.attach_annotation_overlays(&mut binary_type, qualified_binary_file_name);
        let restriction = self.fetch_access_restriction(qualified_binary_file_name);
        Some(TypeAnswer::new(binary_type, restriction, unit.module))
    }

    fn is_package(&self, qualified_package_name: &str, module: ModuleFilter<'_>) -> bool {
        match self.image.is_package(qualified_package_name, module) {
            Ok(found) => found,
            Err(error) => {
                debug!(package = qualified_package_name, %error, "package lookup failed");
                false
            }
        }
    }

    fn find_type_names(
        &self,
        qualified_package_name: &str,
        module: ModuleFilter<'_>,
    ) -> Option<Vec<Vec<String>>> {
        let package = package_path(qualified_package_name);
        if !self.is_package(&package, module) {
            return None;
        }

        let mut collector = TypeNameCollector::new(&package, module);
        if let Err(error) = walk(&self.image, &mut collector, NotifyMode::All) {
            debug!(package = %package, %error, "type name walk ended early");
        }
        let names = collector.into_names();
        if names.is_empty() {
            None
        } else {
            Some(names)
        }
    }

    fn get_module(&self, name: &str) -> Option<Arc<ModuleDescriptor>> {
        self.modules_snapshot()?.get(name)
    }

    fn serves_module(&self, name: &str) -> bool {
        self.modules_snapshot()
            .map(|snapshot| snapshot.contains(name))
            .unwrap_or(false)
    }

    fn initialize(&mut self) {
        self.load_modules();
    }

    fn reset(&mut self) {
        if self.close_at_end {
            self.image.close();
        }
        self.annotation_paths.clear();
    }

    fn canonical_path(&self) -> &Path {
        self.image.canonical_path()
    }

    fn normalized_path(&self) -> &str {
        self.image.normalized_path()
    }

    fn destination_path(&self) -> Option<&Path> {
        self.destination_path.as_deref()
    }

    fn mode(&self) -> ClasspathMode {
        ClasspathMode::Binary
    }
}

impl fmt::Display for ClasspathJrt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Classpath for jrt image {}", self.image.root().display())
    }
}

fn strip_class_suffix(name: &str) -> &str {
    name.strip_suffix(CLASS_SUFFIX).unwrap_or(name)
}
