use super::{ModuleRegistry, ModuleSnapshot};
use crate::classfile::{parse_module_info, ModuleDescriptor, MODULE_INFO_CLASS};
use crate::image::{walk, ImageError, ImageVisitor, ModuleImage, NotifyMode, WalkControl};
use std::sync::Arc;
use tracing::{debug, warn};

/// Reads each module's `module-info.class` and never descends further.
pub struct DescriptorScanner<'a> {
    image: &'a ModuleImage,
    descriptors: Vec<ModuleDescriptor>,
}

impl<'a> DescriptorScanner<'a> {
    pub fn new(image: &'a ModuleImage) -> Self {
        Self {
            image,
            descriptors: Vec::new(),
        }
    }

    pub fn into_descriptors(self) -> Vec<ModuleDescriptor> {
        self.descriptors
    }
}

impl ImageVisitor for DescriptorScanner<'_> {
    fn visit_module(&mut self, module: &str) -> Result<WalkControl, ImageError> {
        match self.image.read_module_unit(module, MODULE_INFO_CLASS) {
            Ok(Some(bytes)) => match parse_module_info(&bytes) {
                Ok(descriptor) => {
                    if descriptor.name != module {
                        // Lookups filtered by on-disk module name will not see it.
                        debug!(
                            module,
                            declared = %descriptor.name,
                            "module declares a name different from its location"
                        );
                    }
                    self.descriptors.push(descriptor);
                }
                Err(error) => {
                    warn!(module, %error, "skipping module with unreadable descriptor");
                }
            },
            Ok(None) => {
                debug!(module, "module has no descriptor");
            }
            Err(error) => {
                warn!(module, %error, "failed to read module descriptor");
            }
        }
        Ok(WalkControl::SkipSubtree)
    }
}

/// Collects every descriptor of `image`. A walk failure ends the scan early
/// and is returned alongside whatever was found before it.
pub fn scan_descriptors(image: &ModuleImage) -> (Vec<ModuleDescriptor>, Option<ImageError>) {
    let mut scanner = DescriptorScanner::new(image);
    let outcome = walk(image, &mut scanner, NotifyMode::Modules);
    (scanner.into_descriptors(), outcome.err())
}

/// Populates `registry` for `image` unless it already holds a snapshot.
/// With `force`, a new generation is published regardless.
///
/// Never fails: an unreadable image leaves the registry untouched, and a scan
/// interrupted midway publishes the descriptors found so far.
pub fn load_modules(
    image: &ModuleImage,
    registry: &ModuleRegistry,
    force: bool,
) -> Option<Arc<ModuleSnapshot>> {
    let key = image.canonical_path();
    if !force {
        if let Some(snapshot) = registry.snapshot(key) {
            return Some(snapshot);
        }
    }

    let (descriptors, error) = scan_descriptors(image);
    if let Some(error) = error {
        warn!(image = %key.display(), %error, "module scan ended early");
    }
    if descriptors.is_empty() {
        debug!(image = %key.display(), "no module descriptors found");
        return registry.snapshot(key);
    }

    let snapshot = registry.publish(key, descriptors);
    debug!(
        image = %key.display(),
        generation = snapshot.generation(),
        modules = snapshot.len(),
        "registered module descriptors"
    );
    Some(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::ImageFixture;

    #[test]
    fn corrupt_descriptor_does_not_stop_the_scan() {
        let built = ImageFixture::exploded()
            .module("java.base")
            .raw("java.broken", "module-info.class", b"\xCA\xFE\xBA\xBE\x00")
            .module("java.sql")
            .build();

        let (descriptors, error) = scan_descriptors(&built.image());
        assert!(error.is_none());
        let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["java.base", "java.sql"]);
    }

    #[test]
    fn unreadable_image_leaves_registry_empty() {
        let registry = ModuleRegistry::new();
        let image = ModuleImage::new("/no/such/image/root");
        assert!(load_modules(&image, &registry, false).is_none());
        assert_eq!(registry.image_count(), 0);
    }

    #[test]
    fn second_load_reuses_snapshot() {
        let built = ImageFixture::jmods().module("java.base").build();
        let registry = ModuleRegistry::new();
        let image = built.image();

        let first = load_modules(&image, &registry, false).expect("first scan");
        let second = load_modules(&image, &registry, false).expect("cached");
        assert!(Arc::ptr_eq(&first, &second));

        let forced = load_modules(&image, &registry, true).expect("rescan");
        assert!(forced.generation() > first.generation());
    }
}
