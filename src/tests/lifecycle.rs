use super::fixtures::{entry_in, isolated_entry, ImageFixture};
use crate::access::{AccessRule, AccessRuleKind};
use crate::classpath::{ClasspathEntry, ClasspathJrt};
use crate::config::JrtConfig;
use crate::image::ModuleFilter;
use crate::modules::ModuleRegistry;
use std::sync::Arc;

fn find_object(entry: &ClasspathJrt) -> bool {
    entry
        .find_type(
            "Object",
            "java/lang",
            "java/lang/Object.class",
            false,
            ModuleFilter::Unnamed,
        )
        .is_some()
}

#[test]
fn non_owning_reset_keeps_shared_image_open() {
    let built = ImageFixture::jmods()
        .module("java.base")
        .class("java.base", "java/lang/Object")
        .build();
    let image = built.image();
    let registry = Arc::new(ModuleRegistry::new());
    let owner = entry_in(Arc::clone(&image), true, Arc::clone(&registry));
    let mut borrower = entry_in(Arc::clone(&image), false, registry);

    assert!(find_object(&borrower));
    assert!(image.is_open());

    borrower.reset();
    assert!(image.is_open());
    assert!(find_object(&owner));
}

#[test]
fn owning_reset_closes_and_lookups_reopen() {
    let built = ImageFixture::jmods()
        .module("java.base")
        .class("java.base", "java/lang/Object")
        .build();
    let image = built.image();
    let mut entry = entry_in(Arc::clone(&image), true, Arc::new(ModuleRegistry::new()));
    entry.initialize();
    assert!(find_object(&entry));

    entry.reset();
    assert!(!image.is_open());
    entry.reset();
    assert!(!image.is_open());

    // Descriptors outlive the handle.
    assert!(entry.serves_module("java.base"));
    assert!(find_object(&entry));
    assert!(image.is_open());
}

#[test]
fn paths_survive_reset() {
    let built = ImageFixture::exploded().module("java.base").build();
    let mut entry = isolated_entry(built.image());

    let normalized = entry.normalized_path().to_string();
    let canonical = entry.canonical_path().to_path_buf();
    entry.reset();

    assert_eq!(entry.normalized_path(), normalized);
    assert_eq!(entry.canonical_path(), canonical);
    assert!(!normalized.contains('\\'));
}

#[test]
fn from_config_carries_settings() {
    let built = ImageFixture::exploded()
        .module("java.base")
        .class("java.base", "sun/misc/Unsafe")
        .build();
    let mut config = JrtConfig::for_image(built.root());
    config.close_at_end = false;
    config.destination_path = Some(built.scratch().join("classes"));
    config.annotation_paths = vec![built.scratch().join("eea")];
    config.access_rules = vec![AccessRule::new("sun/**", AccessRuleKind::Discouraged)];

    let entry = ClasspathJrt::from_config(&config)
        .expect("entry")
        .with_registry(Arc::new(ModuleRegistry::new()));

    assert!(!entry.closes_at_end());
    assert_eq!(entry.image().root(), built.root());
    assert_eq!(
        entry.destination_path(),
        Some(built.scratch().join("classes").as_path())
    );
    assert_eq!(entry.annotation_paths().len(), 1);

    let answer = entry
        .find_type(
            "Unsafe",
            "sun/misc",
            "sun/misc/Unsafe.class",
            false,
            ModuleFilter::Unnamed,
        )
        .expect("type found");
    let restriction = answer.access_restriction().expect("restriction");
    assert!(!restriction.is_forbidden());
    assert_eq!(
        restriction.classpath_entry_name,
        built.root().display().to_string()
    );
}
