//! Module image access.
//!
//! A `ModuleImage` names one read-only root holding a platform's modules,
//! either as exploded directories or as `.jmod` archives. Its content handle
//! is opened on first use, memoized, and can be shared by several classpath
//! entries through an `Arc`.

mod layout;
mod walk;

pub(crate) use layout::ImageContents;
pub use layout::ImageLayout;
pub use walk::{walk, ImageVisitor, NotifyMode, WalkControl};

use crate::annotations::OverlayHandle;
use once_cell::sync::OnceCell;
use std::borrow::Cow;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};
use zip::result::ZipError;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("module image not found at {path}")]
    NotFound { path: PathBuf },
    #[error("no jmods or exploded modules under {path}")]
    UnsupportedLayout { path: PathBuf },
    #[error("IO error while reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ZIP error while reading {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
}

/// Restricts a lookup to a set of modules. `Unnamed` applies no restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleFilter<'a> {
    #[default]
    Unnamed,
    Named(&'a str),
    AnyOf(&'a [String]),
}

impl ModuleFilter<'_> {
    pub fn admits(&self, module: &str) -> bool {
        match self {
            ModuleFilter::Unnamed => true,
            ModuleFilter::Named(name) => *name == module,
            ModuleFilter::AnyOf(names) => names.iter().any(|name| name == module),
        }
    }
}

/// Bytes of a binary unit together with the module that supplied them.
#[derive(Debug, Clone)]
pub struct BinaryUnit {
    pub module: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct ModuleImage {
    root: PathBuf,
    canonical_path: OnceCell<PathBuf>,
    normalized_path: OnceCell<String>,
    contents: Mutex<Option<Arc<ImageContents>>>,
    overlay: Mutex<Option<OverlayHandle>>,
    layout_reported: AtomicBool,
}

impl ModuleImage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            canonical_path: OnceCell::new(),
            normalized_path: OnceCell::new(),
            contents: Mutex::new(None),
            overlay: Mutex::new(None),
            layout_reported: AtomicBool::new(false),
        }
    }

    pub fn shared(root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical path of the root, falling back to the absolute path when the
    /// root cannot be canonicalized.
    pub fn canonical_path(&self) -> &Path {
        self.canonical_path.get_or_init(|| {
            self.root.canonicalize().unwrap_or_else(|_| {
                std::path::absolute(&self.root).unwrap_or_else(|_| self.root.clone())
            })
        })
    }

    /// `/` separated canonical path with the final segment's extension removed.
    pub fn normalized_path(&self) -> &str {
        self.normalized_path.get_or_init(|| {
            let canonical = self.canonical_path();
            let stripped = match canonical.extension() {
                Some(_) => canonical.with_extension(""),
                None => canonical.to_path_buf(),
            };
            stripped.to_string_lossy().replace('\\', "/")
        })
    }

    pub fn is_open(&self) -> bool {
        lock(&self.contents).is_some()
    }

    /// Returns the content handle, opening and indexing the image on first use.
    pub(crate) fn contents(&self) -> Result<Arc<ImageContents>, ImageError> {
        let mut slot = lock(&self.contents);
        if let Some(contents) = slot.as_ref() {
            return Ok(Arc::clone(contents));
        }
        let contents = match ImageContents::open(&self.root) {
            Ok(contents) => Arc::new(contents),
            Err(error @ ImageError::UnsupportedLayout { .. }) => {
                if !self.layout_reported.swap(true, Ordering::Relaxed) {
                    warn!(image = %self.root.display(), %error, "unsupported module image layout");
                }
                return Err(error);
            }
            Err(error) => return Err(error),
        };
        debug!(
            image = %self.root.display(),
            layout = ?contents.layout(),
            modules = contents.module_count(),
            "opened module image"
        );
        *slot = Some(Arc::clone(&contents));
        Ok(contents)
    }

    /// Releases the content and overlay handles. A later lookup reopens them.
    pub fn close(&self) {
        if lock(&self.contents).take().is_some() {
            debug!(image = %self.root.display(), "closed module image");
        }
        lock(&self.overlay).take();
    }

    pub(crate) fn overlay_handle(&self) -> MutexGuard<'_, Option<OverlayHandle>> {
        lock(&self.overlay)
    }

    pub fn layout(&self) -> Result<ImageLayout, ImageError> {
        Ok(self.contents()?.layout())
    }

    /// Module names as they appear on disk, in walk order.
    pub fn module_names(&self) -> Result<Vec<String>, ImageError> {
        Ok(self
            .contents()?
            .modules()
            .map(|module| module.name().to_string())
            .collect())
    }

    /// Whether any admitted module holds the directory for `package`.
    pub fn is_package(&self, package: &str, filter: ModuleFilter<'_>) -> Result<bool, ImageError> {
        let package = package_path(package);
        if package.is_empty() {
            return Ok(false);
        }
        Ok(self
            .contents()?
            .modules()
            .any(|module| filter.admits(module.name()) && module.has_package(&package)))
    }

    /// Reads `java/lang/String.class` style units from the first admitted
    /// module whose tree holds the unit's package.
    pub fn read_binary_unit(
        &self,
        binary_name: &str,
        filter: ModuleFilter<'_>,
    ) -> Result<Option<BinaryUnit>, ImageError> {
        let contents = self.contents()?;
        let package = binary_name
            .rsplit_once('/')
            .map(|(package, _)| package)
            .unwrap_or("");

        for module in contents.modules() {
            if !filter.admits(module.name()) || !module.has_directory(package) {
                continue;
            }
            if let Some(bytes) = module.read(binary_name)? {
                return Ok(Some(BinaryUnit {
                    module: module.name().to_string(),
                    bytes,
                }));
            }
        }
        Ok(None)
    }

    /// Reads a unit relative to one module's root, e.g. `module-info.class`.
    pub fn read_module_unit(
        &self,
        module: &str,
        unit: &str,
    ) -> Result<Option<Vec<u8>>, ImageError> {
        match self.contents()?.module(module) {
            Some(contents) => contents.read(unit),
            None => Ok(None),
        }
    }
}

/// Internal form of a package name: dots become `/`, surrounding `/` trimmed.
pub fn package_path(name: &str) -> Cow<'_, str> {
    let trimmed = name.trim_matches('/');
    if trimmed.contains('.') {
        Cow::Owned(trimmed.replace('.', "/"))
    } else {
        Cow::Borrowed(trimmed)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::ImageFixture;

    #[test]
    fn package_path_accepts_dotted_names() {
        assert_eq!(package_path("java.lang"), "java/lang");
        assert_eq!(package_path("java/lang/"), "java/lang");
        assert_eq!(package_path(""), "");
    }

    #[test]
    fn normalized_path_strips_extension_and_is_memoized() {
        let dir = tempfile::tempdir().expect("temp dir");
        let archive = dir.path().join("platform.jimage");
        std::fs::write(&archive, b"").unwrap();

        let image = ModuleImage::new(&archive);
        let normalized = image.normalized_path().to_string();
        assert!(normalized.ends_with("/platform"));
        assert!(!normalized.contains('\\'));

        std::fs::remove_file(&archive).unwrap();
        assert_eq!(image.normalized_path(), normalized);
    }

    #[test]
    fn missing_root_reports_not_found() {
        let image = ModuleImage::new("/definitely/not/a/jdk/image");
        let error = image.module_names().expect_err("missing image");
        assert!(matches!(error, ImageError::NotFound { .. }));
        assert!(!image.is_open());
    }

    #[test]
    fn binary_units_honor_module_filter() {
        let fixture = ImageFixture::exploded()
            .module("java.base")
            .class("java.base", "java/lang/Object")
            .module("java.sql")
            .class("java.sql", "java/sql/Driver")
            .build();
        let image = fixture.image();

        let unit = image
            .read_binary_unit("java/sql/Driver.class", ModuleFilter::Unnamed)
            .expect("read")
            .expect("unit");
        assert_eq!(unit.module, "java.sql");

        let filtered = image
            .read_binary_unit("java/sql/Driver.class", ModuleFilter::Named("java.base"))
            .expect("read");
        assert!(filtered.is_none());

        let allowed = ["java.xml".to_string(), "java.sql".to_string()];
        assert!(image
            .is_package("java.sql", ModuleFilter::AnyOf(&allowed))
            .expect("is_package"));
        assert!(!image.is_package("", ModuleFilter::Unnamed).expect("is_package"));
    }

    #[test]
    fn jdk_home_without_module_directories_is_unsupported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let home = dir.path().join("jdk");
        std::fs::create_dir_all(home.join("bin")).unwrap();
        std::fs::create_dir_all(home.join("lib")).unwrap();
        std::fs::write(home.join("bin/java"), b"launcher").unwrap();
        std::fs::write(home.join("lib/modules"), b"packed image").unwrap();

        let image = ModuleImage::new(&home);
        let error = image.module_names().expect_err("unsupported layout");
        assert!(matches!(error, ImageError::UnsupportedLayout { .. }));
        assert!(image.is_package("lib", ModuleFilter::Unnamed).is_err());
        assert!(!image.is_open());
    }

    #[test]
    fn root_with_descriptor_directories_is_exploded() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = dir.path().join("image");
        std::fs::create_dir_all(root.join("java.base/java/lang")).unwrap();
        std::fs::write(root.join("java.base/module-info.class"), b"").unwrap();
        std::fs::create_dir_all(root.join("notes")).unwrap();

        let image = ModuleImage::new(&root);
        assert_eq!(image.layout().unwrap(), ImageLayout::Exploded);
        assert!(image.is_package("java/lang", ModuleFilter::Unnamed).unwrap());
    }

    #[test]
    fn corrupt_jmod_does_not_hide_healthy_modules() {
        let fixture = ImageFixture::jmods()
            .module("java.base")
            .class("java.base", "java/lang/Object")
            .build();
        fixture.overwrite("jmods/broken.jmod", b"not a zip");
        let image = fixture.image();

        assert_eq!(image.module_names().unwrap(), vec!["java.base"]);
        assert!(image.is_package("java/lang", ModuleFilter::Unnamed).unwrap());
        assert!(image
            .read_binary_unit("java/lang/Object.class", ModuleFilter::Unnamed)
            .unwrap()
            .is_some());
    }

    #[test]
    fn jmod_header_is_tolerated() {
        let fixture = ImageFixture::jmods()
            .module("java.base")
            .class("java.base", "java/lang/Object")
            .build();
        let archive = std::fs::read(fixture.root().join("jmods/java.base.jmod")).unwrap();
        assert_eq!(&archive[..4], b"JM\x01\x00");

        let image = fixture.image();
        let unit = image
            .read_binary_unit("java/lang/Object.class", ModuleFilter::Named("java.base"))
            .unwrap()
            .expect("unit");
        assert_eq!(unit.module, "java.base");
    }

    #[test]
    fn close_drops_handle_and_reopens_lazily() {
        let fixture = ImageFixture::jmods()
            .module("java.base")
            .class("java.base", "java/lang/Object")
            .build();
        let image = fixture.image();

        assert!(image.is_package("java/lang", ModuleFilter::Unnamed).unwrap());
        assert!(image.is_open());
        image.close();
        assert!(!image.is_open());
        assert!(image.is_package("java/lang", ModuleFilter::Unnamed).unwrap());
        assert_eq!(image.layout().unwrap(), ImageLayout::Jmods);
    }
}
