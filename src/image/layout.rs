use super::{lock, ImageError};
use crate::classfile::MODULE_INFO_CLASS;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use zip::result::ZipError;
use tracing::warn;
use zip::ZipArchive;

/// Prefix of class content inside a `.jmod` archive.
const JMOD_CLASSES_PREFIX: &str = "classes/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLayout {
    /// One directory per module.
    Exploded,
    /// One `.jmod` archive per module.
    Jmods,
}

/// Opened and indexed view of a module image.
#[derive(Debug)]
pub(crate) struct ImageContents {
    layout: ImageLayout,
    modules: BTreeMap<String, ModuleContents>,
}

impl ImageContents {
    pub(crate) fn open(root: &Path) -> Result<Self, ImageError> {
        if !root.is_dir() {
            return Err(ImageError::NotFound {
                path: root.to_path_buf(),
            });
        }

        let jmods = root.join("jmods");
        let exploded = root.join("modules");
        if jmods.is_dir() {
            return Self::open_jmods(&jmods);
        }
        if exploded.is_dir() {
            return Self::open_exploded(&exploded);
        }

        let children = list_dir(root)?;
        if children.iter().any(|path| is_jmod(path)) {
            Self::open_jmods(root)
        } else if children
            .iter()
            .any(|path| path.is_dir() && path.join(MODULE_INFO_CLASS).is_file())
        {
            Self::open_exploded(root)
        } else {
            // e.g. a JDK home that only ships the packed `lib/modules` image
            Err(ImageError::UnsupportedLayout {
                path: root.to_path_buf(),
            })
        }
    }

    fn open_exploded(base: &Path) -> Result<Self, ImageError> {
        let mut modules = BTreeMap::new();
        for path in list_dir(base)? {
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(OsStr::to_str) else {
                continue;
            };
            let tree = match ModuleTree::scan_directory(&path) {
                Ok(tree) => tree,
                Err(error) => {
                    warn!(module = %path.display(), %error, "skipping unreadable module directory");
                    continue;
                }
            };
            modules.insert(
                name.to_string(),
                ModuleContents {
                    name: name.to_string(),
                    source: ModuleSource::Exploded(path.clone()),
                    tree,
                },
            );
        }
        Ok(Self {
            layout: ImageLayout::Exploded,
            modules,
        })
    }

    fn open_jmods(base: &Path) -> Result<Self, ImageError> {
        let mut modules = BTreeMap::new();
        for path in list_dir(base)? {
            if !path.is_file() || !is_jmod(&path) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(OsStr::to_str) else {
                continue;
            };
            match open_jmod(&path, name) {
                Ok(module) => {
                    modules.insert(name.to_string(), module);
                }
                Err(error) => {
                    warn!(module = %path.display(), %error, "skipping unreadable jmod archive");
                }
            }
        }
        Ok(Self {
            layout: ImageLayout::Jmods,
            modules,
        })
    }

    pub(crate) fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub(crate) fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub(crate) fn modules(&self) -> impl Iterator<Item = &ModuleContents> {
        self.modules.values()
    }

    pub(crate) fn module(&self, name: &str) -> Option<&ModuleContents> {
        self.modules.get(name)
    }
}

#[derive(Debug)]
enum ModuleSource {
    Exploded(PathBuf),
    Archive {
        path: PathBuf,
        archive: Mutex<ZipArchive<BufReader<File>>>,
    },
}

#[derive(Debug)]
pub(crate) struct ModuleContents {
    name: String,
    source: ModuleSource,
    tree: ModuleTree,
}

impl ModuleContents {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn tree(&self) -> &ModuleTree {
        &self.tree
    }

    /// A package is any non-root directory of the module tree.
    pub(crate) fn has_package(&self, package: &str) -> bool {
        !package.is_empty() && self.tree.dirs.contains_key(package)
    }

    pub(crate) fn has_directory(&self, dir: &str) -> bool {
        self.tree.dirs.contains_key(dir)
    }

    /// Reads a unit by its path relative to the module root.
    pub(crate) fn read(&self, relative: &str) -> Result<Option<Vec<u8>>, ImageError> {
        match &self.source {
            ModuleSource::Exploded(base) => {
                let path = base.join(relative);
                if !path.is_file() {
                    return Ok(None);
                }
                fs::read(&path)
                    .map(Some)
                    .map_err(|source| ImageError::Io { path, source })
            }
            ModuleSource::Archive { path, archive } => {
                let mut archive = lock(archive);
                let entry_name = format!("{JMOD_CLASSES_PREFIX}{relative}");
                let mut entry = match archive.by_name(&entry_name) {
                    Ok(entry) => entry,
                    Err(ZipError::FileNotFound) => return Ok(None),
                    Err(source) => {
                        return Err(ImageError::Zip {
                            path: path.clone(),
                            source,
                        })
                    }
                };
                let mut buffer = Vec::with_capacity(entry.size() as usize);
                entry
                    .read_to_end(&mut buffer)
                    .map_err(|source| ImageError::Io {
                        path: path.clone(),
                        source,
                    })?;
                Ok(Some(buffer))
            }
        }
    }
}

/// Directory listing of one module, keyed by `/` separated path relative to
/// the module root. The root itself is the empty path.
#[derive(Debug, Default)]
pub(crate) struct ModuleTree {
    dirs: BTreeMap<String, DirListing>,
}

#[derive(Debug, Default)]
pub(crate) struct DirListing {
    /// Full relative paths of child directories.
    pub(crate) subdirs: BTreeSet<String>,
    /// File names directly inside the directory.
    pub(crate) files: BTreeSet<String>,
}

impl ModuleTree {
    fn scan_directory(root: &Path) -> Result<Self, ImageError> {
        let mut tree = ModuleTree::default();
        tree.ensure_dir("");

        let mut pending = vec![(root.to_path_buf(), String::new())];
        while let Some((dir, relative)) = pending.pop() {
            for path in list_dir(&dir)? {
                let Some(name) = path.file_name().and_then(OsStr::to_str) else {
                    continue;
                };
                let child = join(&relative, name);
                let file_type = fs::symlink_metadata(&path)
                    .map_err(|source| ImageError::Io {
                        path: path.clone(),
                        source,
                    })?
                    .file_type();
                // Symlinked directories are never descended.
                if file_type.is_dir() {
                    tree.ensure_dir(&child);
                    pending.push((path, child));
                } else if file_type.is_file() || path.is_file() {
                    tree.add_file(&child);
                }
            }
        }
        Ok(tree)
    }

    fn from_entries<'a>(entries: impl Iterator<Item = &'a str>) -> Self {
        let mut tree = ModuleTree::default();
        tree.ensure_dir("");
        for entry in entries {
            match entry.strip_suffix('/') {
                Some(dir) => tree.ensure_dir(dir),
                None => tree.add_file(entry),
            }
        }
        tree
    }

    fn ensure_dir(&mut self, dir: &str) {
        if self.dirs.contains_key(dir) {
            return;
        }
        self.dirs.insert(dir.to_string(), DirListing::default());
        if dir.is_empty() {
            return;
        }
        let parent = parent_of(dir);
        self.ensure_dir(parent);
        if let Some(listing) = self.dirs.get_mut(parent) {
            listing.subdirs.insert(dir.to_string());
        }
    }

    fn add_file(&mut self, path: &str) {
        let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
        self.ensure_dir(parent);
        if let Some(listing) = self.dirs.get_mut(parent) {
            listing.files.insert(name.to_string());
        }
    }

    pub(crate) fn listing(&self, dir: &str) -> Option<&DirListing> {
        self.dirs.get(dir)
    }
}

pub(crate) fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

pub(crate) fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

fn open_jmod(path: &Path, name: &str) -> Result<ModuleContents, ImageError> {
    let file = File::open(path).map_err(|source| ImageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    // The zip reader locates the central directory from the end, so the
    // 4-byte jmod header in front of the archive is tolerated.
    let archive = ZipArchive::new(BufReader::new(file)).map_err(|source| ImageError::Zip {
        path: path.to_path_buf(),
        source,
    })?;
    let tree = ModuleTree::from_entries(
        archive
            .file_names()
            .filter_map(|entry| entry.strip_prefix(JMOD_CLASSES_PREFIX)),
    );
    Ok(ModuleContents {
        name: name.to_string(),
        source: ModuleSource::Archive {
            path: path.to_path_buf(),
            archive: Mutex::new(archive),
        },
        tree,
    })
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, ImageError> {
    let entries = fs::read_dir(dir).map_err(|source| ImageError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ImageError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn is_jmod(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| ext.eq_ignore_ascii_case("jmod"))
        .unwrap_or(false)
}
