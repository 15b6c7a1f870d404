//! External annotation overlays.
//!
//! An overlay path is either a directory or a zip archive holding one `.eea`
//! file per type, laid out by internal name (`java/lang/String.eea`). The
//! content is carried as opaque bytes and never interpreted here.

use crate::classfile::BinaryType;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::result::ZipError;
use zip::ZipArchive;

pub const EXTERNAL_ANNOTATION_SUFFIX: &str = ".eea";

/// Annotation data found for one type in one overlay source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalAnnotationProvider {
    source: PathBuf,
    type_name: String,
    content: Arc<[u8]>,
}

impl ExternalAnnotationProvider {
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Internal name of the annotated type.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

/// An open overlay archive, reused across lookups targeting the same path.
pub struct OverlayHandle {
    path: PathBuf,
    archive: ZipArchive<BufReader<File>>,
}

impl OverlayHandle {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(BufReader::new(file)).map_err(zip_to_io)?;
        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entry(&mut self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let mut entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(error) => return Err(zip_to_io(error)),
        };
        let mut buffer = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buffer)?;
        Ok(Some(buffer))
    }
}

impl fmt::Debug for OverlayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayHandle")
            .field("path", &self.path)
            .field("entries", &self.archive.len())
            .finish()
    }
}

/// Looks up annotation data for `qualified_type_name` under `overlay_path`
/// and attaches it to `binary_type` when present.
///
/// Archive overlays go through `handle`: an open archive for the same path is
/// reused, otherwise the slot is replaced by a freshly opened one. Directory
/// overlays leave the slot untouched. Returns whether a provider was attached.
pub fn attach_external_annotations(
    binary_type: &mut BinaryType,
    overlay_path: &Path,
    qualified_type_name: &str,
    handle: &mut Option<OverlayHandle>,
) -> io::Result<bool> {
    let entry_name = format!("{qualified_type_name}{EXTERNAL_ANNOTATION_SUFFIX}");

    let content = if overlay_path.is_dir() {
        let candidate = overlay_path.join(&entry_name);
        if !candidate.is_file() {
            return Ok(false);
        }
        fs::read(candidate)?
    } else {
        let reusable = handle
            .as_ref()
            .map(|open| open.path() == overlay_path)
            .unwrap_or(false);
        if !reusable {
            *handle = Some(OverlayHandle::open(overlay_path)?);
        }
        let archive = match handle.as_mut() {
            Some(archive) => archive,
            None => return Ok(false),
        };
        match archive.read_entry(&entry_name)? {
            Some(content) => content,
            None => return Ok(false),
        }
    };

    binary_type.set_annotation_provider(ExternalAnnotationProvider {
        source: overlay_path.to_path_buf(),
        type_name: qualified_type_name.to_string(),
        content: content.into(),
    });
    Ok(true)
}

fn zip_to_io(error: ZipError) -> io::Error {
    match error {
        ZipError::Io(source) => source,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::parse_class;
    use crate::tests::fixtures::{class_bytes, write_zip};

    fn string_type() -> BinaryType {
        parse_class(&class_bytes("java/lang/String")).expect("parse fixture")
    }

    #[test]
    fn directory_overlay_attaches_provider() {
        let dir = tempfile::tempdir().expect("temp dir");
        let eea = dir.path().join("java/lang/String.eea");
        fs::create_dir_all(eea.parent().unwrap()).unwrap();
        fs::write(&eea, b"class java/lang/String\n").unwrap();

        let mut ty = string_type();
        let mut handle = None;
        let attached =
            attach_external_annotations(&mut ty, dir.path(), "java/lang/String", &mut handle)
                .expect("attach");

        assert!(attached);
        assert!(handle.is_none());
        let provider = ty.annotation_provider().expect("provider");
        assert_eq!(provider.source(), dir.path());
        assert_eq!(provider.content(), b"class java/lang/String\n");
    }

    #[test]
    fn archive_overlay_reuses_open_handle() {
        let dir = tempfile::tempdir().expect("temp dir");
        let archive = dir.path().join("annotations.zip");
        write_zip(
            &archive,
            &[
                ("java/lang/String.eea", b"string".as_slice()),
                ("java/lang/Object.eea", b"object".as_slice()),
            ],
        );

        let mut handle = None;
        let mut first = string_type();
        assert!(attach_external_annotations(&mut first, &archive, "java/lang/String", &mut handle)
            .expect("first attach"));
        assert_eq!(handle.as_ref().map(|h| h.path()), Some(archive.as_path()));

        let mut missing = string_type();
        let attached =
            attach_external_annotations(&mut missing, &archive, "java/lang/Missing", &mut handle)
                .expect("missing entry is not an error");
        assert!(!attached);
        assert!(!missing.has_annotation_provider());
        assert!(handle.is_some());
    }

    #[test]
    fn unreadable_archive_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let bogus = dir.path().join("bogus.zip");
        fs::write(&bogus, b"not a zip").unwrap();

        let mut ty = string_type();
        let mut handle = None;
        let outcome = attach_external_annotations(&mut ty, &bogus, "java/lang/String", &mut handle);
        assert!(outcome.is_err());
        assert!(!ty.has_annotation_provider());
    }
}
