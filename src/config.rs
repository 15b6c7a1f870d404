use crate::access::AccessRule;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read classpath configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid classpath configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no module image configured and no Java home could be detected")]
    JavaHomeNotFound,
}

/// Configuration of a module-image classpath entry.
///
/// ```toml
/// image = "/usr/lib/jvm/java-21"
/// annotation-paths = ["annotations/jdk.zip"]
/// destination-path = "out"
///
/// [[access-rules]]
/// pattern = "sun/**"
/// kind = "non-accessible"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct JrtConfig {
    /// Image root. When absent the Java home is detected.
    pub image: Option<PathBuf>,
    pub annotation_paths: Vec<PathBuf>,
    pub access_rules: Vec<AccessRule>,
    pub destination_path: Option<PathBuf>,
    /// Whether the entry built from this configuration owns the image handles.
    pub close_at_end: bool,
}

impl Default for JrtConfig {
    fn default() -> Self {
        Self {
            image: None,
            annotation_paths: Vec::new(),
            access_rules: Vec::new(),
            destination_path: None,
            close_at_end: true,
        }
    }
}

impl JrtConfig {
    pub fn for_image(image: impl Into<PathBuf>) -> Self {
        Self {
            image: Some(image.into()),
            ..Self::default()
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn resolve_image(&self) -> Result<PathBuf, ConfigError> {
        match &self.image {
            Some(image) => Ok(image.clone()),
            None => detect_java_home().ok_or(ConfigError::JavaHomeNotFound),
        }
    }
}

/// Locates the Java home from `JAVA_HOME`, then from `java` on the `PATH`.
pub fn detect_java_home() -> Option<PathBuf> {
    if let Ok(path) = env::var("JAVA_HOME") {
        let candidate = PathBuf::from(path);
        if candidate.is_dir() {
            return Some(candidate);
        }
    }

    let java = which::which("java").ok()?;
    // Distribution launchers are usually symlinks into the real home.
    let java = java.canonicalize().unwrap_or(java);
    let home = java.parent()?.parent()?;
    Some(home.to_path_buf())
}
