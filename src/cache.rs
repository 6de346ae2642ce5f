use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories::ProjectDirs;

/// Identifies one downloadable artifact. Equal descriptors always resolve
/// to the same cache path, distinct descriptors never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheDescriptor {
    pub name: String,
    pub version: String,
    pub classifier: Option<String>,
    pub extension: String,
}

impl CacheDescriptor {
    pub fn new(name: &str, version: &str, extension: &str) -> CacheDescriptor {
        CacheDescriptor {
            name: name.to_string(),
            version: version.to_string(),
            classifier: None,
            extension: extension.to_string(),
        }
    }

    pub fn with_classifier(
        name: &str,
        version: &str,
        classifier: &str,
        extension: &str,
    ) -> CacheDescriptor {
        CacheDescriptor {
            name: name.to_string(),
            version: version.to_string(),
            classifier: Some(classifier.to_string()),
            extension: extension.to_string(),
        }
    }

    /// `<name>-<version>[-<classifier>].<extension>`
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.name, self.version, classifier, self.extension
            ),
            None => format!("{}-{}.{}", self.name, self.version, self.extension),
        }
    }
}

/// Maps artifact descriptors to local file paths. A Maven-repository
/// backed variant would implement this same trait.
pub trait CacheResolver: Send + Sync {
    fn resolve(&self, descriptor: &CacheDescriptor) -> PathBuf;
}

/// Flat directory of `<name>-<version>[-<classifier>].<extension>` files.
pub struct DirectoryCacheResolver {
    cache_directory: PathBuf,
}

impl DirectoryCacheResolver {
    pub fn new<P: AsRef<Path>>(cache_directory: P) -> DirectoryCacheResolver {
        DirectoryCacheResolver {
            cache_directory: cache_directory.as_ref().to_path_buf(),
        }
    }
}

impl CacheResolver for DirectoryCacheResolver {
    fn resolve(&self, descriptor: &CacheDescriptor) -> PathBuf {
        if !self.cache_directory.exists() {
            let _ = std::fs::create_dir_all(&self.cache_directory);
        }
        self.cache_directory.join(descriptor.file_name())
    }
}

/// Per-user cache directory used when the caller doesn't bring their own.
pub fn default_cache_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("org", "nodekit", "nodekit")
        .ok_or_else(|| anyhow!("could not determine the user cache directory"))?;
    Ok(dirs.cache_dir().to_path_buf())
}
