//! Filename sanitation and containment of resolved paths inside the storage root.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::error::{AppError, Result};

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Reduce an untrusted name to a single safe path component.
///
/// May return an empty string; callers that need a name regardless use
/// [`sanitize_or_fallback`].
pub fn sanitize_filename(raw: &str) -> String {
    let spaced: String = raw
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let filtered: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let trimmed = filtered.trim_matches(|c| c == '.' || c == '_').to_string();

    let stem = trimmed.split('.').next().unwrap_or("").to_uppercase();
    if RESERVED_NAMES.contains(&stem.as_str()) {
        return format!("_{}", trimmed);
    }

    trimmed
}

/// Name used when neither headers nor URL yield anything usable.
pub fn fallback_filename() -> String {
    format!("download_{}", chrono::Utc::now().timestamp())
}

pub fn sanitize_or_fallback(raw: &str) -> String {
    let name = sanitize_filename(raw);
    if name.is_empty() {
        fallback_filename()
    } else {
        name
    }
}

#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute form of the storage root, with symlinks resolved when it exists.
    pub fn canonical_root(&self) -> Result<PathBuf> {
        match std::fs::canonicalize(&self.root) {
            Ok(path) => Ok(path),
            Err(_) if self.root.is_absolute() => Ok(self.root.clone()),
            Err(_) => Ok(std::env::current_dir()?.join(&self.root)),
        }
    }

    /// Map an untrusted name to a path strictly inside the storage root.
    ///
    /// Parent references and absolute prefixes are rejected outright, and an
    /// existing target is re-checked after symlink resolution.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf> {
        if raw.is_empty() || raw.contains('\0') {
            return Err(AppError::InvalidPath);
        }

        let mut relative = PathBuf::new();
        for component in Path::new(raw).components() {
            match component {
                Component::Normal(part) => relative.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(AppError::InvalidPath);
                }
            }
        }

        if relative.as_os_str().is_empty() {
            return Err(AppError::InvalidPath);
        }

        let root = self.canonical_root()?;
        let candidate = root.join(&relative);

        let resolved = if candidate.symlink_metadata().is_ok() {
            std::fs::canonicalize(&candidate)?
        } else {
            candidate
        };

        if resolved == root || !resolved.starts_with(&root) {
            return Err(AppError::InvalidPath);
        }

        Ok(resolved)
    }
}

/// Extension allow-list applied at the upload and remote-fetch boundaries.
#[derive(Debug, Clone)]
pub struct ExtensionPolicy {
    allowed: HashSet<String>,
    enforce: bool,
}

impl ExtensionPolicy {
    pub fn new<I, S>(allowed: I, enforce: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(|ext| ext.as_ref().to_lowercase())
                .collect(),
            enforce,
        }
    }

    pub fn permissive() -> Self {
        Self {
            allowed: HashSet::new(),
            enforce: false,
        }
    }

    pub fn is_allowed(&self, filename: &str) -> bool {
        if !self.enforce {
            return true;
        }

        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.allowed.contains(&format!(".{}", ext.to_lowercase())))
            .unwrap_or(false)
    }

    pub fn check(&self, filename: &str) -> Result<()> {
        if self.is_allowed(filename) {
            Ok(())
        } else {
            Err(AppError::DisallowedType(filename.to_string()))
        }
    }
}
