//! Persistent mapping from short random tokens to stored filenames.
//!
//! The whole map lives in one JSON object (`{"slug": "filename"}`) that is
//! loaded fresh and rewritten wholesale on every mutation. Read-modify-write
//! cycles are serialised by an in-process mutex, and writes go through a
//! temporary file that is renamed over the target. Several processes sharing
//! one slug file are not coordinated.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::{distr::Alphanumeric, Rng};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{AppError, Result};

pub const DEFAULT_SLUG_LENGTH: usize = 5;

type SlugMap = BTreeMap<String, String>;

#[derive(Clone)]
pub struct SlugRegistry {
    path: PathBuf,
    length: usize,
    lock: Arc<Mutex<()>>,
}

impl SlugRegistry {
    pub fn new(path: impl Into<PathBuf>, length: usize) -> Self {
        Self {
            path: path.into(),
            length: length.max(1),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Return the slug already mapped to `filename`, or mint and persist a new one.
    pub fn get_or_create(&self, filename: &str) -> Result<String> {
        let _guard = self.lock.lock();
        let mut slugs = self.load()?;

        if let Some(slug) = slugs
            .iter()
            .find(|(_, mapped)| mapped.as_str() == filename)
            .map(|(slug, _)| slug.clone())
        {
            return Ok(slug);
        }

        let mut slug = generate_slug(self.length);
        while slugs.contains_key(&slug) {
            slug = generate_slug(self.length);
        }

        slugs.insert(slug.clone(), filename.to_string());
        self.save(&slugs)?;

        debug!("Assigned slug {} to {}", slug, filename);
        Ok(slug)
    }

    pub fn resolve(&self, slug: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.get(slug).cloned())
    }

    /// Remove every slug pointing at `filename`. Returns whether anything was removed.
    pub fn delete_by_filename(&self, filename: &str) -> Result<bool> {
        let _guard = self.lock.lock();
        let mut slugs = self.load()?;

        let before = slugs.len();
        slugs.retain(|_, mapped| mapped.as_str() != filename);

        if slugs.len() == before {
            return Ok(false);
        }

        self.save(&slugs)?;
        Ok(true)
    }

    pub fn len(&self) -> Result<usize> {
        let _guard = self.lock.lock();
        Ok(self.load()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn load(&self) -> Result<SlugMap> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SlugMap::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&raw) {
            Ok(slugs) => Ok(slugs),
            Err(e) => {
                warn!(
                    "Slug file {} is unreadable, starting from an empty map: {}",
                    self.path.display(),
                    e
                );
                Ok(SlugMap::new())
            }
        }
    }

    fn save(&self, slugs: &SlugMap) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(slugs)
            .map_err(|e| AppError::Internal(format!("failed to encode slug map: {}", e)))?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(json.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| AppError::Io(e.error))?;

        Ok(())
    }
}

pub fn generate_slug(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
