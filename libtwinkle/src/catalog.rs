//! Catalog store: a versioned, lockable collection of product entries
//!
//! The catalog is a whole-file JSON array, read fully on open and
//! rewritten (temp-then-rename) on every mutation. Locked entries can
//! no longer be edited, only exported; an export writes the entry
//! metadata and its image into a per-entry subdirectory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::error::{CatalogError, PersistenceError, Result};
use crate::fsio;
use crate::types::CatalogEntry;

/// Fields that can never be changed through `edit`.
const IMMUTABLE_FIELDS: &[&str] = &["product_code", "image_path", "locked"];

/// Shared handle to the on-disk catalog.
///
/// All operations take the internal lock for their full duration, so
/// an `edit` can never interleave with a `lock` on the same entry.
#[derive(Clone)]
pub struct CatalogStore {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    path: PathBuf,
    entries: Vec<CatalogEntry>,
}

impl CatalogStore {
    /// Open the catalog at `path`. A missing or corrupt file loads as
    /// an empty catalog rather than failing startup.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries: Vec<CatalogEntry> = fsio::load_json_or_default(&path);
        debug!("Loaded {} catalog entries from {}", entries.len(), path.display());
        Self {
            inner: Arc::new(Mutex::new(Inner { path, entries })),
        }
    }

    /// Add a new entry. Fails when the product code is already taken.
    pub fn add(&self, entry: CatalogEntry) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.iter().any(|e| e.product_code == entry.product_code) {
            return Err(CatalogError::DuplicateKey(entry.product_code).into());
        }
        inner.entries.push(entry);
        inner.save()?;
        Ok(())
    }

    /// Look up an entry by product code.
    pub fn find(&self, product_code: &str) -> Result<CatalogEntry> {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .iter()
            .find(|e| e.product_code == product_code)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(product_code.to_string()).into())
    }

    /// Case-insensitive substring search, in catalog order.
    ///
    /// With `field` given, only that field (or attribute) is matched;
    /// otherwise every stringified value of the entry is considered.
    pub fn search(&self, query: &str, field: Option<&str>) -> Vec<CatalogEntry> {
        let query = query.to_lowercase();
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .iter()
            .filter(|entry| match field {
                Some(field) => field_value(entry, field)
                    .map(|v| v.to_lowercase().contains(&query))
                    .unwrap_or(false),
                None => any_value_matches(entry, &query),
            })
            .cloned()
            .collect()
    }

    /// Apply `changes` to an entry, all-or-nothing against the
    /// persisted file.
    ///
    /// Locked entries reject every edit; `product_code`, `image_path`
    /// and `locked` can never be changed. `ring_name` and attribute
    /// keys are fair game.
    pub fn edit(&self, product_code: &str, changes: &BTreeMap<String, String>) -> Result<CatalogEntry> {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner
            .entries
            .iter()
            .position(|e| e.product_code == product_code)
            .ok_or_else(|| CatalogError::NotFound(product_code.to_string()))?;

        if inner.entries[idx].locked {
            return Err(CatalogError::Locked(product_code.to_string()).into());
        }
        if let Some(field) = changes.keys().find(|k| IMMUTABLE_FIELDS.contains(&k.as_str())) {
            return Err(CatalogError::ImmutableField(field.clone()).into());
        }

        // Mutate a copy first; memory is only updated once the file
        // write has succeeded.
        let mut updated = inner.entries[idx].clone();
        for (key, value) in changes {
            if key == "ring_name" {
                updated.ring_name = value.clone();
            } else {
                updated.attributes.insert(key.clone(), value.clone());
            }
        }

        let previous = std::mem::replace(&mut inner.entries[idx], updated.clone());
        if let Err(e) = inner.save() {
            inner.entries[idx] = previous;
            return Err(e);
        }
        info!("Updated catalog entry {}", product_code);
        Ok(updated)
    }

    /// Lock an entry, preventing further edits. Locking an already
    /// locked entry is a no-op success.
    pub fn lock(&self, product_code: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner
            .entries
            .iter()
            .position(|e| e.product_code == product_code)
            .ok_or_else(|| CatalogError::NotFound(product_code.to_string()))?;

        if inner.entries[idx].locked {
            return Ok(());
        }
        inner.entries[idx].locked = true;
        if let Err(e) = inner.save() {
            inner.entries[idx].locked = false;
            return Err(e);
        }
        info!("Locked catalog entry {}", product_code);
        Ok(())
    }

    /// Export a locked entry: metadata JSON plus the referenced image,
    /// into `target_dir/<ring name with whitespace replaced>/`.
    ///
    /// An existing export whose metadata differs from the current
    /// entry is rejected with `ExportConflict`; re-exporting identical
    /// content succeeds.
    pub fn export(&self, product_code: &str, target_dir: &Path) -> Result<PathBuf> {
        let inner = self.inner.lock().unwrap();
        let entry = inner
            .entries
            .iter()
            .find(|e| e.product_code == product_code)
            .ok_or_else(|| CatalogError::NotFound(product_code.to_string()))?;

        if !entry.locked {
            return Err(CatalogError::NotLocked(product_code.to_string()).into());
        }

        let export_dir = target_dir.join(entry.export_name());
        let metadata_path = export_dir.join(format!("{}.json", entry.export_name()));
        let serialized =
            serde_json::to_string_pretty(entry).map_err(PersistenceError::Json)?;

        if metadata_path.exists() {
            let existing = fs::read_to_string(&metadata_path).map_err(PersistenceError::Io)?;
            let same = serde_json::from_str::<CatalogEntry>(&existing)
                .map(|previous| &previous == entry)
                .unwrap_or(false);
            if !same {
                return Err(
                    CatalogError::ExportConflict(metadata_path.display().to_string()).into(),
                );
            }
        }

        // Resolve the image before writing anything, so a missing
        // image does not leave a half-populated export directory.
        let image = PathBuf::from(&entry.image_path);
        let image_name = image
            .file_name()
            .filter(|_| image.is_file())
            .ok_or_else(|| CatalogError::NotFound(format!("image for {}", product_code)))?;

        fs::create_dir_all(&export_dir).map_err(PersistenceError::Io)?;
        fsio::write_atomic(&metadata_path, serialized.as_bytes()).map_err(PersistenceError::Io)?;
        fs::copy(&image, export_dir.join(image_name)).map_err(PersistenceError::Io)?;

        info!("Exported {} to {}", product_code, export_dir.display());
        Ok(export_dir)
    }

    /// All entries, in catalog order.
    pub fn list(&self) -> Vec<CatalogEntry> {
        self.inner.lock().unwrap().entries.clone()
    }
}

impl Inner {
    fn save(&self) -> Result<()> {
        let serialized =
            serde_json::to_string_pretty(&self.entries).map_err(PersistenceError::Json)?;
        fsio::write_atomic(&self.path, serialized.as_bytes()).map_err(PersistenceError::Io)?;
        Ok(())
    }
}

fn field_value(entry: &CatalogEntry, field: &str) -> Option<String> {
    match field {
        "product_code" => Some(entry.product_code.clone()),
        "ring_name" => Some(entry.ring_name.clone()),
        "image_path" => Some(entry.image_path.clone()),
        _ => entry.attributes.get(field).cloned(),
    }
}

fn any_value_matches(entry: &CatalogEntry, query: &str) -> bool {
    entry.product_code.to_lowercase().contains(query)
        || entry.ring_name.to_lowercase().contains(query)
        || entry.image_path.to_lowercase().contains(query)
        || entry
            .attributes
            .values()
            .any(|v| v.to_lowercase().contains(query))
}
