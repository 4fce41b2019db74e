//! Fragment store: reusable post content on disk
//!
//! One JSON file per category under the fragments directory
//! (`quotes.json`, `texts.json`, `symbols.json`, `deals.json`), plus a
//! `pictures/` subdirectory scanned for image files. Categories are
//! append-only; insertion order is significant for index selection.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PersistenceError, Result};
use crate::fsio;
use crate::types::{is_picture_file, Deal, FragmentSet};

/// The deals file keeps its historical wrapper object shape.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DealsFile {
    deals: Vec<Deal>,
}

/// Shared handle to the fragments directory.
#[derive(Clone)]
pub struct FragmentStore {
    inner: Arc<Mutex<PathBuf>>,
}

impl FragmentStore {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(dir.into())),
        }
    }

    /// Read every category into a consistent snapshot. Missing or
    /// malformed files load as empty categories.
    pub fn snapshot(&self) -> FragmentSet {
        let dir = self.inner.lock().unwrap();
        let deals: DealsFile = fsio::load_json_or_default(&dir.join("deals.json"));
        FragmentSet {
            quotes: fsio::load_json_or_default(&dir.join("quotes.json")),
            texts: fsio::load_json_or_default(&dir.join("texts.json")),
            symbols: fsio::load_json_or_default(&dir.join("symbols.json")),
            deals: deals.deals,
            pictures: list_pictures(&dir.join("pictures")),
        }
    }

    pub fn add_quote(&self, quote: impl Into<String>) -> Result<()> {
        self.append_string("quotes.json", quote.into())
    }

    pub fn add_text(&self, text: impl Into<String>) -> Result<()> {
        self.append_string("texts.json", text.into())
    }

    pub fn add_symbol(&self, symbol: impl Into<String>) -> Result<()> {
        self.append_string("symbols.json", symbol.into())
    }

    pub fn add_deal(&self, deal: Deal) -> Result<()> {
        let dir = self.inner.lock().unwrap();
        let path = dir.join("deals.json");
        let mut file: DealsFile = fsio::load_json_or_default(&path);
        file.deals.push(deal);
        save_json(&path, &file)
    }

    /// Copy a picture into the pictures directory. Only jpg/jpeg/png
    /// files are accepted.
    pub fn add_picture(&self, source: &Path) -> Result<String> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| crate::TwinkleError::InvalidInput("Picture has no file name".into()))?
            .to_string();
        if !is_picture_file(&name) {
            return Err(crate::TwinkleError::InvalidInput(format!(
                "Unsupported picture format: {} (expected .jpg, .jpeg or .png)",
                name
            )));
        }

        let dir = self.inner.lock().unwrap();
        let pictures = dir.join("pictures");
        fs::create_dir_all(&pictures).map_err(PersistenceError::Io)?;
        fs::copy(source, pictures.join(&name)).map_err(PersistenceError::Io)?;
        info!("Added picture {}", name);
        Ok(name)
    }

    /// Absolute path of a stored picture, for the publisher boundary.
    pub fn picture_path(&self, name: &str) -> PathBuf {
        self.inner.lock().unwrap().join("pictures").join(name)
    }

    fn append_string(&self, file: &str, value: String) -> Result<()> {
        let dir = self.inner.lock().unwrap();
        let path = dir.join(file);
        let mut items: Vec<String> = fsio::load_json_or_default(&path);
        items.push(value);
        save_json(&path, &items)
    }
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let serialized = serde_json::to_string_pretty(value).map_err(PersistenceError::Json)?;
    fsio::write_atomic(path, serialized.as_bytes()).map_err(PersistenceError::Io)?;
    Ok(())
}

fn list_pictures(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| is_picture_file(name))
        .collect();
    names.sort();
    names
}
