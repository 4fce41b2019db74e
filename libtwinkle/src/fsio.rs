//! Small file helpers shared by the on-disk stores.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::warn;

/// Write a file via a temp-then-rename so a crash mid-write never
/// truncates the previous contents.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

/// Load a JSON document, degrading to the default value when the file
/// is missing or unreadable. A corrupt file is logged, never fatal.
pub(crate) fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                warn!("Malformed JSON in {}: {}. Starting empty.", path.display(), e);
                T::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
        Err(e) => {
            warn!("Could not read {}: {}. Starting empty.", path.display(), e);
            T::default()
        }
    }
}
