//! Scene list files

use crate::error::{open_file, IoError};
use ppfcrate_core::Result;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Read a scene manifest: one scene name per line.
///
/// Surrounding whitespace is trimmed; blank lines and lines starting with `#`
/// are skipped.
pub fn read_scene_manifest<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let reader = BufReader::new(open_file(path)?);

    let mut scenes = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(IoError::Io)?;
        let scene = line.trim();
        if scene.is_empty() || scene.starts_with('#') {
            continue;
        }
        scenes.push(scene.to_string());
    }

    log::debug!("{} scenes listed in {}", scenes.len(), path.display());
    Ok(scenes)
}
