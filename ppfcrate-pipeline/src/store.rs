//! Patch persistence
//!
//! A [`PatchStore`] keeps, per fragment, the local patch tensor and the
//! reference set it was computed from. [`FilePatchStore`] writes `<id>.npy`
//! next to `<id>.pcd` (or `.ply`) and `<id>.indices.npy` in a save directory;
//! [`MemoryPatchStore`] keeps everything in a map for tests and for callers
//! that never touch disk.

use ndarray::Array3;
use ppfcrate_algorithms::ReferenceSet;
use ppfcrate_core::{Error, Result};
use ppfcrate_io::{
    read_indices, read_oriented_cloud, read_patch, write_indices, write_oriented_cloud, write_patch, CloudFormat,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// What a store returns for one fragment
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPatches {
    pub patch: Array3<f32>,
    pub reference: ReferenceSet,
}

fn check_reference_shape(fragment_id: &str, patch: &Array3<f32>, reference: &ReferenceSet) -> Result<()> {
    let rows = patch.shape()[0];
    if rows != reference.cloud.len() || rows != reference.indices.len() {
        return Err(Error::InvalidData(format!(
            "fragment {}: patch holds {} reference points but the reference set has {} points and {} indices",
            fragment_id,
            rows,
            reference.cloud.len(),
            reference.indices.len()
        )));
    }
    Ok(())
}

/// Storage backend for computed patches
pub trait PatchStore: Send + Sync {
    /// Persist the patch tensor and reference set of one fragment,
    /// replacing anything stored under the same id.
    fn write(&self, fragment_id: &str, patch: &Array3<f32>, reference: &ReferenceSet) -> Result<()>;

    fn read(&self, fragment_id: &str) -> Result<StoredPatches>;

    /// Whether a complete entry exists for `fragment_id`
    fn contains(&self, fragment_id: &str) -> bool;

    /// Ids of every stored fragment, sorted
    fn fragment_ids(&self) -> Result<Vec<String>>;
}

impl<S: PatchStore + ?Sized> PatchStore for Box<S> {
    fn write(&self, fragment_id: &str, patch: &Array3<f32>, reference: &ReferenceSet) -> Result<()> {
        (**self).write(fragment_id, patch, reference)
    }

    fn read(&self, fragment_id: &str) -> Result<StoredPatches> {
        (**self).read(fragment_id)
    }

    fn contains(&self, fragment_id: &str) -> bool {
        (**self).contains(fragment_id)
    }

    fn fragment_ids(&self) -> Result<Vec<String>> {
        (**self).fragment_ids()
    }
}

/// Patches stored as files under one directory
#[derive(Debug, Clone)]
pub struct FilePatchStore {
    dir: PathBuf,
    reference_format: CloudFormat,
}

impl FilePatchStore {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>, reference_format: CloudFormat) -> Self {
        Self {
            dir: dir.into(),
            reference_format,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn patch_path(&self, fragment_id: &str) -> PathBuf {
        self.dir.join(format!("{}.npy", fragment_id))
    }

    pub fn reference_path(&self, fragment_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", fragment_id, self.reference_format.extension()))
    }

    pub fn indices_path(&self, fragment_id: &str) -> PathBuf {
        self.dir.join(format!("{}.indices.npy", fragment_id))
    }
}

impl PatchStore for FilePatchStore {
    fn write(&self, fragment_id: &str, patch: &Array3<f32>, reference: &ReferenceSet) -> Result<()> {
        check_reference_shape(fragment_id, patch, reference)?;
        std::fs::create_dir_all(&self.dir)?;

        write_patch(self.patch_path(fragment_id), patch)?;
        write_oriented_cloud(&reference.cloud, self.reference_path(fragment_id))?;
        write_indices(self.indices_path(fragment_id), &reference.indices)?;
        log::debug!("stored fragment {} in {}", fragment_id, self.dir.display());
        Ok(())
    }

    fn read(&self, fragment_id: &str) -> Result<StoredPatches> {
        let patch = read_patch(self.patch_path(fragment_id))?;
        let reference = ReferenceSet {
            cloud: read_oriented_cloud(self.reference_path(fragment_id))?,
            indices: read_indices(self.indices_path(fragment_id))?,
        };
        check_reference_shape(fragment_id, &patch, &reference).map_err(|e| Error::Load(e.to_string()))?;
        Ok(StoredPatches { patch, reference })
    }

    fn contains(&self, fragment_id: &str) -> bool {
        self.patch_path(fragment_id).is_file()
            && self.reference_path(fragment_id).is_file()
            && self.indices_path(fragment_id).is_file()
    }

    fn fragment_ids(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let id = match name.to_str().and_then(|n| n.strip_suffix(".npy")) {
                Some(id) if !id.is_empty() && !id.ends_with(".indices") => id,
                _ => continue,
            };
            if self.contains(id) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Patches kept in memory
#[derive(Debug, Default)]
pub struct MemoryPatchStore {
    entries: Mutex<HashMap<String, StoredPatches>>,
}

impl MemoryPatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, StoredPatches>>> {
        self.entries
            .lock()
            .map_err(|_| Error::InvalidData("memory patch store lock poisoned".to_string()))
    }
}

impl PatchStore for MemoryPatchStore {
    fn write(&self, fragment_id: &str, patch: &Array3<f32>, reference: &ReferenceSet) -> Result<()> {
        check_reference_shape(fragment_id, patch, reference)?;
        let entry = StoredPatches {
            patch: patch.clone(),
            reference: reference.clone(),
        };
        self.lock()?.insert(fragment_id.to_string(), entry);
        Ok(())
    }

    fn read(&self, fragment_id: &str) -> Result<StoredPatches> {
        self.lock()?
            .get(fragment_id)
            .cloned()
            .ok_or_else(|| Error::Load(format!("no stored patches for fragment {}", fragment_id)))
    }

    fn contains(&self, fragment_id: &str) -> bool {
        self.lock().map(|entries| entries.contains_key(fragment_id)).unwrap_or(false)
    }

    fn fragment_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.lock()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
