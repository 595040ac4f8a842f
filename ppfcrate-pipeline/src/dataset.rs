//! Indexable view over the fragments of one scene
//!
//! A training loop asks for item `i` and gets back the patch tensor of the
//! `i`-th fragment (ids sorted) together with the fragment id and the source
//! indices of its reference points. Items come
//! either from the pipeline directly or from a store filled beforehand; for
//! the same seed and inputs both give identical tensors.

use crate::error::{FragmentError, Stage, StageContext};
use crate::pipeline::PatchPipeline;
use crate::source::GeometrySource;
use crate::store::PatchStore;
use ndarray::{Array3, Array4, ArrayView3, Axis};
use ppfcrate_core::{Error, Result};

/// One dataset item
#[derive(Debug, Clone, PartialEq)]
pub struct PatchItem {
    pub fragment_id: String,
    /// `(num_patches, num_points_per_patch, 4)` feature tensor
    pub patch: Array3<f32>,
    /// Source cloud index of the reference point behind each patch row
    pub reference_indices: Vec<usize>,
}

/// Several items stacked along a leading batch axis
#[derive(Debug, Clone, PartialEq)]
pub struct PatchBatch {
    pub fragment_ids: Vec<String>,
    /// `(batch, num_patches, num_points_per_patch, 4)`
    pub patches: Array4<f32>,
    pub reference_indices: Vec<Vec<usize>>,
}

enum Backend {
    OnTheFly(PatchPipeline<Box<dyn GeometrySource>>),
    Precomputed(Box<dyn PatchStore>),
}

pub struct PatchDataset {
    backend: Backend,
    fragment_ids: Vec<String>,
}

impl PatchDataset {
    /// Compute every item on access
    pub fn on_the_fly(pipeline: PatchPipeline<Box<dyn GeometrySource>>) -> Result<Self> {
        let fragment_ids = pipeline.source().fragment_ids()?;
        log::debug!(
            "on-the-fly dataset over {} fragments in {}",
            fragment_ids.len(),
            pipeline.source().root().display()
        );
        Ok(Self {
            backend: Backend::OnTheFly(pipeline),
            fragment_ids,
        })
    }

    /// Read every item from `store`
    pub fn precomputed(store: Box<dyn PatchStore>) -> Result<Self> {
        let fragment_ids = store.fragment_ids()?;
        Ok(Self {
            backend: Backend::Precomputed(store),
            fragment_ids,
        })
    }

    pub fn len(&self) -> usize {
        self.fragment_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragment_ids.is_empty()
    }

    pub fn fragment_ids(&self) -> &[String] {
        &self.fragment_ids
    }

    pub fn get(&self, index: usize) -> std::result::Result<PatchItem, FragmentError> {
        let fragment_id = self.fragment_ids.get(index).ok_or_else(|| {
            FragmentError::new(
                format!("#{}", index),
                Stage::Load,
                Error::InvalidData(format!("index {} out of range for {} items", index, self.len())),
            )
        })?;

        let (patch, reference_indices) = match &self.backend {
            Backend::OnTheFly(pipeline) => pipeline.local_patches_on_the_fly(fragment_id)?,
            Backend::Precomputed(store) => {
                let stored = store.read(fragment_id).at(fragment_id, Stage::Load)?;
                (stored.patch, stored.reference.indices)
            }
        };
        Ok(PatchItem {
            fragment_id: fragment_id.clone(),
            patch,
            reference_indices,
        })
    }

    /// Fetch several items and stack them into one batch
    pub fn batch(&self, indices: &[usize]) -> std::result::Result<PatchBatch, FragmentError> {
        let mut patches = Vec::with_capacity(indices.len());
        let mut fragment_ids = Vec::with_capacity(indices.len());
        let mut reference_indices = Vec::with_capacity(indices.len());
        for &index in indices {
            let item = self.get(index)?;
            patches.push(item.patch);
            fragment_ids.push(item.fragment_id);
            reference_indices.push(item.reference_indices);
        }

        let patches = collate(&patches).map_err(|source| {
            FragmentError::new(fragment_ids.first().cloned().unwrap_or_default(), Stage::Features, source)
        })?;
        Ok(PatchBatch {
            fragment_ids,
            patches,
            reference_indices,
        })
    }
}

/// Stack equally shaped patch tensors into
/// `(batch, num_patches, num_points_per_patch, 4)`
pub fn collate(patches: &[Array3<f32>]) -> Result<Array4<f32>> {
    if patches.is_empty() {
        return Err(Error::InvalidData("cannot collate an empty batch".to_string()));
    }
    let views: Vec<ArrayView3<'_, f32>> = patches.iter().map(|p| p.view()).collect();
    ndarray::stack(Axis(0), &views).map_err(|e| Error::InvalidData(format!("cannot collate patches: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatchConfig;
    use crate::store::MemoryPatchStore;
    use ppfcrate_algorithms::ReferenceSet;
    use ppfcrate_core::{NormalPoint3f, Point3f, PointCloud, Vector3f};

    #[test]
    fn test_collate_stacks_batch() {
        let a = Array3::<f32>::zeros((3, 5, 4));
        let b = Array3::<f32>::ones((3, 5, 4));
        let batch = collate(&[a, b]).unwrap();

        assert_eq!(batch.shape(), &[2, 3, 5, 4]);
        assert_eq!(batch[[0, 2, 4, 3]], 0.0);
        assert_eq!(batch[[1, 0, 0, 0]], 1.0);
    }

    #[test]
    fn test_collate_rejects_mismatch_and_empty() {
        let a = Array3::<f32>::zeros((3, 5, 4));
        let b = Array3::<f32>::zeros((2, 5, 4));
        assert!(matches!(collate(&[a, b]), Err(Error::InvalidData(_))));
        assert!(matches!(collate(&[]), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_precomputed_dataset() {
        let store = MemoryPatchStore::new();
        let reference = |indices: Vec<usize>| ReferenceSet {
            cloud: PointCloud::from_points(vec![NormalPoint3f::new(Point3f::origin(), Vector3f::z()); 2]),
            indices,
        };
        store
            .write("frag_b", &Array3::from_elem((2, 4, 4), 0.5), &reference(vec![7, 1]))
            .unwrap();
        store
            .write("frag_a", &Array3::from_elem((2, 4, 4), 0.25), &reference(vec![0, 9]))
            .unwrap();

        let dataset = PatchDataset::precomputed(Box::new(store)).unwrap();
        assert_eq!(dataset.len(), 2);

        let item = dataset.get(0).unwrap();
        assert_eq!(item.fragment_id, "frag_a");
        assert_eq!(item.patch[[1, 3, 2]], 0.25);
        assert_eq!(item.reference_indices, vec![0, 9]);

        let batch = dataset.batch(&[1, 0]).unwrap();
        assert_eq!(batch.patches.shape(), &[2, 2, 4, 4]);
        assert_eq!(batch.fragment_ids, vec!["frag_b".to_string(), "frag_a".to_string()]);
        assert_eq!(batch.reference_indices, vec![vec![7, 1], vec![0, 9]]);

        assert!(dataset.get(2).is_err());
    }

    #[test]
    fn test_on_the_fly_dataset_lists_source_fragments() {
        struct Empty;
        impl GeometrySource for Empty {
            fn load_fragment(&self, _: &str) -> Result<PointCloud<Point3f>> {
                Err(Error::Load("empty".to_string()))
            }
            fn fragment_ids(&self) -> Result<Vec<String>> {
                Ok(vec!["only".to_string()])
            }
            fn root(&self) -> &std::path::Path {
                std::path::Path::new(".")
            }
        }

        let source: Box<dyn GeometrySource> = Box::new(Empty);
        let pipeline = PatchPipeline::new(source, PatchConfig::default()).unwrap();
        let dataset = PatchDataset::on_the_fly(pipeline).unwrap();

        assert_eq!(dataset.fragment_ids(), &["only".to_string()]);
        let err = dataset.get(0).unwrap_err();
        assert_eq!(err.fragment_id, "only");
        assert_eq!(err.stage, Stage::Load);
    }
}
