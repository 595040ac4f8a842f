//! Per-fragment patch pipeline
//!
//! One fragment flows through the stages strictly in order:
//! load, normal estimation, reference sampling, neighbor collection and
//! feature construction. Nothing is shared between fragments, so callers may
//! run [`PatchPipeline::compute`] for different fragments on different
//! threads.

use crate::config::PatchConfig;
use crate::error::{ConfigError, FragmentError, Stage, StageContext};
use crate::source::GeometrySource;
use crate::store::PatchStore;
use ndarray::Array3;
use ppfcrate_algorithms::{
    build_local_patch, collect_local_neighbors, estimate_normals_with_index, select_reference_points,
    ReferenceSet, SpatialIndex,
};
use ppfcrate_core::{NormalPoint3f, PointCloud};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

/// Patches computed for one fragment
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentPatches {
    pub fragment_id: String,
    /// `(num_patches, num_points_per_patch, 4)` feature tensor
    pub patch: Array3<f32>,
    /// The reference points the rows of `patch` are centered on
    pub reference: ReferenceSet,
}

/// 64-bit FNV-1a, stable across platforms and runs
fn fnv1a(text: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    text.bytes()
        .fold(OFFSET, |hash, byte| (hash ^ byte as u64).wrapping_mul(PRIME))
}

/// Runs the patch stages over fragments of one geometry source
pub struct PatchPipeline<S> {
    source: S,
    config: PatchConfig,
}

impl<S: GeometrySource> PatchPipeline<S> {
    pub fn new(source: S, config: PatchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { source, config })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    /// Random generator for one fragment.
    ///
    /// With a configured seed the generator depends only on the seed and the
    /// fragment id, so results do not depend on processing order.
    pub fn fragment_rng(&self, fragment_id: &str) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ fnv1a(fragment_id)),
            None => StdRng::from_entropy(),
        }
    }

    /// Compute the patches of one fragment
    pub fn compute(&self, fragment_id: &str) -> Result<FragmentPatches, FragmentError> {
        let mut rng = self.fragment_rng(fragment_id);
        self.compute_with_rng(fragment_id, &mut rng)
    }

    /// Same as [`compute`](Self::compute) with a caller-supplied generator
    pub fn compute_with_rng<R>(&self, fragment_id: &str, rng: &mut R) -> Result<FragmentPatches, FragmentError>
    where
        R: Rng + ?Sized,
    {
        let start = Instant::now();
        let cloud = self.source.load_fragment(fragment_id).at(fragment_id, Stage::Load)?;
        log::debug!(
            "{}: loaded {} points in {:?}",
            fragment_id,
            cloud.len(),
            start.elapsed()
        );

        // positions do not change when normals are attached, so one index
        // serves both normal estimation and neighbor collection
        let start = Instant::now();
        let index = SpatialIndex::new(&cloud.points);
        let oriented =
            estimate_normals_with_index(&cloud, &index, &self.config.normals).at(fragment_id, Stage::Normals)?;
        log::debug!("{}: estimated normals in {:?}", fragment_id, start.elapsed());

        self.patches_with_index(fragment_id, &oriented, &index, rng)
    }

    /// Run the stages after normal estimation on a cloud that already
    /// carries normals.
    pub fn patches_from_oriented_cloud<R>(
        &self,
        fragment_id: &str,
        cloud: &PointCloud<NormalPoint3f>,
        rng: &mut R,
    ) -> Result<FragmentPatches, FragmentError>
    where
        R: Rng + ?Sized,
    {
        let index = SpatialIndex::from_cloud(cloud);
        self.patches_with_index(fragment_id, cloud, &index, rng)
    }

    fn patches_with_index<R>(
        &self,
        fragment_id: &str,
        cloud: &PointCloud<NormalPoint3f>,
        index: &SpatialIndex,
        rng: &mut R,
    ) -> Result<FragmentPatches, FragmentError>
    where
        R: Rng + ?Sized,
    {
        let config = &self.config;

        let reference =
            select_reference_points(cloud, config.num_patches, rng).at(fragment_id, Stage::Sampling)?;

        let start = Instant::now();
        let neighbors = collect_local_neighbors(
            &reference,
            cloud,
            index,
            config.vicinity,
            config.num_points_per_patch,
            rng,
        )
        .at(fragment_id, Stage::Neighbors)?;
        log::debug!(
            "{}: collected {} neighbor sets in {:?}",
            fragment_id,
            neighbors.len(),
            start.elapsed()
        );

        let start = Instant::now();
        let patch = build_local_patch(&reference, cloud, &neighbors, config.distance_scale())
            .at(fragment_id, Stage::Features)?;
        log::debug!(
            "{}: built patch {:?} in {:?}",
            fragment_id,
            patch.shape(),
            start.elapsed()
        );

        Ok(FragmentPatches {
            fragment_id: fragment_id.to_string(),
            patch,
            reference,
        })
    }

    /// Compute the patch tensor of a fragment without touching any store,
    /// together with the source indices of its reference points
    pub fn local_patches_on_the_fly(&self, fragment_id: &str) -> Result<(Array3<f32>, Vec<usize>), FragmentError> {
        self.compute(fragment_id)
            .map(|patches| (patches.patch, patches.reference.indices))
    }

    /// Compute a fragment and persist it in `store`
    pub fn process_and_store<P>(&self, fragment_id: &str, store: &P) -> Result<FragmentPatches, FragmentError>
    where
        P: PatchStore + ?Sized,
    {
        let patches = self.compute(fragment_id)?;
        store
            .write(fragment_id, &patches.patch, &patches.reference)
            .at(fragment_id, Stage::Store)?;
        Ok(patches)
    }
}
