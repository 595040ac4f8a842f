//! Nearest neighbor search implementations

use ppfcrate_core::{NearestNeighborSearch, Point3f, PointCloud};
use rstar::primitives::GeomWithData;
use rstar::RTree;

/// A point stored in the tree together with its index in the source cloud
type IndexedPoint = GeomWithData<[f32; 3], usize>;

/// Spatial index over a point cloud, backed by a bulk-loaded R*-tree.
///
/// Built once per fragment and owned by whoever runs the queries; it is not
/// shared between fragments.
pub struct SpatialIndex {
    tree: RTree<IndexedPoint>,
}

impl SpatialIndex {
    pub fn new(points: &[Point3f]) -> Self {
        let indexed: Vec<IndexedPoint> = points
            .iter()
            .enumerate()
            .map(|(idx, p)| GeomWithData::new([p.x, p.y, p.z], idx))
            .collect();

        Self {
            tree: RTree::bulk_load(indexed),
        }
    }

    /// Index the positions of any cloud whose points convert to `Point3f`
    pub fn from_cloud<T>(cloud: &PointCloud<T>) -> Self
    where
        T: Copy + Into<Point3f>,
    {
        let positions: Vec<Point3f> = cloud.iter().map(|&p| p.into()).collect();
        Self::new(&positions)
    }
}

impl NearestNeighborSearch for SpatialIndex {
    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        if !radius.is_finite() || radius < 0.0 {
            return Vec::new();
        }

        let q = [query.x, query.y, query.z];
        self.tree
            .locate_within_distance(q, radius * radius)
            .map(|item| {
                let p = item.geom();
                let dx = p[0] - q[0];
                let dy = p[1] - q[1];
                let dz = p[2] - q[2];
                (item.data, (dx * dx + dy * dy + dz * dz).sqrt())
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.tree.size()
    }
}
