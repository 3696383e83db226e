//! The core `Mesh` trait and face descriptors.

use hytrap_core::Point;
use smallvec::SmallVec;
use std::any::Any;

/// A face shared by two cells.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InteriorFace {
    /// The two adjacent cells, `(a, b)`. The face normal points from `a` to `b`.
    pub cells: (usize, usize),
    /// Face measure (length in 2D, 1 in 1D).
    pub area: f64,
    /// Distance between the two cell centroids.
    pub distance: f64,
}

/// A face on the domain boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundaryFace {
    /// The cell owning the face.
    pub cell: usize,
    /// Face measure.
    pub area: f64,
    /// Distance from the cell centroid to the face centroid.
    pub distance: f64,
    /// Surface marker of the face.
    pub surface: u32,
    /// Face centroid, used to evaluate boundary expressions.
    pub centroid: Point,
}

/// Cell-centred finite-volume view of a meshed domain.
///
/// Solver stages assemble residuals by walking cells, interior faces,
/// and boundary faces. Cells carry a volume marker identifying their
/// material subdomain; boundary faces carry a surface marker used to
/// attach boundary conditions and surface integrals.
///
/// # Object Safety
///
/// Designed for use as `dyn Mesh`; use [`downcast_ref`](Self::downcast_ref)
/// for backend-specific fast paths.
pub trait Mesh: Any + Send + Sync + 'static {
    /// Number of spatial dimensions.
    fn dim(&self) -> usize;

    /// Total number of cells.
    fn cell_count(&self) -> usize;

    /// Centroid of a cell.
    fn centroid(&self, cell: usize) -> Point;

    /// Measure of a cell (length in 1D, area in 2D).
    fn volume(&self, cell: usize) -> f64;

    /// Volume (material subdomain) marker of a cell.
    fn volume_marker(&self, cell: usize) -> u32;

    /// All interior faces in deterministic order.
    fn interior_faces(&self) -> &[InteriorFace];

    /// All boundary faces in deterministic order.
    fn boundary_faces(&self) -> &[BoundaryFace];

    /// Distinct surface markers present on the boundary, ascending.
    fn surface_markers(&self) -> SmallVec<[u32; 4]> {
        let mut markers: SmallVec<[u32; 4]> = SmallVec::new();
        for face in self.boundary_faces() {
            if !markers.contains(&face.surface) {
                markers.push(face.surface);
            }
        }
        markers.sort_unstable();
        markers
    }

    /// Total measure of the domain.
    fn total_volume(&self) -> f64 {
        (0..self.cell_count()).map(|c| self.volume(c)).sum()
    }
}

impl dyn Mesh {
    /// Attempt to downcast a trait object to a concrete mesh type.
    pub fn downcast_ref<T: Mesh>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }
}
