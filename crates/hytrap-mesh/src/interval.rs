//! 1D interval mesh.

use crate::error::MeshError;
use crate::mesh::{BoundaryFace, InteriorFace, Mesh};
use hytrap_core::Point;

/// Surface marker of the left end (`x = x_0`).
pub const LEFT: u32 = 1;
/// Surface marker of the right end (`x = x_n`).
pub const RIGHT: u32 = 2;

/// A local refinement request: keep bisecting the cells left of `x`
/// until that region holds at least `cells` cells.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Refinement {
    /// Minimum number of cells required left of `x`.
    pub cells: usize,
    /// Right edge of the refined region.
    pub x: f64,
}

/// A one-dimensional mesh over `[x_0, x_n]`.
///
/// Cell `i` spans `[x_i, x_{i+1}]`. Faces have unit area, so volume
/// integrals are lengths and surface integrals are point values.
///
/// # Examples
///
/// ```
/// use hytrap_mesh::{IntervalMesh, Mesh};
///
/// let mesh = IntervalMesh::uniform(1.0, 4).unwrap();
/// assert_eq!(mesh.cell_count(), 4);
/// assert_eq!(mesh.interior_faces().len(), 3);
/// assert_eq!(mesh.boundary_faces().len(), 2);
/// assert!((mesh.total_volume() - 1.0).abs() < 1e-15);
/// ```
#[derive(Clone, Debug)]
pub struct IntervalMesh {
    vertices: Vec<f64>,
    markers: Vec<u32>,
    interior: Vec<InteriorFace>,
    boundary: Vec<BoundaryFace>,
}

impl IntervalMesh {
    /// Build a mesh from strictly increasing vertices.
    pub fn from_vertices(vertices: Vec<f64>) -> Result<Self, MeshError> {
        if vertices.len() < 2 {
            return Err(MeshError::EmptyMesh);
        }
        if let Some(i) = vertices.iter().position(|v| !v.is_finite()) {
            return Err(MeshError::InvalidDimension {
                name: "vertex",
                value: vertices[i],
            });
        }
        if let Some(i) = (1..vertices.len()).find(|&i| vertices[i] <= vertices[i - 1]) {
            return Err(MeshError::NonMonotonicVertices { index: i });
        }

        let n = vertices.len() - 1;
        let mid = |i: usize| 0.5 * (vertices[i] + vertices[i + 1]);
        let interior = (0..n.saturating_sub(1))
            .map(|i| InteriorFace {
                cells: (i, i + 1),
                area: 1.0,
                distance: mid(i + 1) - mid(i),
            })
            .collect();
        let boundary = vec![
            BoundaryFace {
                cell: 0,
                area: 1.0,
                distance: mid(0) - vertices[0],
                surface: LEFT,
                centroid: [vertices[0], 0.0, 0.0],
            },
            BoundaryFace {
                cell: n - 1,
                area: 1.0,
                distance: vertices[n] - mid(n - 1),
                surface: RIGHT,
                centroid: [vertices[n], 0.0, 0.0],
            },
        ];

        Ok(Self {
            markers: vec![1; n],
            vertices,
            interior,
            boundary,
        })
    }

    /// A uniform mesh of `cells` cells over `[0, size]`.
    pub fn uniform(size: f64, cells: usize) -> Result<Self, MeshError> {
        Self::refined(size, cells, &[])
    }

    /// A uniform mesh over `[0, size]` with local refinements applied in order.
    pub fn refined(
        size: f64,
        initial_cells: usize,
        refinements: &[Refinement],
    ) -> Result<Self, MeshError> {
        if !size.is_finite() || size <= 0.0 {
            return Err(MeshError::InvalidDimension { name: "size", value: size });
        }
        if initial_cells == 0 {
            return Err(MeshError::EmptyMesh);
        }
        let h = size / initial_cells as f64;
        let mut vertices: Vec<f64> = (0..=initial_cells).map(|i| i as f64 * h).collect();
        // Pin the last vertex so rounding never shortens the domain.
        vertices[initial_cells] = size;

        for r in refinements {
            if !r.x.is_finite() || r.x <= 0.0 {
                return Err(MeshError::InvalidRefinement {
                    reason: format!("refinement point {} must lie inside (0, {size}]", r.x),
                });
            }
            loop {
                let in_region = vertices.windows(2).filter(|w| w[0] < r.x).count();
                if in_region >= r.cells {
                    break;
                }
                let mut next = Vec::with_capacity(vertices.len() + in_region);
                for w in vertices.windows(2) {
                    next.push(w[0]);
                    if w[0] < r.x {
                        next.push(0.5 * (w[0] + w[1]));
                    }
                }
                if let Some(&last) = vertices.last() {
                    next.push(last);
                }
                if next.len() == vertices.len() {
                    return Err(MeshError::InvalidRefinement {
                        reason: format!("no cell lies left of x = {}", r.x),
                    });
                }
                vertices = next;
            }
        }

        Self::from_vertices(vertices)
    }

    /// Assign each cell the marker returned by `f` at its centroid.
    pub fn mark_volumes(&mut self, f: impl Fn(&Point) -> u32) {
        for i in 0..self.markers.len() {
            let c = self.centroid(i);
            self.markers[i] = f(&c);
        }
    }

    /// Replace the volume markers wholesale.
    pub fn with_volume_markers(mut self, markers: Vec<u32>) -> Result<Self, MeshError> {
        if markers.len() != self.markers.len() {
            return Err(MeshError::MarkerCountMismatch {
                expected: self.markers.len(),
                actual: markers.len(),
            });
        }
        self.markers = markers;
        Ok(self)
    }

    /// Mesh vertices, ascending.
    pub fn vertices(&self) -> &[f64] {
        &self.vertices
    }
}

impl Mesh for IntervalMesh {
    fn dim(&self) -> usize {
        1
    }

    fn cell_count(&self) -> usize {
        self.markers.len()
    }

    fn centroid(&self, cell: usize) -> Point {
        [0.5 * (self.vertices[cell] + self.vertices[cell + 1]), 0.0, 0.0]
    }

    fn volume(&self, cell: usize) -> f64 {
        self.vertices[cell + 1] - self.vertices[cell]
    }

    fn volume_marker(&self, cell: usize) -> u32 {
        self.markers[cell]
    }

    fn interior_faces(&self) -> &[InteriorFace] {
        &self.interior
    }

    fn boundary_faces(&self) -> &[BoundaryFace] {
        &self.boundary
    }
}
