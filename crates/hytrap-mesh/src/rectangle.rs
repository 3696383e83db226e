//! 2D structured rectangle mesh.

use crate::error::MeshError;
use crate::mesh::{BoundaryFace, InteriorFace, Mesh};
use hytrap_core::Point;

/// Surface marker of the `x = 0` edge.
pub const LEFT: u32 = 1;
/// Surface marker of the `x = lx` edge.
pub const RIGHT: u32 = 2;
/// Surface marker of the `y = 0` edge.
pub const BOTTOM: u32 = 3;
/// Surface marker of the `y = ly` edge.
pub const TOP: u32 = 4;

/// A rectangle `[0, lx] x [0, ly]` split into `nx * ny` equal cells.
///
/// Cell `(i, j)` has flat index `j * nx + i`.
#[derive(Clone, Debug)]
pub struct RectangleMesh {
    lx: f64,
    ly: f64,
    nx: usize,
    ny: usize,
    markers: Vec<u32>,
    interior: Vec<InteriorFace>,
    boundary: Vec<BoundaryFace>,
}

impl RectangleMesh {
    /// Create a rectangle mesh.
    pub fn new(lx: f64, ly: f64, nx: usize, ny: usize) -> Result<Self, MeshError> {
        for (name, value) in [("lx", lx), ("ly", ly)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(MeshError::InvalidDimension { name, value });
            }
        }
        if nx == 0 || ny == 0 {
            return Err(MeshError::EmptyMesh);
        }
        let dx = lx / nx as f64;
        let dy = ly / ny as f64;
        let idx = |i: usize, j: usize| j * nx + i;

        let mut interior = Vec::with_capacity((nx - 1) * ny + nx * (ny - 1));
        for j in 0..ny {
            for i in 0..nx - 1 {
                interior.push(InteriorFace {
                    cells: (idx(i, j), idx(i + 1, j)),
                    area: dy,
                    distance: dx,
                });
            }
        }
        for j in 0..ny - 1 {
            for i in 0..nx {
                interior.push(InteriorFace {
                    cells: (idx(i, j), idx(i, j + 1)),
                    area: dx,
                    distance: dy,
                });
            }
        }

        let mut boundary = Vec::with_capacity(2 * (nx + ny));
        for j in 0..ny {
            let y = (j as f64 + 0.5) * dy;
            boundary.push(BoundaryFace {
                cell: idx(0, j),
                area: dy,
                distance: 0.5 * dx,
                surface: LEFT,
                centroid: [0.0, y, 0.0],
            });
            boundary.push(BoundaryFace {
                cell: idx(nx - 1, j),
                area: dy,
                distance: 0.5 * dx,
                surface: RIGHT,
                centroid: [lx, y, 0.0],
            });
        }
        for i in 0..nx {
            let x = (i as f64 + 0.5) * dx;
            boundary.push(BoundaryFace {
                cell: idx(i, 0),
                area: dx,
                distance: 0.5 * dy,
                surface: BOTTOM,
                centroid: [x, 0.0, 0.0],
            });
            boundary.push(BoundaryFace {
                cell: idx(i, ny - 1),
                area: dx,
                distance: 0.5 * dy,
                surface: TOP,
                centroid: [x, ly, 0.0],
            });
        }

        Ok(Self {
            lx,
            ly,
            nx,
            ny,
            markers: vec![1; nx * ny],
            interior,
            boundary,
        })
    }

    /// A unit square with `n * n` cells.
    pub fn unit_square(n: usize) -> Result<Self, MeshError> {
        Self::new(1.0, 1.0, n, n)
    }

    /// Assign each cell the marker returned by `f` at its centroid.
    pub fn mark_volumes(&mut self, f: impl Fn(&Point) -> u32) {
        for c in 0..self.markers.len() {
            let p = self.centroid(c);
            self.markers[c] = f(&p);
        }
    }

    /// Cell counts along x and y.
    pub fn shape(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }
}

impl Mesh for RectangleMesh {
    fn dim(&self) -> usize {
        2
    }

    fn cell_count(&self) -> usize {
        self.nx * self.ny
    }

    fn centroid(&self, cell: usize) -> Point {
        let i = cell % self.nx;
        let j = cell / self.nx;
        [
            (i as f64 + 0.5) * self.lx / self.nx as f64,
            (j as f64 + 0.5) * self.ly / self.ny as f64,
            0.0,
        ]
    }

    fn volume(&self, _cell: usize) -> f64 {
        (self.lx / self.nx as f64) * (self.ly / self.ny as f64)
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
