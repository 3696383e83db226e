//! Mesh trait compliance test helpers.
//!
//! These functions check the invariants every backend must satisfy for
//! the finite-volume assembly to be conservative. Reused by the backend
//! test modules.

use crate::mesh::Mesh;

/// Every cell has a positive, finite volume.
pub fn assert_volumes_positive(mesh: &dyn Mesh) {
    for c in 0..mesh.cell_count() {
        let v = mesh.volume(c);
        assert!(v.is_finite() && v > 0.0, "cell {c} has volume {v}");
    }
}

/// Interior faces reference two distinct valid cells with positive geometry.
pub fn assert_interior_faces_valid(mesh: &dyn Mesh) {
    let n = mesh.cell_count();
    for (k, face) in mesh.interior_faces().iter().enumerate() {
        let (a, b) = face.cells;
        assert!(a < n && b < n, "face {k} references cell out of range");
        assert_ne!(a, b, "face {k} connects cell {a} to itself");
        assert!(face.area > 0.0, "face {k} has area {}", face.area);
        assert!(face.distance > 0.0, "face {k} has distance {}", face.distance);
    }
}

/// Boundary faces reference valid cells and non-zero surface markers.
pub fn assert_boundary_faces_valid(mesh: &dyn Mesh) {
    let n = mesh.cell_count();
    for (k, face) in mesh.boundary_faces().iter().enumerate() {
        assert!(face.cell < n, "boundary face {k} references cell out of range");
        assert!(face.surface > 0, "boundary face {k} has no surface marker");
        assert!(face.area > 0.0 && face.distance > 0.0);
    }
}

/// No interior face is listed twice.
pub fn assert_no_duplicate_faces(mesh: &dyn Mesh) {
    let mut pairs: Vec<(usize, usize)> = mesh
        .interior_faces()
        .iter()
        .map(|f| (f.cells.0.min(f.cells.1), f.cells.0.max(f.cells.1)))
        .collect();
    let before = pairs.len();
    pairs.sort_unstable();
    pairs.dedup();
    assert_eq!(before, pairs.len(), "duplicate interior faces");
}

/// Run all compliance checks.
pub fn check_all(mesh: &dyn Mesh) {
    assert_volumes_positive(mesh);
    assert_interior_faces_valid(mesh);
    assert_boundary_faces_valid(mesh);
    assert_no_duplicate_faces(mesh);
}
