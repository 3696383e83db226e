//! Criterion benchmarks for mesh construction and property refresh.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hytrap_materials::{Material, MaterialTable};
use hytrap_mesh::{IntervalMesh, Mesh, RectangleMesh, Refinement};

fn bench_refined_interval(c: &mut Criterion) {
    let refinements = [
        Refinement { cells: 400, x: 1e-2 },
        Refinement { cells: 200, x: 1e-3 },
    ];
    c.bench_function("interval_refined_1000", |b| {
        b.iter(|| {
            let mesh = IntervalMesh::refined(1.0, 1000, &refinements).unwrap();
            black_box(mesh.cell_count());
        });
    });
}

fn bench_rectangle_faces(c: &mut Criterion) {
    let mesh = RectangleMesh::unit_square(100).unwrap();
    c.bench_function("rectangle_100x100_face_sweep", |b| {
        b.iter(|| {
            let total: f64 = mesh.interior_faces().iter().map(|f| f.area).sum();
            black_box(total);
        });
    });
}

fn bench_property_refresh(c: &mut Criterion) {
    let mesh = IntervalMesh::uniform(1.0, 10_000).unwrap();
    let table = MaterialTable::new(
        vec![Material::new(1, 4.1e-7, 0.39).with_solubility(1.87e24, 1.04)],
        &mesh,
    )
    .unwrap();
    let temperature: Vec<f64> = (0..10_000).map(|i| 300.0 + 0.05 * i as f64).collect();
    c.bench_function("property_refresh_10k", |b| {
        b.iter(|| {
            let snapshot = table.refresh(&temperature).unwrap();
            black_box(&snapshot);
        });
    });
}

criterion_group!(
    benches,
    bench_refined_interval,
    bench_rectangle_faces,
    bench_property_refresh
);
criterion_main!(benches);
