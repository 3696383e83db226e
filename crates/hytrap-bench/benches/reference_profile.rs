//! Criterion benchmarks for the reference transport pipeline.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hytrap_bench::{heat_profile, reference_profile, stress_profile};
use hytrap_engine::{run, setup, Parameters, Simulation};

fn simulation(parameters: &Parameters) -> Simulation {
    let mut setup = setup::build(parameters).unwrap();
    setup.resolve_initial_state().unwrap();
    Simulation::new(setup.config).unwrap()
}

fn bench_step_reference(c: &mut Criterion) {
    let mut sim = simulation(&reference_profile(1e9));

    // Warm up: one step so staging buffers are allocated
    sim.step().unwrap();

    c.bench_function("step_reference", |b| {
        b.iter(|| {
            sim.step().unwrap();
            black_box(sim.clock().time());
        });
    });
}

fn bench_step_stress(c: &mut Criterion) {
    let mut sim = simulation(&stress_profile(1e9));
    sim.step().unwrap();

    c.bench_function("step_stress", |b| {
        b.iter(|| {
            sim.step().unwrap();
            black_box(sim.clock().time());
        });
    });
}

fn bench_step_heat(c: &mut Criterion) {
    let mut sim = simulation(&heat_profile(1e9));
    sim.step().unwrap();

    c.bench_function("step_heat", |b| {
        b.iter(|| {
            sim.step().unwrap();
            black_box(sim.clock().time());
        });
    });
}

fn bench_run_100_steps(c: &mut Criterion) {
    c.bench_function("run_100_steps_reference", |b| {
        b.iter(|| {
            let output = run(reference_profile(1.0)).unwrap();
            black_box(&output.solutions);
        });
    });
}

criterion_group!(
    benches,
    bench_step_reference,
    bench_step_stress,
    bench_step_heat,
    bench_run_100_steps
);
criterion_main!(benches);
