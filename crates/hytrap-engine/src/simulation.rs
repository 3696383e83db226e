//! The time-stepping engine.
//!
//! [`Simulation`] owns every piece of run state and advances it one step
//! at a time. A step is atomic: stages write into a staging overlay,
//! post-processors read the result, and only then is the overlay
//! committed. Any failure rolls back the staged fields, the clock, the
//! expression time and the property snapshot.

use std::time::Instant;

use hytrap_core::{FieldReader, SolveError, StepError};
use hytrap_expr::ExpressionClock;
use hytrap_materials::{MaterialTable, PropertySnapshot};
use hytrap_mesh::Mesh;
use hytrap_solver::{
    validate_pipeline, ExecutionPlan, FieldLayout, SolveContext, StepInfo, Subproblem,
};
use log::{debug, info, warn};

use crate::clock::SimulationClock;
use crate::config::{ConfigurationError, SimulationConfig, SolveMode};
use crate::export::ExportError;
use crate::metrics::{RunSummary, StepMetrics};
use crate::overlay::{OverlayReader, StagedFieldCache};
use crate::parameters::AdaptiveStepsize;
use crate::postprocess::{DerivedTable, PostProcessor, StepView};
use crate::store::{CurrentFields, FieldStore, StageWriter};

/// Newton iteration count below which adaptive stepping grows `dt`.
const FAST_CONVERGENCE: usize = 5;

/// A configured simulation, ready to step.
pub struct Simulation {
    mesh: Box<dyn Mesh>,
    materials: MaterialTable,
    layout: FieldLayout,
    expressions: ExpressionClock,
    stages: Vec<Box<dyn Subproblem>>,
    plan: ExecutionPlan,
    store: FieldStore,
    staged_cache: StagedFieldCache,
    properties: PropertySnapshot,
    committed_properties: PropertySnapshot,
    clock: SimulationClock,
    adaptive: Option<AdaptiveStepsize>,
    step_control_stage: Option<usize>,
    post_processors: Vec<Box<dyn PostProcessor>>,
    derived: DerivedTable,
    last_metrics: StepMetrics,
    steps: u64,
    rejected_steps: u64,
}

impl Simulation {
    /// Validate `config` and build the engine.
    ///
    /// Material properties are evaluated once from the initial
    /// temperature.
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let plan = validate_pipeline(
            &config.stages,
            &config.layout.defined_fields(),
            config.layout.temperature,
            config.mode.dt(),
        )?;
        let temperature = config
            .initial_values
            .get(config.layout.temperature.0 as usize)
            .ok_or_else(|| ConfigurationError::InvalidValue {
                key: "initial_values".into(),
                reason: "no initial temperature".into(),
            })?;
        let properties = config.materials.refresh(temperature)?;
        let clock = match config.mode {
            SolveMode::Transient {
                final_time,
                initial_stepsize,
            } => SimulationClock::transient(final_time, initial_stepsize),
            SolveMode::Stationary => SimulationClock::stationary(),
        };
        let header = config
            .post_processors
            .iter()
            .flat_map(|p| p.header())
            .collect();

        Ok(Self {
            mesh: config.mesh,
            materials: config.materials,
            layout: config.layout,
            expressions: config.expressions,
            stages: config.stages,
            plan,
            store: FieldStore::new(config.initial_values),
            staged_cache: StagedFieldCache::new(),
            committed_properties: properties.clone(),
            properties,
            clock,
            adaptive: config.adaptive,
            step_control_stage: config.step_control_stage,
            post_processors: config.post_processors,
            derived: DerivedTable {
                header,
                rows: Vec::new(),
            },
            last_metrics: StepMetrics::default(),
            steps: 0,
            rejected_steps: 0,
        })
    }

    // ── Stepping ───────────────────────────────────────────────────

    /// Run until the clock finishes. Logs progress once per step.
    pub fn run(&mut self) -> Result<RunSummary, StepError> {
        let started = Instant::now();
        while !self.clock.is_finished() {
            self.step()?;
            info!(
                "{:.1} % completed, t = {:e} s, elapsed {:.2} s",
                100.0 * self.clock.progress(),
                self.clock.time(),
                started.elapsed().as_secs_f64()
            );
        }
        Ok(self.summary())
    }

    /// Take one step, retrying with smaller step sizes on convergence
    /// failure when adaptive stepping is configured.
    pub fn step(&mut self) -> Result<StepMetrics, StepError> {
        let adaptive = match self.adaptive {
            Some(a) if self.clock.is_transient() => a,
            _ => return self.execute_step(),
        };
        loop {
            match self.execute_step() {
                Ok(metrics) => {
                    self.adapt_step_size(&adaptive, &metrics);
                    return Ok(metrics);
                }
                Err(e) if e.is_convergence() => {
                    self.rejected_steps += 1;
                    let dt = self.clock.step_size().unwrap_or(0.0) / adaptive.stepsize_change_ratio;
                    if dt < adaptive.dt_min {
                        return Err(StepError::StepSizeUnderflow {
                            dt,
                            dt_min: adaptive.dt_min,
                        });
                    }
                    warn!(
                        "{e}; retrying from t = {:e} s with dt = {dt:e} s",
                        self.clock.time()
                    );
                    self.clock.set_step_size(dt);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Take exactly one step with the current step size.
    ///
    /// On success in a transient run the staged fields are committed.
    /// A stationary run leaves them staged, readable through
    /// [`current`](Self::current). On failure all state is rolled back.
    pub fn execute_step(&mut self) -> Result<StepMetrics, StepError> {
        if self.clock.is_finished() {
            return Err(StepError::Finished);
        }
        let step_start = Instant::now();
        let saved_clock = self.clock.checkpoint();
        let saved_time = self.expressions.time();
        let step = self.clock.advance();

        let t = Instant::now();
        self.expressions.advance_to(step.time);
        let mut metrics = StepMetrics {
            expression_update_us: t.elapsed().as_micros() as u64,
            ..Default::default()
        };

        let record = match self
            .run_stages(step, &mut metrics)
            .and_then(|()| self.post_process(step, &mut metrics))
        {
            Ok(record) => record,
            Err(e) => {
                self.store.rollback();
                self.clock.restore(saved_clock);
                self.expressions.advance_to(saved_time);
                self.properties.clone_from(&self.committed_properties);
                debug!("step {} rolled back: {e}", step.index);
                return Err(e);
            }
        };

        if self.clock.is_transient() {
            let t = Instant::now();
            self.store.commit();
            self.committed_properties.clone_from(&self.properties);
            metrics.commit_us = t.elapsed().as_micros() as u64;
        }
        if let Some(row) = record {
            self.derived.rows.push(row);
        }
        self.steps += 1;
        metrics.total_us = step_start.elapsed().as_micros() as u64;
        self.last_metrics = metrics.clone();
        Ok(metrics)
    }

    fn run_stages(&mut self, step: StepInfo, metrics: &mut StepMetrics) -> Result<(), StepError> {
        let Self {
            mesh,
            materials,
            layout,
            expressions,
            stages,
            plan,
            store,
            staged_cache,
            properties,
            ..
        } = self;

        for (i, stage) in stages.iter().enumerate() {
            let name = stage.name();
            let fail = |reason: SolveError| StepError::SubproblemFailed {
                name: name.to_string(),
                reason,
            };
            let missing_plan = || {
                fail(SolveError::InvalidState {
                    reason: format!("no execution plan entry for stage {i}"),
                })
            };
            let routes = plan.routes_for(i).ok_or_else(missing_plan)?;
            let write_modes = plan.write_modes_for(i).ok_or_else(missing_plan)?;

            // 1. Copy staged inputs so the staging area can be borrowed mutably.
            staged_cache.refill(routes, &store.current());

            // 2. Seed write buffers.
            for (&field, &mode) in write_modes {
                store.prepare(field, mode).map_err(fail)?;
            }

            // 3. Solve.
            let started = Instant::now();
            let report = {
                let (committed, staged) = store.parts_mut();
                let overlay = OverlayReader::new(routes, committed, staged_cache);
                let mut writer = StageWriter::new(staged, write_modes);
                let mut ctx = SolveContext::new(
                    &overlay,
                    committed,
                    &mut writer,
                    mesh.as_ref(),
                    properties,
                    materials,
                    expressions,
                    step,
                );
                stage.solve(&mut ctx).map_err(fail)?
            };
            let elapsed = started.elapsed().as_micros() as u64;

            // 4. Reject non-finite output before anything downstream sees it.
            for &field in write_modes.keys() {
                if let Some(data) = store.current().read(field) {
                    if let Some(index) = data.iter().position(|v| !v.is_finite()) {
                        return Err(fail(SolveError::NanDetected {
                            field,
                            index: Some(index),
                        }));
                    }
                }
            }
            debug!(
                "stage '{name}': {} iterations, residual {:e}, {elapsed} us",
                report.iterations, report.residual
            );
            metrics.stage_us.push((name.to_string(), elapsed));
            metrics
                .stage_iterations
                .push((name.to_string(), report.iterations));

            // 5. Keep properties consistent with a new temperature.
            if plan.refreshes_properties(i) {
                let t = Instant::now();
                let current = store.current();
                let temperature = current
                    .read(layout.temperature)
                    .ok_or(SolveError::FieldUnavailable {
                        field: layout.temperature,
                    })
                    .map_err(fail)?;
                *properties = materials.refresh(temperature).map_err(|e| {
                    fail(SolveError::InvalidState {
                        reason: e.to_string(),
                    })
                })?;
                metrics.property_refresh_us += t.elapsed().as_micros() as u64;
            }
        }
        Ok(())
    }

    fn post_process(
        &mut self,
        step: StepInfo,
        metrics: &mut StepMetrics,
    ) -> Result<Option<Vec<f64>>, StepError> {
        let started = Instant::now();
        let final_step = self.clock.is_finished();
        let Self {
            mesh,
            materials,
            layout,
            expressions,
            store,
            properties,
            post_processors,
            ..
        } = self;
        let current = store.current();
        let view = StepView {
            fields: &current,
            previous: store.committed(),
            mesh: mesh.as_ref(),
            properties,
            materials,
            expressions,
            layout,
            step,
            final_step,
        };
        let mut record: Option<Vec<f64>> = None;
        for processor in post_processors.iter_mut() {
            let out = processor
                .process(&view)
                .map_err(|e| StepError::PostProcessingFailed {
                    reason: format!("{}: {e}", processor.name()),
                })?;
            if let Some(values) = out {
                record.get_or_insert_with(Vec::new).extend(values);
            }
        }
        metrics.post_processing_us = started.elapsed().as_micros() as u64;
        Ok(record)
    }

    fn adapt_step_size(&mut self, adaptive: &AdaptiveStepsize, metrics: &StepMetrics) {
        let Some(dt) = self.clock.step_size() else {
            return;
        };
        let iterations = self
            .step_control_stage
            .and_then(|i| metrics.stage_iterations.get(i))
            .map(|&(_, n)| n);
        let ratio = adaptive.stepsize_change_ratio;
        let mut next = match iterations {
            Some(n) if n < FAST_CONVERGENCE => dt * ratio,
            Some(_) => dt / ratio,
            None => dt,
        };
        if let (Some(t_stop), Some(max)) = (adaptive.t_stop, adaptive.stepsize_stop_max) {
            if self.clock.time() >= t_stop {
                next = next.min(max);
            }
        }
        if next != dt {
            debug!("step size {dt:e} -> {next:e}");
            self.clock.set_step_size(next);
        }
    }

    /// Call [`PostProcessor::finish`] on every post-processor.
    pub fn finish_post_processing(&mut self) -> Result<(), ExportError> {
        for processor in &mut self.post_processors {
            processor.finish()?;
        }
        Ok(())
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// Latest value of every field.
    pub fn current(&self) -> CurrentFields<'_> {
        self.store.current()
    }

    /// Committed values: the end of the last committed step.
    pub fn previous(&self) -> &dyn FieldReader {
        self.store.committed()
    }

    /// Properties at the current temperature.
    pub fn properties(&self) -> &PropertySnapshot {
        &self.properties
    }

    /// The mesh.
    pub fn mesh(&self) -> &dyn Mesh {
        self.mesh.as_ref()
    }

    /// Field ids.
    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Material table.
    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    /// Expression clock.
    pub fn expressions(&self) -> &ExpressionClock {
        &self.expressions
    }

    /// Simulation clock.
    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// Number of committed steps.
    pub fn commit_count(&self) -> u64 {
        self.store.commit_count()
    }

    /// Derived quantities accumulated so far.
    pub fn derived_quantities(&self) -> &DerivedTable {
        &self.derived
    }

    /// Metrics of the last successful step.
    pub fn last_metrics(&self) -> &StepMetrics {
        &self.last_metrics
    }

    /// Steps rolled back by adaptive stepping.
    pub fn rejected_steps(&self) -> u64 {
        self.rejected_steps
    }

    /// Summary of the steps taken so far.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            steps: self.steps,
            final_time: self.clock.time(),
            rejected_steps: self.rejected_steps,
            last_metrics: self.last_metrics.clone(),
        }
    }

    /// Give up the engine, keeping the mesh.
    pub fn into_mesh(self) -> Box<dyn Mesh> {
        self.mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hytrap_core::FieldId;
    use hytrap_materials::Material;
    use hytrap_mesh::IntervalMesh;
    use hytrap_test_utils::{ConstStage, CopyStage, CountingStage, FailingStage};

    const T: FieldId = FieldId(0);
    const C: FieldId = FieldId(1);

    fn config(stages: Vec<Box<dyn Subproblem>>, mode: SolveMode) -> SimulationConfig {
        let mesh = IntervalMesh::uniform(1.0, 3).unwrap();
        let materials = MaterialTable::new(vec![Material::new(1, 1.0, 0.0)], &mesh).unwrap();
        SimulationConfig {
            mesh: Box::new(mesh),
            materials,
            layout: FieldLayout::new(0, 0),
            initial_values: vec![vec![300.0; 3], vec![0.0; 3]],
            expressions: ExpressionClock::new(),
            stages,
            mode,
            adaptive: None,
            step_control_stage: None,
            post_processors: Vec::new(),
        }
    }

    fn transient(final_time: f64, dt: f64) -> SolveMode {
        SolveMode::Transient {
            final_time,
            initial_stepsize: dt,
        }
    }

    #[test]
    fn later_stage_reads_earlier_write() {
        let stages: Vec<Box<dyn Subproblem>> = vec![
            Box::new(ConstStage::new("heat", T, 500.0)),
            Box::new(CopyStage::new("copy", T, C)),
        ];
        let mut sim = Simulation::new(config(stages, transient(1.0, 1.0))).unwrap();
        sim.step().unwrap();
        assert_eq!(sim.previous().read(C), Some(&[500.0; 3][..]));
    }

    #[test]
    fn temperature_write_refreshes_properties() {
        let stages: Vec<Box<dyn Subproblem>> = vec![Box::new(ConstStage::new("heat", T, 600.0))];
        let mesh = IntervalMesh::uniform(1.0, 3).unwrap();
        let materials = MaterialTable::new(vec![Material::new(1, 2.0, 0.5)], &mesh).unwrap();
        let mut c = config(stages, transient(1.0, 1.0));
        c.materials = materials;
        let mut sim = Simulation::new(c).unwrap();
        let before = sim.properties().diffusivity[0];
        sim.step().unwrap();
        assert!(sim.properties().diffusivity[0] > before);
    }

    #[test]
    fn failure_rolls_back_everything() {
        let stages: Vec<Box<dyn Subproblem>> = vec![Box::new(FailingStage::new("flaky", C, 1))];
        let mut sim = Simulation::new(config(stages, transient(3.0, 1.0))).unwrap();
        sim.step().unwrap();
        let time = sim.clock().time();
        let err = sim.step().unwrap_err();
        assert!(err.is_convergence());
        assert_eq!(sim.clock().time(), time);
        assert_eq!(sim.expressions().time(), time);
        assert_eq!(sim.commit_count(), 1);
        assert_eq!(sim.current().read(C), Some(&[0.0; 3][..]));
    }

    #[test]
    fn stationary_solves_once_without_commit() {
        let stages: Vec<Box<dyn Subproblem>> = vec![Box::new(CountingStage::new("count", C, 2))];
        let mut sim = Simulation::new(config(stages, SolveMode::Stationary)).unwrap();
        let summary = sim.run().unwrap();
        assert_eq!(summary.steps, 1);
        assert_eq!(sim.commit_count(), 0);
        assert_eq!(sim.current().read(C), Some(&[1.0; 3][..]));
        assert_eq!(sim.previous().read(C), Some(&[0.0; 3][..]));
        assert_eq!(sim.step().unwrap_err(), StepError::Finished);
    }

    #[test]
    fn adaptive_growth_and_shrink() {
        let stages: Vec<Box<dyn Subproblem>> = vec![Box::new(CountingStage::new("count", C, 2))];
        let mut c = config(stages, transient(100.0, 1.0));
        c.adaptive = Some(AdaptiveStepsize {
            stepsize_change_ratio: 2.0,
            dt_min: 1e-3,
            t_stop: Some(3.0),
            stepsize_stop_max: Some(1.5),
        });
        c.step_control_stage = Some(0);
        let mut sim = Simulation::new(c).unwrap();
        sim.step().unwrap();
        assert_eq!(sim.clock().step_size(), Some(2.0));
        sim.step().unwrap();
        // t = 3 reached t_stop: growth to 4 is capped.
        assert_eq!(sim.clock().step_size(), Some(1.5));

        let stages: Vec<Box<dyn Subproblem>> = vec![Box::new(CountingStage::new("count", C, 9))];
        let mut c = config(stages, transient(100.0, 1.0));
        c.adaptive = Some(AdaptiveStepsize {
            stepsize_change_ratio: 2.0,
            dt_min: 1e-3,
            t_stop: None,
            stepsize_stop_max: None,
        });
        c.step_control_stage = Some(0);
        let mut sim = Simulation::new(c).unwrap();
        sim.step().unwrap();
        assert_eq!(sim.clock().step_size(), Some(0.5));
    }

    #[test]
    fn adaptive_underflow_reported() {
        let stages: Vec<Box<dyn Subproblem>> = vec![Box::new(FailingStage::new("never", C, 0))];
        let mut c = config(stages, transient(1.0, 1.0));
        c.adaptive = Some(AdaptiveStepsize {
            stepsize_change_ratio: 2.0,
            dt_min: 0.2,
            t_stop: None,
            stepsize_stop_max: None,
        });
        let mut sim = Simulation::new(c).unwrap();
        assert!(matches!(
            sim.step(),
            Err(StepError::StepSizeUnderflow { dt, dt_min }) if dt == 0.125 && dt_min == 0.2
        ));
        assert_eq!(sim.rejected_steps(), 3);
        assert_eq!(sim.commit_count(), 0);
    }
}
