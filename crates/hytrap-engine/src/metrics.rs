//! Per-step performance metrics for the simulation engine.
//!
//! [`StepMetrics`] captures timing and solver effort for a single step;
//! [`RunSummary`] closes a whole run.

/// Timing and iteration counts collected during a single step.
///
/// All durations are in microseconds. The engine populates these after
/// each successful step; adaptive step control reads the iteration
/// counts from the most recent step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepMetrics {
    /// Wall-clock time for the entire step.
    pub total_us: u64,
    /// Time spent moving the expression clock to the new time.
    pub expression_update_us: u64,
    /// Per-stage solve times: `(name, microseconds)`.
    pub stage_us: Vec<(String, u64)>,
    /// Per-stage Newton iterations: `(name, iterations)`.
    pub stage_iterations: Vec<(String, usize)>,
    /// Time spent refreshing material properties.
    pub property_refresh_us: u64,
    /// Time spent in post-processors.
    pub post_processing_us: u64,
    /// Time spent promoting staged fields.
    pub commit_us: u64,
}

impl StepMetrics {
    /// Iterations reported by the named stage, if it ran.
    pub fn iterations_of(&self, stage: &str) -> Option<usize> {
        self.stage_iterations
            .iter()
            .find(|(name, _)| name == stage)
            .map(|&(_, n)| n)
    }
}

/// What a completed run did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    /// Committed steps (1 for a stationary run).
    pub steps: u64,
    /// Final simulation time.
    pub final_time: f64,
    /// Steps rolled back and retried with a smaller step size.
    pub rejected_steps: u64,
    /// Metrics of the last successful step.
    pub last_metrics: StepMetrics,
}
