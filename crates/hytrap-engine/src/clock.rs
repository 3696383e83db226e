//! Simulation time bookkeeping.

use hytrap_core::StepIndex;
use hytrap_solver::StepInfo;

/// Saved clock position for rollback.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClockState {
    index: StepIndex,
    segment_start: f64,
    segment_steps: u64,
    time: f64,
    dt: f64,
    done: bool,
}

/// Current time, step size, and termination test.
///
/// Time is `segment_start + k * dt`, where a new segment starts whenever
/// the step size changes. Computing rather than accumulating time keeps
/// the number of fixed-size steps to `F` equal to `ceil(F / dt)`
/// whenever `k * dt` is exact.
///
/// A stationary clock has no step size and finishes after one
/// [`advance`](SimulationClock::advance).
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationClock {
    final_time: Option<f64>,
    state: ClockState,
}

impl SimulationClock {
    /// A transient clock starting at `t = 0`.
    pub fn transient(final_time: f64, dt: f64) -> Self {
        Self {
            final_time: Some(final_time),
            state: ClockState {
                index: StepIndex(0),
                segment_start: 0.0,
                segment_steps: 0,
                time: 0.0,
                dt,
                done: false,
            },
        }
    }

    /// A clock for one steady-state solve.
    pub fn stationary() -> Self {
        Self {
            final_time: None,
            state: ClockState {
                index: StepIndex(0),
                segment_start: 0.0,
                segment_steps: 0,
                time: 0.0,
                dt: 0.0,
                done: false,
            },
        }
    }

    /// Whether the clock marches in time.
    pub fn is_transient(&self) -> bool {
        self.final_time.is_some()
    }

    /// Current simulation time, s.
    pub fn time(&self) -> f64 {
        self.state.time
    }

    /// Index of the last step taken.
    pub fn index(&self) -> StepIndex {
        self.state.index
    }

    /// Step size of the next step; `None` when stationary.
    pub fn step_size(&self) -> Option<f64> {
        self.final_time.map(|_| self.state.dt)
    }

    /// End time; `None` when stationary.
    pub fn final_time(&self) -> Option<f64> {
        self.final_time
    }

    /// Whether no further step should be taken.
    pub fn is_finished(&self) -> bool {
        match self.final_time {
            Some(f) => self.state.time >= f,
            None => self.state.done,
        }
    }

    /// Fraction of the run completed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        match self.final_time {
            Some(f) => (self.state.time / f).clamp(0.0, 1.0),
            None if self.state.done => 1.0,
            None => 0.0,
        }
    }

    /// Move to the next step and describe it.
    pub fn advance(&mut self) -> StepInfo {
        let s = &mut self.state;
        s.index = s.index.next();
        if self.final_time.is_none() {
            s.done = true;
            return StepInfo::stationary();
        }
        s.segment_steps += 1;
        s.time = s.segment_start + s.segment_steps as f64 * s.dt;
        StepInfo::transient(s.index, s.time, s.dt)
    }

    /// Change the step size for subsequent steps. Starts a new segment
    /// at the current time.
    pub fn set_step_size(&mut self, dt: f64) {
        let s = &mut self.state;
        s.segment_start = s.time;
        s.segment_steps = 0;
        s.dt = dt;
    }

    /// Save the current position.
    pub fn checkpoint(&self) -> ClockState {
        self.state
    }

    /// Return to a saved position.
    pub fn restore(&mut self, state: ClockState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn stationary_finishes_after_one_advance() {
        let mut clock = SimulationClock::stationary();
        assert!(!clock.is_finished());
        assert_eq!(clock.step_size(), None);
        let step = clock.advance();
        assert_eq!(step.dt, None);
        assert!(clock.is_finished());
        assert_eq!(clock.progress(), 1.0);
    }

    #[test]
    fn restore_rewinds_time_and_index() {
        let mut clock = SimulationClock::transient(1.0, 0.25);
        clock.advance();
        let saved = clock.checkpoint();
        clock.advance();
        assert_eq!(clock.time(), 0.5);
        clock.restore(saved);
        assert_eq!(clock.time(), 0.25);
        assert_eq!(clock.index(), StepIndex(1));
    }

    #[test]
    fn step_size_change_starts_new_segment() {
        let mut clock = SimulationClock::transient(10.0, 0.5);
        clock.advance();
        clock.advance();
        clock.set_step_size(0.25);
        let step = clock.advance();
        assert_eq!(step.time, 1.25);
        assert_eq!(step.dt, Some(0.25));
        assert_eq!(step.index, StepIndex(3));
    }

    proptest! {
        #[test]
        fn fixed_step_count_is_ceiling(final_time in 0.1f64..50.0, exp in 0u32..6) {
            let dt = 1.0 / f64::from(1u32 << exp);
            let mut clock = SimulationClock::transient(final_time, dt);
            let mut steps = 0u64;
            while !clock.is_finished() {
                clock.advance();
                steps += 1;
            }
            prop_assert_eq!(steps, (final_time / dt).ceil() as u64);
            prop_assert!(clock.time() >= final_time);
            prop_assert!(clock.time() - dt < final_time);
        }
    }
}
