//! Fitness evaluation of decoded schedules.
//!
//! The objective is the makespan, optionally extended with weighted total
//! machine idle time and maximum machine workload. Lower is better.

use std::cmp::Ordering;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::instance::Time;
use crate::schedule::Schedule;

/// Secondary criterion used to break ties between equal objective values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TieBreak {
    /// Ties keep their existing (stable) order
    None,
    /// Prefer less total machine idle time
    IdleTime,
    /// Prefer a smaller maximum machine workload
    MaxWorkload,
}

/// Weights of the scalar objective
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveWeights {
    pub makespan: f64,
    pub idle_time: f64,
    pub max_workload: f64,
    pub tie_break: TieBreak,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        ObjectiveWeights {
            makespan: 1.0,
            idle_time: 0.0,
            max_workload: 0.0,
            tie_break: TieBreak::None,
        }
    }
}

/// Fitness of one chromosome for one generation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Fitness {
    /// Weighted objective value (lower is better)
    pub value: f64,
    /// Makespan of the decoded schedule
    pub makespan: Time,
    /// Tie-break value (0 when no tie-break is configured)
    pub secondary: f64,
}

impl PartialEq for Fitness {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Fitness {}

impl PartialOrd for Fitness {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fitness {
    fn cmp(&self, other: &Self) -> Ordering {
        OrderedFloat(self.value).cmp(&OrderedFloat(other.value))
            .then_with(|| OrderedFloat(self.secondary).cmp(&OrderedFloat(other.secondary)))
    }
}

/// Evaluate a decoded schedule under the given objective weights
pub fn evaluate(schedule: &Schedule, weights: &ObjectiveWeights) -> Fitness {
    let makespan = schedule.makespan();
    let needs_idle = weights.idle_time != 0.0 || weights.tie_break == TieBreak::IdleTime;
    let needs_workload = weights.max_workload != 0.0 || weights.tie_break == TieBreak::MaxWorkload;

    let idle = if needs_idle { schedule.total_idle_time() as f64 } else { 0.0 };
    let workload = if needs_workload { schedule.max_machine_workload() as f64 } else { 0.0 };

    let value = weights.makespan * makespan as f64
        + weights.idle_time * idle
        + weights.max_workload * workload;

    let secondary = match weights.tie_break {
        TieBreak::None => 0.0,
        TieBreak::IdleTime => idle,
        TieBreak::MaxWorkload => workload,
    };

    Fitness { value, makespan, secondary }
}
