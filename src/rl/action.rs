//! Action space of the controller and the operator parameters it drives.

use std::fmt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};

/// Operator parameters in effect for one generation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperatorParameters {
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub selection_pressure: usize,
}

/// One discrete controller decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Use the preset at this index of the parameter grid
    Preset(usize),
    /// Redraw the crossover rate from its range
    ResampleCrossover,
    /// Redraw the mutation rate from its range
    ResampleMutation,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Preset(i) => write!(f, "preset-{}", i),
            Action::ResampleCrossover => write!(f, "resample-crossover"),
            Action::ResampleMutation => write!(f, "resample-mutation"),
        }
    }
}

/// Finite set of actions, fixed for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ActionSpace {
    /// Every combination of the candidate values is one action
    Grid {
        crossover_rates: Vec<f64>,
        mutation_rates: Vec<f64>,
        selection_pressures: Vec<usize>,
    },
    /// Two actions redrawing one rate uniformly from its range
    Resample {
        crossover_range: (f64, f64),
        mutation_range: (f64, f64),
        selection_pressure: usize,
    },
}

impl Default for ActionSpace {
    fn default() -> Self {
        ActionSpace::Grid {
            crossover_rates: vec![0.6, 0.8, 0.95],
            mutation_rates: vec![0.05, 0.15, 0.3],
            selection_pressures: vec![2, 4],
        }
    }
}

fn check_rate(rate: f64, what: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(SolverError::InvalidConfig(format!("{} {} outside [0, 1]", what, rate)));
    }
    Ok(())
}

impl ActionSpace {
    /// Two actions: re-draw the crossover rate in [0.4, 0.9] or the mutation
    /// rate in [0.01, 0.21]
    pub fn resample() -> Self {
        ActionSpace::Resample {
            crossover_range: (0.4, 0.9),
            mutation_range: (0.01, 0.21),
            selection_pressure: 2,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ActionSpace::Grid { crossover_rates, mutation_rates, selection_pressures } => {
                if crossover_rates.is_empty() || mutation_rates.is_empty() || selection_pressures.is_empty() {
                    return Err(SolverError::InvalidConfig("parameter grid has an empty candidate list".into()));
                }
                for &rate in crossover_rates {
                    check_rate(rate, "crossover rate")?;
                }
                for &rate in mutation_rates {
                    check_rate(rate, "mutation rate")?;
                }
                if selection_pressures.contains(&0) {
                    return Err(SolverError::InvalidConfig("selection pressure must be at least 1".into()));
                }
            }
            ActionSpace::Resample { crossover_range, mutation_range, selection_pressure } => {
                for (range, what) in [(crossover_range, "crossover rate"), (mutation_range, "mutation rate")] {
                    check_rate(range.0, what)?;
                    check_rate(range.1, what)?;
                    if range.0 > range.1 {
                        return Err(SolverError::InvalidConfig(format!("{} range is reversed", what)));
                    }
                }
                if *selection_pressure == 0 {
                    return Err(SolverError::InvalidConfig("selection pressure must be at least 1".into()));
                }
            }
        }
        Ok(())
    }

    /// Number of actions
    pub fn len(&self) -> usize {
        match self {
            ActionSpace::Grid { crossover_rates, mutation_rates, selection_pressures } => {
                crossover_rates.len() * mutation_rates.len() * selection_pressures.len()
            }
            ActionSpace::Resample { .. } => 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Action with index `index` in `0..len()`
    pub fn action(&self, index: usize) -> Action {
        match self {
            ActionSpace::Grid { .. } => Action::Preset(index),
            ActionSpace::Resample { .. } => {
                if index == 0 { Action::ResampleCrossover } else { Action::ResampleMutation }
            }
        }
    }

    /// Parameters used before the controller has acted: the middle grid
    /// candidate of each list, or the middle of each range.
    pub fn initial_parameters(&self) -> OperatorParameters {
        match self {
            ActionSpace::Grid { crossover_rates, mutation_rates, selection_pressures } => OperatorParameters {
                crossover_rate: crossover_rates[crossover_rates.len() / 2],
                mutation_rate: mutation_rates[mutation_rates.len() / 2],
                selection_pressure: selection_pressures[selection_pressures.len() / 2],
            },
            ActionSpace::Resample { crossover_range, mutation_range, selection_pressure } => OperatorParameters {
                crossover_rate: (crossover_range.0 + crossover_range.1) / 2.0,
                mutation_rate: (mutation_range.0 + mutation_range.1) / 2.0,
                selection_pressure: *selection_pressure,
            },
        }
    }

    /// Parameters after taking `action` from `current`
    pub fn apply<R: Rng + ?Sized>(
        &self,
        action: Action,
        current: &OperatorParameters,
        rng: &mut R,
    ) -> OperatorParameters {
        match (self, action) {
            (ActionSpace::Grid { crossover_rates, mutation_rates, selection_pressures }, Action::Preset(index)) => {
                let c = index % crossover_rates.len();
                let m = (index / crossover_rates.len()) % mutation_rates.len();
                let p = (index / (crossover_rates.len() * mutation_rates.len())) % selection_pressures.len();
                OperatorParameters {
                    crossover_rate: crossover_rates[c],
                    mutation_rate: mutation_rates[m],
                    selection_pressure: selection_pressures[p],
                }
            }
            (ActionSpace::Resample { crossover_range, .. }, Action::ResampleCrossover) => OperatorParameters {
                crossover_rate: sample(*crossover_range, rng),
                ..*current
            },
            (ActionSpace::Resample { mutation_range, .. }, Action::ResampleMutation) => OperatorParameters {
                mutation_rate: sample(*mutation_range, rng),
                ..*current
            },
            // Actions always come from `self.action`, other pairs cannot occur
            _ => *current,
        }
    }
}

fn sample<R: Rng + ?Sized>(range: (f64, f64), rng: &mut R) -> f64 {
    if range.1 > range.0 {
        rng.gen_range(range.0..=range.1)
    } else {
        range.0
    }
}
